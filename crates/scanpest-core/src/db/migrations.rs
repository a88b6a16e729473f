//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        apply(conn, 1, MIGRATION_V1)?;
    }
    if version < 2 {
        apply(conn, 2, MIGRATION_V2)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Version 1: detections and their bounding boxes
const MIGRATION_V1: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS detections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        client_ref TEXT NOT NULL UNIQUE,
        server_id TEXT UNIQUE,
        image_ref TEXT NOT NULL,
        captured_at INTEGER NOT NULL,
        detected_at INTEGER NOT NULL,
        note TEXT,
        updated_at INTEGER,
        is_synced INTEGER NOT NULL DEFAULT 0,
        is_deleted INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_detections_user_date ON detections(user_id, detected_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_detections_deleted ON detections(is_deleted)",
    "CREATE TABLE IF NOT EXISTS bounding_boxes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        detection_id INTEGER NOT NULL REFERENCES detections(id) ON DELETE CASCADE,
        x1 REAL NOT NULL,
        y1 REAL NOT NULL,
        x2 REAL NOT NULL,
        y2 REAL NOT NULL,
        cx REAL NOT NULL,
        cy REAL NOT NULL,
        w REAL NOT NULL,
        h REAL NOT NULL,
        cnf REAL NOT NULL,
        cls INTEGER NOT NULL,
        cls_name TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_bounding_boxes_detection ON bounding_boxes(detection_id)",
    "CREATE INDEX IF NOT EXISTS idx_bounding_boxes_cls_name ON bounding_boxes(cls_name)",
];

/// Version 2: pending note edits
const MIGRATION_V2: &[&str] = &[
    "ALTER TABLE detections ADD COLUMN note_pending INTEGER NOT NULL DEFAULT 0",
    "CREATE INDEX IF NOT EXISTS idx_detections_note_pending ON detections(note_pending)",
];

fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    // Dropping the transaction without commit rolls back.
    let tx = conn.unchecked_transaction()?;
    for stmt in statements {
        tx.execute(stmt, [])?;
    }
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version {version} (latest {CURRENT_VERSION})");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn column_exists(conn: &Connection, table: &str, column: &str) -> bool {
        let mut stmt = conn
            .prepare(&format!("SELECT name FROM pragma_table_info('{table}')"))
            .unwrap();
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        names.iter().any(|name| name == column)
    }

    #[test]
    fn test_migrations() {
        let conn = setup();
        run(&conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn).unwrap();
        run(&conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migration_v2_adds_note_pending() {
        let conn = setup();
        run(&conn).unwrap();
        assert!(column_exists(&conn, "detections", "note_pending"));
        assert!(column_exists(&conn, "bounding_boxes", "cls_name"));
    }
}
