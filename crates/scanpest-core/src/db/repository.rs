//! Detection repository implementation

use crate::error::{Error, Result};
use crate::models::{BoundingBox, Detection, DetectionId, NewDetection, NoteUpdate, SortOrder};
use crate::util::unix_millis_now;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

const DETECTION_COLUMNS: &str = "id, client_ref, server_id, user_id, image_ref, captured_at, \
     detected_at, note, updated_at, is_synced, is_deleted, note_pending";

/// Trait for user-facing detection storage operations
///
/// Sync bookkeeping (server ids, acknowledgements, purges) is deliberately not
/// part of this trait; only the sync coordinator may touch those columns.
pub trait DetectionRepository {
    /// Record a new detection together with its bounding boxes
    fn insert(&self, record: &NewDetection) -> Result<Detection>;

    /// Get a live (not soft-deleted) detection by local ID
    fn get(&self, id: DetectionId) -> Result<Option<Detection>>;

    /// Get a live detection of `user_id` by server ID
    fn get_by_server_id(&self, user_id: i64, server_id: &str) -> Result<Option<Detection>>;

    /// List live detections, optionally only those containing `pest`
    fn list(&self, user_id: i64, order: SortOrder, pest: Option<&str>) -> Result<Vec<Detection>>;

    /// Count bounding boxes per pest over live detections, most frequent first
    fn pest_counts(&self, user_id: i64) -> Result<Vec<(String, usize)>>;

    /// Soft delete a detection
    fn soft_delete(&self, id: DetectionId) -> Result<()>;

    /// Soft delete every live detection of a user
    fn soft_delete_all(&self, user_id: i64) -> Result<usize>;

    /// Soft delete every live detection of a user containing `pest`
    fn soft_delete_by_pest(&self, user_id: i64, pest: &str) -> Result<usize>;

    /// Set a detection's note, marking it pending merge
    fn set_note(&self, id: DetectionId, note: &str) -> Result<Detection>;

    /// Clear a detection's note, marking it pending merge
    fn clear_note(&self, id: DetectionId) -> Result<Detection>;
}

/// A detection received from the server, with its image already stored locally.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PulledDetection {
    pub server_id: String,
    pub image_ref: String,
    pub captured_at: i64,
    pub detected_at: i64,
    pub note: Option<String>,
    pub updated_at: Option<i64>,
    pub boxes: Vec<BoundingBox>,
}

/// What `insert_pulled` did with an incoming detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PullInsert {
    /// A new row was created
    Inserted(DetectionId),
    /// A local row already carried this server ID
    AlreadyPresent,
    /// A local row proposed this ID but never saw the acknowledgement
    Adopted(DetectionId),
}

/// `SQLite` implementation of `DetectionRepository`
pub struct SqliteDetectionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteDetectionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a detection (without boxes) from a database row
    fn parse_detection(row: &rusqlite::Row<'_>) -> rusqlite::Result<Detection> {
        Ok(Detection {
            id: DetectionId(row.get(0)?),
            client_ref: row.get(1)?,
            server_id: row.get(2)?,
            user_id: row.get(3)?,
            image_ref: row.get(4)?,
            captured_at: row.get(5)?,
            detected_at: row.get(6)?,
            note: row.get(7)?,
            updated_at: row.get(8)?,
            is_synced: row.get::<_, i32>(9)? != 0,
            is_deleted: row.get::<_, i32>(10)? != 0,
            note_pending: row.get::<_, i32>(11)? != 0,
            boxes: Vec::new(),
        })
    }

    fn parse_box(row: &rusqlite::Row<'_>) -> rusqlite::Result<BoundingBox> {
        Ok(BoundingBox {
            x1: row.get(0)?,
            y1: row.get(1)?,
            x2: row.get(2)?,
            y2: row.get(3)?,
            cx: row.get(4)?,
            cy: row.get(5)?,
            w: row.get(6)?,
            h: row.get(7)?,
            confidence: row.get(8)?,
            class_index: row.get(9)?,
            class_name: row.get(10)?,
        })
    }

    fn load_boxes(&self, id: DetectionId) -> Result<Vec<BoundingBox>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT x1, y1, x2, y2, cx, cy, w, h, cnf, cls, cls_name
             FROM bounding_boxes
             WHERE detection_id = ?
             ORDER BY id ASC",
        )?;
        let boxes = stmt
            .query_map(params![id.0], Self::parse_box)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(boxes)
    }

    fn insert_boxes(conn: &Connection, id: DetectionId, boxes: &[BoundingBox]) -> Result<()> {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO bounding_boxes
                (detection_id, x1, y1, x2, y2, cx, cy, w, h, cnf, cls, cls_name)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for bbox in boxes {
            stmt.execute(params![
                id.0,
                bbox.x1,
                bbox.y1,
                bbox.x2,
                bbox.y2,
                bbox.cx,
                bbox.cy,
                bbox.w,
                bbox.h,
                bbox.confidence,
                bbox.class_index,
                bbox.class_name,
            ])?;
        }
        Ok(())
    }

    /// Run a detection query and attach boxes to every row
    fn query_detections(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Detection>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut detections = stmt
            .query_map(params, Self::parse_detection)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for detection in &mut detections {
            detection.boxes = self.load_boxes(detection.id)?;
        }
        Ok(detections)
    }

    fn query_one(&self, sql: &str, params: impl rusqlite::Params) -> Result<Option<Detection>> {
        let detection = self
            .conn
            .query_row(sql, params, Self::parse_detection)
            .optional()?;
        match detection {
            Some(mut detection) => {
                detection.boxes = self.load_boxes(detection.id)?;
                Ok(Some(detection))
            }
            None => Ok(None),
        }
    }

    fn update_note(&self, id: DetectionId, note: Option<&str>) -> Result<Detection> {
        let rows = self.conn.execute(
            "UPDATE detections SET note = ?, updated_at = ?, note_pending = 1
             WHERE id = ? AND is_deleted = 0",
            params![note, unix_millis_now(), id.0],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        self.get(id)?.ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn placeholders(count: usize) -> String {
        vec!["?"; count].join(", ")
    }

    /// Live detections that were never acknowledged by the server
    pub(crate) fn unpushed(&self, user_id: i64) -> Result<Vec<Detection>> {
        self.query_detections(
            &format!(
                "SELECT {DETECTION_COLUMNS} FROM detections
                 WHERE user_id = ? AND server_id IS NULL AND is_deleted = 0
                 ORDER BY id ASC"
            ),
            params![user_id],
        )
    }

    /// Server IDs of the user's live detections
    pub(crate) fn server_ids(&self, user_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT server_id FROM detections
             WHERE user_id = ? AND server_id IS NOT NULL AND is_deleted = 0
             ORDER BY id ASC",
        )?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Whether any row, live or soft-deleted, carries `server_id`
    pub(crate) fn contains_server_id(&self, server_id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM detections WHERE server_id = ?",
                params![server_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Live detections of the user whose server ID is in `server_ids`
    pub(crate) fn by_server_ids(
        &self,
        user_id: i64,
        server_ids: &[String],
    ) -> Result<Vec<Detection>> {
        if server_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {DETECTION_COLUMNS} FROM detections
             WHERE user_id = ? AND is_deleted = 0 AND server_id IN ({})
             ORDER BY id ASC",
            Self::placeholders(server_ids.len())
        );
        let values = std::iter::once(rusqlite::types::Value::Integer(user_id)).chain(
            server_ids
                .iter()
                .map(|id| rusqlite::types::Value::Text(id.clone())),
        );
        self.query_detections(&sql, params_from_iter(values))
    }

    /// Record the server's acknowledgement of an upload
    pub(crate) fn mark_pushed(&self, id: DetectionId, server_id: &str) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE detections SET server_id = ?, is_synced = 1 WHERE id = ?",
            params![server_id, id.0],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Mark an already-identified detection as held by the server again
    pub(crate) fn mark_synced(&self, id: DetectionId) -> Result<()> {
        self.conn.execute(
            "UPDATE detections SET is_synced = 1 WHERE id = ?",
            params![id.0],
        )?;
        Ok(())
    }

    /// Soft-deleted detections of the user awaiting acknowledgement
    pub(crate) fn soft_deleted(&self, user_id: i64) -> Result<Vec<Detection>> {
        self.query_detections(
            &format!(
                "SELECT {DETECTION_COLUMNS} FROM detections
                 WHERE user_id = ? AND is_deleted = 1
                 ORDER BY id ASC"
            ),
            params![user_id],
        )
    }

    /// Physically remove the user's rows with the given server IDs
    pub(crate) fn purge_by_server_ids(&self, user_id: i64, server_ids: &[String]) -> Result<usize> {
        if server_ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM detections WHERE user_id = ? AND server_id IN ({})",
            Self::placeholders(server_ids.len())
        );
        let values = std::iter::once(rusqlite::types::Value::Integer(user_id)).chain(
            server_ids
                .iter()
                .map(|id| rusqlite::types::Value::Text(id.clone())),
        );
        Ok(self.conn.execute(&sql, params_from_iter(values))?)
    }

    /// Remove the user's soft-deleted rows whose server ID, or client ref
    /// while unacknowledged, is in `ids`
    pub(crate) fn purge_deleted(&self, user_id: i64, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM detections
             WHERE user_id = ? AND is_deleted = 1
               AND COALESCE(server_id, client_ref) IN ({})",
            Self::placeholders(ids.len())
        );
        let values = std::iter::once(rusqlite::types::Value::Integer(user_id))
            .chain(ids.iter().map(|id| rusqlite::types::Value::Text(id.clone())));
        Ok(self.conn.execute(&sql, params_from_iter(values))?)
    }

    /// Insert a server detection, idempotent by server ID
    pub(crate) fn insert_pulled(
        &self,
        user_id: i64,
        pulled: &PulledDetection,
    ) -> Result<PullInsert> {
        let tx = self.conn.unchecked_transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM detections WHERE server_id = ?",
                params![pulled.server_id],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Ok(PullInsert::AlreadyPresent);
        }

        let proposed: Option<i64> = tx
            .query_row(
                "SELECT id FROM detections WHERE client_ref = ? AND server_id IS NULL",
                params![pulled.server_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = proposed {
            tx.execute(
                "UPDATE detections SET server_id = ?, is_synced = 1 WHERE id = ?",
                params![pulled.server_id, id],
            )?;
            tx.commit()?;
            return Ok(PullInsert::Adopted(DetectionId(id)));
        }

        tx.execute(
            "INSERT INTO detections
                (user_id, client_ref, server_id, image_ref, captured_at, detected_at,
                 note, updated_at, is_synced, is_deleted, note_pending)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, 0, 0)",
            params![
                user_id,
                pulled.server_id,
                pulled.server_id,
                pulled.image_ref,
                pulled.captured_at,
                pulled.detected_at,
                pulled.note,
                pulled.updated_at,
            ],
        )?;
        let id = DetectionId(tx.last_insert_rowid());
        Self::insert_boxes(&tx, id, &pulled.boxes)?;
        tx.commit()?;

        Ok(PullInsert::Inserted(id))
    }

    /// Note edits of the user awaiting merge
    pub(crate) fn pending_notes(&self, user_id: i64) -> Result<Vec<NoteUpdate>> {
        let mut stmt = self.conn.prepare(
            "SELECT server_id, updated_at, note FROM detections
             WHERE user_id = ? AND note_pending = 1 AND is_deleted = 0 AND server_id IS NOT NULL
             ORDER BY id ASC",
        )?;
        let notes = stmt
            .query_map(params![user_id], |row| {
                Ok(NoteUpdate {
                    server_id: row.get(0)?,
                    updated_at: row.get(1)?,
                    note: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }

    /// Overwrite local notes with the server's canonical values
    pub(crate) fn apply_server_notes(&self, user_id: i64, notes: &[NoteUpdate]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut applied = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE detections
                 SET note = ?, updated_at = COALESCE(?, updated_at), note_pending = 0
                 WHERE server_id = ? AND user_id = ?",
            )?;
            for update in notes {
                applied += stmt.execute(params![
                    update.note,
                    update.updated_at,
                    update.server_id,
                    user_id
                ])?;
            }
        }
        tx.commit()?;
        Ok(applied)
    }
}

impl DetectionRepository for SqliteDetectionRepository<'_> {
    fn insert(&self, record: &NewDetection) -> Result<Detection> {
        record.validate()?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO detections
                (user_id, client_ref, image_ref, captured_at, detected_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                record.user_id,
                record.client_ref,
                record.image_ref,
                record.captured_at,
                record.detected_at,
                record.detected_at,
            ],
        )?;
        let id = DetectionId(tx.last_insert_rowid());
        Self::insert_boxes(&tx, id, &record.boxes)?;
        tx.commit()?;

        self.get(id)?.ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn get(&self, id: DetectionId) -> Result<Option<Detection>> {
        self.query_one(
            &format!("SELECT {DETECTION_COLUMNS} FROM detections WHERE id = ? AND is_deleted = 0"),
            params![id.0],
        )
    }

    fn get_by_server_id(&self, user_id: i64, server_id: &str) -> Result<Option<Detection>> {
        self.query_one(
            &format!(
                "SELECT {DETECTION_COLUMNS} FROM detections
                 WHERE user_id = ? AND server_id = ? AND is_deleted = 0"
            ),
            params![user_id, server_id],
        )
    }

    fn list(&self, user_id: i64, order: SortOrder, pest: Option<&str>) -> Result<Vec<Detection>> {
        let direction = match order {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };
        self.query_detections(
            &format!(
                "SELECT {DETECTION_COLUMNS} FROM detections
                 WHERE user_id = ?1 AND is_deleted = 0
                   AND (?2 IS NULL OR id IN (
                       SELECT detection_id FROM bounding_boxes WHERE cls_name = ?2
                   ))
                 ORDER BY detected_at {direction}, id {direction}"
            ),
            params![user_id, pest],
        )
    }

    fn pest_counts(&self, user_id: i64) -> Result<Vec<(String, usize)>> {
        let mut stmt = self.conn.prepare(
            "SELECT b.cls_name, COUNT(*) AS count
             FROM bounding_boxes b
             JOIN detections d ON d.id = b.detection_id
             WHERE d.user_id = ? AND d.is_deleted = 0
             GROUP BY b.cls_name
             ORDER BY count DESC, b.cls_name ASC",
        )?;
        let counts = stmt
            .query_map(params![user_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    fn soft_delete(&self, id: DetectionId) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE detections SET is_deleted = 1 WHERE id = ? AND is_deleted = 0",
            params![id.0],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn soft_delete_all(&self, user_id: i64) -> Result<usize> {
        Ok(self.conn.execute(
            "UPDATE detections SET is_deleted = 1 WHERE user_id = ? AND is_deleted = 0",
            params![user_id],
        )?)
    }

    fn soft_delete_by_pest(&self, user_id: i64, pest: &str) -> Result<usize> {
        Ok(self.conn.execute(
            "UPDATE detections SET is_deleted = 1
             WHERE user_id = ? AND is_deleted = 0
               AND id IN (SELECT detection_id FROM bounding_boxes WHERE cls_name = ?)",
            params![user_id, pest],
        )?)
    }

    fn set_note(&self, id: DetectionId, note: &str) -> Result<Detection> {
        self.update_note(id, Some(note))
    }

    fn clear_note(&self, id: DetectionId) -> Result<Detection> {
        self.update_note(id, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn record(user_id: i64, pests: &[&str]) -> NewDetection {
        let boxes = pests
            .iter()
            .enumerate()
            .map(|(index, name)| {
                BoundingBox::from_corners((0.1, 0.1), (0.4, 0.4), 0.8, index as i32, *name)
            })
            .collect();
        NewDetection::new(user_id, "/tmp/leaf.png", 1_000, boxes)
    }

    fn pulled(server_id: &str) -> PulledDetection {
        PulledDetection {
            server_id: server_id.to_string(),
            image_ref: "/media/pulled.png".to_string(),
            captured_at: 5,
            detected_at: 6,
            note: Some("from server".to_string()),
            updated_at: Some(7),
            boxes: vec![BoundingBox::from_corners(
                (0.2, 0.2),
                (0.3, 0.3),
                0.6,
                3,
                "whitefly",
            )],
        }
    }

    #[test]
    fn test_insert_and_get_with_boxes() {
        let db = setup();
        let repo = SqliteDetectionRepository::new(db.connection());

        let saved = repo.insert(&record(1, &["aphid", "mite"])).unwrap();
        assert_eq!(saved.boxes.len(), 2);
        assert_eq!(saved.server_id, None);
        assert!(!saved.is_synced);

        let fetched = repo.get(saved.id).unwrap().unwrap();
        assert_eq!(fetched, saved);
        assert_eq!(fetched.boxes[1].class_name, "mite");
    }

    #[test]
    fn test_insert_rejects_invalid_box() {
        let db = setup();
        let repo = SqliteDetectionRepository::new(db.connection());

        let mut bad = record(1, &["aphid"]);
        bad.boxes[0].confidence = 1.5;
        assert!(matches!(repo.insert(&bad), Err(Error::InvalidInput(_))));
        assert!(repo.list(1, SortOrder::Descending, None).unwrap().is_empty());
    }

    #[test]
    fn test_list_orders_and_filters_by_pest() {
        let db = setup();
        let repo = SqliteDetectionRepository::new(db.connection());

        let mut first = record(1, &["aphid"]);
        first.detected_at = 100;
        let mut second = record(1, &["mite"]);
        second.detected_at = 200;
        let other_user = record(2, &["aphid"]);
        let first = repo.insert(&first).unwrap();
        let second = repo.insert(&second).unwrap();
        repo.insert(&other_user).unwrap();

        let desc = repo.list(1, SortOrder::Descending, None).unwrap();
        assert_eq!(
            desc.iter().map(|d| d.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );

        let asc = repo.list(1, SortOrder::Ascending, None).unwrap();
        assert_eq!(asc[0].id, first.id);

        let aphids = repo.list(1, SortOrder::Descending, Some("aphid")).unwrap();
        assert_eq!(aphids.len(), 1);
        assert_eq!(aphids[0].id, first.id);
    }

    #[test]
    fn test_soft_delete_hides_rows() {
        let db = setup();
        let repo = SqliteDetectionRepository::new(db.connection());

        let saved = repo.insert(&record(1, &["aphid"])).unwrap();
        repo.soft_delete(saved.id).unwrap();

        assert!(repo.get(saved.id).unwrap().is_none());
        assert!(repo.list(1, SortOrder::Descending, None).unwrap().is_empty());
        assert_eq!(repo.soft_deleted(1).unwrap().len(), 1);

        // Second delete finds nothing live
        assert!(matches!(repo.soft_delete(saved.id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_soft_delete_by_pest_and_all() {
        let db = setup();
        let repo = SqliteDetectionRepository::new(db.connection());

        repo.insert(&record(1, &["aphid", "mite"])).unwrap();
        repo.insert(&record(1, &["mite"])).unwrap();
        repo.insert(&record(1, &["whitefly"])).unwrap();

        assert_eq!(repo.soft_delete_by_pest(1, "mite").unwrap(), 2);
        assert_eq!(repo.list(1, SortOrder::Descending, None).unwrap().len(), 1);

        assert_eq!(repo.soft_delete_all(1).unwrap(), 1);
        assert!(repo.list(1, SortOrder::Descending, None).unwrap().is_empty());
    }

    #[test]
    fn test_pest_counts() {
        let db = setup();
        let repo = SqliteDetectionRepository::new(db.connection());

        repo.insert(&record(1, &["aphid", "mite"])).unwrap();
        repo.insert(&record(1, &["aphid"])).unwrap();
        let deleted = repo.insert(&record(1, &["aphid"])).unwrap();
        repo.soft_delete(deleted.id).unwrap();

        let counts = repo.pest_counts(1).unwrap();
        assert_eq!(
            counts,
            vec![("aphid".to_string(), 2), ("mite".to_string(), 1)]
        );
    }

    #[test]
    fn test_note_edits_mark_pending() {
        let db = setup();
        let repo = SqliteDetectionRepository::new(db.connection());

        let saved = repo.insert(&record(1, &["aphid"])).unwrap();
        let noted = repo.set_note(saved.id, "check underside").unwrap();
        assert_eq!(noted.note.as_deref(), Some("check underside"));
        assert!(noted.note_pending);

        let cleared = repo.clear_note(saved.id).unwrap();
        assert_eq!(cleared.note, None);

        // Pending notes only include rows the server knows about
        assert!(repo.pending_notes(1).unwrap().is_empty());
        repo.mark_pushed(saved.id, "srv-1").unwrap();
        let pending = repo.pending_notes(1).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].server_id, "srv-1");
    }

    #[test]
    fn test_set_note_on_missing_detection() {
        let db = setup();
        let repo = SqliteDetectionRepository::new(db.connection());
        assert!(matches!(
            repo.set_note(DetectionId(99), "x"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_mark_pushed_assigns_server_id() {
        let db = setup();
        let repo = SqliteDetectionRepository::new(db.connection());

        let saved = repo.insert(&record(1, &["aphid"])).unwrap();
        assert_eq!(repo.unpushed(1).unwrap().len(), 1);

        repo.mark_pushed(saved.id, "abc").unwrap();
        assert!(repo.unpushed(1).unwrap().is_empty());
        assert_eq!(repo.server_ids(1).unwrap(), vec!["abc".to_string()]);

        let fetched = repo.get_by_server_id(1, "abc").unwrap().unwrap();
        assert!(fetched.is_synced);
    }

    #[test]
    fn test_insert_pulled_is_idempotent_by_server_id() {
        let db = setup();
        let repo = SqliteDetectionRepository::new(db.connection());

        let first = repo.insert_pulled(1, &pulled("srv-9")).unwrap();
        assert!(matches!(first, PullInsert::Inserted(_)));
        let second = repo.insert_pulled(1, &pulled("srv-9")).unwrap();
        assert_eq!(second, PullInsert::AlreadyPresent);

        let rows = repo.list(1, SortOrder::Descending, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].server_id.as_deref(), Some("srv-9"));
        assert_eq!(rows[0].boxes.len(), 1);
        assert_eq!(rows[0].note.as_deref(), Some("from server"));
        assert!(rows[0].is_synced);
    }

    #[test]
    fn test_contains_server_id_sees_soft_deleted_rows() {
        let db = setup();
        let repo = SqliteDetectionRepository::new(db.connection());

        let first = repo.insert_pulled(1, &pulled("srv-3")).unwrap();
        let PullInsert::Inserted(id) = first else {
            panic!("expected insert, got {first:?}");
        };
        repo.soft_delete(id).unwrap();

        assert!(repo.contains_server_id("srv-3").unwrap());
        assert!(!repo.contains_server_id("srv-4").unwrap());
    }

    #[test]
    fn test_insert_pulled_adopts_unacknowledged_row() {
        let db = setup();
        let repo = SqliteDetectionRepository::new(db.connection());

        let saved = repo.insert(&record(1, &["aphid"])).unwrap();
        let outcome = repo
            .insert_pulled(1, &pulled(&saved.client_ref))
            .unwrap();
        assert_eq!(outcome, PullInsert::Adopted(saved.id));

        let rows = repo.list(1, SortOrder::Descending, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].server_id.as_deref(), Some(saved.client_ref.as_str()));
        // Local boxes are kept
        assert_eq!(rows[0].boxes[0].class_name, "aphid");
    }

    #[test]
    fn test_purge_cascades_to_boxes() {
        let db = setup();
        let repo = SqliteDetectionRepository::new(db.connection());

        let saved = repo.insert(&record(1, &["aphid", "mite"])).unwrap();
        repo.mark_pushed(saved.id, "abc").unwrap();

        let removed = repo
            .purge_by_server_ids(1, &["abc".to_string(), "zzz".to_string()])
            .unwrap();
        assert_eq!(removed, 1);

        let boxes: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM bounding_boxes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(boxes, 0);
    }

    #[test]
    fn test_purge_ignores_other_users() {
        let db = setup();
        let repo = SqliteDetectionRepository::new(db.connection());

        let saved = repo.insert(&record(2, &["aphid"])).unwrap();
        repo.mark_pushed(saved.id, "abc").unwrap();

        assert_eq!(repo.purge_by_server_ids(1, &["abc".to_string()]).unwrap(), 0);
        assert!(repo.get(saved.id).unwrap().is_some());
    }

    #[test]
    fn test_purge_deleted_matches_client_ref_until_acknowledged() {
        let db = setup();
        let repo = SqliteDetectionRepository::new(db.connection());

        let local_only = repo.insert(&record(1, &["aphid"])).unwrap();
        let pushed = repo.insert(&record(1, &["mite"])).unwrap();
        let live = repo.insert(&record(1, &["thrips"])).unwrap();
        repo.mark_pushed(pushed.id, "srv").unwrap();
        repo.soft_delete(local_only.id).unwrap();
        repo.soft_delete(pushed.id).unwrap();

        // A pushed row is no longer addressed by its client ref
        assert_eq!(repo.purge_deleted(1, &[pushed.client_ref.clone()]).unwrap(), 0);
        assert_eq!(
            repo.purge_deleted(1, &[live.client_ref.clone()]).unwrap(),
            0
        );

        let ids = vec![local_only.client_ref.clone(), "srv".to_string()];
        assert_eq!(repo.purge_deleted(2, &ids).unwrap(), 0);
        assert_eq!(repo.purge_deleted(1, &ids).unwrap(), 2);
        assert!(repo.soft_deleted(1).unwrap().is_empty());
        assert!(repo.get(live.id).unwrap().is_some());
    }

    #[test]
    fn test_apply_server_notes_overwrites_and_clears_pending() {
        let db = setup();
        let repo = SqliteDetectionRepository::new(db.connection());

        let saved = repo.insert(&record(1, &["aphid"])).unwrap();
        repo.mark_pushed(saved.id, "abc").unwrap();
        repo.set_note(saved.id, "local edit").unwrap();

        let applied = repo
            .apply_server_notes(
                1,
                &[NoteUpdate {
                    server_id: "abc".to_string(),
                    updated_at: Some(42),
                    note: Some("server text".to_string()),
                }],
            )
            .unwrap();
        assert_eq!(applied, 1);

        let fetched = repo.get(saved.id).unwrap().unwrap();
        assert_eq!(fetched.note.as_deref(), Some("server text"));
        assert_eq!(fetched.updated_at, Some(42));
        assert!(!fetched.note_pending);
    }

    #[test]
    fn test_by_server_ids_filters_user_and_deleted() {
        let db = setup();
        let repo = SqliteDetectionRepository::new(db.connection());

        let a = repo.insert(&record(1, &["aphid"])).unwrap();
        let b = repo.insert(&record(1, &["mite"])).unwrap();
        repo.mark_pushed(a.id, "a").unwrap();
        repo.mark_pushed(b.id, "b").unwrap();
        repo.soft_delete(b.id).unwrap();

        let found = repo
            .by_server_ids(1, &["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);
        assert!(repo.by_server_ids(1, &[]).unwrap().is_empty());
    }
}
