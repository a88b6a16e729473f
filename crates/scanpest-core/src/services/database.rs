//! Shared detection store wrapper used across clients.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    Database, DetectionRepository, PullInsert, PulledDetection, SqliteDetectionRepository,
};
use crate::models::{BoundingBox, Detection, DetectionId, NewDetection, NoteUpdate, SortOrder};
use crate::Result;

/// Thread-safe handle to the local detection store.
///
/// The lock is held only for the duration of a single store call, never
/// across a network request.
#[derive(Clone)]
pub struct DetectionStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl DetectionStore {
    /// Open a detection store at the given filesystem path.
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory detection store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem path of the store, if it is file-backed.
    pub fn path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    async fn with_repo<T>(
        &self,
        op: impl FnOnce(&SqliteDetectionRepository<'_>) -> Result<T>,
    ) -> Result<T> {
        let db = self.db.lock().await;
        let repo = SqliteDetectionRepository::new(db.connection());
        op(&repo)
    }

    /// Record a detector result for `user_id`.
    pub async fn record_detection(
        &self,
        user_id: i64,
        image_ref: &str,
        captured_at: i64,
        boxes: Vec<BoundingBox>,
    ) -> Result<Detection> {
        let record = NewDetection::new(user_id, image_ref, captured_at, boxes);
        let detection = self.with_repo(|repo| repo.insert(&record)).await?;
        tracing::debug!(
            "Recorded detection {} with {} boxes",
            detection.id,
            detection.boxes.len()
        );
        Ok(detection)
    }

    /// Insert a prepared record.
    pub async fn insert_detection(&self, record: &NewDetection) -> Result<Detection> {
        self.with_repo(|repo| repo.insert(record)).await
    }

    /// Fetch a live detection by local id.
    pub async fn get_detection(&self, id: DetectionId) -> Result<Option<Detection>> {
        self.with_repo(|repo| repo.get(id)).await
    }

    /// Fetch a live detection by server id.
    pub async fn get_by_server_id(
        &self,
        user_id: i64,
        server_id: &str,
    ) -> Result<Option<Detection>> {
        self.with_repo(|repo| repo.get_by_server_id(user_id, server_id))
            .await
    }

    /// List detection history, optionally filtered by pest name.
    pub async fn list_detections(
        &self,
        user_id: i64,
        order: SortOrder,
        pest: Option<&str>,
    ) -> Result<Vec<Detection>> {
        self.with_repo(|repo| repo.list(user_id, order, pest)).await
    }

    /// Box counts per pest.
    pub async fn pest_counts(&self, user_id: i64) -> Result<Vec<(String, usize)>> {
        self.with_repo(|repo| repo.pest_counts(user_id)).await
    }

    /// Soft-delete a detection.
    pub async fn delete_detection(&self, id: DetectionId) -> Result<()> {
        self.with_repo(|repo| repo.soft_delete(id)).await
    }

    /// Soft-delete every detection of a user.
    pub async fn delete_all(&self, user_id: i64) -> Result<usize> {
        self.with_repo(|repo| repo.soft_delete_all(user_id)).await
    }

    /// Soft-delete every detection of a user containing `pest`.
    pub async fn delete_by_pest(&self, user_id: i64, pest: &str) -> Result<usize> {
        self.with_repo(|repo| repo.soft_delete_by_pest(user_id, pest))
            .await
    }

    /// Set a detection's note.
    pub async fn set_note(&self, id: DetectionId, note: &str) -> Result<Detection> {
        self.with_repo(|repo| repo.set_note(id, note)).await
    }

    /// Clear a detection's note.
    pub async fn clear_note(&self, id: DetectionId) -> Result<Detection> {
        self.with_repo(|repo| repo.clear_note(id)).await
    }

    pub(crate) async fn unpushed(&self, user_id: i64) -> Result<Vec<Detection>> {
        self.with_repo(|repo| repo.unpushed(user_id)).await
    }

    pub(crate) async fn server_ids(&self, user_id: i64) -> Result<Vec<String>> {
        self.with_repo(|repo| repo.server_ids(user_id)).await
    }

    pub(crate) async fn contains_server_id(&self, server_id: &str) -> Result<bool> {
        self.with_repo(|repo| repo.contains_server_id(server_id))
            .await
    }

    pub(crate) async fn by_server_ids(
        &self,
        user_id: i64,
        server_ids: &[String],
    ) -> Result<Vec<Detection>> {
        self.with_repo(|repo| repo.by_server_ids(user_id, server_ids))
            .await
    }

    pub(crate) async fn mark_pushed(&self, id: DetectionId, server_id: &str) -> Result<()> {
        self.with_repo(|repo| repo.mark_pushed(id, server_id)).await
    }

    pub(crate) async fn mark_synced(&self, id: DetectionId) -> Result<()> {
        self.with_repo(|repo| repo.mark_synced(id)).await
    }

    pub(crate) async fn soft_deleted(&self, user_id: i64) -> Result<Vec<Detection>> {
        self.with_repo(|repo| repo.soft_deleted(user_id)).await
    }

    pub(crate) async fn purge_by_server_ids(
        &self,
        user_id: i64,
        server_ids: &[String],
    ) -> Result<usize> {
        self.with_repo(|repo| repo.purge_by_server_ids(user_id, server_ids))
            .await
    }

    pub(crate) async fn purge_deleted(&self, user_id: i64, ids: &[String]) -> Result<usize> {
        self.with_repo(|repo| repo.purge_deleted(user_id, ids)).await
    }

    pub(crate) async fn insert_pulled(
        &self,
        user_id: i64,
        pulled: &PulledDetection,
    ) -> Result<PullInsert> {
        self.with_repo(|repo| repo.insert_pulled(user_id, pulled))
            .await
    }

    pub(crate) async fn pending_notes(&self, user_id: i64) -> Result<Vec<NoteUpdate>> {
        self.with_repo(|repo| repo.pending_notes(user_id)).await
    }

    pub(crate) async fn apply_server_notes(
        &self,
        user_id: i64,
        notes: &[NoteUpdate],
    ) -> Result<usize> {
        self.with_repo(|repo| repo.apply_server_notes(user_id, notes))
            .await
    }
}
