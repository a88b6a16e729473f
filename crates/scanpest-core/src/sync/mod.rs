//! Reconciles local detections with the detection server.
//!
//! A [`SyncCoordinator`] runs four flows for a user:
//!
//! - push: upload detections the server has never acknowledged
//! - pull: insert server detections missing locally and re-upload the ones
//!   the server asks for
//! - deletions: exchange soft-deletes in both directions
//! - notes: send pending note edits and adopt the server's canonical notes
//!
//! At most one synchronization runs per user. Remote failures are recorded in
//! the returned reports; local store failures abort the running call.

mod report;
mod state;


use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};

use thiserror::Error;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::db::{PullInsert, PulledDetection};
use crate::models::{BoundingBox, Detection};
use crate::remote::{AuthToken, DetectionService, RemoteDetection, RemoteError, UploadBatch};
use crate::services::DetectionStore;

pub use report::{FlowReport, ItemFailure, SyncFlow, SyncOutcome, SyncReport};
pub use state::SyncState;

const DEFAULT_IMAGE_EXTENSION: &str = "jpg";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("A synchronization is already running for user {user_id}")]
    Busy { user_id: i64 },
    #[error("Local store error during sync: {0}")]
    Store(#[from] crate::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Failure of a single detection inside a flow.
#[derive(Debug, Error)]
enum ItemError {
    #[error("unreadable image {path}: {source}")]
    Image {
        path: String,
        source: std::io::Error,
    },
    #[error("could not store image in {path}: {source}")]
    Media {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

type GateMap = std::sync::Mutex<HashMap<i64, Arc<Mutex<()>>>>;

/// Holds a user's gate for one run. Dropping it releases the gate and
/// forgets the user once nothing else references it.
struct RunGuard<'a> {
    gates: &'a GateMap,
    user_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        if gates
            .get(&self.user_id)
            .is_some_and(|gate| Arc::strong_count(gate) == 1)
        {
            gates.remove(&self.user_id);
        }
    }
}

/// Drives synchronization between a [`DetectionStore`] and a
/// [`DetectionService`].
pub struct SyncCoordinator<S> {
    store: DetectionStore,
    service: Arc<S>,
    media_dir: PathBuf,
    gates: GateMap,
    active: AtomicUsize,
    state: watch::Sender<SyncState>,
}

impl<S: DetectionService> SyncCoordinator<S> {
    pub fn new(store: DetectionStore, service: Arc<S>, media_dir: impl Into<PathBuf>) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            store,
            service,
            media_dir: media_dir.into(),
            gates: std::sync::Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            state,
        }
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    /// Run push, pull, deletions and notes in order.
    pub async fn sync_all(&self, user_id: i64, token: &AuthToken) -> SyncResult<SyncReport> {
        let _guard = self.begin(user_id)?;
        let result: SyncResult<SyncReport> = async {
            let flows = vec![
                self.run_push(user_id, token).await?,
                self.run_pull(user_id, token).await?,
                self.run_deletions(user_id, token).await?,
                self.run_notes(user_id, token).await?,
            ];
            Ok(SyncReport { flows })
        }
        .await;

        if let Ok(report) = &result {
            tracing::info!(
                "Sync for user {user_id} finished: {} ({} failed items)",
                report.outcome(),
                report.failed_items()
            );
        }
        self.finish(result.as_ref().map(SyncReport::settled_state));
        result
    }

    pub async fn push(&self, user_id: i64, token: &AuthToken) -> SyncResult<FlowReport> {
        let _guard = self.begin(user_id)?;
        let result = self.run_push(user_id, token).await;
        self.settle_flow(result)
    }

    pub async fn pull(&self, user_id: i64, token: &AuthToken) -> SyncResult<FlowReport> {
        let _guard = self.begin(user_id)?;
        let result = self.run_pull(user_id, token).await;
        self.settle_flow(result)
    }

    pub async fn reconcile_deletions(
        &self,
        user_id: i64,
        token: &AuthToken,
    ) -> SyncResult<FlowReport> {
        let _guard = self.begin(user_id)?;
        let result = self.run_deletions(user_id, token).await;
        self.settle_flow(result)
    }

    pub async fn merge_notes(&self, user_id: i64, token: &AuthToken) -> SyncResult<FlowReport> {
        let _guard = self.begin(user_id)?;
        let result = self.run_notes(user_id, token).await;
        self.settle_flow(result)
    }

    fn begin(&self, user_id: i64) -> SyncResult<RunGuard<'_>> {
        let gate = {
            let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(gates.entry(user_id).or_default())
        };
        let guard = gate.try_lock_owned().map_err(|_| {
            tracing::debug!("Dropping sync trigger for user {user_id}: already running");
            SyncError::Busy { user_id }
        })?;

        self.active.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(SyncState::Running);
        Ok(RunGuard {
            gates: &self.gates,
            user_id,
            guard: Some(guard),
        })
    }

    fn finish(&self, settled: Result<SyncState, &SyncError>) {
        let state = settled.unwrap_or_else(|error| SyncState::Failed {
            reason: error.to_string(),
        });
        // Another user's sync keeps the state at Running
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.send_replace(state);
        }
    }

    fn settle_flow(&self, result: SyncResult<FlowReport>) -> SyncResult<FlowReport> {
        if let Ok(report) = &result {
            tracing::info!("{report}");
        }
        self.finish(result.as_ref().map(FlowReport::settled_state));
        result
    }

    async fn run_push(&self, user_id: i64, token: &AuthToken) -> SyncResult<FlowReport> {
        let mut report = FlowReport::new(SyncFlow::Push);
        let pending = self.store.unpushed(user_id).await?;
        tracing::debug!("Pushing {} detection(s) for user {user_id}", pending.len());

        for detection in pending {
            match self
                .upload_one(token, &detection, &detection.client_ref)
                .await
            {
                Ok(server_id) => {
                    // An ack naming an id another row holds leaves this row
                    // unpushed for the next push.
                    if self.store.contains_server_id(&server_id).await? {
                        report.fail(
                            detection.id.to_string(),
                            format!("server acknowledged it as {server_id}, which is already stored"),
                        );
                        continue;
                    }
                    self.store.mark_pushed(detection.id, &server_id).await?;
                    tracing::debug!("Pushed detection {} as {server_id}", detection.id);
                    report.completed += 1;
                }
                Err(error) => report.fail(detection.id.to_string(), error),
            }
        }
        Ok(report)
    }

    async fn run_pull(&self, user_id: i64, token: &AuthToken) -> SyncResult<FlowReport> {
        let mut report = FlowReport::new(SyncFlow::Pull);
        let known = self.store.server_ids(user_id).await?;
        let response = match self.service.fetch_by_ids(token, &known).await {
            Ok(response) => response,
            Err(error) => {
                report.abort(error);
                return Ok(report);
            }
        };

        for remote in response.detections_to_send {
            let server_id = remote.detection.server_id.clone();
            if self.store.contains_server_id(&server_id).await? {
                report.skipped += 1;
                continue;
            }
            match self.insert_remote(user_id, token, remote).await? {
                Ok(PullInsert::Inserted(id) | PullInsert::Adopted(id)) => {
                    tracing::debug!("Pulled {server_id} into detection {id}");
                    report.completed += 1;
                }
                Ok(PullInsert::AlreadyPresent) => report.skipped += 1,
                Err(error) => report.fail(server_id, error),
            }
        }

        let requested = response.detections_needed_from_phone;
        let needed = self.store.by_server_ids(user_id, &requested).await?;
        report.skipped += requested.len().saturating_sub(needed.len());
        for detection in needed {
            let Some(server_id) = detection.server_id.clone() else {
                continue;
            };
            match self.upload_one(token, &detection, &server_id).await {
                Ok(_) => {
                    self.store.mark_synced(detection.id).await?;
                    report.completed += 1;
                }
                Err(error) => report.fail(server_id, error),
            }
        }
        Ok(report)
    }

    async fn run_deletions(&self, user_id: i64, token: &AuthToken) -> SyncResult<FlowReport> {
        let mut report = FlowReport::new(SyncFlow::Deletions);
        // Never-acknowledged rows go out under their client ref, which the
        // server adopts as the id of a lost-ack upload.
        let pending: Vec<String> = self
            .store
            .soft_deleted(user_id)
            .await?
            .into_iter()
            .map(|detection| detection.server_id.unwrap_or(detection.client_ref))
            .collect();

        let outgoing = async {
            if pending.is_empty() {
                Ok(())
            } else {
                self.service.soft_delete(token, &pending).await
            }
        };
        let (outgoing, incoming) = tokio::join!(outgoing, self.service.soft_deleted_ids(token));

        match outgoing {
            Ok(()) => {
                report.completed += self.store.purge_deleted(user_id, &pending).await?;
            }
            Err(error) => {
                let reason = error.to_string();
                for server_id in &pending {
                    report.fail(server_id.as_str(), &reason);
                }
            }
        }

        match incoming {
            Ok(deleted_ids) => {
                let purged = self.store.purge_by_server_ids(user_id, &deleted_ids).await?;
                report.completed += purged;
                report.skipped += deleted_ids.len().saturating_sub(purged);
            }
            Err(error) => report.abort(error),
        }
        Ok(report)
    }

    async fn run_notes(&self, user_id: i64, token: &AuthToken) -> SyncResult<FlowReport> {
        let mut report = FlowReport::new(SyncFlow::Notes);
        let pending = self.store.pending_notes(user_id).await?;
        tracing::debug!("Merging {} pending note(s) for user {user_id}", pending.len());

        match self.service.update_notes(token, &pending).await {
            Ok(canonical) => {
                let applied = self.store.apply_server_notes(user_id, &canonical).await?;
                report.completed += applied;
                report.skipped += canonical.len().saturating_sub(applied);
            }
            Err(error) => report.abort(error),
        }
        Ok(report)
    }

    /// Upload one detection, returning the server id it is known under.
    async fn upload_one(
        &self,
        token: &AuthToken,
        detection: &Detection,
        proposed_id: &str,
    ) -> Result<String, ItemError> {
        let bytes =
            tokio::fs::read(&detection.image_ref)
                .await
                .map_err(|source| ItemError::Image {
                    path: detection.image_ref.clone(),
                    source,
                })?;
        let file_name = Path::new(&detection.image_ref)
            .file_name()
            .map_or_else(
                || format!("{proposed_id}.{DEFAULT_IMAGE_EXTENSION}"),
                |name| name.to_string_lossy().into_owned(),
            );

        let mut batch = UploadBatch::default();
        batch.push(detection, proposed_id, &file_name, bytes);
        let ack = self.service.upload_batch(token, batch).await?;

        Ok(ack
            .server_ids
            .into_iter()
            .next()
            .unwrap_or_else(|| proposed_id.to_string()))
    }

    /// Download a pulled detection's image and insert it.
    ///
    /// The outer result carries store failures, the inner one item failures.
    async fn insert_remote(
        &self,
        user_id: i64,
        token: &AuthToken,
        remote: RemoteDetection,
    ) -> SyncResult<Result<PullInsert, ItemError>> {
        let record = remote.detection;
        let image_path = match self.download_image(token, &record.image_uri).await {
            Ok(path) => path,
            Err(error) => return Ok(Err(error)),
        };

        let pulled = PulledDetection {
            server_id: record.server_id,
            image_ref: image_path.to_string_lossy().into_owned(),
            captured_at: record.timestamp,
            detected_at: record.detection_date,
            note: record.note,
            updated_at: record.updated_at,
            boxes: remote
                .bounding_boxes
                .into_iter()
                .map(BoundingBox::from)
                .collect(),
        };

        let outcome = self.store.insert_pulled(user_id, &pulled).await;
        if !matches!(outcome, Ok(PullInsert::Inserted(_))) {
            discard_file(&image_path).await;
        }
        Ok(Ok(outcome?))
    }

    async fn download_image(&self, token: &AuthToken, image_uri: &str) -> Result<PathBuf, ItemError> {
        let bytes = self.service.download_image(token, image_uri).await?;
        let path = self.media_dir.join(format!(
            "{}.{}",
            Uuid::now_v7(),
            image_extension(image_uri)
        ));

        tokio::fs::create_dir_all(&self.media_dir)
            .await
            .map_err(|source| ItemError::Media {
                path: self.media_dir.clone(),
                source,
            })?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| ItemError::Media {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

async fn discard_file(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await {
        tracing::debug!("Could not remove {}: {error}", path.display());
    }
}

/// File extension of an image URL, ignoring query strings.
fn image_extension(image_uri: &str) -> String {
    let path = image_uri.split(['?', '#']).next().unwrap_or_default();
    let name = path.rsplit('/').next().unwrap_or_default();
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(char::is_alphanumeric))
        .unwrap_or_else(|| DEFAULT_IMAGE_EXTENSION.to_string())
}
