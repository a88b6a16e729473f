use std::io;

use scanpest_core::{DetectionId, RemoteError, SyncError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] scanpest_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid detection ID: {0}")]
    InvalidDetectionId(String),
    #[error("Detection not found: {0}")]
    DetectionNotFound(DetectionId),
    #[error("Invalid box '{spec}': {reason}")]
    InvalidBox { spec: String, reason: String },
    #[error("Note text cannot be empty (use --clear to remove a note)")]
    EmptyNote,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("No user configured. Pass --user, set SCANPEST_USER_ID, or run `scanpest config init --user-id <ID>`.")]
    UserNotConfigured,
    #[error("No server token. Pass --token or set SCANPEST_TOKEN.")]
    TokenMissing,
    #[error("Sync failed: {0}")]
    SyncFailed(String),
}
