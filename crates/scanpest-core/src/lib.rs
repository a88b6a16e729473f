//! scanpest-core - Core library for ScanPest
//!
//! This crate contains the detection models, the local detection store, the
//! detection server client, the synchronization coordinator and the
//! annotation renderer used by ScanPest clients.

pub mod annotate;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod sync;
pub mod util;

pub use config::ClientConfig;
pub use error::{Error, Result};
pub use models::{BoundingBox, Detection, DetectionId, NewDetection, SortOrder, SyncStatus};
pub use remote::{AuthToken, DetectionService, HttpDetectionService, RemoteError};
pub use services::DetectionStore;
pub use sync::{SyncCoordinator, SyncError, SyncOutcome, SyncReport, SyncState};
