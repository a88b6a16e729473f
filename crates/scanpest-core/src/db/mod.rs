//! Local detection store

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::{DetectionRepository, SqliteDetectionRepository};
pub(crate) use repository::{PullInsert, PulledDetection};
