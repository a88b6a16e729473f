//! Services shared by all clients.

mod database;

pub use database::DetectionStore;
