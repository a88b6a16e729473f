//! Data models for ScanPest

mod bounding_box;
mod detection;
mod note_update;

pub use bounding_box::BoundingBox;
pub use detection::{Detection, DetectionId, NewDetection, SortOrder, SyncStatus};
pub use note_update::NoteUpdate;
