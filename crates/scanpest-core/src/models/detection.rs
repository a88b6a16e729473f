//! Detection model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::BoundingBox;
use crate::util::unix_millis_now;
use crate::{Error, Result};

/// Device-scoped identifier of a stored detection (`SQLite` rowid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DetectionId(pub i64);

impl fmt::Display for DetectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DetectionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Where a detection stands relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Never acknowledged by the server
    PendingPush,
    /// Soft-deleted locally, deletion not yet acknowledged
    PendingDelete,
    /// Note edited locally, not yet merged
    PendingNote,
    /// In agreement with the server
    Synced,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::PendingPush => "pending-push",
            Self::PendingDelete => "pending-delete",
            Self::PendingNote => "pending-note",
            Self::Synced => "synced",
        };
        f.write_str(label)
    }
}

/// A stored detection result with its bounding boxes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Local identifier
    pub id: DetectionId,
    /// Identity proposed to the server on first upload (UUID v7)
    pub client_ref: String,
    /// Server-assigned identifier, present once acknowledged
    pub server_id: Option<String>,
    /// Owning user
    pub user_id: i64,
    /// Local path of the source image
    pub image_ref: String,
    /// Capture timestamp (Unix ms)
    pub captured_at: i64,
    /// Detection timestamp (Unix ms)
    pub detected_at: i64,
    /// Free-text note
    pub note: Option<String>,
    /// Last note update (Unix ms)
    pub updated_at: Option<i64>,
    /// Acknowledged by the server
    pub is_synced: bool,
    /// Soft delete flag for sync
    pub is_deleted: bool,
    /// Local note edit awaiting merge
    pub note_pending: bool,
    /// Detected objects, in detector order
    pub boxes: Vec<BoundingBox>,
}

impl Detection {
    /// Derive the sync status shown to users.
    pub const fn sync_status(&self) -> SyncStatus {
        if self.is_deleted {
            SyncStatus::PendingDelete
        } else if self.server_id.is_none() {
            SyncStatus::PendingPush
        } else if self.note_pending {
            SyncStatus::PendingNote
        } else {
            SyncStatus::Synced
        }
    }

    /// Distinct pest names found in this detection, in first-seen order.
    #[must_use]
    pub fn pest_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for bbox in &self.boxes {
            if !names.contains(&bbox.class_name.as_str()) {
                names.push(&bbox.class_name);
            }
        }
        names
    }
}

/// Input for recording a new detector result.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDetection {
    pub client_ref: String,
    pub user_id: i64,
    pub image_ref: String,
    pub captured_at: i64,
    pub detected_at: i64,
    pub boxes: Vec<BoundingBox>,
}

impl NewDetection {
    /// Create a record for a freshly analyzed image.
    #[must_use]
    pub fn new(
        user_id: i64,
        image_ref: impl Into<String>,
        captured_at: i64,
        boxes: Vec<BoundingBox>,
    ) -> Self {
        Self {
            client_ref: Uuid::now_v7().to_string(),
            user_id,
            image_ref: image_ref.into(),
            captured_at,
            detected_at: unix_millis_now(),
            boxes,
        }
    }

    /// Validate the record before it is persisted.
    pub fn validate(&self) -> Result<()> {
        if self.image_ref.trim().is_empty() {
            return Err(Error::InvalidInput(
                "detection image reference cannot be empty".to_string(),
            ));
        }
        for bbox in &self.boxes {
            bbox.validate()?;
        }
        Ok(())
    }
}

/// Sort order for detection history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}
