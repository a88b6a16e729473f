//! Observable synchronization state.

use serde::Serialize;

/// Latest synchronization state, published on a watch channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Running,
    Succeeded {
        failed_items: usize,
    },
    Failed {
        reason: String,
    },
}

impl SyncState {
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Running => f.write_str("running"),
            Self::Succeeded { failed_items: 0 } => f.write_str("succeeded"),
            Self::Succeeded { failed_items } => {
                write!(f, "succeeded with {failed_items} failed item(s)")
            }
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}
