//! Structured results of synchronization flows.

use std::fmt;

use serde::Serialize;

use super::SyncState;

/// The four synchronization flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncFlow {
    Push,
    Pull,
    Deletions,
    Notes,
}

impl fmt::Display for SyncFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Push => "push",
            Self::Pull => "pull",
            Self::Deletions => "deletions",
            Self::Notes => "notes",
        };
        f.write_str(label)
    }
}

/// A single detection the flow could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    /// Local id or server id of the affected detection
    pub reference: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Complete,
    Partial,
    Failed,
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Result of one flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowReport {
    pub flow: SyncFlow,
    /// Items applied locally or acknowledged remotely
    pub completed: usize,
    /// Items that needed no work
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
    /// Request-level failure that stopped the flow
    pub aborted: Option<String>,
}

impl FlowReport {
    pub const fn new(flow: SyncFlow) -> Self {
        Self {
            flow,
            completed: 0,
            skipped: 0,
            failures: Vec::new(),
            aborted: None,
        }
    }

    pub(crate) fn fail(&mut self, reference: impl Into<String>, reason: impl fmt::Display) {
        let reference = reference.into();
        let reason = reason.to_string();
        tracing::warn!("{} failed for {reference}: {reason}", self.flow);
        self.failures.push(ItemFailure { reference, reason });
    }

    pub(crate) fn abort(&mut self, reason: impl fmt::Display) {
        let reason = reason.to_string();
        tracing::warn!("{} aborted: {reason}", self.flow);
        self.aborted = Some(reason);
    }

    /// `Failed` when something went wrong and nothing was completed.
    pub fn outcome(&self) -> SyncOutcome {
        if self.aborted.is_none() && self.failures.is_empty() {
            SyncOutcome::Complete
        } else if self.completed == 0 {
            SyncOutcome::Failed
        } else {
            SyncOutcome::Partial
        }
    }

    pub(super) fn settled_state(&self) -> SyncState {
        if self.outcome() == SyncOutcome::Failed {
            let reason = self
                .aborted
                .clone()
                .or_else(|| self.failures.first().map(|failure| failure.reason.clone()))
                .unwrap_or_default();
            SyncState::Failed { reason }
        } else {
            SyncState::Succeeded {
                failed_items: self.failures.len() + usize::from(self.aborted.is_some()),
            }
        }
    }
}

impl fmt::Display for FlowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({} completed, {} skipped, {} failed)",
            self.flow,
            self.outcome(),
            self.completed,
            self.skipped,
            self.failures.len()
        )?;
        if let Some(reason) = &self.aborted {
            write!(f, ", aborted: {reason}")?;
        }
        Ok(())
    }
}

/// Aggregate of a full synchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub flows: Vec<FlowReport>,
}

impl SyncReport {
    /// `Failed` when some flow went wrong and no flow completed anything.
    pub fn outcome(&self) -> SyncOutcome {
        if self
            .flows
            .iter()
            .all(|report| report.outcome() == SyncOutcome::Complete)
        {
            SyncOutcome::Complete
        } else if self.flows.iter().all(|report| report.completed == 0) {
            SyncOutcome::Failed
        } else {
            SyncOutcome::Partial
        }
    }

    pub fn flow(&self, flow: SyncFlow) -> Option<&FlowReport> {
        self.flows.iter().find(|report| report.flow == flow)
    }

    /// Item failures plus aborted flows.
    pub fn failed_items(&self) -> usize {
        self.flows
            .iter()
            .map(|report| report.failures.len() + usize::from(report.aborted.is_some()))
            .sum()
    }

    pub(super) fn settled_state(&self) -> SyncState {
        if self.outcome() == SyncOutcome::Failed {
            let reason = self
                .flows
                .iter()
                .filter_map(|report| match report.settled_state() {
                    SyncState::Failed { reason } => Some(format!("{}: {reason}", report.flow)),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("; ");
            SyncState::Failed { reason }
        } else {
            SyncState::Succeeded {
                failed_items: self.failed_items(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn report(flow: SyncFlow, completed: usize, failures: usize, aborted: bool) -> FlowReport {
        let mut report = FlowReport::new(flow);
        report.completed = completed;
        for index in 0..failures {
            report.fail(index.to_string(), "rejected");
        }
        if aborted {
            report.abort("connection refused");
        }
        report
    }

    #[test]
    fn flow_outcome_classification() {
        assert_eq!(report(SyncFlow::Push, 2, 0, false).outcome(), SyncOutcome::Complete);
        assert_eq!(report(SyncFlow::Push, 1, 1, false).outcome(), SyncOutcome::Partial);
        assert_eq!(report(SyncFlow::Pull, 0, 0, true).outcome(), SyncOutcome::Failed);
        assert_eq!(report(SyncFlow::Deletions, 1, 0, true).outcome(), SyncOutcome::Partial);
        assert_eq!(report(SyncFlow::Push, 0, 2, false).outcome(), SyncOutcome::Failed);
    }

    #[test]
    fn failed_flow_state_falls_back_to_item_reason() {
        assert_eq!(
            report(SyncFlow::Push, 0, 2, false).settled_state(),
            SyncState::Failed {
                reason: "rejected".to_string()
            }
        );
    }

    #[test]
    fn sync_report_distinguishes_partial_from_total_failure() {
        let partial = SyncReport {
            flows: vec![
                report(SyncFlow::Push, 1, 0, false),
                report(SyncFlow::Pull, 0, 0, true),
            ],
        };
        assert_eq!(partial.outcome(), SyncOutcome::Partial);
        assert_eq!(partial.failed_items(), 1);
        assert_eq!(
            partial.settled_state(),
            SyncState::Succeeded { failed_items: 1 }
        );

        let failed = SyncReport {
            flows: vec![
                report(SyncFlow::Push, 0, 0, true),
                report(SyncFlow::Notes, 0, 0, true),
            ],
        };
        assert_eq!(failed.outcome(), SyncOutcome::Failed);
        assert_eq!(
            failed.settled_state(),
            SyncState::Failed {
                reason: "push: connection refused; notes: connection refused".to_string()
            }
        );
    }

    #[test]
    fn flow_report_display_mentions_abort() {
        let text = report(SyncFlow::Pull, 0, 0, true).to_string();
        assert_eq!(
            text,
            "pull: failed (0 completed, 0 skipped, 0 failed), aborted: connection refused"
        );
    }
}
