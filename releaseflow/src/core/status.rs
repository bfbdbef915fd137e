//! Stage, execution, and approval state enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of work a stage performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// A stage that pulls the source artifact into the pipeline.
    Source,
    /// A stage that runs build actions over input artifacts.
    Build,
    /// A stage that binds an artifact version to an environment target.
    Deploy,
    /// A manual-approval checkpoint with no build actions.
    Approval,
}

impl Default for StageKind {
    fn default() -> Self {
        Self::Build
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Build => write!(f, "build"),
            Self::Deploy => write!(f, "deploy"),
            Self::Approval => write!(f, "approval"),
        }
    }
}

/// The lifecycle state of a stage within one execution.
///
/// Transitions are monotonic: once `Succeeded` or `Failed`, a stage
/// never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Waiting for input artifacts.
    Pending,
    /// All inputs exist; eligible to start.
    Ready,
    /// Currently executing.
    Running,
    /// Completed successfully.
    Succeeded,
    /// Failed; terminal.
    Failed,
}

impl Default for StageState {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl StageState {
    /// Returns true if the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Returns true if the transition to `next` respects monotonicity.
    #[must_use]
    pub fn can_transition(&self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Ready | Self::Failed),
            Self::Ready => matches!(next, Self::Running | Self::Failed),
            Self::Running => matches!(next, Self::Succeeded | Self::Failed),
            Self::Succeeded | Self::Failed => false,
        }
    }
}

/// The overall status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Stages are still being scheduled or run.
    Running,
    /// Every stage succeeded.
    Succeeded,
    /// At least one stage failed.
    Failed,
    /// The execution was cancelled before completion.
    Cancelled,
}

impl Default for ExecutionStatus {
    fn default() -> Self {
        Self::Running
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl ExecutionStatus {
    /// Returns true if the status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// The state of a promotion gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    /// The gate stage has not started.
    Pending,
    /// Waiting for an external decision.
    AwaitingApproval,
    /// Approved; the pipeline may proceed.
    Approved,
    /// Rejected; terminal failure for the execution.
    Rejected,
}

impl fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::AwaitingApproval => write!(f, "awaiting_approval"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_state_display() {
        assert_eq!(StageState::Pending.to_string(), "pending");
        assert_eq!(StageState::Succeeded.to_string(), "succeeded");
    }

    #[test]
    fn test_stage_state_terminal() {
        assert!(StageState::Succeeded.is_terminal());
        assert!(StageState::Failed.is_terminal());
        assert!(!StageState::Running.is_terminal());
        assert!(!StageState::Pending.is_terminal());
    }

    #[test]
    fn test_stage_state_monotonic() {
        assert!(StageState::Pending.can_transition(StageState::Ready));
        assert!(StageState::Ready.can_transition(StageState::Running));
        assert!(StageState::Running.can_transition(StageState::Succeeded));
        assert!(StageState::Running.can_transition(StageState::Failed));

        // Terminal states never revert.
        assert!(!StageState::Succeeded.can_transition(StageState::Running));
        assert!(!StageState::Failed.can_transition(StageState::Pending));
        // No skipping Ready.
        assert!(!StageState::Pending.can_transition(StageState::Running));
    }

    #[test]
    fn test_execution_status_terminal() {
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Succeeded.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_stage_kind_serialize() {
        let json = serde_json::to_string(&StageKind::Approval).unwrap();
        assert_eq!(json, r#""approval""#);
    }

    #[test]
    fn test_approval_state_display() {
        assert_eq!(
            ApprovalState::AwaitingApproval.to_string(),
            "awaiting_approval"
        );
    }
}
