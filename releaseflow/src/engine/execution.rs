//! The per-run execution record.

use crate::core::{
    Artifact, ExecutionId, ExecutionIdentity, ExecutionStatus, StageState,
};
use crate::errors::ActionFailure;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// One run of a pipeline graph.
///
/// Holds the per-stage status map and the overall status. Stage
/// transitions are monotonic; attempts to revert a terminal state are
/// rejected and logged.
#[derive(Debug)]
pub struct Execution {
    identity: ExecutionIdentity,
    stages: RwLock<HashMap<String, StageState>>,
    status: RwLock<ExecutionStatus>,
    failures: RwLock<Vec<ActionFailure>>,
    started_at: DateTime<Utc>,
    finished_at: RwLock<Option<DateTime<Utc>>>,
}

impl Execution {
    /// Creates an execution with every stage Pending.
    #[must_use]
    pub fn new(
        identity: ExecutionIdentity,
        stage_names: impl IntoIterator<Item = String>,
    ) -> Self {
        let stages = stage_names
            .into_iter()
            .map(|name| (name, StageState::Pending))
            .collect();

        Self {
            identity,
            stages: RwLock::new(stages),
            status: RwLock::new(ExecutionStatus::Running),
            failures: RwLock::new(Vec::new()),
            started_at: Utc::now(),
            finished_at: RwLock::new(None),
        }
    }

    /// Recreates an execution from a snapshot, keeping succeeded stages
    /// and resetting everything else to Pending.
    #[must_use]
    pub fn from_snapshot(snapshot: &ExecutionSnapshot) -> Self {
        let stages = snapshot
            .stages
            .iter()
            .map(|(name, state)| {
                let state = if *state == StageState::Succeeded {
                    StageState::Succeeded
                } else {
                    StageState::Pending
                };
                (name.clone(), state)
            })
            .collect();

        Self {
            identity: snapshot.identity.clone(),
            stages: RwLock::new(stages),
            status: RwLock::new(ExecutionStatus::Running),
            failures: RwLock::new(Vec::new()),
            started_at: Utc::now(),
            finished_at: RwLock::new(None),
        }
    }

    /// Returns the execution identity.
    #[must_use]
    pub fn identity(&self) -> &ExecutionIdentity {
        &self.identity
    }

    /// Returns the execution id.
    #[must_use]
    pub fn id(&self) -> ExecutionId {
        self.identity.id
    }

    /// Returns the state of one stage.
    #[must_use]
    pub fn stage_state(&self, stage: &str) -> Option<StageState> {
        self.stages.read().get(stage).copied()
    }

    /// Returns a copy of the full status map.
    #[must_use]
    pub fn stage_states(&self) -> HashMap<String, StageState> {
        self.stages.read().clone()
    }

    /// Applies a stage transition, enforcing monotonicity.
    ///
    /// Returns false (and logs) when the transition is not allowed.
    pub fn transition(&self, stage: &str, next: StageState) -> bool {
        let mut stages = self.stages.write();
        let Some(current) = stages.get_mut(stage) else {
            warn!(stage, "transition for unknown stage");
            return false;
        };

        if !current.can_transition(next) {
            warn!(
                stage,
                from = %current,
                to = %next,
                "rejected non-monotonic stage transition"
            );
            return false;
        }

        *current = next;
        true
    }

    /// Records an action failure.
    pub fn record_failure(&self, failure: ActionFailure) {
        self.failures.write().push(failure);
    }

    /// Returns the recorded failures.
    #[must_use]
    pub fn failures(&self) -> Vec<ActionFailure> {
        self.failures.read().clone()
    }

    /// Returns the overall status.
    #[must_use]
    pub fn status(&self) -> ExecutionStatus {
        *self.status.read()
    }

    /// Returns when the execution started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the execution finished, if it has.
    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        *self.finished_at.read()
    }

    /// Moves the execution to a terminal status.
    pub fn finish(&self, status: ExecutionStatus) {
        let mut current = self.status.write();
        if current.is_terminal() {
            warn!(from = %*current, to = %status, "execution already finished");
            return;
        }
        *current = status;
        *self.finished_at.write() = Some(Utc::now());
    }

    /// Takes a snapshot sufficient to resume after a process restart.
    #[must_use]
    pub fn snapshot(&self, artifacts: Vec<Artifact>) -> ExecutionSnapshot {
        ExecutionSnapshot {
            identity: self.identity.clone(),
            stages: self.stage_states(),
            artifacts,
            taken_at: Utc::now(),
        }
    }
}

/// A serializable snapshot of an execution: the status map plus the
/// artifact inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    /// The execution identity.
    pub identity: ExecutionIdentity,
    /// Per-stage states at snapshot time.
    pub stages: HashMap<String, StageState>,
    /// Artifacts produced before the snapshot.
    pub artifacts: Vec<Artifact>,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PayloadRef;

    fn execution() -> Execution {
        Execution::new(
            ExecutionIdentity::new(ExecutionId::new(1)),
            ["Source".to_string(), "Build".to_string()],
        )
    }

    #[test]
    fn test_new_execution_all_pending() {
        let execution = execution();
        assert_eq!(execution.stage_state("Source"), Some(StageState::Pending));
        assert_eq!(execution.stage_state("Build"), Some(StageState::Pending));
        assert_eq!(execution.status(), ExecutionStatus::Running);
    }

    #[test]
    fn test_transitions_monotonic() {
        let execution = execution();

        assert!(execution.transition("Source", StageState::Ready));
        assert!(execution.transition("Source", StageState::Running));
        assert!(execution.transition("Source", StageState::Succeeded));

        // Terminal: no reverting.
        assert!(!execution.transition("Source", StageState::Running));
        assert!(!execution.transition("Source", StageState::Failed));
        assert_eq!(execution.stage_state("Source"), Some(StageState::Succeeded));
    }

    #[test]
    fn test_transition_unknown_stage() {
        let execution = execution();
        assert!(!execution.transition("Missing", StageState::Ready));
    }

    #[test]
    fn test_finish_once() {
        let execution = execution();
        execution.finish(ExecutionStatus::Failed);
        execution.finish(ExecutionStatus::Succeeded);

        assert_eq!(execution.status(), ExecutionStatus::Failed);
        assert!(execution.finished_at().is_some());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let execution = execution();
        execution.transition("Source", StageState::Ready);
        execution.transition("Source", StageState::Running);
        execution.transition("Source", StageState::Succeeded);

        let artifact = Artifact::new(
            "sourceOut",
            "Source",
            execution.id(),
            PayloadRef::new("repo://demo"),
        );
        let snapshot = execution.snapshot(vec![artifact]);

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: ExecutionSnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(back.stages.get("Source"), Some(&StageState::Succeeded));
        assert_eq!(back.artifacts.len(), 1);
        assert_eq!(back.identity.id, ExecutionId::new(1));
    }

    #[test]
    fn test_from_snapshot_resets_non_succeeded() {
        let execution = execution();
        execution.transition("Source", StageState::Ready);
        execution.transition("Source", StageState::Running);
        execution.transition("Source", StageState::Succeeded);
        execution.transition("Build", StageState::Ready);
        execution.transition("Build", StageState::Running);
        execution.transition("Build", StageState::Failed);

        let snapshot = execution.snapshot(Vec::new());
        let resumed = Execution::from_snapshot(&snapshot);

        assert_eq!(resumed.stage_state("Source"), Some(StageState::Succeeded));
        assert_eq!(resumed.stage_state("Build"), Some(StageState::Pending));
        assert_eq!(resumed.id(), execution.id());
    }
}
