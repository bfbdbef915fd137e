//! Error types for the releaseflow orchestrator.
//!
//! Graph-definition errors (`DependencyError`, `CycleError`,
//! `ValidationError`) fail fast before any execution starts. Action
//! failures stay local to their stage and surface through the execution
//! report rather than crossing stage boundaries as errors.

use crate::core::ExecutionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for releaseflow operations.
#[derive(Debug, Error)]
pub enum ReleaseflowError {
    /// A stage declared an input artifact no earlier stage produces.
    #[error("{0}")]
    Dependency(#[from] DependencyError),

    /// The pipeline graph contains a dependency cycle.
    #[error("{0}")]
    Cycle(#[from] CycleError),

    /// A stage or pipeline definition is malformed.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// An artifact name was produced twice in one execution.
    #[error("{0}")]
    DuplicateArtifact(#[from] DuplicateArtifactError),

    /// An artifact was requested before production.
    #[error("{0}")]
    ArtifactNotReady(#[from] ArtifactNotReadyError),

    /// A promotion gate was rejected or timed out.
    #[error("{0}")]
    PromotionRejected(#[from] PromotionRejectedError),

    /// An artifact from another execution was offered for deployment.
    #[error("{0}")]
    StaleArtifact(#[from] StaleArtifactError),

    /// The underlying provisioner failed.
    #[error("{0}")]
    Provisioner(#[from] ProvisionerError),

    /// A deploy referenced an environment target that was never registered.
    #[error("Unknown environment target: {0}")]
    UnknownTarget(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error raised when a stage declares an input artifact that no
/// earlier-added stage produces and that is not an external source
/// artifact.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Stage '{stage}' consumes artifact '{artifact}' which is not produced by any earlier stage: {message}")]
pub struct DependencyError {
    /// The stage with the unsatisfiable declaration.
    pub stage: String,
    /// The offending artifact name.
    pub artifact: String,
    /// Additional detail.
    pub message: String,
}

impl DependencyError {
    /// Creates a new dependency error.
    #[must_use]
    pub fn new(
        stage: impl Into<String>,
        artifact: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            artifact: artifact.into(),
            message: message.into(),
        }
    }
}

/// Error raised when a cycle is detected in the pipeline graph.
///
/// Append-only construction makes cycles structurally impossible, but
/// the topological sort still checks because artifact names could be
/// rewired by later definitions.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Cycle detected in pipeline: {}", cycle_path.join(" -> "))]
pub struct CycleError {
    /// The path of stages forming the cycle.
    pub cycle_path: Vec<String>,
}

impl CycleError {
    /// Creates a new cycle error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        Self { cycle_path }
    }
}

/// Error raised when a stage or pipeline definition is malformed.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }
}

/// Error raised when an artifact name is produced a second time within
/// one execution.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Artifact '{artifact}' was already produced by stage '{prior_producer}' in this execution (attempted again by '{producer}')")]
pub struct DuplicateArtifactError {
    /// The artifact name.
    pub artifact: String,
    /// The stage attempting the second production.
    pub producer: String,
    /// The stage that produced the artifact first.
    pub prior_producer: String,
}

impl DuplicateArtifactError {
    /// Creates a new duplicate artifact error.
    #[must_use]
    pub fn new(
        artifact: impl Into<String>,
        producer: impl Into<String>,
        prior_producer: impl Into<String>,
    ) -> Self {
        Self {
            artifact: artifact.into(),
            producer: producer.into(),
            prior_producer: prior_producer.into(),
        }
    }
}

/// Error raised when an artifact is requested before it was produced.
///
/// The engine's readiness check prevents this from surfacing during a
/// well-formed execution; seeing it indicates a scheduling bug.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Artifact '{artifact}' has not been produced yet")]
pub struct ArtifactNotReadyError {
    /// The artifact name.
    pub artifact: String,
}

impl ArtifactNotReadyError {
    /// Creates a new artifact-not-ready error.
    #[must_use]
    pub fn new(artifact: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
        }
    }
}

/// Why a promotion gate rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    /// An approver explicitly rejected, with a note.
    Rejected {
        /// Who rejected, if known.
        actor: Option<String>,
        /// The rejection note.
        note: String,
    },
    /// The configured wait elapsed with no decision.
    Timeout,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected { actor, note } => match actor {
                Some(actor) => write!(f, "rejected by {actor}: {note}"),
                None => write!(f, "rejected: {note}"),
            },
            Self::Timeout => write!(f, "Timeout"),
        }
    }
}

/// Error raised when a promotion gate is rejected or times out.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Promotion gate '{stage}' did not approve: {reason}")]
pub struct PromotionRejectedError {
    /// The gate stage name.
    pub stage: String,
    /// Why the gate rejected.
    pub reason: RejectionReason,
}

impl PromotionRejectedError {
    /// Creates a rejection from an explicit decision.
    #[must_use]
    pub fn rejected(
        stage: impl Into<String>,
        actor: Option<String>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            reason: RejectionReason::Rejected {
                actor,
                note: note.into(),
            },
        }
    }

    /// Creates a rejection from an elapsed timeout.
    #[must_use]
    pub fn timeout(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            reason: RejectionReason::Timeout,
        }
    }

    /// Returns true if the rejection came from a timeout.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.reason == RejectionReason::Timeout
    }
}

/// Error raised when a deploy references an artifact produced by an
/// execution other than the current one.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Artifact '{artifact}' was produced by execution {produced_by} but the current execution is {current}")]
pub struct StaleArtifactError {
    /// The artifact name.
    pub artifact: String,
    /// The execution that produced the artifact.
    pub produced_by: ExecutionId,
    /// The execution attempting the deploy.
    pub current: ExecutionId,
}

impl StaleArtifactError {
    /// Creates a new stale artifact error.
    #[must_use]
    pub fn new(
        artifact: impl Into<String>,
        produced_by: ExecutionId,
        current: ExecutionId,
    ) -> Self {
        Self {
            artifact: artifact.into(),
            produced_by,
            current,
        }
    }
}

/// Error wrapping an underlying provisioner failure.
///
/// The target's previously deployed version is intact whenever this is
/// returned.
#[derive(Debug, Error)]
#[error("Provisioner failed for target '{target}': {source}")]
pub struct ProvisionerError {
    /// The environment target being deployed to.
    pub target: String,
    /// The underlying cause.
    #[source]
    pub source: anyhow::Error,
}

impl ProvisionerError {
    /// Wraps a provisioner failure for a target.
    #[must_use]
    pub fn new(target: impl Into<String>, source: anyhow::Error) -> Self {
        Self {
            target: target.into(),
            source,
        }
    }
}

/// Record of an executor-reported action failure.
///
/// Stays local to the owning stage; collected on the execution rather
/// than thrown across stage boundaries.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Action '{action}' in stage '{stage}' failed: {error}")]
pub struct ActionFailure {
    /// The owning stage.
    pub stage: String,
    /// The failed action.
    pub action: String,
    /// The executor-reported error.
    pub error: String,
    /// Whether the executor marked the failure retryable.
    pub retryable: bool,
    /// Attempts consumed, including the first.
    pub attempts: u32,
    /// When the failure was recorded.
    pub failed_at: DateTime<Utc>,
}

impl ActionFailure {
    /// Creates a new action failure record.
    #[must_use]
    pub fn new(
        stage: impl Into<String>,
        action: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            action: action.into(),
            error: error.into(),
            retryable: false,
            attempts: 1,
            failed_at: Utc::now(),
        }
    }

    /// Marks the failure retryable.
    #[must_use]
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    /// Sets the attempt count.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_error_display() {
        let err = DependencyError::new("Deploy", "imageDefOut", "not produced");
        assert!(err.to_string().contains("Deploy"));
        assert!(err.to_string().contains("imageDefOut"));
    }

    #[test]
    fn test_cycle_error_path() {
        let err = CycleError::new(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]);
        assert!(err.to_string().contains("a -> b -> a"));
    }

    #[test]
    fn test_promotion_rejected_timeout() {
        let err = PromotionRejectedError::timeout("Approval");
        assert!(err.timed_out());
        assert!(err.to_string().contains("Timeout"));
    }

    #[test]
    fn test_promotion_rejected_explicit() {
        let err = PromotionRejectedError::rejected(
            "Approval",
            Some("release-manager".to_string()),
            "not ready",
        );
        assert!(!err.timed_out());
        assert!(err.to_string().contains("not ready"));
        assert!(err.to_string().contains("release-manager"));
    }

    #[test]
    fn test_stale_artifact_error() {
        let err = StaleArtifactError::new(
            "imageDefOut",
            ExecutionId::new(1),
            ExecutionId::new(2),
        );
        assert!(err.to_string().contains("execution 1"));
    }

    #[test]
    fn test_action_failure_builder() {
        let failure = ActionFailure::new("Build", "Compile", "exit 1")
            .retryable()
            .with_attempts(3);

        assert!(failure.retryable);
        assert_eq!(failure.attempts, 3);
    }

    #[test]
    fn test_error_conversion() {
        let err: ReleaseflowError = ArtifactNotReadyError::new("sourceOut").into();
        assert!(matches!(err, ReleaseflowError::ArtifactNotReady(_)));
    }
}
