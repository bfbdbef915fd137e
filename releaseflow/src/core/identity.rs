//! Execution identity for tracking pipeline runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The monotonically increasing number of an execution.
///
/// Assigned by the engine; later executions always carry larger numbers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ExecutionId(u64);

impl ExecutionId {
    /// Creates an execution id from a raw number.
    #[must_use]
    pub fn new(number: u64) -> Self {
        Self(number)
    }

    /// Returns the raw number.
    #[must_use]
    pub fn number(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one execution of a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionIdentity {
    /// The execution number, monotonic per engine.
    pub id: ExecutionId,

    /// Correlation id for logs and events.
    pub correlation: Uuid,

    /// What triggered the execution (e.g. a commit id), if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
}

impl ExecutionIdentity {
    /// Creates an identity with a fresh correlation id.
    #[must_use]
    pub fn new(id: ExecutionId) -> Self {
        Self {
            id,
            correlation: Uuid::new_v4(),
            trigger: None,
        }
    }

    /// Sets the trigger description.
    #[must_use]
    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_id_ordering() {
        assert!(ExecutionId::new(1) < ExecutionId::new(2));
        assert_eq!(ExecutionId::new(7).number(), 7);
        assert_eq!(ExecutionId::new(7).to_string(), "7");
    }

    #[test]
    fn test_identity_trigger() {
        let identity = ExecutionIdentity::new(ExecutionId::new(3))
            .with_trigger("commit 4f2a91c");

        assert_eq!(identity.id, ExecutionId::new(3));
        assert_eq!(identity.trigger.as_deref(), Some("commit 4f2a91c"));
    }

    #[test]
    fn test_identity_serialization() {
        let identity = ExecutionIdentity::new(ExecutionId::new(1));
        let json = serde_json::to_string(&identity).unwrap();
        let back: ExecutionIdentity = serde_json::from_str(&json).unwrap();

        assert_eq!(identity.id, back.id);
        assert_eq!(identity.correlation, back.correlation);
    }
}
