//! Action specifications and executor outcomes.

use super::PayloadRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declaration of one action within a stage.
///
/// The action's command is opaque configuration for the executor; the
/// core only interprets the declared artifact inputs and outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Action name, unique within the stage.
    pub name: String,

    /// Name of the registered executor that runs this action.
    pub executor: String,

    /// Artifact names this action consumes.
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Artifact names this action produces.
    #[serde(default)]
    pub outputs: Vec<String>,

    /// Namespace under which produced variables are published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables_namespace: Option<String>,

    /// Opaque executor configuration (commands, parameter overrides).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub configuration: HashMap<String, serde_json::Value>,
}

impl ActionSpec {
    /// Creates a new action bound to a named executor.
    #[must_use]
    pub fn new(name: impl Into<String>, executor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executor: executor.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            variables_namespace: None,
            configuration: HashMap::new(),
        }
    }

    /// Declares an input artifact.
    #[must_use]
    pub fn with_input(mut self, artifact: impl Into<String>) -> Self {
        self.inputs.push(artifact.into());
        self
    }

    /// Declares an output artifact.
    #[must_use]
    pub fn with_output(mut self, artifact: impl Into<String>) -> Self {
        self.outputs.push(artifact.into());
        self
    }

    /// Sets the variable namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.variables_namespace = Some(namespace.into());
        self
    }

    /// Adds an opaque configuration entry.
    #[must_use]
    pub fn with_configuration(
        mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.configuration.insert(key.into(), value);
        self
    }
}

/// The result an executor reports for one action attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Payloads for the artifacts the action produced, by artifact name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub produced: HashMap<String, PayloadRef>,

    /// Variables resolved during the action (e.g. a short commit id).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, String>,

    /// Error message when the action failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Whether a failure is worth retrying.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl ActionOutcome {
    /// Creates a successful outcome with no payloads.
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Creates a retryable failed outcome.
    #[must_use]
    pub fn fail_retryable(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            retryable: true,
            ..Self::default()
        }
    }

    /// Attaches a produced payload.
    #[must_use]
    pub fn with_payload(mut self, artifact: impl Into<String>, payload: PayloadRef) -> Self {
        self.produced.insert(artifact.into(), payload);
        self
    }

    /// Attaches a resolved variable.
    #[must_use]
    pub fn with_variable(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Returns true if the action succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_spec_builder() {
        let action = ActionSpec::new("Docker_Build", "codebuild")
            .with_input("sourceOut")
            .with_output("imageDefOut")
            .with_namespace("DemoAPI")
            .with_configuration("buildspec", serde_json::json!("docker/buildspec.yml"));

        assert_eq!(action.inputs, vec!["sourceOut"]);
        assert_eq!(action.outputs, vec!["imageDefOut"]);
        assert_eq!(action.variables_namespace.as_deref(), Some("DemoAPI"));
        assert_eq!(action.configuration.len(), 1);
    }

    #[test]
    fn test_outcome_ok() {
        let outcome = ActionOutcome::ok()
            .with_payload("imageDefOut", PayloadRef::new("s3://a/imagedef.json"))
            .with_variable("SHA", "4f2a91c");

        assert!(outcome.is_success());
        assert_eq!(outcome.produced.len(), 1);
        assert_eq!(outcome.variables.get("SHA").map(String::as_str), Some("4f2a91c"));
    }

    #[test]
    fn test_outcome_fail() {
        let outcome = ActionOutcome::fail("exit status 1");
        assert!(!outcome.is_success());
        assert!(!outcome.retryable);

        let transient = ActionOutcome::fail_retryable("registry throttled");
        assert!(transient.retryable);
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = ActionOutcome::ok().with_variable("SHA", "abc1234");
        let json = serde_json::to_string(&outcome).unwrap();
        let back: ActionOutcome = serde_json::from_str(&json).unwrap();

        assert!(back.is_success());
        assert_eq!(back.variables.get("SHA").map(String::as_str), Some("abc1234"));
    }
}
