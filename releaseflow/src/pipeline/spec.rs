//! Stage specifications.

use super::RetryPolicy;
use crate::core::{ActionSpec, StageKind};
use crate::errors::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Configuration for a promotion gate stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Milliseconds to wait for a decision before treating the gate as
    /// rejected. `None` waits indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl GateConfig {
    /// A gate that waits indefinitely.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the decision timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Returns the timeout as a duration, if configured.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Binds a deploy stage to an environment target and the artifact it
/// promotes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployBinding {
    /// The environment target to update.
    pub target: String,
    /// The artifact whose version is deployed.
    pub artifact: String,
}

impl DeployBinding {
    /// Creates a new deploy binding.
    #[must_use]
    pub fn new(target: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            artifact: artifact.into(),
        }
    }
}

/// Specification for a single stage in a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    /// The unique name of the stage.
    pub name: String,
    /// The kind of stage.
    pub kind: StageKind,
    /// Actions executed when the stage runs; parallel within the stage.
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    /// Stages that must succeed before this one, beyond what artifact
    /// consumption already implies. Needed by stages with no artifact
    /// inputs of their own, such as approval gates.
    #[serde(default)]
    pub runs_after: Vec<String>,
    /// Retry policy applied per action. Defaults to fail fast.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Gate configuration for approval stages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateConfig>,
    /// Deploy binding for deploy stages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeployBinding>,
}

impl StageSpec {
    /// Creates a new stage specification.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: StageKind) -> Self {
        Self {
            name: name.into(),
            kind,
            actions: Vec::new(),
            runs_after: Vec::new(),
            retry: RetryPolicy::default(),
            gate: None,
            deploy: None,
        }
    }

    /// Adds an action.
    #[must_use]
    pub fn with_action(mut self, action: ActionSpec) -> Self {
        self.actions.push(action);
        self
    }

    /// Adds an explicit ordering constraint.
    #[must_use]
    pub fn after(mut self, stage: impl Into<String>) -> Self {
        self.runs_after.push(stage.into());
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the gate configuration.
    #[must_use]
    pub fn with_gate(mut self, gate: GateConfig) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Sets the deploy binding.
    #[must_use]
    pub fn with_deploy(mut self, deploy: DeployBinding) -> Self {
        self.deploy = Some(deploy);
        self
    }

    /// All artifact names this stage consumes, including the deployed
    /// artifact of a deploy binding.
    #[must_use]
    pub fn inputs(&self) -> HashSet<String> {
        let mut inputs: HashSet<String> = self
            .actions
            .iter()
            .flat_map(|a| a.inputs.iter().cloned())
            .collect();
        if let Some(ref binding) = self.deploy {
            inputs.insert(binding.artifact.clone());
        }
        inputs
    }

    /// All artifact names this stage produces.
    #[must_use]
    pub fn outputs(&self) -> Vec<String> {
        self.actions
            .iter()
            .flat_map(|a| a.outputs.iter().cloned())
            .collect()
    }

    /// Validates the stage specification in isolation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::new("Stage name cannot be empty"));
        }

        let mut action_names = HashSet::new();
        for action in &self.actions {
            if !action_names.insert(action.name.as_str()) {
                return Err(ValidationError::new(format!(
                    "Stage '{}' declares action '{}' more than once",
                    self.name, action.name
                ))
                .with_stages(vec![self.name.clone()]));
            }
        }

        let mut outputs = HashSet::new();
        for output in self.outputs() {
            if !outputs.insert(output.clone()) {
                return Err(ValidationError::new(format!(
                    "Stage '{}' declares output artifact '{}' more than once",
                    self.name, output
                ))
                .with_stages(vec![self.name.clone()]));
            }
        }

        // Actions within a stage run in parallel; one action cannot
        // consume another's output.
        for action in &self.actions {
            for input in &action.inputs {
                if outputs.contains(input) {
                    return Err(ValidationError::new(format!(
                        "Stage '{}' consumes artifact '{}' that it also produces",
                        self.name, input
                    ))
                    .with_stages(vec![self.name.clone()]));
                }
            }
        }

        match self.kind {
            StageKind::Approval => {
                if !self.actions.is_empty() {
                    return Err(ValidationError::new(format!(
                        "Approval stage '{}' must have no build actions",
                        self.name
                    ))
                    .with_stages(vec![self.name.clone()]));
                }
                if self.deploy.is_some() {
                    return Err(ValidationError::new(format!(
                        "Approval stage '{}' cannot carry a deploy binding",
                        self.name
                    ))
                    .with_stages(vec![self.name.clone()]));
                }
            }
            StageKind::Deploy => {
                if self.deploy.is_none() {
                    return Err(ValidationError::new(format!(
                        "Deploy stage '{}' requires a deploy binding",
                        self.name
                    ))
                    .with_stages(vec![self.name.clone()]));
                }
            }
            StageKind::Source | StageKind::Build => {
                if self.actions.is_empty() {
                    return Err(ValidationError::new(format!(
                        "Stage '{}' has no actions",
                        self.name
                    ))
                    .with_stages(vec![self.name.clone()]));
                }
            }
        }

        if self.runs_after.iter().any(|s| s == &self.name) {
            return Err(ValidationError::new(format!(
                "Stage '{}' cannot run after itself",
                self.name
            ))
            .with_stages(vec![self.name.clone()]));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_spec_inputs_and_outputs() {
        let spec = StageSpec::new("Build", StageKind::Build)
            .with_action(
                ActionSpec::new("CDK_Build", "codebuild")
                    .with_input("sourceOut")
                    .with_output("cdkBuildOut"),
            )
            .with_action(
                ActionSpec::new("Lambda_Build", "codebuild")
                    .with_input("sourceOut")
                    .with_output("lambdaBuildOut"),
            );

        assert_eq!(spec.inputs(), HashSet::from(["sourceOut".to_string()]));
        assert_eq!(spec.outputs().len(), 2);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_deploy_binding_counts_as_input() {
        let spec = StageSpec::new("Prod_Deployment", StageKind::Deploy)
            .with_deploy(DeployBinding::new("production", "imageDefOut"));

        assert!(spec.inputs().contains("imageDefOut"));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_deploy_requires_binding() {
        let spec = StageSpec::new("Deploy", StageKind::Deploy);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_approval_rejects_actions() {
        let spec = StageSpec::new("Approval", StageKind::Approval)
            .with_action(ActionSpec::new("Build", "codebuild"));
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_duplicate_action_names() {
        let spec = StageSpec::new("Build", StageKind::Build)
            .with_action(ActionSpec::new("A", "x").with_output("a"))
            .with_action(ActionSpec::new("A", "x").with_output("b"));
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_intra_stage_consumption_rejected() {
        let spec = StageSpec::new("Build", StageKind::Build)
            .with_action(ActionSpec::new("A", "x").with_output("mid"))
            .with_action(ActionSpec::new("B", "x").with_input("mid"));
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_self_ordering_rejected() {
        let spec = StageSpec::new("Build", StageKind::Build)
            .with_action(ActionSpec::new("A", "x").with_output("a"))
            .after("Build");
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_gate_timeout() {
        let gate = GateConfig::new().with_timeout_ms(5000);
        assert_eq!(gate.timeout(), Some(Duration::from_millis(5000)));
        assert_eq!(GateConfig::new().timeout(), None);
    }
}
