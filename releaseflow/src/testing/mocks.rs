//! Mock executors and provisioners.

use crate::core::{ActionOutcome, ActionSpec, Artifact, PayloadRef};
use crate::deploy::{
    ArtifactVersion, EnvironmentTarget, ProvisionSpec, ProvisionedResource, Provisioner,
};
use crate::executor::ActionExecutor;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

/// An executor returning scripted outcomes per action name.
///
/// Actions with no scripted outcome succeed and produce a synthetic
/// payload for each declared output.
#[derive(Debug)]
pub struct ScriptedExecutor {
    name: String,
    scripted: Mutex<HashMap<String, VecDeque<ActionOutcome>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    /// Creates a new scripted executor.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scripted: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queues an outcome for the next run of an action.
    pub fn script(&self, action: &str, outcome: ActionOutcome) {
        self.scripted
            .lock()
            .entry(action.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Queues a permanent failure for an action.
    pub fn fail_action(&self, action: &str, error: &str) {
        self.script(action, ActionOutcome::fail(error));
    }

    /// Returns how many times an action ran.
    #[must_use]
    pub fn call_count(&self, action: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == action).count()
    }

    /// Returns every action run, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn default_outcome(action: &ActionSpec) -> ActionOutcome {
        let mut outcome = ActionOutcome::ok();
        for output in &action.outputs {
            outcome = outcome
                .with_payload(output, PayloadRef::new(format!("scripted://{output}")));
        }
        outcome
    }
}

#[async_trait]
impl ActionExecutor for ScriptedExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, action: &ActionSpec, _inputs: &[Artifact]) -> ActionOutcome {
        self.calls.lock().push(action.name.clone());

        let scripted = self
            .scripted
            .lock()
            .get_mut(&action.name)
            .and_then(VecDeque::pop_front);

        scripted.unwrap_or_else(|| Self::default_outcome(action))
    }
}

/// A provisioner that records deploys and fails on demand.
#[derive(Debug, Default)]
pub struct MockProvisioner {
    deploys: Mutex<Vec<(String, ArtifactVersion)>>,
    fail_targets: Mutex<HashSet<String>>,
}

impl MockProvisioner {
    /// Creates a new mock provisioner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes future deploys to a target fail.
    pub fn fail_target(&self, target: &str) {
        self.fail_targets.lock().insert(target.to_string());
    }

    /// Returns the recorded deploys.
    #[must_use]
    pub fn deploys(&self) -> Vec<(String, ArtifactVersion)> {
        self.deploys.lock().clone()
    }

    /// Returns how many deploys hit a target.
    #[must_use]
    pub fn deploy_count(&self, target: &str) -> usize {
        self.deploys
            .lock()
            .iter()
            .filter(|(t, _)| t == target)
            .count()
    }
}

#[async_trait]
impl Provisioner for MockProvisioner {
    fn name(&self) -> &str {
        "mock"
    }

    async fn provision(&self, spec: ProvisionSpec) -> anyhow::Result<ProvisionedResource> {
        Ok(ProvisionedResource {
            id: format!("mock-{}", spec.target),
            attributes: HashMap::new(),
        })
    }

    async fn deploy(
        &self,
        target: &EnvironmentTarget,
        version: &ArtifactVersion,
    ) -> anyhow::Result<()> {
        if self.fail_targets.lock().contains(&target.name) {
            anyhow::bail!("injected failure for target '{}'", target.name);
        }
        self.deploys
            .lock()
            .push((target.name.clone(), version.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_executor_default_outcome() {
        let executor = ScriptedExecutor::new("codebuild");
        let action = ActionSpec::new("CDK_Build", "codebuild").with_output("cdkBuildOut");

        let outcome = executor.run(&action, &[]).await;
        assert!(outcome.is_success());
        assert!(outcome.produced.contains_key("cdkBuildOut"));
        assert_eq!(executor.call_count("CDK_Build"), 1);
    }

    #[tokio::test]
    async fn test_scripted_executor_queue() {
        let executor = ScriptedExecutor::new("codebuild");
        executor.script("Build", ActionOutcome::fail_retryable("transient"));
        executor.script("Build", ActionOutcome::ok());

        let action = ActionSpec::new("Build", "codebuild");
        assert!(!executor.run(&action, &[]).await.is_success());
        assert!(executor.run(&action, &[]).await.is_success());
        assert_eq!(executor.call_count("Build"), 2);
    }

    #[tokio::test]
    async fn test_mock_provisioner_failure_injection() {
        let provisioner = MockProvisioner::new();
        provisioner.fail_target("production");

        let target = EnvironmentTarget::new("production");
        let version = ArtifactVersion {
            name: "imageDefOut".to_string(),
            payload: PayloadRef::new("registry://demo:abc"),
            variables: HashMap::new(),
        };

        assert!(provisioner.deploy(&target, &version).await.is_err());
        assert_eq!(provisioner.deploy_count("production"), 0);

        let ok_target = EnvironmentTarget::new("non-production");
        assert!(provisioner.deploy(&ok_target, &version).await.is_ok());
        assert_eq!(provisioner.deploy_count("non-production"), 1);
    }
}
