//! Action executors.
//!
//! Executors are the external collaborators that actually run build
//! work. The core hands them an action's opaque configuration and the
//! resolved input artifacts, and reads back an outcome.

use crate::core::{ActionOutcome, ActionSpec, Artifact, PayloadRef};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Trait for action executors.
#[async_trait]
pub trait ActionExecutor: Send + Sync + Debug {
    /// Returns the executor name used in action bindings.
    fn name(&self) -> &str;

    /// Runs one action attempt with its resolved inputs.
    async fn run(&self, action: &ActionSpec, inputs: &[Artifact]) -> ActionOutcome;
}

/// A simple function-based executor.
pub struct FnExecutor<F>
where
    F: Fn(&ActionSpec, &[Artifact]) -> ActionOutcome + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnExecutor<F>
where
    F: Fn(&ActionSpec, &[Artifact]) -> ActionOutcome + Send + Sync,
{
    /// Creates a new function-based executor.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnExecutor<F>
where
    F: Fn(&ActionSpec, &[Artifact]) -> ActionOutcome + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnExecutor").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> ActionExecutor for FnExecutor<F>
where
    F: Fn(&ActionSpec, &[Artifact]) -> ActionOutcome + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, action: &ActionSpec, inputs: &[Artifact]) -> ActionOutcome {
        (self.func)(action, inputs)
    }
}

/// An executor that succeeds and produces a synthetic payload for each
/// declared output. Useful for wiring tests.
#[derive(Debug, Clone)]
pub struct NoOpExecutor {
    name: String,
}

impl NoOpExecutor {
    /// Creates a new no-op executor.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for NoOpExecutor {
    fn default() -> Self {
        Self::new("noop")
    }
}

#[async_trait]
impl ActionExecutor for NoOpExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, action: &ActionSpec, _inputs: &[Artifact]) -> ActionOutcome {
        let mut outcome = ActionOutcome::ok();
        for output in &action.outputs {
            outcome = outcome
                .with_payload(output, PayloadRef::new(format!("noop://{output}")));
        }
        outcome
    }
}

/// Registry resolving executor names referenced by actions.
#[derive(Debug, Default)]
pub struct ExecutorRegistry {
    executors: RwLock<HashMap<String, Arc<dyn ActionExecutor>>>,
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an executor under its own name.
    pub fn register(&self, executor: Arc<dyn ActionExecutor>) {
        self.executors
            .write()
            .insert(executor.name().to_string(), executor);
    }

    /// Looks up an executor.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionExecutor>> {
        self.executors.read().get(name).cloned()
    }

    /// Returns the registered executor names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.executors.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ExecutionId;

    #[tokio::test]
    async fn test_noop_executor_produces_outputs() {
        let executor = NoOpExecutor::default();
        let action = ActionSpec::new("Build", "noop")
            .with_output("buildOut")
            .with_output("reportOut");

        let outcome = executor.run(&action, &[]).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.produced.len(), 2);
        assert_eq!(
            outcome.produced.get("buildOut").map(|p| p.locator.as_str()),
            Some("noop://buildOut")
        );
    }

    #[tokio::test]
    async fn test_fn_executor() {
        let executor = FnExecutor::new("docker", |action: &ActionSpec, inputs: &[Artifact]| {
            let mut outcome = ActionOutcome::ok().with_variable("SHA", "4f2a91c");
            for output in &action.outputs {
                outcome = outcome.with_payload(
                    output,
                    PayloadRef::new(format!("registry://{}/{}", inputs.len(), output)),
                );
            }
            outcome
        });

        let action = ActionSpec::new("Docker_Build", "docker").with_output("imageDefOut");
        let source = Artifact::new(
            "sourceOut",
            "Source",
            ExecutionId::new(1),
            PayloadRef::new("repo://demo"),
        );

        let outcome = executor.run(&action, &[source]).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.variables.get("SHA").map(String::as_str), Some("4f2a91c"));
    }

    #[test]
    fn test_registry() {
        let registry = ExecutorRegistry::new();
        registry.register(Arc::new(NoOpExecutor::new("codebuild")));

        assert!(registry.get("codebuild").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["codebuild".to_string()]);
    }
}
