//! The scheduling engine.
//!
//! Walks the pipeline graph, starting every stage the instant its
//! inputs exist and its predecessors have succeeded. Independent
//! stages, and actions within a stage, run concurrently. Failures stay
//! on their branch: a failed stage blocks only the stages whose inputs
//! trace through it.

use super::{Execution, ExecutionSnapshot};
use crate::cancellation::CancellationToken;
use crate::core::{
    ActionSpec, Artifact, ExecutionId, ExecutionIdentity, ExecutionStatus,
    StageKind, StageState,
};
use crate::deploy::TargetBinder;
use crate::errors::{
    ActionFailure, DependencyError, PromotionRejectedError, ReleaseflowError,
    ValidationError,
};
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};
use crate::executor::ExecutorRegistry;
use crate::gate::GateRegistry;
use crate::pipeline::{PipelineGraph, RetryPolicy, StageSpec};
use crate::store::ArtifactStore;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How to restart a finished execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartMode {
    /// Rerun from the failed stages forward, reusing upstream artifacts.
    FromFailed,
    /// Rerun the whole pipeline from the source artifact.
    FromSource,
}

/// The final report of one execution.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// The execution identity.
    pub identity: ExecutionIdentity,
    /// The terminal status.
    pub status: ExecutionStatus,
    /// Final per-stage states.
    pub stages: HashMap<String, StageState>,
    /// Every captured action failure.
    pub failures: Vec<ActionFailure>,
    /// The gate rejection that failed the execution, if any.
    pub rejection: Option<PromotionRejectedError>,
    /// Artifacts left in the store, kept for forensic inspection.
    pub artifacts: Vec<Artifact>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
}

impl ExecutionReport {
    /// Returns true if the execution succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }

    /// Returns the final state of one stage.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<StageState> {
        self.stages.get(name).copied()
    }

    /// Returns a produced artifact by name.
    #[must_use]
    pub fn artifact(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }

    /// Takes a snapshot suitable for [`PipelineEngine::resume`].
    #[must_use]
    pub fn snapshot(&self) -> ExecutionSnapshot {
        ExecutionSnapshot {
            identity: self.identity.clone(),
            stages: self.stages.clone(),
            artifacts: self.artifacts.clone(),
            taken_at: chrono::Utc::now(),
        }
    }
}

/// Result of one stage task.
struct StageCompletion {
    stage: String,
    artifacts: Vec<Artifact>,
    failures: Vec<ActionFailure>,
    rejection: Option<PromotionRejectedError>,
}

impl StageCompletion {
    fn succeeded(stage: impl Into<String>, artifacts: Vec<Artifact>) -> Self {
        Self {
            stage: stage.into(),
            artifacts,
            failures: Vec::new(),
            rejection: None,
        }
    }

    fn failed(
        stage: impl Into<String>,
        failures: Vec<ActionFailure>,
        rejection: Option<PromotionRejectedError>,
    ) -> Self {
        Self {
            stage: stage.into(),
            artifacts: Vec::new(),
            failures,
            rejection,
        }
    }

    fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

type StageFuture = Pin<
    Box<
        dyn Future<Output = (String, Result<StageCompletion, tokio::task::JoinError>)>
            + Send,
    >,
>;

/// Executes pipeline graphs.
///
/// Executions run one at a time per engine, which also enforces
/// at-most-one-active-execution-per-stage.
pub struct PipelineEngine {
    graph: Arc<PipelineGraph>,
    executors: Arc<ExecutorRegistry>,
    binder: Option<Arc<TargetBinder>>,
    gates: Arc<GateRegistry>,
    sink: Arc<dyn EventSink>,
    next_execution: AtomicU64,
    run_lock: tokio::sync::Mutex<()>,
}

impl PipelineEngine {
    /// Creates an engine over a graph.
    #[must_use]
    pub fn new(graph: PipelineGraph) -> Self {
        Self {
            graph: Arc::new(graph),
            executors: Arc::new(ExecutorRegistry::new()),
            binder: None,
            gates: Arc::new(GateRegistry::new()),
            sink: Arc::new(NoOpEventSink),
            next_execution: AtomicU64::new(1),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Sets the executor registry.
    #[must_use]
    pub fn with_executors(mut self, executors: Arc<ExecutorRegistry>) -> Self {
        self.executors = executors;
        self
    }

    /// Sets the target binder used by deploy stages.
    #[must_use]
    pub fn with_binder(mut self, binder: Arc<TargetBinder>) -> Self {
        self.binder = Some(binder);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the gate registry, for wiring the approval channel.
    #[must_use]
    pub fn gates(&self) -> Arc<GateRegistry> {
        self.gates.clone()
    }

    /// Returns the graph.
    #[must_use]
    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    /// Runs the pipeline with no externally supplied artifacts.
    pub async fn run(&self) -> Result<ExecutionReport, ReleaseflowError> {
        self.run_seeded(Vec::new()).await
    }

    /// Runs the pipeline, seeding externally supplied artifacts.
    pub async fn run_seeded(
        &self,
        seeds: Vec<Artifact>,
    ) -> Result<ExecutionReport, ReleaseflowError> {
        self.run_with_token(seeds, Arc::new(CancellationToken::new()))
            .await
    }

    /// Runs the pipeline with a caller-held cancellation token.
    pub async fn run_with_token(
        &self,
        seeds: Vec<Artifact>,
        token: Arc<CancellationToken>,
    ) -> Result<ExecutionReport, ReleaseflowError> {
        self.graph.topological_order()?;

        let id = ExecutionId::new(self.next_execution.fetch_add(1, Ordering::SeqCst));
        let identity = ExecutionIdentity::new(id);
        let store = Arc::new(ArtifactStore::new(id));
        self.seed(&store, seeds, id)?;

        let execution = Arc::new(Execution::new(
            identity,
            self.graph.stages().iter().map(|s| s.name.clone()),
        ));

        Ok(self.execute(execution, store, token).await)
    }

    /// Restarts an execution from a snapshot.
    ///
    /// `FromFailed` keeps the snapshot's identity and already-produced
    /// artifacts and reruns everything that did not succeed.
    /// `FromSource` starts a fresh execution, reusing only the
    /// externally supplied artifacts.
    pub async fn resume(
        &self,
        snapshot: &ExecutionSnapshot,
        mode: RestartMode,
    ) -> Result<ExecutionReport, ReleaseflowError> {
        self.graph.topological_order()?;
        let token = Arc::new(CancellationToken::new());

        match mode {
            RestartMode::FromFailed => {
                let execution = Arc::new(Execution::from_snapshot(snapshot));
                let store = Arc::new(ArtifactStore::new(snapshot.identity.id));
                for artifact in snapshot.artifacts.clone() {
                    store
                        .put(artifact)
                        .map_err(ReleaseflowError::DuplicateArtifact)?;
                }
                info!(
                    execution = %snapshot.identity.id,
                    "resuming from failed stages"
                );
                Ok(self.execute(execution, store, token).await)
            }
            RestartMode::FromSource => {
                let seeds: Vec<Artifact> = snapshot
                    .artifacts
                    .iter()
                    .filter(|a| self.graph.externals().contains(&a.name))
                    .cloned()
                    .collect();

                let id =
                    ExecutionId::new(self.next_execution.fetch_add(1, Ordering::SeqCst));
                let identity = ExecutionIdentity::new(id)
                    .with_trigger(format!("rerun of execution {}", snapshot.identity.id));
                let store = Arc::new(ArtifactStore::new(id));
                self.seed(&store, seeds, id)?;

                let execution = Arc::new(Execution::new(
                    identity,
                    self.graph.stages().iter().map(|s| s.name.clone()),
                ));
                Ok(self.execute(execution, store, token).await)
            }
        }
    }

    fn seed(
        &self,
        store: &ArtifactStore,
        seeds: Vec<Artifact>,
        execution: ExecutionId,
    ) -> Result<(), ReleaseflowError> {
        for external in self.graph.externals() {
            if !seeds.iter().any(|a| &a.name == external) {
                return Err(DependencyError::new(
                    self.graph.name(),
                    external,
                    "external artifact not supplied at execution start",
                )
                .into());
            }
        }

        for seed in seeds {
            if !self.graph.externals().contains(&seed.name) {
                return Err(ValidationError::new(format!(
                    "Seed artifact '{}' is not declared external",
                    seed.name
                ))
                .into());
            }
            let artifact = Artifact {
                execution,
                ..seed
            };
            store
                .put(artifact)
                .map_err(ReleaseflowError::DuplicateArtifact)?;
        }
        Ok(())
    }

    async fn execute(
        &self,
        execution: Arc<Execution>,
        store: Arc<ArtifactStore>,
        token: Arc<CancellationToken>,
    ) -> ExecutionReport {
        let _run_guard = self.run_lock.lock().await;
        let start = Instant::now();
        let id = execution.id();

        self.emit(
            "execution.started",
            id,
            serde_json::json!({
                "pipeline": self.graph.name(),
                "trigger": execution.identity().trigger.clone(),
            }),
        );

        let mut in_flight: FuturesUnordered<StageFuture> = FuturesUnordered::new();
        let mut blocked: HashSet<String> = HashSet::new();
        let mut rejection: Option<PromotionRejectedError> = None;

        loop {
            if !token.is_cancelled() {
                for spec in self.graph.stages() {
                    if self.stage_is_ready(spec, &execution, &store, &blocked) {
                        execution.transition(&spec.name, StageState::Ready);
                        in_flight.push(self.spawn_stage(
                            spec.clone(),
                            execution.clone(),
                            store.clone(),
                            token.clone(),
                        ));
                    }
                }
            }

            let Some((stage_name, joined)) = in_flight.next().await else {
                break;
            };

            let completion = joined.unwrap_or_else(|err| {
                StageCompletion::failed(
                    stage_name.clone(),
                    vec![ActionFailure::new(
                        &stage_name,
                        "<task>",
                        format!("stage task aborted: {err}"),
                    )],
                    None,
                )
            });

            if completion.is_success() {
                let mut conflict = None;
                for artifact in completion.artifacts {
                    if let Err(dup) = store.put(artifact) {
                        conflict = Some(dup);
                        break;
                    }
                }

                if let Some(dup) = conflict {
                    execution.record_failure(ActionFailure::new(
                        &completion.stage,
                        "<store>",
                        dup.to_string(),
                    ));
                    execution.transition(&completion.stage, StageState::Failed);
                    blocked.extend(self.graph.downstream_of(&completion.stage));
                    self.emit(
                        "stage.failed",
                        id,
                        serde_json::json!({
                            "stage": completion.stage,
                            "error": dup.to_string(),
                        }),
                    );
                } else {
                    execution.transition(&completion.stage, StageState::Succeeded);
                    self.emit(
                        "stage.succeeded",
                        id,
                        serde_json::json!({"stage": completion.stage}),
                    );
                }
            } else {
                let first_error = completion
                    .failures
                    .first()
                    .map(|f| f.error.clone())
                    .unwrap_or_default();
                for failure in completion.failures {
                    execution.record_failure(failure);
                }
                if rejection.is_none() {
                    rejection = completion.rejection;
                }
                execution.transition(&completion.stage, StageState::Failed);
                blocked.extend(self.graph.downstream_of(&completion.stage));
                self.emit(
                    "stage.failed",
                    id,
                    serde_json::json!({
                        "stage": completion.stage,
                        "error": first_error,
                    }),
                );
            }
        }

        let states = execution.stage_states();
        let status = if token.is_cancelled() {
            ExecutionStatus::Cancelled
        } else if states.values().all(|s| *s == StageState::Succeeded) {
            ExecutionStatus::Succeeded
        } else {
            ExecutionStatus::Failed
        };
        execution.finish(status);

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.emit(
            "execution.finished",
            id,
            serde_json::json!({
                "status": status.to_string(),
                "duration_ms": duration_ms,
            }),
        );

        ExecutionReport {
            identity: execution.identity().clone(),
            status,
            stages: states,
            failures: execution.failures(),
            rejection,
            artifacts: store.artifacts(),
            duration_ms,
        }
    }

    /// A stage is ready the instant every predecessor succeeded and
    /// every declared input artifact exists in the store.
    fn stage_is_ready(
        &self,
        spec: &StageSpec,
        execution: &Execution,
        store: &ArtifactStore,
        blocked: &HashSet<String>,
    ) -> bool {
        if execution.stage_state(&spec.name) != Some(StageState::Pending) {
            return false;
        }
        if blocked.contains(&spec.name) {
            return false;
        }
        let deps_succeeded = self
            .graph
            .dependencies_of(&spec.name)
            .iter()
            .all(|dep| execution.stage_state(dep) == Some(StageState::Succeeded));
        deps_succeeded && spec.inputs().iter().all(|input| store.contains(input))
    }

    fn spawn_stage(
        &self,
        spec: StageSpec,
        execution: Arc<Execution>,
        store: Arc<ArtifactStore>,
        token: Arc<CancellationToken>,
    ) -> StageFuture {
        let name = spec.name.clone();
        let executors = self.executors.clone();
        let binder = self.binder.clone();
        let gates = self.gates.clone();
        let sink = self.sink.clone();

        let handle = tokio::spawn(async move {
            run_stage(spec, execution, store, executors, binder, gates, sink, token)
                .await
        });

        Box::pin(async move { (name, handle.await) })
    }

    fn emit(&self, name: &str, execution: ExecutionId, data: serde_json::Value) {
        self.sink
            .emit(PipelineEvent::new(name, execution).with_data(data));
    }
}

impl std::fmt::Debug for PipelineEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineEngine")
            .field("pipeline", &self.graph.name())
            .field("stages", &self.graph.stage_count())
            .finish()
    }
}

/// Resolves while cancellation has not been requested.
async fn watch_cancel(token: Arc<CancellationToken>) {
    while !token.is_cancelled() {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_stage(
    spec: StageSpec,
    execution: Arc<Execution>,
    store: Arc<ArtifactStore>,
    executors: Arc<ExecutorRegistry>,
    binder: Option<Arc<TargetBinder>>,
    gates: Arc<GateRegistry>,
    sink: Arc<dyn EventSink>,
    token: Arc<CancellationToken>,
) -> StageCompletion {
    let id = execution.id();
    let name = spec.name.clone();

    execution.transition(&name, StageState::Running);
    sink.emit(
        PipelineEvent::new("stage.started", id)
            .with_data(serde_json::json!({"stage": name, "kind": spec.kind.to_string()})),
    );
    debug!(stage = %name, kind = %spec.kind, "stage started");

    if spec.kind == StageKind::Approval {
        return run_gate(&spec, id, &gates, sink.as_ref(), token).await;
    }

    let action_results = futures::future::join_all(spec.actions.iter().map(|action| {
        run_action(
            action.clone(),
            name.clone(),
            spec.retry,
            store.clone(),
            executors.clone(),
            token.clone(),
        )
    }))
    .await;

    let mut artifacts = Vec::new();
    let mut failures = Vec::new();
    for result in action_results {
        match result {
            Ok(mut produced) => artifacts.append(&mut produced),
            Err(failure) => failures.push(failure),
        }
    }

    if !failures.is_empty() {
        return StageCompletion::failed(name, failures, None);
    }

    if spec.kind == StageKind::Deploy {
        let Some(binding) = spec.deploy.as_ref() else {
            return StageCompletion::failed(
                name.clone(),
                vec![ActionFailure::new(&name, "Deploy", "missing deploy binding")],
                None,
            );
        };
        let Some(binder) = binder else {
            return StageCompletion::failed(
                name.clone(),
                vec![ActionFailure::new(
                    &name,
                    "Deploy",
                    "no target binder configured on the engine",
                )],
                None,
            );
        };

        let artifact = match store.get(&binding.artifact) {
            Ok(artifact) => artifact,
            Err(err) => {
                return StageCompletion::failed(
                    name.clone(),
                    vec![ActionFailure::new(&name, "Deploy", err.to_string())],
                    None,
                );
            }
        };

        match binder.deploy(&binding.target, &artifact, id).await {
            Ok(deployed) => {
                sink.emit(
                    PipelineEvent::new("target.deployed", id).with_data(serde_json::json!({
                        "stage": name,
                        "target": binding.target,
                        "artifact": deployed.artifact,
                        "locator": deployed.version.payload.locator,
                    })),
                );
            }
            Err(err) => {
                warn!(stage = %name, target = %binding.target, error = %err, "deploy failed");
                return StageCompletion::failed(
                    name.clone(),
                    vec![ActionFailure::new(&name, "Deploy", err.to_string())],
                    None,
                );
            }
        }
    }

    StageCompletion::succeeded(name, artifacts)
}

async fn run_gate(
    spec: &StageSpec,
    id: ExecutionId,
    gates: &GateRegistry,
    sink: &dyn EventSink,
    token: Arc<CancellationToken>,
) -> StageCompletion {
    let name = spec.name.clone();
    let timeout = spec.gate.clone().unwrap_or_default().timeout();

    sink.emit(
        PipelineEvent::new("gate.awaiting", id)
            .with_data(serde_json::json!({"stage": name})),
    );

    let gate_stage = name.clone();
    tokio::select! {
        decision = gates.await_decision(&gate_stage, id, timeout) => match decision {
            Ok(approval) => {
                sink.emit(
                    PipelineEvent::new("gate.approved", id).with_data(
                        serde_json::json!({"stage": name.clone(), "actor": approval.actor}),
                    ),
                );
                StageCompletion::succeeded(name.clone(), Vec::new())
            }
            Err(ReleaseflowError::PromotionRejected(rejected)) => {
                sink.emit(
                    PipelineEvent::new("gate.rejected", id).with_data(serde_json::json!({
                        "stage": name.clone(),
                        "reason": rejected.reason.to_string(),
                    })),
                );
                let failure =
                    ActionFailure::new(&name, "Manual_Approval", rejected.to_string());
                StageCompletion::failed(name.clone(), vec![failure], Some(rejected))
            }
            Err(other) => StageCompletion::failed(
                name.clone(),
                vec![ActionFailure::new(&name, "Manual_Approval", other.to_string())],
                None,
            ),
        },
        () = watch_cancel(token) => {
            gates.close(&name);
            StageCompletion::failed(
                name.clone(),
                vec![ActionFailure::new(&name, "Manual_Approval", "execution cancelled")],
                None,
            )
        }
    }
}

async fn run_action(
    action: ActionSpec,
    stage: String,
    retry: RetryPolicy,
    store: Arc<ArtifactStore>,
    executors: Arc<ExecutorRegistry>,
    token: Arc<CancellationToken>,
) -> Result<Vec<Artifact>, ActionFailure> {
    let Some(executor) = executors.get(&action.executor) else {
        return Err(ActionFailure::new(
            &stage,
            &action.name,
            format!("no executor registered under '{}'", action.executor),
        ));
    };

    let mut inputs = Vec::with_capacity(action.inputs.len());
    for input in &action.inputs {
        match store.get(input) {
            Ok(artifact) => inputs.push(artifact),
            Err(err) => {
                return Err(ActionFailure::new(&stage, &action.name, err.to_string()));
            }
        }
    }

    let mut attempt: u32 = 1;
    loop {
        let outcome = executor.run(&action, &inputs).await;

        if outcome.is_success() {
            let mut artifacts = Vec::with_capacity(action.outputs.len());
            for output in &action.outputs {
                let Some(payload) = outcome.produced.get(output) else {
                    return Err(ActionFailure::new(
                        &stage,
                        &action.name,
                        format!("executor did not produce declared output '{output}'"),
                    )
                    .with_attempts(attempt));
                };

                let mut artifact =
                    Artifact::new(output, &stage, store.execution(), payload.clone());
                if let Some(ref namespace) = action.variables_namespace {
                    artifact = artifact.with_namespace(namespace);
                }
                for (key, value) in &outcome.variables {
                    artifact = artifact.with_variable(key, value);
                }
                artifacts.push(artifact);
            }
            return Ok(artifacts);
        }

        let error = outcome
            .error
            .unwrap_or_else(|| "action failed without detail".to_string());

        if outcome.retryable && retry.allows_retry(attempt) && !token.is_cancelled() {
            let delay = retry.delay_for(attempt);
            debug!(
                stage = %stage,
                action = %action.name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying action"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
            continue;
        }

        let mut failure =
            ActionFailure::new(&stage, &action.name, error).with_attempts(attempt);
        if outcome.retryable {
            failure = failure.retryable();
        }
        return Err(failure);
    }
}
