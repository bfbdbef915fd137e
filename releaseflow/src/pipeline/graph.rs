//! The append-only pipeline graph.
//!
//! Dependency edges between stages are inferred from artifact
//! consumption: a stage depends on the producers of its declared input
//! artifacts, plus any explicit `runs_after` constraints. Validation
//! happens at definition time, before any execution starts.

use super::StageSpec;
use crate::errors::{CycleError, DependencyError, ReleaseflowError, ValidationError};
use std::collections::{HashMap, HashSet};

/// A directed acyclic graph of release stages.
#[derive(Debug, Clone, Default)]
pub struct PipelineGraph {
    /// The pipeline name.
    name: String,
    /// Stages in insertion order.
    stages: Vec<StageSpec>,
    /// Stage name to position in `stages`.
    index: HashMap<String, usize>,
    /// Artifact name to producing stage.
    producers: HashMap<String, String>,
    /// Artifacts supplied externally at execution start.
    externals: HashSet<String>,
}

impl PipelineGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the stages in insertion order.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Looks up a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageSpec> {
        self.index.get(name).map(|&i| &self.stages[i])
    }

    /// Returns the externally supplied artifact names.
    #[must_use]
    pub fn externals(&self) -> &HashSet<String> {
        &self.externals
    }

    /// Returns the stage producing an artifact, if any.
    #[must_use]
    pub fn producer_of(&self, artifact: &str) -> Option<&str> {
        self.producers.get(artifact).map(String::as_str)
    }

    /// Declares an artifact supplied externally at execution start.
    pub fn add_external(
        &mut self,
        artifact: impl Into<String>,
    ) -> Result<(), ReleaseflowError> {
        let artifact = artifact.into();
        if let Some(producer) = self.producers.get(&artifact) {
            return Err(DependencyError::new(
                producer.clone(),
                artifact,
                "cannot also be supplied externally",
            )
            .into());
        }
        self.externals.insert(artifact);
        Ok(())
    }

    /// Appends a stage, validating its artifact wiring.
    ///
    /// # Errors
    ///
    /// Returns `DependencyError` when an input artifact is not produced
    /// by an earlier stage (and is not external), or when an output
    /// artifact name is already taken; `ValidationError` for malformed
    /// specs or unknown `runs_after` references.
    pub fn add_stage(&mut self, spec: StageSpec) -> Result<(), ReleaseflowError> {
        spec.validate()?;

        if self.index.contains_key(&spec.name) {
            return Err(ValidationError::new(format!(
                "Stage '{}' is already defined",
                spec.name
            ))
            .with_stages(vec![spec.name])
            .into());
        }

        for after in &spec.runs_after {
            if !self.index.contains_key(after) {
                return Err(ValidationError::new(format!(
                    "Stage '{}' runs after unknown stage '{}'",
                    spec.name, after
                ))
                .with_stages(vec![spec.name.clone(), after.clone()])
                .into());
            }
        }

        for input in spec.inputs() {
            if !self.producers.contains_key(&input) && !self.externals.contains(&input) {
                return Err(DependencyError::new(
                    spec.name.clone(),
                    input,
                    "add the producing stage first, or declare it external",
                )
                .into());
            }
        }

        for output in spec.outputs() {
            if let Some(prior) = self.producers.get(&output) {
                return Err(DependencyError::new(
                    spec.name.clone(),
                    output.clone(),
                    format!("artifact name already produced by stage '{prior}'"),
                )
                .into());
            }
            if self.externals.contains(&output) {
                return Err(DependencyError::new(
                    spec.name.clone(),
                    output,
                    "artifact name is already an external source artifact",
                )
                .into());
            }
        }

        for output in spec.outputs() {
            self.producers.insert(output, spec.name.clone());
        }
        self.index.insert(spec.name.clone(), self.stages.len());
        self.stages.push(spec);

        Ok(())
    }

    /// The stages a stage directly depends on: producers of its inputs
    /// plus explicit ordering constraints.
    #[must_use]
    pub fn dependencies_of(&self, stage: &str) -> HashSet<String> {
        let Some(spec) = self.stage(stage) else {
            return HashSet::new();
        };

        let mut deps: HashSet<String> = spec
            .inputs()
            .iter()
            .filter_map(|artifact| self.producers.get(artifact).cloned())
            .collect();
        deps.extend(spec.runs_after.iter().cloned());
        deps.remove(stage);
        deps
    }

    /// Every stage whose inputs trace transitively through `stage`.
    ///
    /// Append-only construction means all edges point backwards, so a
    /// single in-order pass collects the transitive closure.
    #[must_use]
    pub fn downstream_of(&self, stage: &str) -> HashSet<String> {
        let mut affected: HashSet<String> = HashSet::new();
        affected.insert(stage.to_string());

        for spec in &self.stages {
            if spec.name == stage {
                continue;
            }
            if self
                .dependencies_of(&spec.name)
                .iter()
                .any(|dep| affected.contains(dep))
            {
                affected.insert(spec.name.clone());
            }
        }

        affected.remove(stage);
        affected
    }

    /// Returns stage names in dependency order.
    ///
    /// Checked defensively: append-only construction makes cycles
    /// structurally impossible, but artifact names drive the edges and
    /// are worth distrusting.
    pub fn topological_order(&self) -> Result<Vec<String>, CycleError> {
        let mut order = Vec::with_capacity(self.stages.len());
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for spec in &self.stages {
            if !visited.contains(&spec.name) {
                self.visit(&spec.name, &mut visited, &mut rec_stack, &mut path, &mut order)?;
            }
        }

        Ok(order)
    }

    fn visit(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
        order: &mut Vec<String>,
    ) -> Result<(), CycleError> {
        rec_stack.insert(node.to_string());
        path.push(node.to_string());

        for dep in self.dependencies_of(node) {
            if rec_stack.contains(&dep) {
                let start = path.iter().position(|n| n == &dep).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].to_vec();
                cycle.push(dep);
                return Err(CycleError::new(cycle));
            }
            if !visited.contains(&dep) {
                self.visit(&dep, visited, rec_stack, path, order)?;
            }
        }

        path.pop();
        rec_stack.remove(node);
        visited.insert(node.to_string());
        order.push(node.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ActionSpec, StageKind};
    use crate::pipeline::DeployBinding;

    fn build_stage(name: &str, inputs: &[&str], outputs: &[&str]) -> StageSpec {
        let mut action = ActionSpec::new(format!("{name}_Action"), "noop");
        for input in inputs {
            action = action.with_input(*input);
        }
        for output in outputs {
            action = action.with_output(*output);
        }
        StageSpec::new(name, StageKind::Build).with_action(action)
    }

    fn simple_graph() -> PipelineGraph {
        let mut graph = PipelineGraph::new("test");
        graph
            .add_stage(build_stage("Source", &[], &["sourceOut"]))
            .unwrap();
        graph
            .add_stage(build_stage("Build", &["sourceOut"], &["buildOut"]))
            .unwrap();
        graph
    }

    #[test]
    fn test_add_stage_and_lookup() {
        let graph = simple_graph();
        assert_eq!(graph.stage_count(), 2);
        assert!(graph.stage("Build").is_some());
        assert_eq!(graph.producer_of("sourceOut"), Some("Source"));
    }

    #[test]
    fn test_unknown_input_rejected() {
        let mut graph = PipelineGraph::new("test");
        let result = graph.add_stage(build_stage("Build", &["missing"], &["out"]));

        assert!(matches!(
            result,
            Err(ReleaseflowError::Dependency(_))
        ));
    }

    #[test]
    fn test_external_input_accepted() {
        let mut graph = PipelineGraph::new("test");
        graph.add_external("sourceOut").unwrap();
        graph
            .add_stage(build_stage("Build", &["sourceOut"], &["buildOut"]))
            .unwrap();

        assert_eq!(graph.stage_count(), 1);
    }

    #[test]
    fn test_reused_output_rejected() {
        let mut graph = simple_graph();
        let result = graph.add_stage(build_stage("Rebuild", &[], &["buildOut"]));

        assert!(matches!(
            result,
            Err(ReleaseflowError::Dependency(_))
        ));
    }

    #[test]
    fn test_duplicate_stage_name_rejected() {
        let mut graph = simple_graph();
        let result = graph.add_stage(build_stage("Build", &[], &["other"]));

        assert!(matches!(
            result,
            Err(ReleaseflowError::Validation(_))
        ));
    }

    #[test]
    fn test_runs_after_unknown_stage() {
        let mut graph = PipelineGraph::new("test");
        let spec = build_stage("Build", &[], &["out"]).after("Missing");

        assert!(matches!(
            graph.add_stage(spec),
            Err(ReleaseflowError::Validation(_))
        ));
    }

    #[test]
    fn test_dependencies_inferred_from_artifacts() {
        let graph = simple_graph();
        let deps = graph.dependencies_of("Build");

        assert_eq!(deps, HashSet::from(["Source".to_string()]));
        assert!(graph.dependencies_of("Source").is_empty());
    }

    #[test]
    fn test_deploy_binding_dependency() {
        let mut graph = simple_graph();
        graph
            .add_stage(
                StageSpec::new("Deploy", StageKind::Deploy)
                    .with_deploy(DeployBinding::new("nonprod", "buildOut")),
            )
            .unwrap();

        assert!(graph.dependencies_of("Deploy").contains("Build"));
    }

    #[test]
    fn test_topological_order() {
        let mut graph = simple_graph();
        graph
            .add_stage(build_stage("Package", &["buildOut"], &["packageOut"]))
            .unwrap();

        let order = graph.topological_order().unwrap();
        let pos = |name: &str| order.iter().position(|n| n == name).unwrap();

        assert!(pos("Source") < pos("Build"));
        assert!(pos("Build") < pos("Package"));
    }

    #[test]
    fn test_topological_order_fan_out() {
        let mut graph = PipelineGraph::new("test");
        graph
            .add_stage(build_stage("Source", &[], &["sourceOut"]))
            .unwrap();
        graph
            .add_stage(build_stage("A", &["sourceOut"], &["aOut"]))
            .unwrap();
        graph
            .add_stage(build_stage("B", &["sourceOut"], &["bOut"]))
            .unwrap();
        graph
            .add_stage(build_stage("Join", &["aOut", "bOut"], &["joinOut"]))
            .unwrap();

        let order = graph.topological_order().unwrap();
        let pos = |name: &str| order.iter().position(|n| n == name).unwrap();

        assert!(pos("Source") < pos("A"));
        assert!(pos("Source") < pos("B"));
        assert!(pos("A") < pos("Join"));
        assert!(pos("B") < pos("Join"));
    }

    #[test]
    fn test_downstream_closure() {
        let mut graph = PipelineGraph::new("test");
        graph
            .add_stage(build_stage("Source", &[], &["sourceOut"]))
            .unwrap();
        graph
            .add_stage(build_stage("A", &["sourceOut"], &["aOut"]))
            .unwrap();
        graph
            .add_stage(build_stage("B", &["sourceOut"], &["bOut"]))
            .unwrap();
        graph
            .add_stage(build_stage("C", &["aOut"], &["cOut"]))
            .unwrap();

        let downstream = graph.downstream_of("A");
        assert!(downstream.contains("C"));
        assert!(!downstream.contains("B"));
        assert!(!downstream.contains("Source"));
    }

    #[test]
    fn test_runs_after_contributes_edges() {
        let mut graph = simple_graph();
        graph
            .add_stage(
                StageSpec::new("Approval", StageKind::Approval).after("Build"),
            )
            .unwrap();

        assert!(graph.dependencies_of("Approval").contains("Build"));
        assert!(graph.downstream_of("Build").contains("Approval"));
    }
}
