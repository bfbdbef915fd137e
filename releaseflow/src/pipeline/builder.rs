//! Fluent pipeline builder.

use super::{GateConfig, PipelineGraph, StageSpec};
use crate::core::StageKind;
use crate::errors::{ReleaseflowError, ValidationError};

/// Builder for validated pipeline graphs.
///
/// Every `stage` call validates artifact wiring immediately, so a
/// malformed definition fails at the line that introduces it.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    graph: PipelineGraph,
}

impl PipelineBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            graph: PipelineGraph::new(name),
        }
    }

    /// Declares an artifact supplied externally at execution start.
    pub fn external(mut self, artifact: impl Into<String>) -> Result<Self, ReleaseflowError> {
        self.graph.add_external(artifact)?;
        Ok(self)
    }

    /// Adds a stage.
    pub fn stage(mut self, spec: StageSpec) -> Result<Self, ReleaseflowError> {
        self.graph.add_stage(spec)?;
        Ok(self)
    }

    /// Adds an approval gate that waits indefinitely, ordered after the
    /// given stages.
    pub fn approval(
        self,
        name: impl Into<String>,
        after: &[&str],
    ) -> Result<Self, ReleaseflowError> {
        self.approval_with(name, GateConfig::new(), after)
    }

    /// Adds an approval gate with explicit configuration.
    pub fn approval_with(
        mut self,
        name: impl Into<String>,
        gate: GateConfig,
        after: &[&str],
    ) -> Result<Self, ReleaseflowError> {
        let mut spec = StageSpec::new(name, StageKind::Approval).with_gate(gate);
        for stage in after {
            spec = spec.after(*stage);
        }
        self.graph.add_stage(spec)?;
        Ok(self)
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.graph.name()
    }

    /// Returns the number of stages added so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.graph.stage_count()
    }

    /// Finishes the build.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty pipeline, and re-checks the graph
    /// for cycles.
    pub fn build(self) -> Result<PipelineGraph, ReleaseflowError> {
        if self.graph.stage_count() == 0 {
            return Err(ValidationError::new("Pipeline has no stages").into());
        }
        self.graph.topological_order()?;
        Ok(self.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ActionSpec;
    use crate::pipeline::DeployBinding;

    fn source_stage() -> StageSpec {
        StageSpec::new("Source", StageKind::Source).with_action(
            ActionSpec::new("Code_Pull", "source").with_output("sourceOut"),
        )
    }

    #[test]
    fn test_builder_empty_rejected() {
        let result = PipelineBuilder::new("test").build();
        assert!(matches!(result, Err(ReleaseflowError::Validation(_))));
    }

    #[test]
    fn test_builder_single_stage() {
        let graph = PipelineBuilder::new("test")
            .stage(source_stage())
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(graph.stage_count(), 1);
        assert_eq!(graph.name(), "test");
    }

    #[test]
    fn test_builder_chained() {
        let graph = PipelineBuilder::new("demo-api")
            .stage(source_stage())
            .unwrap()
            .stage(
                StageSpec::new("Build", StageKind::Build).with_action(
                    ActionSpec::new("Compile", "codebuild")
                        .with_input("sourceOut")
                        .with_output("buildOut"),
                ),
            )
            .unwrap()
            .approval("Approval", &["Build"])
            .unwrap()
            .stage(
                StageSpec::new("Deploy", StageKind::Deploy)
                    .with_deploy(DeployBinding::new("production", "buildOut"))
                    .after("Approval"),
            )
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(graph.stage_count(), 4);
        let order = graph.topological_order().unwrap();
        let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(pos("Approval") < pos("Deploy"));
    }

    #[test]
    fn test_builder_bad_wiring_fails_at_definition() {
        let result = PipelineBuilder::new("test").stage(
            StageSpec::new("Build", StageKind::Build).with_action(
                ActionSpec::new("Compile", "codebuild")
                    .with_input("neverProduced")
                    .with_output("buildOut"),
            ),
        );

        assert!(matches!(result, Err(ReleaseflowError::Dependency(_))));
    }

    #[test]
    fn test_builder_external_source() {
        let graph = PipelineBuilder::new("test")
            .external("sourceOut")
            .unwrap()
            .stage(
                StageSpec::new("Build", StageKind::Build).with_action(
                    ActionSpec::new("Compile", "codebuild")
                        .with_input("sourceOut")
                        .with_output("buildOut"),
                ),
            )
            .unwrap()
            .build()
            .unwrap();

        assert!(graph.externals().contains("sourceOut"));
    }

    #[test]
    fn test_builder_approval_with_timeout() {
        let builder = PipelineBuilder::new("test")
            .stage(source_stage())
            .unwrap()
            .approval_with(
                "Approval",
                GateConfig::new().with_timeout_ms(60_000),
                &["Source"],
            )
            .unwrap();

        let graph = builder.build().unwrap();
        let gate = graph.stage("Approval").unwrap().gate.clone().unwrap();
        assert_eq!(gate.timeout_ms, Some(60_000));
    }
}
