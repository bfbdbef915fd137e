//! # Releaseflow
//!
//! A declarative, provider-agnostic release-pipeline orchestrator.
//!
//! Releaseflow moves a build artifact through an ordered graph of stages
//! with support for:
//!
//! - **Artifact-driven dependencies**: stage edges inferred from the
//!   artifacts each stage consumes and produces
//! - **Parallel execution**: independent stages and actions run
//!   concurrently as soon as their inputs exist
//! - **Promotion gates**: manual-approval checkpoints that block
//!   progress until an external decision arrives
//! - **Environment targets**: promotion by reference - a production
//!   deploy reuses the exact artifact validated in non-production
//! - **Restart semantics**: rerun a failed execution from the failed
//!   stage forward, or fully from source
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use releaseflow::prelude::*;
//!
//! // Define a pipeline
//! let graph = PipelineBuilder::new("demo-api")
//!     .stage(StageSpec::new("Source", StageKind::Source)
//!         .with_action(ActionSpec::new("Pull", "source").with_output("sourceOut")))?
//!     .stage(StageSpec::new("Build", StageKind::Build)
//!         .with_action(ActionSpec::new("Compile", "build")
//!             .with_input("sourceOut")
//!             .with_output("buildOut")))?
//!     .build()?;
//!
//! // Execute it
//! let report = engine.run().await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod deploy;
pub mod engine;
pub mod errors;
pub mod events;
pub mod executor;
pub mod gate;
pub mod observability;
pub mod pipeline;
pub mod store;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::ReleaseConfig;
    pub use crate::core::{
        ActionOutcome, ActionSpec, ApprovalState, Artifact, ExecutionId,
        ExecutionIdentity, ExecutionStatus, PayloadRef, StageKind, StageState,
    };
    pub use crate::deploy::{
        ArtifactVersion, EnvironmentTarget, Provisioner, TargetBinder,
    };
    pub use crate::engine::{
        ExecutionReport, ExecutionSnapshot, PipelineEngine, RestartMode,
    };
    pub use crate::errors::{
        ArtifactNotReadyError, CycleError, DependencyError,
        DuplicateArtifactError, PromotionRejectedError, ProvisionerError,
        ReleaseflowError, StaleArtifactError, ValidationError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::executor::{ActionExecutor, ExecutorRegistry, NoOpExecutor};
    pub use crate::gate::{Approval, GateDecision, GateRegistry};
    pub use crate::pipeline::{
        Backoff, DeployBinding, GateConfig, PipelineBuilder, PipelineGraph,
        RetryPolicy, StageSpec,
    };
    pub use crate::store::ArtifactStore;
}

#[cfg(test)]
mod tests {
    #[test]
    fn library_compiles() {
        assert!(true);
    }
}
