//! The provisioner interface.
//!
//! Provisioners materialize and update real infrastructure. Spec and
//! resource shapes are provider-defined; the core treats them as
//! opaque values and never interprets them.

use crate::core::{Artifact, PayloadRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::EnvironmentTarget;

/// An opaque provisioning request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionSpec {
    /// The target the resources belong to.
    pub target: String,
    /// Provider-defined options.
    pub options: serde_json::Value,
}

impl ProvisionSpec {
    /// Creates a new provision spec.
    #[must_use]
    pub fn new(target: impl Into<String>, options: serde_json::Value) -> Self {
        Self {
            target: target.into(),
            options,
        }
    }
}

/// A handle to provisioned infrastructure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionedResource {
    /// Provider-assigned identifier.
    pub id: String,
    /// Provider-defined attributes (endpoints, ARNs).
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// The artifact version handed to a provisioner for deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactVersion {
    /// The artifact name.
    pub name: String,
    /// Reference to the stored payload.
    pub payload: PayloadRef,
    /// Variables resolved when the artifact was produced.
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

impl ArtifactVersion {
    /// Derives a version from a produced artifact.
    #[must_use]
    pub fn of(artifact: &Artifact) -> Self {
        Self {
            name: artifact.name.clone(),
            payload: artifact.payload.clone(),
            variables: artifact.variables.clone(),
        }
    }
}

/// Trait for infrastructure provisioners.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Returns the provisioner name.
    fn name(&self) -> &str;

    /// Materializes infrastructure described by an opaque spec.
    async fn provision(&self, spec: ProvisionSpec) -> anyhow::Result<ProvisionedResource>;

    /// Points a target at an artifact version.
    ///
    /// Implementations own rollback-on-failure; the core only promises
    /// that a failed deploy never updates the target's recorded
    /// version.
    async fn deploy(
        &self,
        target: &EnvironmentTarget,
        version: &ArtifactVersion,
    ) -> anyhow::Result<()>;
}
