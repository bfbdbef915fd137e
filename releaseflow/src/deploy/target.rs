//! Environment targets and the deploy binding.

use super::{ArtifactVersion, Provisioner};
use crate::core::{Artifact, ExecutionId};
use crate::errors::{ProvisionerError, ReleaseflowError, StaleArtifactError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// A named deployment destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentTarget {
    /// Target name (e.g. `non-production`, `production`).
    pub name: String,
    /// Role assumed to run the deployment, if the provisioner needs one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy_role: Option<String>,
    /// Role assumed across an account boundary for promotion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cross_account_role: Option<String>,
}

impl EnvironmentTarget {
    /// Creates a target with no role references.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            deploy_role: None,
            cross_account_role: None,
        }
    }

    /// Sets the deploy role.
    #[must_use]
    pub fn with_deploy_role(mut self, role: impl Into<String>) -> Self {
        self.deploy_role = Some(role.into());
        self
    }

    /// Sets the cross-account role.
    #[must_use]
    pub fn with_cross_account_role(mut self, role: impl Into<String>) -> Self {
        self.cross_account_role = Some(role.into());
        self
    }
}

/// The artifact version currently live on a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployedVersion {
    /// The deployed artifact name.
    pub artifact: String,
    /// The deployed version.
    pub version: ArtifactVersion,
    /// The execution that performed the deploy.
    pub execution: ExecutionId,
    /// When the deploy completed.
    pub deployed_at: DateTime<Utc>,
}

/// Binds artifact versions to environment targets through a
/// provisioner.
///
/// The binding is all-or-nothing: a provisioner failure leaves the
/// target's previously recorded version intact. Deploys to the same
/// target are serialized; distinct targets deploy concurrently.
pub struct TargetBinder {
    provisioner: Arc<dyn Provisioner>,
    targets: RwLock<HashMap<String, EnvironmentTarget>>,
    deployed: RwLock<HashMap<String, DeployedVersion>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TargetBinder {
    /// Creates a binder over a provisioner.
    #[must_use]
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            provisioner,
            targets: RwLock::new(HashMap::new()),
            deployed: RwLock::new(HashMap::new()),
            locks: DashMap::new(),
        }
    }

    /// Registers an environment target.
    pub fn register(&self, target: EnvironmentTarget) {
        self.targets.write().insert(target.name.clone(), target);
    }

    /// Returns a registered target.
    #[must_use]
    pub fn target(&self, name: &str) -> Option<EnvironmentTarget> {
        self.targets.read().get(name).cloned()
    }

    /// Returns the version currently deployed to a target, if any.
    #[must_use]
    pub fn deployed_version(&self, name: &str) -> Option<DeployedVersion> {
        self.deployed.read().get(name).cloned()
    }

    /// Deploys an artifact version to a target.
    ///
    /// Callers must only pass artifacts whose producing stage succeeded
    /// in the given execution; the engine's readiness rules guarantee
    /// this on the orchestrated path.
    ///
    /// # Errors
    ///
    /// `StaleArtifactError` if the artifact belongs to another
    /// execution; `ProvisionerError` if the underlying deploy failed
    /// (previous version untouched); `UnknownTarget` for unregistered
    /// names.
    pub async fn deploy(
        &self,
        target_name: &str,
        artifact: &Artifact,
        execution: ExecutionId,
    ) -> Result<DeployedVersion, ReleaseflowError> {
        let target = self
            .target(target_name)
            .ok_or_else(|| ReleaseflowError::UnknownTarget(target_name.to_string()))?;

        if artifact.execution != execution {
            return Err(StaleArtifactError::new(
                &artifact.name,
                artifact.execution,
                execution,
            )
            .into());
        }

        let lock = self
            .locks
            .entry(target_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let version = ArtifactVersion::of(artifact);

        if let Err(cause) = self.provisioner.deploy(&target, &version).await {
            warn!(
                target = %target.name,
                artifact = %artifact.name,
                error = %cause,
                "deploy failed; previous version retained"
            );
            return Err(ProvisionerError::new(&target.name, cause).into());
        }

        let deployed = DeployedVersion {
            artifact: artifact.name.clone(),
            version,
            execution,
            deployed_at: Utc::now(),
        };
        self.deployed
            .write()
            .insert(target.name.clone(), deployed.clone());

        info!(
            target = %target.name,
            artifact = %artifact.name,
            locator = %deployed.version.payload.locator,
            "deployed"
        );

        Ok(deployed)
    }
}

impl std::fmt::Debug for TargetBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetBinder")
            .field("provisioner", &self.provisioner.name())
            .field("targets", &self.targets.read().len())
            .finish()
    }
}
