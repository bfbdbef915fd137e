//! Environment targets and deployment binding.

mod provisioner;
mod target;

pub use provisioner::{ArtifactVersion, ProvisionSpec, ProvisionedResource, Provisioner};
pub use target::{DeployedVersion, EnvironmentTarget, TargetBinder};
