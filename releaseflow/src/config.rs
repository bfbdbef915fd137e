//! Immutable release configuration.
//!
//! Read once at pipeline-definition time and never re-read during an
//! execution. Account and network identifiers resolve externally (a
//! parameter store, a config file); the core only carries the values.

use serde::{Deserialize, Serialize};

/// Top-level configuration for a release pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// Application name, used to derive pipeline and stack names.
    pub app_name: String,
    /// Account identifiers and region.
    pub accounts: AccountConfig,
    /// Name of the artifact bucket backing the store.
    pub artifact_bucket: String,
    /// Name of the container image repository.
    pub image_repository: String,
    /// Source repository settings.
    pub code_repo: CodeRepoConfig,
    /// Deployment role references.
    pub roles: RoleConfig,
    /// Deployed service settings.
    pub service: ServiceConfig,
}

impl ReleaseConfig {
    /// Parses a configuration from JSON.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Returns the image repository URI for an account.
    #[must_use]
    pub fn image_uri(&self, account: &str) -> String {
        format!(
            "{account}.registry.{region}.example.com/{repo}",
            region = self.accounts.region,
            repo = self.image_repository
        )
    }
}

/// Account identifiers for the two environments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Non-production account id.
    pub non_prod: String,
    /// Production account id.
    pub prod: String,
    /// Region shared by both accounts.
    pub region: String,
}

/// Source repository settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeRepoConfig {
    /// Repository name.
    pub name: String,
    /// Branch that triggers executions.
    pub default_branch: String,
}

/// Role references used for deployment.
///
/// The cross-account role differs from the deploy role when promotion
/// crosses an account boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Role assumed to run the deployment itself.
    pub deploy_role: String,
    /// Role assumed to act in the production account.
    pub cross_account_role: String,
}

/// Settings of the deployed service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name.
    pub name: String,
    /// Desired instance count.
    pub desired_count: u32,
    /// Target CPU utilization percentage for scale-out.
    pub cpu_utilization_target: u32,
    /// Memory utilization percentage limit.
    pub memory_utilization_limit: u32,
    /// Seconds to wait between scale-in steps.
    pub scale_in_cooldown_s: u32,
    /// Seconds to wait between scale-out steps.
    pub scale_out_cooldown_s: u32,
    /// Health check settings.
    pub health_check: HealthCheckConfig,
}

/// Health check settings handed to the provisioner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Path probed by the health check.
    pub path: String,
    /// Seconds between probes.
    pub interval_s: u32,
    /// Consecutive successes before healthy.
    pub healthy_threshold: u32,
    /// Consecutive failures before unhealthy.
    pub unhealthy_threshold: u32,
    /// Status code treated as success.
    pub success_code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ReleaseConfig {
        ReleaseConfig {
            app_name: "demo-api".to_string(),
            accounts: AccountConfig {
                non_prod: "111111111111".to_string(),
                prod: "222222222222".to_string(),
                region: "eu-west-1".to_string(),
            },
            artifact_bucket: "demo-api-artifacts".to_string(),
            image_repository: "demo-api".to_string(),
            code_repo: CodeRepoConfig {
                name: "demo-api".to_string(),
                default_branch: "main".to_string(),
            },
            roles: RoleConfig {
                deploy_role: "arn:example:role/deploy".to_string(),
                cross_account_role: "arn:example:role/cross-account".to_string(),
            },
            service: ServiceConfig {
                name: "demo-api".to_string(),
                desired_count: 2,
                cpu_utilization_target: 60,
                memory_utilization_limit: 80,
                scale_in_cooldown_s: 120,
                scale_out_cooldown_s: 60,
                health_check: HealthCheckConfig {
                    path: "/health".to_string(),
                    interval_s: 30,
                    healthy_threshold: 2,
                    unhealthy_threshold: 3,
                    success_code: "200".to_string(),
                },
            },
        }
    }

    #[test]
    fn test_image_uri() {
        let config = sample();
        assert_eq!(
            config.image_uri(&config.accounts.non_prod),
            "111111111111.registry.eu-west-1.example.com/demo-api"
        );
    }

    #[test]
    fn test_round_trip() {
        let config = sample();
        let json = serde_json::to_string(&config).unwrap();
        let back = ReleaseConfig::from_json(&json).unwrap();

        assert_eq!(back.app_name, "demo-api");
        assert_eq!(back.service.desired_count, 2);
        assert_eq!(back.service.health_check.path, "/health");
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(ReleaseConfig::from_json("{\"app_name\": 42}").is_err());
    }
}
