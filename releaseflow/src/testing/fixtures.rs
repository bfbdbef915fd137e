//! Reference fixtures: a canonical two-environment release topology
//! and a matching configuration.

use crate::config::{
    AccountConfig, CodeRepoConfig, HealthCheckConfig, ReleaseConfig, RoleConfig,
    ServiceConfig,
};
use crate::core::{ActionSpec, StageKind};
use crate::deploy::{EnvironmentTarget, TargetBinder};
use crate::executor::{ExecutorRegistry, NoOpExecutor};
use crate::pipeline::{DeployBinding, PipelineBuilder, PipelineGraph, StageSpec};
use std::sync::Arc;

/// A sample release configuration.
#[must_use]
pub fn release_config() -> ReleaseConfig {
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
            deploy_role: "arn:example:role/demo-api-deploy".to_string(),
            cross_account_role: "arn:example:role/demo-api-cross-account".to_string(),
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

/// Builds the reference release topology:
///
/// Source -> Build{CDK_Build, Lambda_Build} -> Pipeline_Update ->
/// Application_Build -> Non_Prod_Deployment -> Approval -> Push_Image
/// -> Prod_Deployment
///
/// The two build actions run in parallel over the source artifact, and
/// the production deploy reuses the image definition produced by
/// Application_Build.
#[must_use]
pub fn release_pipeline(config: &ReleaseConfig) -> PipelineGraph {
    let non_prod_image = config.image_uri(&config.accounts.non_prod);
    let prod_image = config.image_uri(&config.accounts.prod);

    PipelineBuilder::new(&config.app_name)
        .stage(
            StageSpec::new("Source", StageKind::Source).with_action(
                ActionSpec::new("Code_Commit_Pull", "source")
                    .with_output("sourceOut")
                    .with_configuration(
                        "branch",
                        serde_json::json!(config.code_repo.default_branch),
                    ),
            ),
        )
        .and_then(|b| {
            b.stage(
                StageSpec::new("Build", StageKind::Build)
                    .with_action(
                        ActionSpec::new("CDK_Build", "codebuild")
                            .with_input("sourceOut")
                            .with_output("cdkBuildOut"),
                    )
                    .with_action(
                        ActionSpec::new("Lambda_Build", "codebuild")
                            .with_input("sourceOut")
                            .with_output("lambdaBuildOut"),
                    ),
            )
        })
        .and_then(|b| {
            b.stage(
                StageSpec::new("Pipeline_Update", StageKind::Build).with_action(
                    ActionSpec::new("Self_Mutate", "cloudformation")
                        .with_input("cdkBuildOut"),
                ),
            )
        })
        .and_then(|b| {
            b.stage(
                StageSpec::new("Application_Build", StageKind::Build)
                    .with_action(
                        ActionSpec::new("Docker_Build", "docker")
                            .with_input("sourceOut")
                            .with_output("imageDefOut")
                            .with_namespace("DemoAPI")
                            .with_configuration("image_uri", serde_json::json!(non_prod_image)),
                    )
                    .after("Pipeline_Update"),
            )
        })
        .and_then(|b| {
            b.stage(
                StageSpec::new("Non_Prod_Deployment", StageKind::Deploy)
                    .with_action(
                        ActionSpec::new("Deploy_Non_Prod_Application_Stack", "cloudformation")
                            .with_input("cdkBuildOut")
                            .with_input("lambdaBuildOut"),
                    )
                    .with_deploy(DeployBinding::new("non-production", "imageDefOut")),
            )
        })
        .and_then(|b| b.approval("Approval", &["Non_Prod_Deployment"]))
        .and_then(|b| {
            b.stage(
                StageSpec::new("Push_Image", StageKind::Build)
                    .with_action(
                        ActionSpec::new("Image_Push_To_Prod", "docker")
                            .with_input("sourceOut")
                            .with_configuration("sha_variable", serde_json::json!("DemoAPI.SHA"))
                            .with_configuration("destination", serde_json::json!(prod_image)),
                    )
                    .after("Approval"),
            )
        })
        .and_then(|b| {
            b.stage(
                StageSpec::new("Prod_Deployment", StageKind::Deploy)
                    .with_action(
                        ActionSpec::new("Deploy_Prod_Application_Stack", "cloudformation")
                            .with_input("cdkBuildOut")
                            .with_input("lambdaBuildOut"),
                    )
                    .with_deploy(DeployBinding::new("production", "imageDefOut"))
                    .after("Push_Image"),
            )
        })
        .and_then(PipelineBuilder::build)
        .unwrap_or_else(|err| panic!("reference topology must be valid: {err}"))
}

/// Registers the non-production and production targets with the roles
/// the configuration names.
pub fn register_release_targets(binder: &TargetBinder, config: &ReleaseConfig) {
    binder.register(
        EnvironmentTarget::new("non-production")
            .with_deploy_role(&config.roles.deploy_role),
    );
    binder.register(
        EnvironmentTarget::new("production")
            .with_deploy_role(&config.roles.deploy_role)
            .with_cross_account_role(&config.roles.cross_account_role),
    );
}

/// An executor registry with no-op executors under every name the
/// reference topology binds.
#[must_use]
pub fn noop_registry() -> Arc<ExecutorRegistry> {
    let registry = ExecutorRegistry::new();
    for name in ["source", "codebuild", "cloudformation", "docker"] {
        registry.register(Arc::new(NoOpExecutor::new(name)));
    }
    Arc::new(registry)
}
