use std::sync::Arc;
use std::time::Duration;

use ticketdesk_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use ticketdesk_core::domain::resources::AccountContext;
use ticketdesk_provision::{
    ArtifactSource, AwsCloud, InMemoryCloud, ProvisionError, ProvisionPlan, ProvisionReport,
    ProvisionSettings, Provisioner,
};

use crate::commands::{current_thread_runtime, init_logging, CommandResult};

/// Account id reported by dry runs.
pub const DRY_RUN_ACCOUNT_ID: &str = "000000000000";
const DRY_RUN_REGION: &str = "us-east-1";
const DRY_RUN_ARTIFACT: &[u8] = b"dry-run placeholder bootstrap";

#[derive(Clone, Debug, Default)]
pub struct ProvisionArgs {
    pub dry_run: bool,
    pub overrides: ConfigOverrides,
}

pub fn run(args: ProvisionArgs) -> CommandResult {
    let options = LoadOptions { overrides: args.overrides, ..LoadOptions::default() };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "provision",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    init_logging(&config.logging);

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "provision",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        if args.dry_run {
            provision_in_memory(&config).await
        } else {
            provision_against_aws(&config).await
        }
    });

    match result {
        Ok(report) => {
            let mode = if args.dry_run { "dry run" } else { "provisioned" };
            let message = format!(
                "{mode}: {} resources ensured for agent `{}` ({} created)",
                report.resources().len(),
                config.agent.name,
                report.created_count()
            );
            let details = serde_json::to_value(&report).ok();
            CommandResult::success("provision", message, details)
        }
        Err(error) => {
            CommandResult::failure("provision", error.error_class(), error.to_string(), 4)
        }
    }
}

async fn provision_against_aws(config: &AppConfig) -> Result<ProvisionReport, ProvisionError> {
    let cloud = Arc::new(AwsCloud::connect(&config.aws).await);
    let provisioner = Provisioner::bootstrap(cloud, ProvisionSettings::from_config(config)).await?;
    provisioner.provision(&ProvisionPlan::from_config(config)).await
}

/// Runs the full sequence against a throwaway in-memory cloud with no waits.
async fn provision_in_memory(config: &AppConfig) -> Result<ProvisionReport, ProvisionError> {
    let account = AccountContext {
        region: config.aws.region.clone().unwrap_or_else(|| DRY_RUN_REGION.to_string()),
        account_id: DRY_RUN_ACCOUNT_ID.to_string(),
    };
    let settings = ProvisionSettings {
        propagation_delay: Duration::ZERO,
        table_poll_interval: Duration::ZERO,
        ..ProvisionSettings::from_config(config)
    };

    let mut plan = ProvisionPlan::from_config(config);
    if !config.function.artifact_path.exists() {
        plan.artifact = ArtifactSource::Bytes(DRY_RUN_ARTIFACT.to_vec());
    }

    let cloud = Arc::new(InMemoryCloud::new(account));
    let provisioner = Provisioner::bootstrap(cloud, settings).await?;
    provisioner.provision(&plan).await
}
