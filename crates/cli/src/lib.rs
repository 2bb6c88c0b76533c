pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use ticketdesk_core::config::ConfigOverrides;

use crate::commands::invoke::InvokeArgs;
use crate::commands::provision::ProvisionArgs;

#[derive(Debug, Parser)]
#[command(
    name = "ticketdesk",
    about = "Ticketdesk operator CLI",
    long_about = "Provision the support-ticket agent's cloud resources, exercise the ticket handler, and inspect configuration.",
    after_help = "Examples:\n  ticketdesk provision --dry-run\n  ticketdesk invoke --event event.json --local\n  ticketdesk doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Create or fetch the table, roles, policies and function for the agent")]
    Provision {
        #[arg(long, help = "Run against an in-memory cloud instead of the configured account")]
        dry_run: bool,
        #[arg(long, help = "Override aws.region")]
        region: Option<String>,
        #[arg(long, help = "Override agent.name")]
        agent_name: Option<String>,
        #[arg(long, help = "Override agent.foundation_model")]
        foundation_model: Option<String>,
        #[arg(long, help = "Override agent.knowledge_base_id")]
        knowledge_base_id: Option<String>,
        #[arg(long, help = "Override table.name")]
        table_name: Option<String>,
        #[arg(long, help = "Override function.name")]
        function_name: Option<String>,
        #[arg(long, help = "Override function.artifact_path")]
        artifact: Option<PathBuf>,
        #[arg(long, help = "Override provisioning.propagation_delay_secs")]
        propagation_delay_secs: Option<u64>,
        #[arg(long, help = "Override logging.level")]
        log_level: Option<String>,
    },
    #[command(about = "Dispatch invocation envelopes from a JSON file through the ticket handler")]
    Invoke {
        #[arg(long, help = "Path to a JSON envelope or array of envelopes")]
        event: PathBuf,
        #[arg(long, help = "Keep tickets in memory instead of the configured table")]
        local: bool,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, derived resource names, handler artifact and AWS identity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Provision {
            dry_run,
            region,
            agent_name,
            foundation_model,
            knowledge_base_id,
            table_name,
            function_name,
            artifact,
            propagation_delay_secs,
            log_level,
        } => commands::provision::run(ProvisionArgs {
            dry_run,
            overrides: ConfigOverrides {
                region,
                agent_name,
                foundation_model,
                knowledge_base_id,
                table_name,
                function_name,
                artifact_path: artifact,
                propagation_delay_secs,
                log_level,
            },
        }),
        Command::Invoke { event, local } => commands::invoke::run(InvokeArgs { event, local }),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
