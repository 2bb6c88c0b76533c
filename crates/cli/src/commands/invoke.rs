use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;

use ticketdesk_core::config::{AppConfig, LoadOptions};
use ticketdesk_db::{DynamoTicketRepository, InMemoryTicketRepository, TicketRepository};
use ticketdesk_handler::{InvocationEnvelope, TicketDispatcher};

use crate::commands::{current_thread_runtime, init_logging, CommandResult};

#[derive(Clone, Debug)]
pub struct InvokeArgs {
    pub event: PathBuf,
    pub local: bool,
}

/// Dispatches one envelope, or an array of envelopes in order, through the
/// ticket handler. `--local` keeps tickets in memory for the duration of the
/// command; otherwise the configured table is used.
pub fn run(args: InvokeArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "invoke",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    init_logging(&config.logging);

    let envelopes = match read_envelopes(&args.event) {
        Ok(envelopes) => envelopes,
        Err(error) => {
            return CommandResult::failure("invoke", "event_file", format!("{error:#}"), 2);
        }
    };

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "invoke",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let responses = runtime.block_on(async {
        let repository: Arc<dyn TicketRepository> = if args.local {
            Arc::new(InMemoryTicketRepository::default())
        } else {
            let client = ticketdesk_db::connect(&config.aws).await;
            Arc::new(DynamoTicketRepository::new(client, config.table.name.clone()))
        };
        let dispatcher = TicketDispatcher::for_repository(repository);

        let mut responses = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            responses.push(dispatcher.dispatch(envelope).await);
        }
        responses
    });

    let target = if args.local { "in-memory store".to_string() } else { config.table.name };
    let message = format!("dispatched {} invocation(s) against {target}", responses.len());
    CommandResult::success("invoke", message, serde_json::to_value(&responses).ok())
}

fn read_envelopes(path: &Path) -> Result<Vec<InvocationEnvelope>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read event file `{}`", path.display()))?;
    let payload: Value = serde_json::from_str(&raw)
        .with_context(|| format!("event file `{}` is not valid JSON", path.display()))?;

    Ok(match payload {
        Value::Array(items) => items.into_iter().map(InvocationEnvelope::from_value).collect(),
        single => vec![InvocationEnvelope::from_value(single)],
    })
}
