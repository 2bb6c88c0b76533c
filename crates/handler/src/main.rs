use std::sync::Arc;

use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

use ticketdesk_core::config::{AwsConfig, HandlerConfig, LoggingConfig};
use ticketdesk_db::DynamoTicketRepository;
use ticketdesk_handler::{InvocationEnvelope, ResponseEnvelope, TicketDispatcher};

fn init_logging(logging: &LoggingConfig) {
    use ticketdesk_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = logging.level.parse::<Level>().unwrap_or(Level::INFO);

    // The runtime already stamps each line, so timestamps are dropped.
    match logging.format {
        Compact => {
            tracing_subscriber::fmt()
                .with_target(false)
                .without_time()
                .with_max_level(log_level)
                .compact()
                .init();
        }
        Pretty => {
            tracing_subscriber::fmt()
                .with_target(false)
                .without_time()
                .with_max_level(log_level)
                .pretty()
                .init();
        }
        Json => {
            tracing_subscriber::fmt()
                .with_target(false)
                .without_time()
                .with_max_level(log_level)
                .json()
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = HandlerConfig::from_env()?;
    init_logging(&config.logging);

    let client = ticketdesk_db::connect(&AwsConfig::default()).await;
    let repository = DynamoTicketRepository::new(client, config.table_name.clone());
    let dispatcher = TicketDispatcher::for_repository(Arc::new(repository));

    tracing::info!(
        event_name = "system.handler.started",
        table = %config.table_name,
        tools = dispatcher.registry().len(),
        "ticket handler ready"
    );

    let dispatcher = &dispatcher;
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        handle(dispatcher, event).await
    }))
    .await
}

async fn handle(
    dispatcher: &TicketDispatcher,
    event: LambdaEvent<Value>,
) -> Result<ResponseEnvelope, Error> {
    let request_id = event.context.request_id.clone();
    let envelope = InvocationEnvelope::from_value(event.payload);

    tracing::info!(
        event_name = "handler.invocation.received",
        request_id = %request_id,
        function = %envelope.function,
        parameters = envelope.parameters.len(),
        "invocation received"
    );

    Ok(dispatcher.dispatch(envelope).await)
}
