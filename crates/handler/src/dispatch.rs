use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use ticketdesk_db::TicketRepository;

use crate::envelope::{InvocationEnvelope, ResponseEnvelope};
use crate::tools::{ToolError, ToolParameters, ToolRegistry};

pub const INVALID_FUNCTION: &str = "Invalid function";

pub struct TicketDispatcher {
    registry: ToolRegistry,
}

impl TicketDispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn for_repository(repository: Arc<dyn TicketRepository>) -> Self {
        Self::new(ToolRegistry::ticket_tools(repository))
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Runs the named tool and wraps its outcome. Never fails.
    pub async fn dispatch(&self, envelope: InvocationEnvelope) -> ResponseEnvelope {
        let (outcome, body) = match self.registry.get(&envelope.function) {
            None => {
                warn!(
                    event_name = "handler.dispatch.unknown_function",
                    function = %envelope.function,
                    "no tool registered for function"
                );
                ("invalid_function", INVALID_FUNCTION.to_string())
            }
            Some(tool) => {
                let params = ToolParameters::from_list(&envelope.parameters);
                match tool.execute(&params).await {
                    Ok(value) => ("ok", value.to_string()),
                    Err(ToolError::MissingParameter(message)) => {
                        ("missing_parameter", message.to_string())
                    }
                    Err(error) => {
                        warn!(
                            event_name = "handler.dispatch.failed",
                            function = %envelope.function,
                            error = %error,
                            "tool failed"
                        );
                        ("error", json!({ "error": error.to_string() }).to_string())
                    }
                }
            }
        };

        info!(
            event_name = "handler.dispatch.responded",
            function = %envelope.function,
            action_group = %envelope.action_group,
            outcome,
            body_len = body.len(),
            body = %body,
            "response ready"
        );
        ResponseEnvelope::reply(&envelope, body)
    }
}
