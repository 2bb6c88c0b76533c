use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use ticketdesk_core::domain::ticket::{NewTicket, TicketId};
use ticketdesk_core::errors::DomainError;
use ticketdesk_db::{RepositoryError, TicketRepository};

use crate::envelope::Parameter;

pub const GET_TICKET: &str = "get_support_ticket_details";
pub const CREATE_TICKET: &str = "create_support_ticket";
pub const DELETE_TICKET: &str = "delete_support_ticket";

pub const MISSING_TICKET_ID: &str = "Missing ticket_id parameter";
pub const MISSING_REQUIRED: &str = "Missing required parameters";

#[derive(Debug, Error)]
pub enum ToolError {
    /// Rendered verbatim as the response body.
    #[error("{0}")]
    MissingParameter(&'static str),
    #[error(transparent)]
    InvalidParameter(#[from] DomainError),
    #[error(transparent)]
    Storage(#[from] RepositoryError),
    #[error("could not encode tool result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Named invocation parameters. The first occurrence of a name wins and
/// empty values count as absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolParameters {
    values: HashMap<String, String>,
}

impl ToolParameters {
    pub fn from_list(parameters: &[Parameter]) -> Self {
        let mut values = HashMap::with_capacity(parameters.len());
        for parameter in parameters {
            if parameter.value.is_empty() {
                continue;
            }
            values.entry(parameter.name.clone()).or_insert_with(|| parameter.value.clone());
        }
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    fn require(&self, name: &str, missing: &'static str) -> Result<&str, ToolError> {
        self.get(name).ok_or(ToolError::MissingParameter(missing))
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    async fn execute(&self, params: &ToolParameters) -> Result<Value, ToolError>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Registers the get/create/delete ticket tools over one repository.
    pub fn ticket_tools(repository: Arc<dyn TicketRepository>) -> Self {
        let mut registry = Self::default();
        registry.register(GetTicketTool { repository: Arc::clone(&repository) });
        registry.register(CreateTicketTool { repository: Arc::clone(&repository) });
        registry.register(DeleteTicketTool { repository });
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(Box::as_ref)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

struct GetTicketTool {
    repository: Arc<dyn TicketRepository>,
}

#[async_trait]
impl Tool for GetTicketTool {
    fn name(&self) -> &'static str {
        GET_TICKET
    }

    async fn execute(&self, params: &ToolParameters) -> Result<Value, ToolError> {
        let ticket_id = TicketId(params.require("ticket_id", MISSING_TICKET_ID)?.to_string());

        match self.repository.find_by_id(&ticket_id).await? {
            Some(ticket) => Ok(serde_json::to_value(ticket)?),
            None => Ok(json!({ "message": format!("No support ticket found with ID {ticket_id}") })),
        }
    }
}

struct CreateTicketTool {
    repository: Arc<dyn TicketRepository>,
}

#[async_trait]
impl Tool for CreateTicketTool {
    fn name(&self) -> &'static str {
        CREATE_TICKET
    }

    async fn execute(&self, params: &ToolParameters) -> Result<Value, ToolError> {
        let new_ticket = NewTicket {
            occurred_at: params.require("occurred_at", MISSING_REQUIRED)?.to_string(),
            subject: params.require("subject", MISSING_REQUIRED)?.to_string(),
            details: params.require("details", MISSING_REQUIRED)?.to_string(),
            priority: params.require("priority", MISSING_REQUIRED)?.to_string(),
        };

        let ticket = new_ticket.into_ticket(TicketId::generate())?;
        let ticket_id = ticket.ticket_id.clone();
        self.repository.save(ticket).await?;

        Ok(json!({ "ticket_id": ticket_id }))
    }
}

struct DeleteTicketTool {
    repository: Arc<dyn TicketRepository>,
}

#[async_trait]
impl Tool for DeleteTicketTool {
    fn name(&self) -> &'static str {
        DELETE_TICKET
    }

    async fn execute(&self, params: &ToolParameters) -> Result<Value, ToolError> {
        let ticket_id = TicketId(params.require("ticket_id", MISSING_TICKET_ID)?.to_string());

        let ack = self.repository.delete(&ticket_id).await?;
        let message = if ack.is_success() {
            format!("Support Ticket with ID {ticket_id} deleted successfully")
        } else {
            format!("Failed to delete support ticket with ID {ticket_id}")
        };

        Ok(json!({ "message": message }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ticketdesk_db::InMemoryTicketRepository;

    use super::{ToolParameters, ToolRegistry, CREATE_TICKET, DELETE_TICKET, GET_TICKET};
    use crate::envelope::Parameter;

    #[test]
    fn first_non_empty_parameter_wins() {
        let params = ToolParameters::from_list(&[
            Parameter::new("ticket_id", ""),
            Parameter::new("ticket_id", "first"),
            Parameter::new("ticket_id", "second"),
        ]);

        assert_eq!(params.get("ticket_id"), Some("first"));
        assert_eq!(params.get("subject"), None);
    }

    #[test]
    fn ticket_registry_holds_exactly_three_tools() {
        let registry = ToolRegistry::ticket_tools(Arc::new(InMemoryTicketRepository::default()));

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names(), vec![CREATE_TICKET, DELETE_TICKET, GET_TICKET]);
        assert!(registry.get("update_support_ticket").is_none());
    }
}
