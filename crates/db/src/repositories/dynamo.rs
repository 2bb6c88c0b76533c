use std::collections::HashMap;

use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use tracing::debug;

use ticketdesk_core::domain::ticket::{Ticket, TicketId, TICKET_KEY_ATTRIBUTE};

use super::{DeleteAck, RepositoryError, TicketRepository};
use crate::DynamoClient;

pub const KEY_ATTRIBUTE: &str = TICKET_KEY_ATTRIBUTE;
const OCCURRED_AT: &str = "occurred_at";
const SUBJECT: &str = "subject";
const DETAILS: &str = "details";
const PRIORITY: &str = "priority";

type Item = HashMap<String, AttributeValue>;

pub struct DynamoTicketRepository {
    client: DynamoClient,
    table_name: String,
}

impl DynamoTicketRepository {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self { client, table_name: table_name.into() }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

#[async_trait::async_trait]
impl TicketRepository for DynamoTicketRepository {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(KEY_ATTRIBUTE, AttributeValue::S(id.0.clone()))
            .send()
            .await
            .map_err(|error| RepositoryError::Service(DisplayErrorContext(&error).to_string()))?;

        debug!(table = %self.table_name, ticket_id = %id, found = output.item().is_some(), "get_item");
        output.item().map(decode_ticket).transpose()
    }

    async fn save(&self, ticket: Ticket) -> Result<(), RepositoryError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(encode_ticket(ticket)))
            .send()
            .await
            .map_err(|error| RepositoryError::Service(DisplayErrorContext(&error).to_string()))?;
        Ok(())
    }

    async fn delete(&self, id: &TicketId) -> Result<DeleteAck, RepositoryError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key(KEY_ATTRIBUTE, AttributeValue::S(id.0.clone()))
            .send()
            .await
            .map_err(|error| RepositoryError::Service(DisplayErrorContext(&error).to_string()))?;

        // Non-2xx responses surface as SDK errors, so a returned output is a 200.
        Ok(DeleteAck::OK)
    }
}

pub fn encode_ticket(ticket: Ticket) -> Item {
    HashMap::from([
        (KEY_ATTRIBUTE.to_string(), AttributeValue::S(ticket.ticket_id.0)),
        (OCCURRED_AT.to_string(), AttributeValue::S(ticket.occurred_at)),
        (SUBJECT.to_string(), AttributeValue::S(ticket.subject)),
        (DETAILS.to_string(), AttributeValue::S(ticket.details)),
        (PRIORITY.to_string(), AttributeValue::N(ticket.priority.to_string())),
    ])
}

pub fn decode_ticket(item: &Item) -> Result<Ticket, RepositoryError> {
    Ok(Ticket {
        ticket_id: TicketId(string_attr(item, KEY_ATTRIBUTE)?),
        occurred_at: string_attr(item, OCCURRED_AT)?,
        subject: string_attr(item, SUBJECT)?,
        details: string_attr(item, DETAILS)?,
        priority: integer_attr(item, PRIORITY)?,
    })
}

fn string_attr(item: &Item, name: &str) -> Result<String, RepositoryError> {
    match item.get(name) {
        Some(AttributeValue::S(value)) => Ok(value.clone()),
        Some(_) => Err(RepositoryError::Decode(format!("attribute `{name}` is not a string"))),
        None => Err(RepositoryError::Decode(format!("attribute `{name}` is missing"))),
    }
}

fn integer_attr(item: &Item, name: &str) -> Result<i64, RepositoryError> {
    match item.get(name) {
        Some(AttributeValue::N(value)) => value.parse::<i64>().map_err(|_| {
            RepositoryError::Decode(format!("attribute `{name}` is not an integer: `{value}`"))
        }),
        Some(_) => Err(RepositoryError::Decode(format!("attribute `{name}` is not a number"))),
        None => Err(RepositoryError::Decode(format!("attribute `{name}` is missing"))),
    }
}
