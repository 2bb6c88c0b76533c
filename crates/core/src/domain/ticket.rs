use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// Length of a generated ticket id (leading hex digits of a v4 UUID).
pub const TICKET_ID_LEN: usize = 8;
/// Hash key of the ticket table; the handler's record layout depends on it.
pub const TICKET_KEY_ATTRIBUTE: &str = "ticket_id";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub String);

impl TicketId {
    /// Collisions are not detected; eight hex digits are treated as unique enough.
    pub fn generate() -> Self {
        let mut raw = Uuid::new_v4().simple().to_string();
        raw.truncate(TICKET_ID_LEN);
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: TicketId,
    pub occurred_at: String,
    pub subject: String,
    pub details: String,
    pub priority: i64,
}

/// Caller-supplied ticket fields, before an id is assigned and priority is coerced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTicket {
    pub occurred_at: String,
    pub subject: String,
    pub details: String,
    pub priority: String,
}

impl NewTicket {
    pub fn into_ticket(self, ticket_id: TicketId) -> Result<Ticket, DomainError> {
        let priority = parse_priority(&self.priority)?;
        Ok(Ticket {
            ticket_id,
            occurred_at: self.occurred_at,
            subject: self.subject,
            details: self.details,
            priority,
        })
    }
}

pub fn parse_priority(raw: &str) -> Result<i64, DomainError> {
    raw.trim().parse::<i64>().map_err(|_| DomainError::InvalidPriority(raw.to_owned()))
}
