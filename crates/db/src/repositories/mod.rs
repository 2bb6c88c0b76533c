use async_trait::async_trait;
use thiserror::Error;

use ticketdesk_core::domain::ticket::{Ticket, TicketId};

pub mod dynamo;
pub mod memory;

pub use dynamo::DynamoTicketRepository;
pub use memory::InMemoryTicketRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("storage error: {0}")]
    Service(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Transport-level acknowledgement of a delete; says nothing about whether
/// the item existed beforehand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeleteAck {
    pub status_code: u16,
}

impl DeleteAck {
    pub const OK: Self = Self { status_code: 200 };

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError>;
    async fn save(&self, ticket: Ticket) -> Result<(), RepositoryError>;
    async fn delete(&self, id: &TicketId) -> Result<DeleteAck, RepositoryError>;
}
