use std::collections::HashMap;

use tokio::sync::RwLock;

use ticketdesk_core::domain::ticket::{Ticket, TicketId};

use super::{DeleteAck, RepositoryError, TicketRepository};

#[derive(Default)]
pub struct InMemoryTicketRepository {
    tickets: RwLock<HashMap<String, Ticket>>,
}

impl InMemoryTicketRepository {
    pub async fn len(&self) -> usize {
        self.tickets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tickets.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl TicketRepository for InMemoryTicketRepository {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError> {
        let tickets = self.tickets.read().await;
        Ok(tickets.get(&id.0).cloned())
    }

    async fn save(&self, ticket: Ticket) -> Result<(), RepositoryError> {
        let mut tickets = self.tickets.write().await;
        tickets.insert(ticket.ticket_id.0.clone(), ticket);
        Ok(())
    }

    async fn delete(&self, id: &TicketId) -> Result<DeleteAck, RepositoryError> {
        let mut tickets = self.tickets.write().await;
        tickets.remove(&id.0);
        Ok(DeleteAck::OK)
    }
}

#[cfg(test)]
mod tests {
    use ticketdesk_core::domain::ticket::{Ticket, TicketId};

    use crate::repositories::{InMemoryTicketRepository, TicketRepository};

    fn ticket(id: &str) -> Ticket {
        Ticket {
            ticket_id: TicketId(id.to_string()),
            occurred_at: "2024-03-04T05:06:07Z".to_string(),
            subject: "vpn drops".to_string(),
            details: "timeout after 30s".to_string(),
            priority: 1,
        }
    }

    #[tokio::test]
    async fn in_memory_ticket_repo_round_trip() {
        let repo = InMemoryTicketRepository::default();

        repo.save(ticket("aaaa0001")).await.expect("save ticket");
        let found = repo.find_by_id(&TicketId("aaaa0001".to_string())).await.expect("find ticket");

        assert_eq!(found, Some(ticket("aaaa0001")));
    }

    #[tokio::test]
    async fn delete_of_unknown_id_is_acknowledged() {
        let repo = InMemoryTicketRepository::default();

        let ack = repo.delete(&TicketId("zzzzzzzz".to_string())).await.expect("delete");

        assert!(ack.is_success());
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn delete_removes_existing_ticket() {
        let repo = InMemoryTicketRepository::default();
        repo.save(ticket("bbbb0002")).await.expect("save ticket");

        repo.delete(&TicketId("bbbb0002".to_string())).await.expect("delete");

        assert_eq!(repo.find_by_id(&TicketId("bbbb0002".to_string())).await.expect("find"), None);
        assert_eq!(repo.len().await, 0);
    }
}
