pub mod connection;
pub mod repositories;

pub use connection::{connect, load_sdk_config, DynamoClient};
pub use repositories::{
    DeleteAck, DynamoTicketRepository, InMemoryTicketRepository, RepositoryError,
    TicketRepository,
};
