pub mod access_policy;
pub mod config;
pub mod domain;
pub mod errors;

pub use access_policy::PolicyDocument;
pub use domain::resources::{
    AccountContext, FunctionDescriptor, PolicyDescriptor, ResourceKind, ResourceNames,
    RoleDescriptor, TableDescriptor, TableStatus,
};
pub use domain::ticket::{NewTicket, Ticket, TicketId};
pub use errors::DomainError;
