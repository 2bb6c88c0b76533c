//! Ticket tool handler invoked by the agent's action group.
//!
//! Each invocation carries one envelope naming a function and its string
//! parameters. The handler:
//! 1. **Parses** the envelope leniently (`envelope`) - missing fields default
//! 2. **Dispatches** to one of three registered ticket tools (`tools`)
//! 3. **Replies** with a response envelope whose body is plain text or JSON
//!
//! # Contract
//!
//! The handler is total: every input yields a well-formed response envelope
//! and at most one storage mutation. Missing parameters, unknown functions
//! and storage faults are reported inside the body, never returned as errors
//! to the host.

pub mod dispatch;
pub mod envelope;
pub mod tools;

pub use dispatch::TicketDispatcher;
pub use envelope::{InvocationEnvelope, Parameter, ResponseEnvelope};
pub use tools::{Tool, ToolError, ToolParameters, ToolRegistry};
