pub mod resources;
pub mod ticket;
