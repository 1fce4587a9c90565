// Upstream module - scheduling backend access

pub mod client;
pub mod envelope;
pub mod resources;
