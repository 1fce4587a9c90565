// Handlers module - portal pages and the API passthrough

pub mod admin;
pub mod auth;
pub mod instructor;
pub mod passthrough;
pub mod theme;
