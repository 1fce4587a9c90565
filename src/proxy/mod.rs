// proxy module - portal web server and upstream reverse proxy

pub mod config;
pub mod server;
pub mod views;

pub mod handlers;          // Page, auth and passthrough handlers
pub mod middleware;        // Axum middleware
pub mod upstream;          // Upstream client and typed resources
pub mod common;            // Common utilities

#[cfg(test)]
pub mod test_support;

pub use config::ProxyConfig;
pub use server::{AppState, AxumServer};
