pub mod config;
pub mod credentials;
pub mod logger;
pub mod session;
pub mod theme;
