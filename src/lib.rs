pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod routing;
pub mod session;
pub mod utils;

// Crate version exposed for runtime queries
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
