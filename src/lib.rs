pub mod codegen;
pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod openapi;
pub mod rate_limit; // in-memory rate limiting
pub mod repo;
pub mod routes;
pub mod security;
pub mod service;
pub mod session;
pub mod validate;

// Re-export commonly used items for tests / external users
pub use error::AuthError;
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
pub use service::AuthService;
