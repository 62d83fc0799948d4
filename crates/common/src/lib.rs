//! Pressroom Common Library
//!
//! Shared code for the Pressroom services including:
//! - The edition lifecycle (storage keys, upload classification,
//!   reconciliation, file cleanup)
//! - Database models and the Postgres edition store
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod edition;
pub mod errors;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use edition::{EditionService, EditionStore};
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
