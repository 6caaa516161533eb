//! SAR recommendation engine library crate
//!
//! Re-exports core modules for integration tests and external use.

pub mod api;
pub mod config;
pub mod database;
pub mod datasets;
pub mod error;
pub mod evaluation;
pub mod recommendation;
pub mod table;

// Re-export commonly used types
pub use config::Config;
pub use database::{Database, InMemoryRepository, RecommendationRepository};
pub use error::{Error, Result};
pub use recommendation::*;
pub use table::{Column, Id, Table};
