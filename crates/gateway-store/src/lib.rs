//! # Gateway Store
//!
//! Implementations of the [`gateway_core::GatewayStore`] seam:
//! - [`MemoryStore`], seeded from configuration, for single-node deployments
//!   and tests
//! - `PostgresStore` (feature `postgres`) backed by `sqlx`

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use gateway_core::GatewayError;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Referenced record does not exist
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// Record kind
        kind: &'static str,
        /// Record identifier
        id: String,
    },
    /// Seed data is inconsistent
    #[error("Invalid seed data: {0}")]
    Seed(String),
    /// Database failure
    #[error("Database error: {0}")]
    Database(String),
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        Self::store(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}
