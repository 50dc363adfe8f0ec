//! Meridian Core - Entity model, generic repository, and shared types
//!
//! This crate defines the data-access abstractions used throughout Meridian:
//! - Entity identity and timestamps (composition, not inheritance)
//! - Static entity descriptors and validated field changes
//! - The `Session` trait with PostgreSQL and in-memory implementations
//! - A generic `Repository` providing CRUD and pagination for any entity
//! - Pagination envelopes
//! - Configuration management

pub mod config;
pub mod entity;
pub mod memory;
pub mod models;
pub mod pagination;
pub mod postgres;
pub mod repository;
pub mod session;

pub use config::{
    AppConfig, AppSettings, AuthConfig, ConfigError, DatabaseConfig, Environment, JwtAlgorithm,
    LogFormat, LoggingConfig, ServerConfig,
};
pub use entity::{
    Changes, Entity, EntityDescriptor, EntityId, FieldDef, FieldKind, FieldMap, FieldValue,
    FromField, Record, Timestamps,
};
pub use memory::{MemorySession, MemoryStore};
pub use pagination::{PageRequest, Paginated};
pub use postgres::PgSession;
pub use repository::Repository;
pub use session::{PendingChange, Session};

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Failures originating from the underlying store.
///
/// These are never caught or reinterpreted by the repository; the caller owns
/// the transactional response (retry, rollback, surface to the user).
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("Constraint violation on {table}.{field}: {message}")]
    ConstraintViolation {
        table: &'static str,
        field: &'static str,
        message: String,
    },

    #[error("Row {id} in {table} no longer exists")]
    StaleRow { table: &'static str, id: EntityId },
}

impl PersistenceError {
    /// Whether the store rejected the operation because of a uniqueness or
    /// other integrity constraint.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::ConstraintViolation { .. } => true,
            Self::Database(sqlx::Error::Database(db)) => {
                db.is_unique_violation() || db.is_foreign_key_violation() || db.is_check_violation()
            }
            _ => false,
        }
    }
}

/// Errors returned by repository operations.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Unknown field '{field}' for {entity}")]
    UnknownField { entity: &'static str, field: String },

    #[error("Field '{field}' of {entity} is managed by the store and cannot be set")]
    ReadOnlyField { entity: &'static str, field: String },

    #[error("Field '{field}' of {entity} expects {expected}, got {actual}")]
    TypeMismatch {
        entity: &'static str,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Missing required field '{field}' for {entity}")]
    MissingField {
        entity: &'static str,
        field: &'static str,
    },

    #[error("Invalid pagination: page={page}, page_size={page_size} (both must be >= 1)")]
    InvalidPagination { page: u32, page_size: u32 },
}

impl RepositoryError {
    /// True for errors caused by caller misuse rather than the store.
    pub fn is_contract_violation(&self) -> bool {
        !matches!(self, Self::Persistence(_))
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        RepositoryError::Persistence(PersistenceError::Database(err))
    }
}

pub type Result<T> = std::result::Result<T, RepositoryError>;
