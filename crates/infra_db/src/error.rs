//! Database error types

use thiserror::Error;

/// Errors raised while setting up database infrastructure
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Connection or query failure
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration failure
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
