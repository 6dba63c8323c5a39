//! Persistence error handling

use thiserror::Error;

use core_kernel::PortError;

/// Errors raised while setting up the store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Migration failure
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Generic SQL error
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

/// Maps a SQLx error onto the port error taxonomy
pub(crate) fn to_port_error(e: sqlx::Error, context: &str) -> PortError {
    match &e {
        sqlx::Error::RowNotFound => PortError::not_found(context, "row"),
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PortError::conflict(format!("{context}: {db}"))
        }
        sqlx::Error::PoolTimedOut => PortError::Timeout {
            operation: context.to_string(),
            duration_ms: 0,
        },
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            PortError::connection(format!("{context}: {e}"))
        }
        _ => PortError::internal(format!("{context}: {e}")),
    }
}

/// Maps a malformed stored value onto an internal port error
pub(crate) fn corrupt_row(context: &str, detail: impl std::fmt::Display) -> PortError {
    PortError::internal(format!("corrupt row in {context}: {detail}"))
}
