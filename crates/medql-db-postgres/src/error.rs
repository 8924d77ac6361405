//! Errors of the PostgreSQL provider and their translation to storage errors.

use medql_storage::StorageError;
use sqlx_core::error::Error as SqlxError;
use sqlx_postgres::PgDatabaseError;

/// SQLSTATE for a unique constraint violation (23505).
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// SQLSTATE for a foreign key violation (23503).
pub const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

/// SQLSTATE for a check constraint violation (23514).
pub const PG_CHECK_VIOLATION: &str = "23514";

/// SQLSTATE for a not-null violation (23502).
pub const PG_NOT_NULL_VIOLATION: &str = "23502";

/// Checks if a sqlx error carries a specific SQLSTATE.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Errors specific to the PostgreSQL provider.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    #[error("Database connection error: {0}")]
    Connection(#[from] SqlxError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Pool error: {message}")]
    Pool { message: String },
}

impl PostgresError {
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn pool(message: impl Into<String>) -> Self {
        Self::Pool {
            message: message.into(),
        }
    }
}

/// Maps a driver error onto the storage error taxonomy.
///
/// Integrity violations become constraint or not-null violations; any other
/// database error passes through with its SQLSTATE.
pub fn translate(err: SqlxError) -> StorageError {
    match &err {
        SqlxError::Database(db_err) => {
            let code = db_err.code().map(|c| c.into_owned());
            let message = db_err.message().to_string();
            match code.as_deref() {
                Some(PG_UNIQUE_VIOLATION | PG_FOREIGN_KEY_VIOLATION | PG_CHECK_VIOLATION) => {
                    StorageError::constraint_violation(
                        db_err.constraint().map(str::to_string),
                        message,
                    )
                }
                Some(PG_NOT_NULL_VIOLATION) => {
                    let column = db_err
                        .try_downcast_ref::<PgDatabaseError>()
                        .and_then(PgDatabaseError::column)
                        .map(str::to_string);
                    StorageError::not_null_violation(column, message)
                }
                _ => StorageError::provider(code, message),
            }
        }
        SqlxError::ColumnDecode { .. } | SqlxError::Decode(_) | SqlxError::ColumnNotFound(_) => {
            StorageError::materialization(err.to_string())
        }
        _ => StorageError::provider(None, err.to_string()),
    }
}

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Connection(e) => translate(e),
            PostgresError::Config { message } => {
                StorageError::provider(None, format!("Configuration error: {message}"))
            }
            PostgresError::Pool { message } => {
                StorageError::provider(None, format!("Pool error: {message}"))
            }
        }
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;
