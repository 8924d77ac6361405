//! Storage error types.
//!
//! Planning failures arrive wrapped from [`QueryError`]; provider failures are
//! translated into constraint categories where the provider reports a
//! recognizable code and passed through as [`StorageError::Provider`]
//! otherwise.

use std::fmt;

use medql_core::CoreError;
use medql_query::QueryError;

/// Errors raised while executing statements and materializing results.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The statement could not be planned or built.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// A unique, foreign-key or check constraint rejected the statement.
    #[error("Constraint violation{}: {message}", fmt_target(.constraint))]
    ConstraintViolation {
        constraint: Option<String>,
        message: String,
    },

    /// A NOT NULL column received no value.
    #[error("Not-null violation{}: {message}", fmt_target(.column))]
    NotNullViolation {
        column: Option<String>,
        message: String,
    },

    /// Untranslated provider failure.
    #[error("Provider error{}: {message}", fmt_code(.code))]
    Provider {
        code: Option<String>,
        message: String,
    },

    #[error("Transaction error: {message}")]
    TransactionError { message: String },

    /// A result row did not fit the requested shape.
    #[error("Materialization error: {message}")]
    Materialization { message: String },

    /// An update or delete by primary key matched no row.
    #[error("{type_name} not found: {key}")]
    NotFound { type_name: String, key: String },

    /// The object cannot be written as given (e.g. unset primary key).
    #[error("Invalid {type_name}: {message}")]
    InvalidModel { type_name: String, message: String },
}

impl StorageError {
    #[must_use]
    pub fn constraint_violation(constraint: Option<String>, message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            constraint,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_null_violation(column: Option<String>, message: impl Into<String>) -> Self {
        Self::NotNullViolation {
            column,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn provider(code: Option<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn transaction_error(message: impl Into<String>) -> Self {
        Self::TransactionError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn materialization(message: impl Into<String>) -> Self {
        Self::Materialization {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(type_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            type_name: type_name.into(),
            key: key.into(),
        }
    }

    #[must_use]
    pub fn invalid_model(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidModel {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for constraint and not-null violations.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::ConstraintViolation { .. } | Self::NotNullViolation { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Query(_) | Self::InvalidModel { .. } => ErrorCategory::Validation,
            Self::ConstraintViolation { .. } | Self::NotNullViolation { .. } => {
                ErrorCategory::Conflict
            }
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::TransactionError { .. } => ErrorCategory::Transaction,
            Self::Provider { .. } => ErrorCategory::Infrastructure,
            Self::Materialization { .. } => ErrorCategory::Internal,
        }
    }
}

impl From<CoreError> for StorageError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Materialization(message) => Self::Materialization { message },
            other => Self::Query(QueryError::Core(other)),
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    NotFound,
    /// Constraint and not-null violations
    Conflict,
    /// Bad query or object supplied by the caller
    Validation,
    Transaction,
    Infrastructure,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Transaction => write!(f, "transaction"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

fn fmt_target(target: &Option<String>) -> String {
    target.as_deref().map(|t| format!(" on {t}")).unwrap_or_default()
}

fn fmt_code(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default()
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
