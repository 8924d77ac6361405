use medql_core::CoreError;
use thiserror::Error;

/// Errors raised while building statements and planning queries.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Unambiguous key not found joining {left} to {right}: {message}")]
    AmbiguousJoin {
        left: String,
        right: String,
        message: String,
    },

    #[error("Unsupported predicate construct: {0}")]
    UnsupportedConstruct(String),

    #[error("Invalid statement state: {0}")]
    InvalidState(String),

    #[error("Cannot resolve '{path}' on {type_name}: {message}")]
    CannotResolve {
        type_name: String,
        path: String,
        message: String,
    },

    #[error("Invalid query parameter '{key}': {message}")]
    InvalidParameter { key: String, message: String },

    #[error("Query too complex: {0}")]
    QueryTooComplex(String),
}

impl QueryError {
    #[must_use]
    pub fn ambiguous_join(
        left: impl Into<String>,
        right: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::AmbiguousJoin {
            left: left.into(),
            right: right.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unsupported(construct: impl Into<String>) -> Self {
        Self::UnsupportedConstruct(construct.into())
    }

    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    #[must_use]
    pub fn cannot_resolve(
        type_name: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::CannotResolve {
            type_name: type_name.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_parameter(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns `true` for errors caused by names that do not resolve against
    /// the registered schema.
    pub fn is_resolution_failure(&self) -> bool {
        match self {
            Self::Core(err) => err.is_resolution_failure(),
            Self::CannotResolve { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` for builder-contract violations (programmer errors).
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::InvalidState(_))
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
