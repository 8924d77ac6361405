use thiserror::Error;

/// Core error types for MedQL metadata and value handling
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Cannot resolve member '{member}' on {type_name}")]
    UnresolvableMember { type_name: String, member: String },

    #[error("Unknown domain type: {0}")]
    UnknownType(String),

    #[error("No domain type is mapped to table '{0}'")]
    UnknownTable(String),

    #[error("Cannot convert '{value}' to {target}: {message}")]
    TypeCoercion {
        value: String,
        target: String,
        message: String,
    },

    #[error("Invalid schema for {type_name}: {message}")]
    InvalidSchema { type_name: String, message: String },

    #[error("Materialization error: {0}")]
    Materialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl CoreError {
    /// Create a new UnresolvableMember error
    pub fn unresolvable_member(type_name: impl Into<String>, member: impl Into<String>) -> Self {
        Self::UnresolvableMember {
            type_name: type_name.into(),
            member: member.into(),
        }
    }

    /// Create a new UnknownType error
    pub fn unknown_type(type_name: impl Into<String>) -> Self {
        Self::UnknownType(type_name.into())
    }

    /// Create a new TypeCoercion error
    pub fn type_coercion(
        value: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::TypeCoercion {
            value: value.into(),
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a new InvalidSchema error
    pub fn invalid_schema(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Create a new Materialization error
    pub fn materialization(message: impl Into<String>) -> Self {
        Self::Materialization(message.into())
    }

    /// Returns `true` when the error means a name could not be resolved
    /// against the registered schema.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            Self::UnresolvableMember { .. } | Self::UnknownType(_) | Self::UnknownTable(_)
        )
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
