//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::dialect::DialectKind;
use crate::error::{CoreError, Result};

/// Configuration for the query engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQL dialect of the target database.
    pub dialect: DialectKind,

    /// Join two tables on same-named columns when no foreign key links them.
    pub natural_join_fallback: bool,

    /// Reuse join skeletons across queries.
    pub cache_skeletons: bool,

    /// Maximum nesting of relationship sub-queries.
    pub max_subquery_depth: usize,

    /// Serialized member marking soft-deleted rows; filtered with
    /// `IS NULL` on related types unless the caller filters it.
    pub soft_delete_property: String,

    /// Sub-property prefix selecting the reverse end of a two-sided link.
    pub reverse_link_marker: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::Postgresql,
            natural_join_fallback: false,
            cache_skeletons: true,
            max_subquery_depth: 8,
            soft_delete_property: "obsoletionTime".into(),
            reverse_link_marker: "source".into(),
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_subquery_depth == 0 {
            return Err(CoreError::Configuration(
                "max_subquery_depth must be >= 1".to_string(),
            ));
        }
        if self.soft_delete_property.is_empty() {
            return Err(CoreError::Configuration(
                "soft_delete_property must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_dialect(mut self, dialect: DialectKind) -> Self {
        self.dialect = dialect;
        self
    }

    #[must_use]
    pub fn with_natural_join_fallback(mut self, enabled: bool) -> Self {
        self.natural_join_fallback = enabled;
        self
    }

    #[must_use]
    pub fn with_cache_skeletons(mut self, enabled: bool) -> Self {
        self.cache_skeletons = enabled;
        self
    }

    #[must_use]
    pub fn with_max_subquery_depth(mut self, depth: usize) -> Self {
        self.max_subquery_depth = depth;
        self
    }

    #[must_use]
    pub fn with_soft_delete_property(mut self, property: impl Into<String>) -> Self {
        self.soft_delete_property = property.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.dialect, DialectKind::Postgresql);
        assert!(!config.natural_join_fallback);
        assert!(config.cache_skeletons);
        assert_eq!(config.max_subquery_depth, 8);
        assert_eq!(config.soft_delete_property, "obsoletionTime");
        assert_eq!(config.reverse_link_marker, "source");
    }

    #[test]
    fn test_from_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            dialect = "sqlite"
            natural_join_fallback = true
            max_subquery_depth = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.dialect, DialectKind::Sqlite);
        assert!(config.natural_join_fallback);
        assert_eq!(config.max_subquery_depth, 3);
        assert!(config.cache_skeletons);
    }

    #[test]
    fn test_invalid_config() {
        let err = EngineConfig::from_toml_str("max_subquery_depth = 0").unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));

        let err = EngineConfig::from_toml_str("dialect = \"oracle\"").unwrap_err();
        assert!(matches!(err, CoreError::TomlError(_)));
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::default()
            .with_dialect(DialectKind::Sqlite)
            .with_cache_skeletons(false)
            .with_soft_delete_property("deletedAt");
        assert_eq!(config.dialect, DialectKind::Sqlite);
        assert!(!config.cache_skeletons);
        assert_eq!(config.soft_delete_property, "deletedAt");
    }
}
