//! SQL dialect abstraction.
//!
//! The query engine emits `?` placeholders and generic SQL; anything that
//! differs between database providers goes through [`SqlDialect`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Provider-specific SQL keywords and features.
pub trait SqlDialect: Send + Sync + fmt::Debug {
    /// Short provider name used in logs.
    fn name(&self) -> &'static str;

    /// Case-insensitive pattern match of `expr` against one placeholder.
    fn case_insensitive_like(&self, expr: &str) -> String;

    fn lower(&self, expr: &str) -> String {
        format!("LOWER({expr})")
    }

    fn upper(&self, expr: &str) -> String {
        format!("UPPER({expr})")
    }

    fn trim(&self, expr: &str) -> String {
        format!("TRIM({expr})")
    }

    fn length(&self, expr: &str) -> String {
        format!("LENGTH({expr})")
    }

    fn current_timestamp(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    /// Year component of a date/timestamp expression.
    fn year(&self, expr: &str) -> String;

    /// Expression producing a fresh UUID server-side.
    fn new_uuid(&self) -> &'static str;

    /// Can INSERT statements return generated column values?
    fn supports_returning(&self) -> bool;

    /// Clause appended to an INSERT to read back `columns`.
    fn returning_clause(&self, columns: &[&str]) -> Option<String> {
        if self.supports_returning() && !columns.is_empty() {
            Some(format!(" RETURNING {}", columns.join(", ")))
        } else {
            None
        }
    }

    /// Placeholder text for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String;
}

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn case_insensitive_like(&self, expr: &str) -> String {
        format!("{expr} ILIKE ?")
    }

    fn year(&self, expr: &str) -> String {
        format!("EXTRACT(YEAR FROM {expr})")
    }

    fn new_uuid(&self) -> &'static str {
        "gen_random_uuid()"
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }
}

/// SQLite dialect (3.35+ for RETURNING).
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn case_insensitive_like(&self, expr: &str) -> String {
        format!("LOWER({expr}) LIKE LOWER(?)")
    }

    fn year(&self, expr: &str) -> String {
        format!("CAST(strftime('%Y', {expr}) AS INTEGER)")
    }

    fn new_uuid(&self) -> &'static str {
        "lower(hex(randomblob(16)))"
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }
}

/// Configured dialect selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Postgresql,
    Sqlite,
}

impl DialectKind {
    pub fn dialect(self) -> Arc<dyn SqlDialect> {
        match self {
            Self::Postgresql => Arc::new(PostgresDialect),
            Self::Sqlite => Arc::new(SqliteDialect),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_dialect() {
        let d = PostgresDialect;
        assert_eq!(d.case_insensitive_like("p.given"), "p.given ILIKE ?");
        assert_eq!(d.placeholder(3), "$3");
        assert_eq!(d.new_uuid(), "gen_random_uuid()");
        assert_eq!(
            d.returning_clause(&["id"]).as_deref(),
            Some(" RETURNING id")
        );
        assert_eq!(d.returning_clause(&[]), None);
    }

    #[test]
    fn test_sqlite_dialect() {
        let d = SqliteDialect;
        assert_eq!(
            d.case_insensitive_like("p.given"),
            "LOWER(p.given) LIKE LOWER(?)"
        );
        assert_eq!(d.placeholder(3), "?");
        assert_eq!(d.new_uuid(), "lower(hex(randomblob(16)))");
        assert_eq!(d.year("p.birth_date"), "CAST(strftime('%Y', p.birth_date) AS INTEGER)");
    }

    #[test]
    fn test_dialect_kind_deserialize() {
        let kind: DialectKind = serde_json::from_str("\"sqlite\"").unwrap();
        assert_eq!(kind, DialectKind::Sqlite);
        assert_eq!(kind.dialect().name(), "sqlite");
    }
}
