//! Direct column predicates from query-parameter values.
//!
//! The leading characters of each value select the comparison:
//!
//! | Value | SQL |
//! |---|---|
//! | `null` / `!null` | `IS NULL` / `IS NOT NULL` |
//! | `<v` `<=v` `>v` `>=v` | ordered comparison |
//! | `!v` | `<>` |
//! | `~v` | case-insensitive contains (`*`/`?` are wildcards) |
//! | `^v` | case-insensitive prefix |
//! | `v` with `*` on a text column | case-insensitive wildcard match |
//! | anything else | `=` |
//!
//! Range and negation filters on one column are ANDed; all other filters
//! are ORed, and the two groups are ANDed together.

use medql_core::{ColumnMapping, ColumnType, CoreError, SqlDialect, SqlValue};

use crate::error::Result;
use crate::statement::SqlStatement;

/// Escape LIKE metacharacters so the value matches literally.
pub fn escape_like_pattern(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Escape the value, then turn `*` and `?` into SQL wildcards.
fn wildcard_pattern(s: &str) -> String {
    escape_like_pattern(s).replace('*', "%").replace('?', "_")
}

fn has_wildcards(s: &str) -> bool {
    s.contains('*') || s.contains('?')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    IsNull,
    IsNotNull,
    Lt,
    Le,
    Gt,
    Ge,
    Ne,
    Contains,
    StartsWith,
    Eq,
}

impl FilterOp {
    /// Operators whose filters on one column are ANDed.
    pub fn is_conjunctive(self) -> bool {
        matches!(
            self,
            Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::Ne | Self::IsNotNull
        )
    }

    fn comparison_sql(self) -> Option<&'static str> {
        match self {
            Self::Lt => Some("<"),
            Self::Le => Some("<="),
            Self::Gt => Some(">"),
            Self::Ge => Some(">="),
            Self::Ne => Some("<>"),
            Self::Eq => Some("="),
            _ => None,
        }
    }
}

/// One parsed filter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueFilter {
    pub op: FilterOp,
    pub operand: String,
}

impl ValueFilter {
    pub fn parse(raw: &str) -> Self {
        let (op, operand) = match raw {
            "null" => (FilterOp::IsNull, ""),
            "!null" => (FilterOp::IsNotNull, ""),
            _ => {
                if let Some(rest) = raw.strip_prefix("<=") {
                    (FilterOp::Le, rest)
                } else if let Some(rest) = raw.strip_prefix(">=") {
                    (FilterOp::Ge, rest)
                } else if let Some(rest) = raw.strip_prefix('<') {
                    (FilterOp::Lt, rest)
                } else if let Some(rest) = raw.strip_prefix('>') {
                    (FilterOp::Gt, rest)
                } else if let Some(rest) = raw.strip_prefix('!') {
                    (FilterOp::Ne, rest)
                } else if let Some(rest) = raw.strip_prefix('~') {
                    (FilterOp::Contains, rest)
                } else if let Some(rest) = raw.strip_prefix('^') {
                    (FilterOp::StartsWith, rest)
                } else {
                    (FilterOp::Eq, raw)
                }
            }
        };
        Self {
            op,
            operand: operand.to_string(),
        }
    }
}

/// Encodes query-parameter values against one column.
pub struct ColumnPredicateEncoder<'a> {
    dialect: &'a dyn SqlDialect,
}

impl<'a> ColumnPredicateEncoder<'a> {
    pub fn new(dialect: &'a dyn SqlDialect) -> Self {
        Self { dialect }
    }

    /// Encode every value against `column` (qualified as `column_sql`).
    pub fn encode(
        &self,
        column_sql: &str,
        column: &ColumnMapping,
        values: &[String],
    ) -> Result<SqlStatement> {
        let mut any_of = SqlStatement::new();
        let mut all_of = SqlStatement::new();
        let (mut any_count, mut all_count) = (0, 0);

        for raw in values {
            let filter = ValueFilter::parse(raw);
            let predicate = self.encode_one(column_sql, column, &filter)?;
            if filter.op.is_conjunctive() {
                all_of = all_of.and(predicate);
                all_count += 1;
            } else {
                any_of = any_of.or(predicate);
                any_count += 1;
            }
        }

        if any_count > 1 && all_count > 0 {
            any_of = any_of.parenthesize();
        }
        let combined = any_of.and(all_of);
        Ok(if any_count + all_count > 1 {
            combined.parenthesize()
        } else {
            combined
        })
    }

    fn encode_one(
        &self,
        column_sql: &str,
        column: &ColumnMapping,
        filter: &ValueFilter,
    ) -> Result<SqlStatement> {
        let operand = filter.operand.as_str();
        match filter.op {
            FilterOp::IsNull => Ok(SqlStatement::from_sql(format!("{column_sql} IS NULL"))),
            FilterOp::IsNotNull => Ok(SqlStatement::from_sql(format!("{column_sql} IS NOT NULL"))),
            FilterOp::Contains => {
                let pattern = if has_wildcards(operand) {
                    wildcard_pattern(operand)
                } else {
                    format!("%{}%", escape_like_pattern(operand))
                };
                self.pattern(column_sql, column, operand, pattern)
            }
            FilterOp::StartsWith => {
                let pattern = format!("{}%", wildcard_pattern(operand));
                self.pattern(column_sql, column, operand, pattern)
            }
            FilterOp::Eq if column.column_type == ColumnType::Text && operand.contains('*') => {
                self.pattern(column_sql, column, operand, wildcard_pattern(operand))
            }
            op => {
                let sql_op = op.comparison_sql().unwrap_or("=");
                let value = column.column_type.coerce(operand)?;
                Ok(SqlStatement::with_params(
                    format!("{column_sql} {sql_op} ?"),
                    [value],
                ))
            }
        }
    }

    fn pattern(
        &self,
        column_sql: &str,
        column: &ColumnMapping,
        raw: &str,
        pattern: String,
    ) -> Result<SqlStatement> {
        if column.column_type != ColumnType::Text {
            return Err(CoreError::type_coercion(
                raw,
                column.column_type.as_str(),
                "pattern matching needs a text column",
            )
            .into());
        }
        Ok(SqlStatement::with_params(
            format!(
                "{} ESCAPE '\\'",
                self.dialect.case_insensitive_like(column_sql)
            ),
            [SqlValue::Text(pattern)],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medql_core::fixtures::fixture_registry;
    use medql_core::{PostgresDialect, SqliteDialect};

    fn encode_on(
        dialect: &dyn SqlDialect,
        type_name: &str,
        column: &str,
        values: &[&str],
    ) -> Result<(String, Vec<SqlValue>)> {
        let registry = fixture_registry();
        let mapping = registry.mapping(type_name)?;
        let column = mapping.column(column).expect("fixture column");
        let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        let built = ColumnPredicateEncoder::new(dialect)
            .encode(&format!("t.{}", column.name), column, &values)?
            .build()?;
        Ok(built.into_parts())
    }

    fn encode(type_name: &str, column: &str, values: &[&str]) -> Result<(String, Vec<SqlValue>)> {
        encode_on(&PostgresDialect, type_name, column, values)
    }

    fn text(s: &str) -> SqlValue {
        SqlValue::Text(s.to_string())
    }

    #[test]
    fn test_parse_operators() {
        assert_eq!(ValueFilter::parse("<=5").op, FilterOp::Le);
        assert_eq!(ValueFilter::parse("<=5").operand, "5");
        assert_eq!(ValueFilter::parse(">2").op, FilterOp::Gt);
        assert_eq!(ValueFilter::parse("!male").op, FilterOp::Ne);
        assert_eq!(ValueFilter::parse("!null").op, FilterOp::IsNotNull);
        assert_eq!(ValueFilter::parse("null").op, FilterOp::IsNull);
        assert_eq!(ValueFilter::parse("nullable").op, FilterOp::Eq);
        assert_eq!(ValueFilter::parse("~Jo").op, FilterOp::Contains);
        assert_eq!(ValueFilter::parse("^Jo").op, FilterOp::StartsWith);
    }

    #[test]
    fn test_operator_mapping() {
        assert_eq!(
            encode("PatientName", "given", &["^Jo"]).unwrap(),
            ("t.given ILIKE ? ESCAPE '\\'".into(), vec![text("Jo%")])
        );
        assert_eq!(
            encode("PatientName", "given", &["~Jo"]).unwrap(),
            ("t.given ILIKE ? ESCAPE '\\'".into(), vec![text("%Jo%")])
        );
        assert_eq!(
            encode("Patient", "gender", &["!null"]).unwrap(),
            ("t.gender IS NOT NULL".into(), vec![])
        );
        assert_eq!(
            encode("Patient", "gender", &["null"]).unwrap(),
            ("t.gender IS NULL".into(), vec![])
        );
        assert_eq!(
            encode("Patient", "multiple_birth_order", &["<=5"]).unwrap(),
            ("t.multiple_birth_order <= ?".into(), vec![SqlValue::Int(5)])
        );
    }

    #[test]
    fn test_wildcards() {
        let (sql, params) = encode("PatientName", "given", &["Jo*"]).unwrap();
        assert_eq!(sql, "t.given ILIKE ? ESCAPE '\\'");
        assert_eq!(params, vec![text("Jo%")]);

        let (_, params) = encode("PatientName", "given", &["~J?n*s"]).unwrap();
        assert_eq!(params, vec![text("J_n%s")]);

        // Literal LIKE metacharacters are escaped
        let (_, params) = encode("PatientName", "given", &["~50%_off"]).unwrap();
        assert_eq!(params, vec![text("%50\\%\\_off%")]);
    }

    #[test]
    fn test_sqlite_case_insensitive_match() {
        let (sql, _) = encode_on(&SqliteDialect, "PatientName", "given", &["~Jo"]).unwrap();
        assert_eq!(sql, "LOWER(t.given) LIKE LOWER(?) ESCAPE '\\'");
    }

    #[test]
    fn test_list_values_are_ored() {
        let (sql, params) = encode("Patient", "gender", &["male", "female"]).unwrap();
        assert_eq!(sql, "(t.gender = ? OR t.gender = ?)");
        assert_eq!(params, vec![text("male"), text("female")]);
    }

    #[test]
    fn test_range_bounds_are_anded() {
        let (sql, params) = encode("Patient", "birth_date", &[">=1980-01-01", "<=1989-12-31"]).unwrap();
        assert_eq!(sql, "(t.birth_date >= ? AND t.birth_date <= ?)");
        assert_eq!(params.len(), 2);

        let (sql, _) = encode("Patient", "gender", &["male", "female", "!null"]).unwrap();
        assert_eq!(
            sql,
            "((t.gender = ? OR t.gender = ?) AND t.gender IS NOT NULL)"
        );
    }

    #[test]
    fn test_coercion_failures_are_errors() {
        let err = encode("Patient", "multiple_birth_order", &[">two"]).unwrap_err();
        assert!(err.to_string().contains("Cannot convert 'two' to integer"));

        // No pattern matching on non-text columns
        assert!(encode("Patient", "birth_date", &["~1980"]).is_err());

        // A star on a non-text column is not a wildcard
        assert!(encode("Patient", "multiple_birth_order", &["1*"]).is_err());
    }
}
