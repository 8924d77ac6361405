//! Predicate expression to WHERE-clause translation.

use medql_core::{ColumnType, SqlDialect, SqlValue};

use crate::encoder::escape_like_pattern;
use crate::error::{QueryError, Result};
use crate::expr::{BinaryOp, Expr};
use crate::skeleton::Skeleton;
use crate::statement::SqlStatement;

/// A value-typed piece of SQL.
#[derive(Debug)]
struct Operand {
    sql: String,
    params: Vec<SqlValue>,
    column_type: Option<ColumnType>,
}

impl Operand {
    fn raw(sql: impl Into<String>, column_type: Option<ColumnType>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            column_type,
        }
    }
}

/// Translates [`Expr`] trees against the tables in a join skeleton.
pub struct PredicateTranslator<'a> {
    skeleton: &'a Skeleton,
    dialect: &'a dyn SqlDialect,
}

impl<'a> PredicateTranslator<'a> {
    pub fn new(skeleton: &'a Skeleton, dialect: &'a dyn SqlDialect) -> Self {
        Self { skeleton, dialect }
    }

    /// Translate a boolean-valued expression.
    pub fn translate(&self, expr: &Expr) -> Result<SqlStatement> {
        match expr {
            Expr::Binary { op, lhs, rhs } if op.is_logical() => {
                let lhs = self.translate(lhs)?;
                let rhs = self.translate(rhs)?;
                let combined = match op {
                    BinaryOp::And => lhs.and(rhs),
                    _ => lhs.or(rhs),
                };
                Ok(combined.parenthesize())
            }
            Expr::Binary { op, lhs, rhs } => self.comparison(*op, lhs, rhs),
            Expr::Not(inner) => Ok(SqlStatement::from_sql("NOT ")
                .append_statement(self.translate(inner)?.parenthesize())),
            Expr::Member(_) => {
                let operand = self.operand(expr, None)?;
                if operand.column_type != Some(ColumnType::Boolean) {
                    return Err(QueryError::unsupported(format!(
                        "non-boolean member '{}' used as a condition",
                        operand.sql
                    )));
                }
                Ok(SqlStatement::with_params(
                    format!("{} = ?", operand.sql),
                    [SqlValue::Bool(true)],
                ))
            }
            Expr::Constant(SqlValue::Bool(true)) => Ok(SqlStatement::from_sql("1 = 1")),
            Expr::Constant(SqlValue::Bool(false)) => Ok(SqlStatement::from_sql("1 = 0")),
            Expr::Constant(value) => Err(QueryError::unsupported(format!(
                "{} constant used as a condition",
                value.kind()
            ))),
            Expr::Call { function, args } => match function.as_str() {
                "contains" => self.like(function, args, |v| format!("%{v}%")),
                "starts_with" => self.like(function, args, |v| format!("{v}%")),
                "ends_with" => self.like(function, args, |v| format!("%{v}")),
                _ => Err(QueryError::unsupported(format!(
                    "function '{function}' used as a condition"
                ))),
            },
        }
    }

    fn comparison(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<SqlStatement> {
        let null_test = match (lhs, rhs) {
            (other, Expr::Constant(SqlValue::Null)) | (Expr::Constant(SqlValue::Null), other) => {
                Some(other)
            }
            _ => None,
        };
        if let Some(other) = null_test {
            let keyword = match op {
                BinaryOp::Eq => "IS NULL",
                BinaryOp::Ne => "IS NOT NULL",
                _ => {
                    return Err(QueryError::unsupported(format!(
                        "'{}' comparison with null",
                        op.as_sql()
                    )));
                }
            };
            let operand = self.operand(other, None)?;
            return Ok(SqlStatement::with_params(
                format!("{} {keyword}", operand.sql),
                operand.params,
            ));
        }

        // Constants take the type of the opposite side
        let lhs_type = self.type_of(lhs)?;
        let rhs_type = self.type_of(rhs)?;
        let lhs = self.operand(lhs, rhs_type)?;
        let rhs = self.operand(rhs, lhs_type)?;

        let mut params = lhs.params;
        params.extend(rhs.params);
        Ok(SqlStatement::with_params(
            format!("{} {} {}", lhs.sql, op.as_sql(), rhs.sql),
            params,
        ))
    }

    fn like(&self, function: &str, args: &[Expr], pattern: fn(&str) -> String) -> Result<SqlStatement> {
        let [receiver, Expr::Constant(SqlValue::Text(value))] = args else {
            return Err(QueryError::unsupported(format!(
                "{function} expects a receiver and a text constant"
            )));
        };
        let receiver = self.operand(receiver, None)?;
        if receiver.column_type != Some(ColumnType::Text) {
            return Err(QueryError::unsupported(format!(
                "{function} on non-text expression '{}'",
                receiver.sql
            )));
        }

        let mut params = receiver.params;
        params.push(SqlValue::Text(pattern(&escape_like_pattern(value))));
        Ok(SqlStatement::with_params(
            format!("{} LIKE ? ESCAPE '\\'", receiver.sql),
            params,
        ))
    }

    /// Static type of a value expression, `None` for untyped constants.
    fn type_of(&self, expr: &Expr) -> Result<Option<ColumnType>> {
        Ok(match expr {
            Expr::Member(name) => Some(self.resolve(name)?.1),
            Expr::Constant(_) => None,
            Expr::Call { function, .. } => match function.as_str() {
                "to_lower" | "to_upper" | "trim" => Some(ColumnType::Text),
                "length" | "year" => Some(ColumnType::Integer),
                "now" => Some(ColumnType::Timestamp),
                _ => None,
            },
            Expr::Binary { .. } | Expr::Not(_) => Some(ColumnType::Boolean),
        })
    }

    fn operand(&self, expr: &Expr, hint: Option<ColumnType>) -> Result<Operand> {
        match expr {
            Expr::Member(name) => {
                let (sql, column_type) = self.resolve(name)?;
                Ok(Operand::raw(sql, Some(column_type)))
            }
            Expr::Constant(value) => {
                let value = match hint {
                    Some(column_type) => column_type.coerce_value(value.clone())?,
                    None => value.clone(),
                };
                Ok(Operand {
                    sql: "?".to_string(),
                    params: vec![value],
                    column_type: hint,
                })
            }
            Expr::Call { function, args } => self.call(function, args),
            Expr::Binary { .. } | Expr::Not(_) => Err(QueryError::unsupported(
                "boolean expression used as a value",
            )),
        }
    }

    fn call(&self, function: &str, args: &[Expr]) -> Result<Operand> {
        if function == "now" {
            if !args.is_empty() {
                return Err(QueryError::unsupported("now takes no arguments"));
            }
            return Ok(Operand::raw(
                self.dialect.current_timestamp(),
                Some(ColumnType::Timestamp),
            ));
        }

        let [receiver] = args else {
            return Err(QueryError::unsupported(format!(
                "function '{function}' with {} arguments",
                args.len()
            )));
        };
        let inner = self.operand(receiver, None)?;
        let (sql, column_type) = match function {
            "to_lower" => (self.dialect.lower(&inner.sql), ColumnType::Text),
            "to_upper" => (self.dialect.upper(&inner.sql), ColumnType::Text),
            "trim" => (self.dialect.trim(&inner.sql), ColumnType::Text),
            "length" => (self.dialect.length(&inner.sql), ColumnType::Integer),
            "year" => (self.dialect.year(&inner.sql), ColumnType::Integer),
            other => return Err(QueryError::unsupported(format!("function '{other}'"))),
        };
        Ok(Operand {
            sql,
            params: inner.params,
            column_type: Some(column_type),
        })
    }

    fn resolve(&self, name: &str) -> Result<(String, ColumnType)> {
        if let Some(resolved) = self.skeleton.column(name) {
            return Ok((resolved.qualified(), resolved.column.column_type));
        }
        if self.skeleton.member(name).is_some() {
            return Err(QueryError::unsupported(format!(
                "navigation through relationship member '{name}'"
            )));
        }
        Err(medql_core::CoreError::unresolvable_member(&self.skeleton.type_name, name).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medql_core::PostgresDialect;
    use medql_core::fixtures::fixture_registry;
    use time::macros::date;

    fn translate(type_name: &str, expr: &Expr) -> Result<(String, Vec<SqlValue>)> {
        let registry = fixture_registry();
        let skeleton = Skeleton::build(&registry, type_name, "")?;
        let built = PredicateTranslator::new(&skeleton, &PostgresDialect)
            .translate(expr)?
            .build()?;
        Ok(built.into_parts())
    }

    #[test]
    fn test_comparisons_and_logic() {
        let expr = Expr::member("gender")
            .eq("male")
            .and(Expr::member("multipleBirthOrder").gt(1).or(Expr::member("deceased")));
        let (sql, params) = translate("Patient", &expr).unwrap();

        assert_eq!(
            sql,
            "(patient.gender = ? AND (patient.multiple_birth_order > ? OR patient.deceased = ?))"
        );
        assert_eq!(
            params,
            vec![
                SqlValue::Text("male".into()),
                SqlValue::Int(1),
                SqlValue::Bool(true)
            ]
        );
    }

    #[test]
    fn test_constants_are_coerced_to_column_type() {
        let expr = Expr::member("birthDate").ge("1980-01-01");
        let (sql, params) = translate("Patient", &expr).unwrap();
        assert_eq!(sql, "patient.birth_date >= ?");
        assert_eq!(params, vec![SqlValue::Date(date!(1980 - 01 - 01))]);

        let err = translate("Patient", &Expr::member("multipleBirthOrder").eq("two")).unwrap_err();
        assert!(matches!(
            err,
            QueryError::Core(medql_core::CoreError::TypeCoercion { .. })
        ));
    }

    #[test]
    fn test_null_comparisons() {
        let (sql, params) = translate("Patient", &Expr::member("obsoletionTime").is_null()).unwrap();
        assert_eq!(sql, "patient.obsoletion_time IS NULL");
        assert!(params.is_empty());

        let (sql, _) = translate("Patient", &!Expr::member("gender").is_not_null()).unwrap();
        assert_eq!(sql, "NOT (patient.gender IS NOT NULL)");
    }

    #[test]
    fn test_string_helpers() {
        let expr = Expr::member("name").to_lower().starts_with("jo_");
        let (sql, params) = translate("Person", &expr).unwrap();
        assert_eq!(sql, "LOWER(person.name) LIKE ? ESCAPE '\\'");
        assert_eq!(params, vec![SqlValue::Text("jo\\_%".into())]);

        let (sql, _) = translate("Person", &Expr::member("name").trim().length().gt(3)).unwrap();
        assert_eq!(sql, "LENGTH(TRIM(person.name)) > ?");
    }

    #[test]
    fn test_date_helpers() {
        let (sql, params) = translate("Patient", &Expr::member("birthDate").year().eq(1984)).unwrap();
        assert_eq!(sql, "EXTRACT(YEAR FROM patient.birth_date) = ?");
        assert_eq!(params, vec![SqlValue::Int(1984)]);

        let expr = Expr::member("obsoletionTime").binary(BinaryOp::Lt, Expr::now());
        let (sql, _) = translate("Patient", &expr).unwrap();
        assert_eq!(sql, "patient.obsoletion_time < CURRENT_TIMESTAMP");
    }

    #[test]
    fn test_members_resolve_through_parents() {
        let expr = Expr::member("specialty").eq("cardiology").and(Expr::member("name").eq("Grey"));
        let (sql, _) = translate("Practitioner", &expr).unwrap();
        assert_eq!(sql, "(practitioner.specialty = ? AND person.name = ?)");
    }

    #[test]
    fn test_unsupported_constructs_are_named() {
        let err = translate(
            "Person",
            &Expr::call("soundex", vec![Expr::member("name")]).eq("J520"),
        )
        .unwrap_err();
        assert!(matches!(&err, QueryError::UnsupportedConstruct(msg) if msg.contains("soundex")));

        let err = translate("Patient", &Expr::member("name").eq("x")).unwrap_err();
        assert!(err.to_string().contains("relationship member 'name'"));

        let err = translate("Patient", &Expr::member("nickname").eq("x")).unwrap_err();
        assert!(err.is_resolution_failure());
    }
}
