//! INSERT, UPDATE and DELETE statements derived from table mappings.
//!
//! All three read column lists and the primary-key predicate from the same
//! [`TableMapping`] the planner uses for queries.

use medql_core::{ColumnMapping, Model, SqlDialect, SqlValue, TableMapping};
use medql_query::SqlStatement;

use crate::error::{Result, StorageError};

/// A planned INSERT.
#[derive(Debug)]
pub struct InsertStatement<'m> {
    pub statement: SqlStatement,
    /// Generated columns read back from the `RETURNING` clause, in order
    pub returning: Vec<&'m ColumnMapping>,
}

fn value_of<T: Model>(model: &T, column: &ColumnMapping) -> SqlValue {
    model.get(&column.property).unwrap_or(SqlValue::Null)
}

fn key_predicate<T: Model>(mapping: &TableMapping, model: &T) -> Result<SqlStatement> {
    let mut predicate = SqlStatement::new();
    for column in mapping.primary_keys() {
        let value = value_of(model, column);
        if value.is_null() {
            return Err(StorageError::invalid_model(
                T::TYPE_NAME,
                format!("primary key '{}' is not set", column.property),
            ));
        }
        predicate = predicate.and(SqlStatement::with_params(
            format!("{} = ?", column.name),
            [value],
        ));
    }
    if predicate.is_empty() {
        return Err(StorageError::invalid_model(
            T::TYPE_NAME,
            "type has no primary key",
        ));
    }
    Ok(predicate)
}

/// Readable `col=value` list of the primary key, for errors.
pub fn describe_key<T: Model>(mapping: &TableMapping, model: &T) -> String {
    mapping
        .primary_keys()
        .map(|c| format!("{}={}", c.property, value_of(model, c)))
        .collect::<Vec<_>>()
        .join(",")
}

/// `INSERT INTO t (..) VALUES (..) [RETURNING ..]`.
///
/// Unset auto-generated columns are left to the database and, when the
/// dialect supports it, read back.
pub fn insert<'m, T: Model>(
    mapping: &'m TableMapping,
    model: &T,
    dialect: &dyn SqlDialect,
) -> Result<InsertStatement<'m>> {
    let mut names = Vec::new();
    let mut values = SqlStatement::new();
    let mut generated = Vec::new();

    for column in &mapping.columns {
        let value = value_of(model, column);
        if column.is_auto_generated && value.is_null() {
            generated.push(column);
            continue;
        }
        if column.is_non_null && value.is_null() {
            return Err(StorageError::not_null_violation(
                Some(column.name.clone()),
                format!("{}.{} is not set", T::TYPE_NAME, column.property),
            ));
        }
        names.push(column.name.as_str());
        values = values.append("?", [value]).append_sql(", ");
    }
    if names.is_empty() {
        return Err(StorageError::invalid_model(T::TYPE_NAME, "no column to insert"));
    }

    let mut statement = SqlStatement::from_sql(format!(
        "INSERT INTO {} ({}) VALUES (",
        mapping.table_name,
        names.join(", ")
    ))
    .append_statement(values.remove_last()?)
    .append_sql(")");

    let returning_names: Vec<&str> = generated.iter().map(|c| c.name.as_str()).collect();
    let returning = match dialect.returning_clause(&returning_names) {
        Some(clause) => {
            statement = statement.append_sql(clause);
            generated
        }
        None => Vec::new(),
    };

    Ok(InsertStatement {
        statement,
        returning,
    })
}

/// `UPDATE t SET .. WHERE <primary key>`.
pub fn update<T: Model>(mapping: &TableMapping, model: &T) -> Result<SqlStatement> {
    let mut assignments = SqlStatement::new();
    for column in mapping.columns.iter().filter(|c| !c.is_primary_key) {
        assignments = assignments
            .append(format!("{} = ?", column.name), [value_of(model, column)])
            .append_sql(", ");
    }
    if assignments.is_empty() {
        return Err(StorageError::invalid_model(
            T::TYPE_NAME,
            "no column besides the primary key",
        ));
    }

    Ok(SqlStatement::from_sql(format!("UPDATE {} SET ", mapping.table_name))
        .append_statement(assignments.remove_last()?)
        .where_clause(key_predicate(mapping, model)?))
}

/// `DELETE FROM t WHERE <primary key>`.
pub fn delete<T: Model>(mapping: &TableMapping, model: &T) -> Result<SqlStatement> {
    Ok(SqlStatement::from_sql(format!("DELETE FROM {}", mapping.table_name))
        .where_clause(key_predicate(mapping, model)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use medql_core::fixtures::{Patient, PatientRelationship, fixture_registry};
    use medql_core::{PostgresDialect, SqliteDialect};
    use uuid::Uuid;

    #[derive(Debug)]
    struct NoReturning;

    impl SqlDialect for NoReturning {
        fn name(&self) -> &'static str {
            "plain"
        }
        fn case_insensitive_like(&self, expr: &str) -> String {
            format!("{expr} LIKE ?")
        }
        fn year(&self, expr: &str) -> String {
            format!("YEAR({expr})")
        }
        fn new_uuid(&self) -> &'static str {
            "UUID()"
        }
        fn supports_returning(&self) -> bool {
            false
        }
        fn placeholder(&self, _index: usize) -> String {
            "?".into()
        }
    }

    fn patient() -> Patient {
        Patient {
            gender: Some("female".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_omits_unset_generated_key() {
        let registry = fixture_registry();
        let mapping = registry.mapping("Patient").unwrap();

        let insert = insert(&mapping, &patient(), &PostgresDialect).unwrap();
        let built = insert.statement.build().unwrap();
        assert!(built.sql().starts_with("INSERT INTO patient (gender, "));
        assert!(!built.sql().contains("(id"));
        assert!(built.sql().ends_with(" RETURNING id"));
        assert_eq!(built.sql().matches('?').count(), built.params().len());
        assert_eq!(insert.returning.len(), 1);
        assert_eq!(insert.returning[0].name, "id");
    }

    #[test]
    fn test_insert_keeps_explicit_key() {
        let registry = fixture_registry();
        let mapping = registry.mapping("Patient").unwrap();
        let id = Uuid::new_v4();
        let model = Patient {
            id: Some(id),
            ..patient()
        };

        let insert = insert(&mapping, &model, &SqliteDialect).unwrap();
        let built = insert.statement.build().unwrap();
        assert!(built.sql().starts_with("INSERT INTO patient (id, gender, "));
        assert_eq!(built.params()[0], SqlValue::Uuid(id));
        assert!(insert.returning.is_empty());
    }

    #[test]
    fn test_insert_without_returning_support() {
        let registry = fixture_registry();
        let mapping = registry.mapping("Patient").unwrap();
        let insert = insert(&mapping, &patient(), &NoReturning).unwrap();
        assert!(!insert.statement.build().unwrap().sql().contains("RETURNING"));
        assert!(insert.returning.is_empty());
    }

    #[test]
    fn test_insert_rejects_missing_required_column() {
        let registry = fixture_registry();
        let mapping = registry.mapping("PatientRelationship").unwrap();
        let err = insert(&mapping, &PatientRelationship::default(), &PostgresDialect).unwrap_err();
        assert!(matches!(err, StorageError::NotNullViolation { .. }));
    }

    #[test]
    fn test_update_and_delete_by_key() {
        let registry = fixture_registry();
        let mapping = registry.mapping("Patient").unwrap();
        let id = Uuid::new_v4();
        let model = Patient {
            id: Some(id),
            ..patient()
        };

        let built = update(&mapping, &model).unwrap().build().unwrap();
        assert!(built.sql().starts_with("UPDATE patient SET gender = ?, "));
        assert!(built.sql().ends_with(" WHERE id = ?"));
        assert_eq!(built.params().last(), Some(&SqlValue::Uuid(id)));

        let built = delete(&mapping, &model).unwrap().build().unwrap();
        assert_eq!(built.sql(), "DELETE FROM patient WHERE id = ?");
        assert_eq!(built.params(), &[SqlValue::Uuid(id)]);
        assert_eq!(describe_key(&mapping, &model), format!("id={id}"));
    }

    #[test]
    fn test_unset_key_is_rejected() {
        let registry = fixture_registry();
        let mapping = registry.mapping("Patient").unwrap();
        let err = delete(&mapping, &patient()).unwrap_err();
        assert!(matches!(err, StorageError::InvalidModel { .. }));
    }
}
