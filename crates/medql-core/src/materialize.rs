//! Mapping result rows back into domain objects.
//!
//! A row produced for `T` holds exactly `T`'s mapped columns in mapping
//! order. A [`CompositeResult`] row holds the columns of each slot type
//! back to back, in slot order, starting at offset 0.

use crate::error::{CoreError, Result};
use crate::registry::TableMappingRegistry;
use crate::schema::Model;
use crate::value::SqlValue;

/// One result row as returned by a connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// A row without column names (positional access only).
    pub fn from_values(values: Vec<SqlValue>) -> Self {
        Self {
            columns: Vec::new(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.values.get(i))
    }
}

/// Types that can be built from one result row.
pub trait FromRow: Sized + Send + 'static {
    /// Domain types whose columns the row carries, in order.
    fn result_types() -> Vec<&'static str>;

    fn from_row(row: &Row, registry: &TableMappingRegistry) -> Result<Self>;
}

/// Read `T`'s columns starting at `offset`, advancing it past them.
fn read_model<T: Model>(
    row: &Row,
    offset: &mut usize,
    registry: &TableMappingRegistry,
) -> Result<T> {
    let mapping = registry.mapping(T::TYPE_NAME)?;
    let end = *offset + mapping.columns.len();
    if end > row.len() {
        return Err(CoreError::materialization(format!(
            "row has {} columns, {} needs columns {}..{}",
            row.len(),
            T::TYPE_NAME,
            offset,
            end
        )));
    }

    let mut model = T::default();
    for (column, value) in mapping.columns.iter().zip(&row.values()[*offset..end]) {
        model.set(&column.property, value.clone())?;
    }
    *offset = end;
    Ok(model)
}

fn ensure_consumed(row: &Row, consumed: usize) -> Result<()> {
    if consumed != row.len() {
        return Err(CoreError::materialization(format!(
            "row has {} columns but the result shape consumes {consumed}",
            row.len()
        )));
    }
    Ok(())
}

impl<T: Model> FromRow for T {
    fn result_types() -> Vec<&'static str> {
        vec![T::TYPE_NAME]
    }

    fn from_row(row: &Row, registry: &TableMappingRegistry) -> Result<Self> {
        let mut offset = 0;
        let model = read_model::<T>(row, &mut offset, registry)?;
        ensure_consumed(row, offset)?;
        Ok(model)
    }
}

/// Fixed-arity tuple of domain objects read from one joined row.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeResult<T>(pub T);

impl<T> CompositeResult<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

macro_rules! composite_from_row {
    ($($slot:ident),+) => {
        impl<$($slot: Model),+> FromRow for CompositeResult<($($slot,)+)> {
            fn result_types() -> Vec<&'static str> {
                vec![$($slot::TYPE_NAME),+]
            }

            fn from_row(row: &Row, registry: &TableMappingRegistry) -> Result<Self> {
                let mut offset = 0;
                let tuple = ($(read_model::<$slot>(row, &mut offset, registry)?,)+);
                ensure_consumed(row, offset)?;
                Ok(CompositeResult(tuple))
            }
        }
    };
}

composite_from_row!(A, B);
composite_from_row!(A, B, C);
composite_from_row!(A, B, C, D);
composite_from_row!(A, B, C, D, E);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Entity, Person, Practitioner, fixture_registry};
    use uuid::Uuid;

    #[test]
    fn test_single_model_from_row() {
        let registry = fixture_registry();
        let id = Uuid::new_v4();
        let row = Row::from_values(vec![
            SqlValue::Uuid(id),
            SqlValue::Text("Dr. Grey".into()),
        ]);

        let person = Person::from_row(&row, &registry).unwrap();
        assert_eq!(person.id, Some(id));
        assert_eq!(person.name.as_deref(), Some("Dr. Grey"));
    }

    #[test]
    fn test_composite_splits_row_in_slot_order() {
        let registry = fixture_registry();
        let id = Uuid::new_v4();
        let row = Row::from_values(vec![
            // practitioner
            SqlValue::Uuid(id),
            SqlValue::Text("cardiology".into()),
            // person
            SqlValue::Uuid(id),
            SqlValue::Text("Dr. Grey".into()),
            // entity
            SqlValue::Uuid(id),
            SqlValue::Text("PSN".into()),
            SqlValue::Null,
        ]);

        let CompositeResult((practitioner, person, entity)) =
            CompositeResult::<(Practitioner, Person, Entity)>::from_row(&row, &registry).unwrap();
        assert_eq!(practitioner.specialty.as_deref(), Some("cardiology"));
        assert_eq!(person.name.as_deref(), Some("Dr. Grey"));
        assert_eq!(entity.class_code.as_deref(), Some("PSN"));
        assert_eq!(entity.obsoletion_time, None);
    }

    #[test]
    fn test_arity_mismatch_is_an_error() {
        let registry = fixture_registry();
        let short = Row::from_values(vec![SqlValue::Uuid(Uuid::new_v4())]);
        assert!(Person::from_row(&short, &registry).is_err());

        let long = Row::from_values(vec![
            SqlValue::Uuid(Uuid::new_v4()),
            SqlValue::Text("x".into()),
            SqlValue::Text("extra".into()),
        ]);
        let err = Person::from_row(&long, &registry).unwrap_err();
        assert!(matches!(err, CoreError::Materialization(_)));
    }

    #[test]
    fn test_row_by_name() {
        let row = Row::new(
            vec!["id".into(), "name".into()],
            vec![SqlValue::Int(1), SqlValue::Text("a".into())],
        );
        assert_eq!(row.get_by_name("name"), Some(&SqlValue::Text("a".into())));
        assert_eq!(row.get_by_name("missing"), None);
    }
}
