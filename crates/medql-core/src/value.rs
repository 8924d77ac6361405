//! Typed SQL values and column types.
//!
//! Every value that reaches a statement travels as a [`SqlValue`] bound to a
//! positional placeholder. [`ColumnType`] describes what a column stores and
//! knows how to coerce raw query-parameter text into that type.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// A single bound parameter or materialized cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Date(Date),
    Timestamp(OffsetDateTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    /// Name of the variant, used in coercion error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Uuid(_) => "uuid",
            Self::Date(_) => "date",
            Self::Timestamp(_) => "timestamp",
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "'{s}'"),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Date(d) => write!(f, "{d}"),
            Self::Timestamp(ts) => write!(f, "{ts}"),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Uuid> for SqlValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<Date> for SqlValue {
    fn from(value: Date) -> Self {
        Self::Date(value)
    }
}

impl From<OffsetDateTime> for SqlValue {
    fn from(value: OffsetDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Conversion out of a materialized cell into a domain field.
pub trait FromSqlValue: Sized {
    fn from_sql_value(value: SqlValue) -> Result<Self>;
}

fn mismatch(value: &SqlValue, target: &str) -> CoreError {
    CoreError::type_coercion(value.to_string(), target, format!("found {}", value.kind()))
}

impl FromSqlValue for String {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Text(s) => Ok(s),
            other => Err(mismatch(&other, "text")),
        }
    }
}

impl FromSqlValue for bool {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Bool(b) => Ok(b),
            SqlValue::Int(i) => Ok(i != 0),
            other => Err(mismatch(&other, "boolean")),
        }
    }
}

impl FromSqlValue for i64 {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Int(i) => Ok(i),
            other => Err(mismatch(&other, "integer")),
        }
    }
}

impl FromSqlValue for i32 {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Int(i) => i32::try_from(i)
                .map_err(|e| CoreError::type_coercion(i.to_string(), "i32", e.to_string())),
            other => Err(mismatch(&other, "integer")),
        }
    }
}

impl FromSqlValue for f64 {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Float(v) => Ok(v),
            SqlValue::Int(i) => Ok(i as f64),
            other => Err(mismatch(&other, "float")),
        }
    }
}

impl FromSqlValue for Uuid {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Uuid(u) => Ok(u),
            // SQLite hands UUIDs back as text
            SqlValue::Text(s) => Uuid::parse_str(&s)
                .map_err(|e| CoreError::type_coercion(s.clone(), "uuid", e.to_string())),
            other => Err(mismatch(&other, "uuid")),
        }
    }
}

impl FromSqlValue for Date {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Date(d) => Ok(d),
            SqlValue::Text(s) => ColumnType::Date.coerce(&s).and_then(Self::from_sql_value),
            other => Err(mismatch(&other, "date")),
        }
    }
}

impl FromSqlValue for OffsetDateTime {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Timestamp(ts) => Ok(ts),
            SqlValue::Text(s) => ColumnType::Timestamp
                .coerce(&s)
                .and_then(Self::from_sql_value),
            other => Err(mismatch(&other, "timestamp")),
        }
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql_value(other).map(Some),
        }
    }
}

/// Declared storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Uuid,
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    Timestamp,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uuid => "uuid",
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
        }
    }

    /// Columns whose values can be ordered with `<`/`>`.
    pub fn is_ordered(self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Float | Self::Date | Self::Timestamp | Self::Text
        )
    }

    /// Parse raw query-parameter text into a value of this type.
    ///
    /// Never falls back to text: a value that does not parse is an error.
    pub fn coerce(self, raw: &str) -> Result<SqlValue> {
        let err = |message: String| CoreError::type_coercion(raw, self.as_str(), message);
        match self {
            Self::Text => Ok(SqlValue::Text(raw.to_string())),
            Self::Uuid => Uuid::parse_str(raw)
                .map(SqlValue::Uuid)
                .map_err(|e| err(e.to_string())),
            Self::Integer => raw
                .parse::<i64>()
                .map(SqlValue::Int)
                .map_err(|e| err(e.to_string())),
            Self::Float => raw
                .parse::<f64>()
                .map(SqlValue::Float)
                .map_err(|e| err(e.to_string())),
            Self::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(SqlValue::Bool(true)),
                "false" | "0" => Ok(SqlValue::Bool(false)),
                _ => Err(err("expected true or false".to_string())),
            },
            Self::Date => Date::parse(raw, format_description!("[year]-[month]-[day]"))
                .map(SqlValue::Date)
                .map_err(|e| err(e.to_string())),
            Self::Timestamp => {
                if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
                    return Ok(SqlValue::Timestamp(ts));
                }
                // A bare date means midnight UTC on that day
                Date::parse(raw, format_description!("[year]-[month]-[day]"))
                    .map(|d| SqlValue::Timestamp(d.midnight().assume_utc()))
                    .map_err(|e| err(e.to_string()))
            }
        }
    }

    /// Coerce an already-typed value (e.g. a predicate constant) to this type.
    pub fn coerce_value(self, value: SqlValue) -> Result<SqlValue> {
        match (self, value) {
            (_, SqlValue::Null) => Ok(SqlValue::Null),
            (_, SqlValue::Text(s)) if self != Self::Text => self.coerce(&s),
            (Self::Float, SqlValue::Int(i)) => Ok(SqlValue::Float(i as f64)),
            (Self::Timestamp, SqlValue::Date(d)) => {
                Ok(SqlValue::Timestamp(d.midnight().assume_utc()))
            }
            (ty, value) if ty.accepts(&value) => Ok(value),
            (ty, value) => Err(CoreError::type_coercion(
                value.to_string(),
                ty.as_str(),
                format!("found {}", value.kind()),
            )),
        }
    }

    fn accepts(self, value: &SqlValue) -> bool {
        matches!(
            (self, value),
            (Self::Text, SqlValue::Text(_))
                | (Self::Uuid, SqlValue::Uuid(_))
                | (Self::Integer, SqlValue::Int(_))
                | (Self::Float, SqlValue::Float(_))
                | (Self::Boolean, SqlValue::Bool(_))
                | (Self::Date, SqlValue::Date(_))
                | (Self::Timestamp, SqlValue::Timestamp(_))
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn test_coerce_scalars() {
        assert_eq!(ColumnType::Integer.coerce("5").unwrap(), SqlValue::Int(5));
        assert_eq!(ColumnType::Float.coerce("2.5").unwrap(), SqlValue::Float(2.5));
        assert_eq!(
            ColumnType::Boolean.coerce("TRUE").unwrap(),
            SqlValue::Bool(true)
        );
        assert_eq!(
            ColumnType::Text.coerce("Jones").unwrap(),
            SqlValue::Text("Jones".into())
        );
    }

    #[test]
    fn test_coerce_temporal() {
        assert_eq!(
            ColumnType::Date.coerce("1984-03-02").unwrap(),
            SqlValue::Date(date!(1984 - 03 - 02))
        );
        assert_eq!(
            ColumnType::Timestamp.coerce("2020-01-01T10:00:00Z").unwrap(),
            SqlValue::Timestamp(datetime!(2020-01-01 10:00:00 UTC))
        );
        assert_eq!(
            ColumnType::Timestamp.coerce("2020-01-01").unwrap(),
            SqlValue::Timestamp(datetime!(2020-01-01 0:00 UTC))
        );
    }

    #[test]
    fn test_coerce_failure_is_an_error() {
        let err = ColumnType::Integer.coerce("five").unwrap_err();
        assert!(matches!(err, CoreError::TypeCoercion { .. }));
        assert!(ColumnType::Uuid.coerce("not-a-uuid").is_err());
        assert!(ColumnType::Date.coerce("03/02/1984").is_err());
    }

    #[test]
    fn test_coerce_value() {
        assert_eq!(
            ColumnType::Float.coerce_value(SqlValue::Int(3)).unwrap(),
            SqlValue::Float(3.0)
        );
        assert_eq!(
            ColumnType::Integer
                .coerce_value(SqlValue::Text("42".into()))
                .unwrap(),
            SqlValue::Int(42)
        );
        assert_eq!(
            ColumnType::Uuid.coerce_value(SqlValue::Null).unwrap(),
            SqlValue::Null
        );
        assert!(ColumnType::Boolean.coerce_value(SqlValue::Int(1)).is_err());
    }

    #[test]
    fn test_from_sql_value() {
        let id = Uuid::new_v4();
        assert_eq!(Uuid::from_sql_value(SqlValue::Uuid(id)).unwrap(), id);
        assert_eq!(
            Uuid::from_sql_value(SqlValue::Text(id.to_string())).unwrap(),
            id
        );
        assert_eq!(
            Option::<String>::from_sql_value(SqlValue::Null).unwrap(),
            None
        );
        assert!(i64::from_sql_value(SqlValue::Text("x".into())).is_err());
    }
}
