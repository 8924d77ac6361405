//! Table metadata, typed values and SQL dialects for MedQL.
//!
//! Domain types describe their persisted shape through [`Model::schema`].
//! The [`TableMappingRegistry`] derives one immutable [`TableMapping`] per
//! type on first use and hands it out to the query builder and the data
//! context.
//!
//! # Modules
//!
//! - [`schema`]: descriptors declared by domain types
//! - [`mapping`]: validated table/column/member mappings
//! - [`registry`]: concurrent mapping cache
//! - [`value`]: bound parameter values and column type coercion
//! - [`dialect`]: provider-specific SQL
//! - [`materialize`]: result rows back into domain objects
//! - [`config`]: engine configuration

pub mod config;
pub mod dialect;
pub mod error;
pub mod mapping;
pub mod materialize;
pub mod registry;
pub mod schema;
pub mod value;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use config::EngineConfig;
pub use dialect::{DialectKind, PostgresDialect, SqlDialect, SqliteDialect};
pub use error::{CoreError, Result};
pub use mapping::{ColumnMapping, ForeignKey, Member, MemberKind, TableMapping};
pub use materialize::{CompositeResult, FromRow, Row};
pub use registry::TableMappingRegistry;
pub use schema::{ColumnDef, ForeignKeyDef, LinkRole, Model, ModelSchema, RelationDef};
pub use value::{ColumnType, FromSqlValue, SqlValue};
