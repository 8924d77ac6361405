//! Provider abstraction.
//!
//! A database provider hands out [`Connection`]s and names its SQL dialect.
//! Statements reach connections finalized, with `?` placeholders; the
//! connection rewrites them to the provider's positional form.

use std::sync::Arc;

use async_trait::async_trait;
use medql_core::{Row, SqlDialect};
use medql_query::BuiltStatement;

use crate::error::Result;

/// One database connection.
///
/// Connections are used by one caller at a time; shared transactions
/// serialize access through [`ContextTransaction`](crate::ContextTransaction).
#[async_trait]
pub trait Connection: Send {
    /// Runs a row-returning statement.
    async fn query(&mut self, statement: &BuiltStatement) -> Result<Vec<Row>>;

    /// Runs a statement and returns the number of affected rows.
    async fn execute(&mut self, statement: &BuiltStatement) -> Result<u64>;

    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

/// Source of connections for one database.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// An independent connection, not shared with any open transaction.
    async fn acquire(&self) -> Result<Box<dyn Connection>>;

    fn dialect(&self) -> Arc<dyn SqlDialect>;

    /// Name of the backend for logging.
    fn backend_name(&self) -> &'static str;
}
