//! `Connection` and `ConnectionProvider` over a sqlx PostgreSQL pool.
//!
//! Statements arrive with `?` placeholders. Null parameters are written into
//! the SQL as `NULL` so the server infers their type from context, the rest
//! are bound to `$1..$n`.

use std::sync::Arc;

use async_trait::async_trait;
use medql_core::{PostgresDialect, Row, SqlDialect, SqlValue};
use medql_query::BuiltStatement;
use medql_storage::{Connection, ConnectionProvider, Result, StorageError};
use sqlx_core::column::Column as _;
use sqlx_core::error::Error as SqlxError;
use sqlx_core::pool::PoolConnection;
use sqlx_core::query::Query;
use sqlx_core::row::Row as _;
use sqlx_core::transaction::Transaction;
use sqlx_core::type_info::TypeInfo as _;
use sqlx_postgres::{PgArguments, PgConnection, PgPool, PgRow, Postgres};
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::config::PostgresConfig;
use crate::error::translate;
use crate::pool::create_pool;

/// Hands out pooled PostgreSQL connections.
#[derive(Clone)]
pub struct PgConnectionProvider {
    pool: PgPool,
    dialect: Arc<dyn SqlDialect>,
}

impl PgConnectionProvider {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            dialect: Arc::new(PostgresDialect),
        }
    }

    /// Creates the pool described by `config`.
    pub async fn connect(config: &PostgresConfig) -> crate::Result<Self> {
        Ok(Self::new(create_pool(config).await?))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl std::fmt::Debug for PgConnectionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnectionProvider")
            .field("size", &self.pool.size())
            .field("idle", &self.pool.num_idle())
            .finish()
    }
}

#[async_trait]
impl ConnectionProvider for PgConnectionProvider {
    async fn acquire(&self) -> Result<Box<dyn Connection>> {
        let connection = self.pool.acquire().await.map_err(translate)?;
        Ok(Box::new(PostgresConnection {
            pool: self.pool.clone(),
            state: State::Idle(connection),
        }))
    }

    fn dialect(&self) -> Arc<dyn SqlDialect> {
        Arc::clone(&self.dialect)
    }

    fn backend_name(&self) -> &'static str {
        "postgresql"
    }
}

enum State {
    Idle(PoolConnection<Postgres>),
    Transaction(Transaction<'static, Postgres>),
    /// Returned to the pool after commit or rollback; reacquired on next use
    Released,
}

/// One pooled connection, optionally inside a transaction.
pub struct PostgresConnection {
    pool: PgPool,
    state: State,
}

impl PostgresConnection {
    async fn connection(&mut self) -> Result<&mut PgConnection> {
        if matches!(self.state, State::Released) {
            self.state = State::Idle(self.pool.acquire().await.map_err(translate)?);
        }
        match &mut self.state {
            State::Idle(c) => Ok(&mut **c),
            State::Transaction(tx) => Ok(&mut **tx),
            State::Released => Err(StorageError::transaction_error("connection released")),
        }
    }

    fn take_transaction(&mut self) -> Result<Transaction<'static, Postgres>> {
        match std::mem::replace(&mut self.state, State::Released) {
            State::Transaction(tx) => Ok(tx),
            other => {
                self.state = other;
                Err(StorageError::transaction_error("No transaction is open"))
            }
        }
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn query(&mut self, statement: &BuiltStatement) -> Result<Vec<Row>> {
        let statement = statement.with_null_literals();
        let sql = statement.to_positional(&PostgresDialect);
        trace!(sql = %sql, "Fetching rows");

        let connection = self.connection().await?;
        let rows = bind(&sql, statement.params())
            .fetch_all(connection)
            .await
            .map_err(translate)?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&mut self, statement: &BuiltStatement) -> Result<u64> {
        let statement = statement.with_null_literals();
        let sql = statement.to_positional(&PostgresDialect);
        trace!(sql = %sql, "Executing");

        let connection = self.connection().await?;
        let done = bind(&sql, statement.params())
            .execute(connection)
            .await
            .map_err(translate)?;
        Ok(done.rows_affected())
    }

    async fn begin(&mut self) -> Result<()> {
        if matches!(self.state, State::Transaction(_)) {
            return Err(StorageError::transaction_error(
                "Connection is already in a transaction",
            ));
        }
        // The idle connection goes back to the pool; the transaction checks out its own.
        self.state = State::Released;
        let tx = self.pool.begin().await.map_err(translate)?;
        self.state = State::Transaction(tx);
        debug!("BEGIN");
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.take_transaction()?.commit().await.map_err(translate)?;
        debug!("COMMIT");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.take_transaction()?.rollback().await.map_err(translate)?;
        debug!("ROLLBACK");
        Ok(())
    }
}

fn bind<'q>(sql: &'q str, params: &[SqlValue]) -> Query<'q, Postgres, PgArguments> {
    params
        .iter()
        .fold(sqlx_core::query::query::<Postgres>(sql), |query, value| {
            match value {
                SqlValue::Null => query.bind(None::<String>),
                SqlValue::Bool(b) => query.bind(*b),
                SqlValue::Int(i) => query.bind(*i),
                SqlValue::Float(f) => query.bind(*f),
                SqlValue::Text(s) => query.bind(s.clone()),
                SqlValue::Uuid(u) => query.bind(*u),
                SqlValue::Date(d) => query.bind(*d),
                SqlValue::Timestamp(ts) => query.bind(*ts),
            }
        })
}

fn decode_row(row: &PgRow) -> Result<Row> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        values.push(decode_value(row, index, column.type_info().name()).map_err(translate)?);
    }
    Ok(Row::new(columns, values))
}

/// Reads one cell by its PostgreSQL type name. Unlisted types are read as text.
fn decode_value(
    row: &PgRow,
    index: usize,
    type_name: &str,
) -> std::result::Result<SqlValue, SqlxError> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(SqlValue::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)?
            .map(|v| SqlValue::Int(v.into())),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)?
            .map(|v| SqlValue::Int(v.into())),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map(SqlValue::Int),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)?
            .map(|v| SqlValue::Float(v.into())),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(SqlValue::Float),
        "UUID" => row.try_get::<Option<Uuid>, _>(index)?.map(SqlValue::Uuid),
        "DATE" => row.try_get::<Option<Date>, _>(index)?.map(SqlValue::Date),
        "TIMESTAMPTZ" => row
            .try_get::<Option<OffsetDateTime>, _>(index)?
            .map(SqlValue::Timestamp),
        "TIMESTAMP" => row
            .try_get::<Option<PrimitiveDateTime>, _>(index)?
            .map(|ts| SqlValue::Timestamp(ts.assume_utc())),
        _ => row.try_get::<Option<String>, _>(index)?.map(SqlValue::Text),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}
