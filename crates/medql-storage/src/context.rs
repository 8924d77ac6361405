//! Statement execution and materialization.
//!
//! A [`DataContext`] plans queries with its [`QueryBuilder`], runs them on a
//! connection and maps rows back into domain objects. Outside a transaction
//! every call acquires its own connection; inside one, every call (from any
//! clone of the context) runs on the transaction's connection.

use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::stream::{self, Stream};
use medql_core::{EngineConfig, FromRow, Model, Row, SqlValue, TableMappingRegistry};
use medql_query::grammar::COUNT_PARAM;
use medql_query::{Projection, QueryBuilder, QueryFilter, SqlStatement};
use tracing::{debug, instrument, trace};

use crate::crud;
use crate::error::{Result, StorageError};
use crate::traits::ConnectionProvider;
use crate::transaction::ContextTransaction;

/// Rows of one query, materialized as they are consumed.
pub struct ResultSet<T> {
    rows: std::vec::IntoIter<Row>,
    registry: Arc<TableMappingRegistry>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromRow> ResultSet<T> {
    fn new(rows: Vec<Row>, registry: Arc<TableMappingRegistry>) -> Self {
        Self {
            rows: rows.into_iter(),
            registry,
            _marker: PhantomData,
        }
    }

    /// Rows not yet materialized.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    /// Materialize every remaining row, failing on the first bad one.
    pub fn try_collect(self) -> Result<Vec<T>> {
        self.collect()
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<T>> {
        stream::iter(self)
    }
}

impl<T: FromRow> Iterator for ResultSet<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some(T::from_row(&row, &self.registry).map_err(StorageError::from))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

/// Executes planned statements against a provider.
#[derive(Clone)]
pub struct DataContext {
    provider: Arc<dyn ConnectionProvider>,
    builder: Arc<QueryBuilder>,
    transaction: Option<ContextTransaction>,
}

impl DataContext {
    /// Context over `provider`; statements use the provider's dialect.
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        registry: Arc<TableMappingRegistry>,
        config: EngineConfig,
    ) -> Self {
        let builder = QueryBuilder::new(registry, config).with_dialect(provider.dialect());
        Self::with_builder(provider, builder)
    }

    pub fn with_builder(provider: Arc<dyn ConnectionProvider>, builder: QueryBuilder) -> Self {
        Self {
            provider,
            builder: Arc::new(builder),
            transaction: None,
        }
    }

    pub fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    pub fn registry(&self) -> &Arc<TableMappingRegistry> {
        self.builder.registry()
    }

    pub fn transaction(&self) -> Option<&ContextTransaction> {
        self.transaction.as_ref()
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// A context whose statements run in a transaction.
    ///
    /// Inside a transaction this returns a context on the same transaction;
    /// a second one is never opened.
    pub async fn begin(&self) -> Result<DataContext> {
        if self.transaction.is_some() {
            trace!("Reusing open transaction");
            return Ok(self.clone());
        }
        let transaction = ContextTransaction::begin(self.provider.as_ref()).await?;
        Ok(Self {
            transaction: Some(transaction),
            ..self.clone()
        })
    }

    pub async fn commit(&self) -> Result<()> {
        self.current_transaction()?.commit().await
    }

    pub async fn rollback(&self) -> Result<()> {
        self.current_transaction()?.rollback().await
    }

    fn current_transaction(&self) -> Result<&ContextTransaction> {
        self.transaction
            .as_ref()
            .ok_or_else(|| StorageError::transaction_error("No transaction is open"))
    }

    /// Run a row-returning statement.
    pub async fn fetch(&self, statement: SqlStatement) -> Result<Vec<Row>> {
        let built = statement.build()?;
        debug!(statement = %built, "Executing query");
        let rows = match &self.transaction {
            Some(transaction) => transaction.query(&built).await?,
            None => self.provider.acquire().await?.query(&built).await?,
        };
        trace!(rows = rows.len(), "Query returned");
        Ok(rows)
    }

    /// Run a statement; returns the affected row count.
    pub async fn execute(&self, statement: SqlStatement) -> Result<u64> {
        let built = statement.build()?;
        debug!(statement = %built, "Executing statement");
        match &self.transaction {
            Some(transaction) => transaction.execute(&built).await,
            None => self.provider.acquire().await?.execute(&built).await,
        }
    }

    /// Query `T`, a model or a [`CompositeResult`](medql_core::CompositeResult)
    /// rooted at its first slot type.
    #[instrument(skip(self, filter), fields(result = ?T::result_types()))]
    pub async fn query<T: FromRow>(&self, filter: impl Into<QueryFilter>) -> Result<ResultSet<T>> {
        let statement = self.plan::<T>(&filter.into())?;
        let rows = self.fetch(statement).await?;
        Ok(ResultSet::new(rows, Arc::clone(self.registry())))
    }

    /// First row of the query, if any.
    ///
    /// A `_count` parameter is overridden; `_offset` and `_orderBy` apply.
    pub async fn first<T: FromRow>(&self, filter: impl Into<QueryFilter>) -> Result<Option<T>> {
        let statement = match filter.into() {
            QueryFilter::Parameters(mut params) => {
                params.set(COUNT_PARAM, "1");
                self.plan::<T>(&QueryFilter::Parameters(params))?
            }
            filter => self.plan::<T>(&filter)?.limit(1),
        };
        let rows = self.fetch(statement).await?;
        rows.first()
            .map(|row| T::from_row(row, self.registry()).map_err(StorageError::from))
            .transpose()
    }

    pub async fn count<T: Model>(&self, filter: impl Into<QueryFilter>) -> Result<u64> {
        let statement = self
            .builder
            .create_count_query(T::TYPE_NAME, &filter.into(), "")?;
        let rows = self.fetch(statement).await?;
        match rows.first().and_then(|row| row.get(0)) {
            Some(SqlValue::Int(count)) => u64::try_from(*count)
                .map_err(|_| StorageError::materialization(format!("negative count {count}"))),
            other => Err(StorageError::materialization(format!(
                "COUNT(*) returned {other:?}"
            ))),
        }
    }

    pub async fn exists<T: Model>(&self, filter: impl Into<QueryFilter>) -> Result<bool> {
        Ok(self.count::<T>(filter).await? > 0)
    }

    /// Insert `model`, filling generated columns from the database.
    #[instrument(skip(self, model), fields(type_name = T::TYPE_NAME))]
    pub async fn insert<T: Model>(&self, model: &mut T) -> Result<()> {
        let mapping = self.registry().mapping(T::TYPE_NAME)?;
        let insert = crud::insert(&mapping, model, self.builder.dialect())?;

        if insert.returning.is_empty() {
            self.execute(insert.statement).await?;
            return Ok(());
        }

        let rows = self.fetch(insert.statement).await?;
        let Some(row) = rows.first() else {
            return Err(StorageError::materialization(format!(
                "INSERT INTO {} returned no row",
                mapping.table_name
            )));
        };
        for (index, column) in insert.returning.iter().enumerate() {
            let value = row.get(index).cloned().ok_or_else(|| {
                StorageError::materialization(format!("generated column '{}' missing", column.name))
            })?;
            model.set(&column.property, value)?;
        }
        Ok(())
    }

    /// Update `model` by primary key.
    pub async fn update<T: Model>(&self, model: &T) -> Result<()> {
        let mapping = self.registry().mapping(T::TYPE_NAME)?;
        let affected = self.execute(crud::update(&mapping, model)?).await?;
        if affected == 0 {
            return Err(StorageError::not_found(
                T::TYPE_NAME,
                crud::describe_key(&mapping, model),
            ));
        }
        Ok(())
    }

    /// Delete `model` by primary key.
    pub async fn delete<T: Model>(&self, model: &T) -> Result<()> {
        let mapping = self.registry().mapping(T::TYPE_NAME)?;
        let affected = self.execute(crud::delete(&mapping, model)?).await?;
        if affected == 0 {
            return Err(StorageError::not_found(
                T::TYPE_NAME,
                crud::describe_key(&mapping, model),
            ));
        }
        Ok(())
    }

    fn plan<T: FromRow>(&self, filter: &QueryFilter) -> Result<SqlStatement> {
        let types = T::result_types();
        let Some(root) = types.first().copied() else {
            return Err(StorageError::materialization("result shape names no type"));
        };
        let projection = match types.as_slice() {
            [single] => Projection::Type(single.to_string()),
            many => Projection::Types(many.iter().map(|t| t.to_string()).collect()),
        };
        Ok(self
            .builder
            .create_query(root, filter, "", Some(&projection))?)
    }
}

impl std::fmt::Debug for DataContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataContext")
            .field("backend", &self.provider.backend_name())
            .field("transaction", &self.transaction)
            .finish_non_exhaustive()
    }
}
