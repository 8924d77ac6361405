//! Shared transaction handle.
//!
//! Every [`DataContext`](crate::DataContext) bound to a transaction holds a
//! clone of the same [`ContextTransaction`], so all of them run on the one
//! connection that opened it. Statements are serialized behind a mutex since
//! a connection runs one command at a time.

use std::fmt;
use std::sync::Arc;

use medql_core::Row;
use medql_query::BuiltStatement;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, StorageError};
use crate::traits::{Connection, ConnectionProvider};

struct TransactionInner {
    id: Uuid,
    /// `None` once committed or rolled back
    connection: Mutex<Option<Box<dyn Connection>>>,
}

impl Drop for TransactionInner {
    fn drop(&mut self) {
        if let Ok(connection) = self.connection.try_lock()
            && connection.is_some()
        {
            warn!(
                transaction = %self.id,
                "Transaction dropped without commit/rollback; the provider rolls it back"
            );
        }
    }
}

/// An open transaction shared by clones of one data context.
#[derive(Clone)]
pub struct ContextTransaction {
    inner: Arc<TransactionInner>,
}

impl ContextTransaction {
    /// Acquire a connection from `provider` and start a transaction on it.
    pub async fn begin(provider: &dyn ConnectionProvider) -> Result<Self> {
        let mut connection = provider.acquire().await?;
        connection.begin().await?;

        let id = Uuid::new_v4();
        debug!(transaction = %id, backend = provider.backend_name(), "Transaction started");
        Ok(Self {
            inner: Arc::new(TransactionInner {
                id,
                connection: Mutex::new(Some(connection)),
            }),
        })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Both handles refer to the same transaction.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub async fn is_active(&self) -> bool {
        self.inner.connection.lock().await.is_some()
    }

    pub async fn query(&self, statement: &BuiltStatement) -> Result<Vec<Row>> {
        let mut guard = self.inner.connection.lock().await;
        let connection = guard.as_deref_mut().ok_or_else(completed)?;
        connection.query(statement).await
    }

    pub async fn execute(&self, statement: &BuiltStatement) -> Result<u64> {
        let mut guard = self.inner.connection.lock().await;
        let connection = guard.as_deref_mut().ok_or_else(completed)?;
        connection.execute(statement).await
    }

    /// Commit and release the connection. Later use of any clone fails.
    pub async fn commit(&self) -> Result<()> {
        let mut connection = self.inner.connection.lock().await.take().ok_or_else(completed)?;
        connection.commit().await.map_err(|e| {
            StorageError::transaction_error(format!("Failed to commit transaction: {e}"))
        })?;
        debug!(transaction = %self.inner.id, "Transaction committed");
        Ok(())
    }

    pub async fn rollback(&self) -> Result<()> {
        let mut connection = self.inner.connection.lock().await.take().ok_or_else(completed)?;
        connection.rollback().await.map_err(|e| {
            StorageError::transaction_error(format!("Failed to roll back transaction: {e}"))
        })?;
        debug!(transaction = %self.inner.id, "Transaction rolled back");
        Ok(())
    }
}

impl fmt::Debug for ContextTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextTransaction")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

fn completed() -> StorageError {
    StorageError::transaction_error("Transaction already completed (committed or rolled back)")
}
