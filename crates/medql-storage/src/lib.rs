//! Execution layer for MedQL.
//!
//! A database provider implements [`ConnectionProvider`]; a [`DataContext`]
//! built over it plans queries, runs them and materializes the rows into
//! domain objects or [`CompositeResult`](medql_core::CompositeResult) tuples.
//!
//! # Example
//!
//! ```ignore
//! use medql_query::QueryParameters;
//! use medql_storage::DataContext;
//!
//! let context = DataContext::new(provider, registry, EngineConfig::default());
//! let patients: Vec<Patient> = context
//!     .query::<Patient>(QueryParameters::new().with("name.given", "Jo*"))
//!     .await?
//!     .try_collect()?;
//!
//! let tx = context.begin().await?;
//! tx.insert(&mut patient).await?;
//! tx.commit().await?;
//! ```

pub mod context;
pub mod crud;
pub mod error;
pub mod traits;
pub mod transaction;

pub use context::{DataContext, ResultSet};
pub use error::{ErrorCategory, Result, StorageError};
pub use traits::{Connection, ConnectionProvider};
pub use transaction::ContextTransaction;
