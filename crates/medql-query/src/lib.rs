//! Statement building and query planning for MedQL.
//!
//! [`QueryBuilder`] turns a domain type plus either a predicate [`Expr`] or a
//! set of [`QueryParameters`] into a parameterized [`SqlStatement`]. All
//! values travel as bound parameters behind `?` placeholders; dialects
//! rewrite them to positional form when the statement is executed.
//!
//! ```text
//! name.given=Jo*
//!   -> WITH cte0 AS (SELECT sq0_patient_name.id FROM patient_name AS sq0_patient_name
//!                    WHERE sq0_patient_name.given ILIKE ? ESCAPE '\')
//!      SELECT * FROM patient AS patient INNER JOIN cte0 ON (patient.name_id = cte0.id)
//! ```

pub mod encoder;
pub mod error;
pub mod expr;
pub mod grammar;
pub mod planner;
pub mod skeleton;
pub mod statement;
pub mod translator;

pub use encoder::{ColumnPredicateEncoder, FilterOp, ValueFilter, escape_like_pattern};
pub use error::{QueryError, Result};
pub use expr::{BinaryOp, Expr};
pub use grammar::{QueryControls, QueryKey, QueryParameters, QueryValue};
pub use planner::{Projection, QueryBuilder, QueryFilter};
pub use skeleton::{ResolvedColumn, ScopedTable, Skeleton, SkeletonCache, SkeletonCacheStats};
pub use statement::{BuiltStatement, JoinKind, SqlStatement};
pub use translator::PredicateTranslator;
