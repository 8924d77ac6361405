//! Table metadata registry.
//!
//! Holds the registered schema descriptors and lazily derives one
//! [`TableMapping`] per domain type. Mappings are handed out as `Arc`s so
//! repeated lookups return the same instance.
//!
//! Uses DashMap for lock-free reads; a miss takes the shard lock through the
//! entry API, re-checks, then populates.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::mapping::TableMapping;
use crate::schema::{Model, ModelSchema};

/// Registry of domain types and their table mappings.
#[derive(Debug, Default)]
pub struct TableMappingRegistry {
    /// Descriptors by type name
    schemas: DashMap<String, ModelSchema>,
    /// Table name -> type name
    tables: DashMap<String, String>,
    /// Derived mappings by type name
    mappings: DashMap<String, Arc<TableMapping>>,
}

impl TableMappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a domain type.
    pub fn register<T: Model>(&self) {
        self.register_schema(T::schema());
    }

    /// Register a descriptor directly.
    ///
    /// Re-registering a type replaces its descriptor but never an already
    /// derived mapping.
    pub fn register_schema(&self, schema: ModelSchema) {
        self.tables
            .insert(schema.table_name.clone(), schema.type_name.clone());
        self.schemas.insert(schema.type_name.clone(), schema);
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with<T: Model>(self) -> Self {
        self.register::<T>();
        self
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.schemas.contains_key(type_name)
    }

    /// Get the mapping for a registered type, deriving it on first use.
    pub fn mapping(&self, type_name: &str) -> Result<Arc<TableMapping>> {
        if let Some(mapping) = self.mappings.get(type_name) {
            return Ok(Arc::clone(mapping.value()));
        }

        match self.mappings.entry(type_name.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let schema = self
                    .schemas
                    .get(type_name)
                    .map(|s| s.value().clone())
                    .ok_or_else(|| CoreError::unknown_type(type_name))?;
                let mapping = Arc::new(TableMapping::from_schema(schema)?);
                tracing::debug!(
                    type_name,
                    table = %mapping.table_name,
                    columns = mapping.columns.len(),
                    "Derived table mapping"
                );
                entry.insert(Arc::clone(&mapping));
                Ok(mapping)
            }
        }
    }

    pub fn mapping_for<T: Model>(&self) -> Result<Arc<TableMapping>> {
        self.mapping(T::TYPE_NAME)
    }

    /// Get the mapping of the type stored in `table`.
    pub fn mapping_by_table(&self, table: &str) -> Result<Arc<TableMapping>> {
        let type_name = self
            .tables
            .get(table)
            .map(|t| t.value().clone())
            .ok_or_else(|| CoreError::UnknownTable(table.to_string()))?;
        self.mapping(&type_name)
    }

    /// Number of mappings derived so far.
    pub fn mapped_count(&self) -> usize {
        self.mappings.len()
    }
}
