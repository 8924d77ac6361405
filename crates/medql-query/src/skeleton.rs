//! Join skeletons: the FROM clause of a type plus its always-joined parents.
//!
//! A skeleton depends only on table metadata and the alias prefix, never on
//! the filter, so it is computed once per `(alias prefix, type)` and shared.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use medql_core::{ColumnMapping, Member, MemberKind, TableMapping, TableMappingRegistry};
use tracing::{debug, trace};

use crate::error::Result;
use crate::statement::JoinKind;

/// A table reachable from the skeleton's FROM clause.
#[derive(Debug, Clone)]
pub struct ScopedTable {
    pub alias: String,
    pub mapping: Arc<TableMapping>,
}

impl ScopedTable {
    pub fn qualify(&self, column: &str) -> String {
        format!("{}.{column}", self.alias)
    }
}

/// A column resolved to the scoped table holding it.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedColumn<'a> {
    pub table: &'a ScopedTable,
    pub column: &'a ColumnMapping,
}

impl ResolvedColumn<'_> {
    pub fn qualified(&self) -> String {
        self.table.qualify(&self.column.name)
    }
}

/// FROM clause and join chain for one `(alias prefix, type)` pair.
#[derive(Debug, Clone)]
pub struct Skeleton {
    pub type_name: String,
    pub alias_prefix: String,
    /// `table AS alias [INNER|LEFT JOIN parent AS alias ON (..)]*`
    pub from: String,
    /// The queried table first, then joined parents in join order
    pub tables: Vec<ScopedTable>,
}

impl Skeleton {
    /// Follow always-join columns transitively from `type_name`.
    ///
    /// Worklist traversal; a table already in scope is never joined twice.
    pub fn build(
        registry: &TableMappingRegistry,
        type_name: &str,
        alias_prefix: &str,
    ) -> Result<Self> {
        let root = registry.mapping(type_name)?;
        let root_alias = format!("{alias_prefix}{}", root.table_name);
        let mut from = format!("{} AS {root_alias}", root.table_name);
        let mut tables = vec![ScopedTable {
            alias: root_alias,
            mapping: root,
        }];

        let mut pending = vec![0];
        while let Some(index) = pending.pop() {
            let scope = tables[index].clone();
            for column in scope.mapping.always_join_columns() {
                let Some(fk) = &column.foreign_key else {
                    continue;
                };
                if tables.iter().any(|t| t.mapping.table_name == fk.table) {
                    continue;
                }

                let parent = registry.mapping_by_table(&fk.table)?;
                let alias = format!("{alias_prefix}{}", fk.table);
                let kind = if column.is_non_null {
                    JoinKind::Inner
                } else {
                    JoinKind::Left
                };
                from.push_str(&format!(
                    " {} {} AS {alias} ON ({} = {alias}.{})",
                    kind.as_sql(),
                    fk.table,
                    scope.qualify(&column.name),
                    fk.column
                ));
                trace!(from = %scope.alias, to = %alias, "Joined always-join parent");

                tables.push(ScopedTable {
                    alias,
                    mapping: parent,
                });
                pending.push(tables.len() - 1);
            }
        }

        Ok(Self {
            type_name: type_name.to_string(),
            alias_prefix: alias_prefix.to_string(),
            from,
            tables,
        })
    }

    pub fn root(&self) -> &ScopedTable {
        &self.tables[0]
    }

    pub fn table(&self, table_name: &str) -> Option<&ScopedTable> {
        self.tables
            .iter()
            .find(|t| t.mapping.table_name == table_name)
    }

    /// Find the scoped table mapped to `type_name`.
    pub fn table_for_type(&self, type_name: &str) -> Option<&ScopedTable> {
        self.tables.iter().find(|t| t.mapping.type_name == type_name)
    }

    /// Find a member by serialization name, own table first.
    pub fn member(&self, name: &str) -> Option<(&ScopedTable, &Member)> {
        self.tables
            .iter()
            .find_map(|t| t.mapping.member(name).map(|m| (t, m)))
    }

    /// Resolve a column member by serialization name, then by property name.
    pub fn column(&self, name: &str) -> Option<ResolvedColumn<'_>> {
        let by_member = self.tables.iter().find_map(|table| match table.mapping.member(name) {
            Some(Member {
                kind: MemberKind::Column { column },
                ..
            }) => table
                .mapping
                .column(column)
                .map(|column| ResolvedColumn { table, column }),
            _ => None,
        });
        by_member.or_else(|| {
            self.tables.iter().find_map(|table| {
                table
                    .mapping
                    .column_by_property(name)
                    .map(|column| ResolvedColumn { table, column })
            })
        })
    }

    /// First classifier declared in scope, own table first.
    pub fn classifier(&self) -> Option<&str> {
        self.tables
            .iter()
            .find_map(|t| t.mapping.classifier.as_deref())
    }
}

/// Point-in-time skeleton cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkeletonCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Concurrent cache of join skeletons keyed by `(alias prefix, type)`.
#[derive(Debug, Default)]
pub struct SkeletonCache {
    skeletons: DashMap<(String, String), Arc<Skeleton>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SkeletonCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached skeleton or build and insert it.
    pub fn get_or_build(
        &self,
        registry: &TableMappingRegistry,
        type_name: &str,
        alias_prefix: &str,
    ) -> Result<Arc<Skeleton>> {
        let key = (alias_prefix.to_string(), type_name.to_string());
        if let Some(skeleton) = self.skeletons.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(skeleton.value()));
        }

        match self.skeletons.entry(key) {
            Entry::Occupied(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Arc::clone(entry.get()))
            }
            Entry::Vacant(entry) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                let skeleton = Arc::new(Skeleton::build(registry, type_name, alias_prefix)?);
                debug!(type_name, alias_prefix, from = %skeleton.from, "Cached join skeleton");
                entry.insert(Arc::clone(&skeleton));
                Ok(skeleton)
            }
        }
    }

    pub fn stats(&self) -> SkeletonCacheStats {
        SkeletonCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.skeletons.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.skeletons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skeletons.is_empty()
    }

    /// Drop every cached skeleton (after a schema reload).
    pub fn clear(&self) {
        self.skeletons.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medql_core::fixtures::fixture_registry;

    #[test]
    fn test_skeleton_follows_always_join_chain() {
        let registry = fixture_registry();
        let skeleton = Skeleton::build(&registry, "Practitioner", "").unwrap();

        assert_eq!(
            skeleton.from,
            "practitioner AS practitioner \
             INNER JOIN person AS person ON (practitioner.id = person.id) \
             INNER JOIN entity AS entity ON (person.id = entity.id)"
        );
        let aliases: Vec<_> = skeleton.tables.iter().map(|t| t.alias.as_str()).collect();
        assert_eq!(aliases, ["practitioner", "person", "entity"]);
    }

    #[test]
    fn test_skeleton_without_parents() {
        let registry = fixture_registry();
        let skeleton = Skeleton::build(&registry, "Patient", "sq0_").unwrap();
        assert_eq!(skeleton.from, "patient AS sq0_patient");
        assert_eq!(skeleton.tables.len(), 1);
    }

    #[test]
    fn test_column_resolution_across_scope() {
        let registry = fixture_registry();
        let skeleton = Skeleton::build(&registry, "Practitioner", "p_").unwrap();

        // Own table wins for the shared `id`
        assert_eq!(skeleton.column("id").unwrap().qualified(), "p_practitioner.id");
        assert_eq!(skeleton.column("name").unwrap().qualified(), "p_person.name");
        // Serialized name and property name both resolve
        assert_eq!(
            skeleton.column("obsoletionTime").unwrap().qualified(),
            "p_entity.obsoletion_time"
        );
        assert_eq!(
            skeleton.column("obsoletion_time").unwrap().qualified(),
            "p_entity.obsoletion_time"
        );
        assert!(skeleton.column("nickname").is_none());
    }

    #[test]
    fn test_cache_hits_and_misses() {
        let registry = fixture_registry();
        let cache = SkeletonCache::new();

        let first = cache.get_or_build(&registry, "Person", "").unwrap();
        let second = cache.get_or_build(&registry, "Person", "").unwrap();
        let other = cache.get_or_build(&registry, "Person", "sq0_").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(
            cache.stats(),
            SkeletonCacheStats {
                hits: 1,
                misses: 2,
                entries: 2
            }
        );

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_unknown_type() {
        let registry = fixture_registry();
        let cache = SkeletonCache::new();
        assert!(cache.get_or_build(&registry, "Ghost", "").is_err());
        assert_eq!(cache.len(), 0);
    }
}
