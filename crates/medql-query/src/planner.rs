//! Query planner.
//!
//! [`QueryBuilder::create_query`] compiles a domain type plus a predicate or
//! a query-parameter set into one statement:
//!
//! ```text
//! WITH cte0 AS (..), ..                 -- to-one relationship filters
//! SELECT <projection>
//! FROM <join skeleton>                  -- type + always-joined parents
//! [INNER JOIN cteN ON (fk = cteN.key)]*
//! WHERE <column predicates>
//!   AND key IN (<sub-query> [INTERSECT <sub-query>]*)   -- to-many filters
//! [ORDER BY ..] [LIMIT ?] [OFFSET ?]
//! ```
//!
//! Relationship parameters are grouped by property, then partitioned by
//! guard and cast. Each partition recurses into the related type with a
//! fresh `sqN_` alias prefix; partitions on one property are intersected.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;
use medql_core::{
    ColumnMapping, CoreError, EngineConfig, LinkRole, MemberKind, Model, SqlDialect, TableMapping,
    TableMappingRegistry,
};
use tracing::{debug, instrument, trace};

use crate::encoder::ColumnPredicateEncoder;
use crate::error::{QueryError, Result};
use crate::expr::Expr;
use crate::grammar::{QueryKey, QueryParameters, QueryValue, split_guard};
use crate::skeleton::{ScopedTable, Skeleton, SkeletonCache, SkeletonCacheStats};
use crate::statement::{JoinKind, SqlStatement};
use crate::translator::PredicateTranslator;

/// What to filter a query by.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum QueryFilter {
    #[default]
    None,
    Predicate(Expr),
    Parameters(QueryParameters),
}

impl From<Expr> for QueryFilter {
    fn from(expr: Expr) -> Self {
        Self::Predicate(expr)
    }
}

impl From<QueryParameters> for QueryFilter {
    fn from(params: QueryParameters) -> Self {
        Self::Parameters(params)
    }
}

/// The SELECT list of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// `*`
    Star,
    /// Every mapped column of one type in the join skeleton
    Type(String),
    /// Every mapped column of each type, in order (composite rows)
    Types(Vec<String>),
    /// Individual members, resolved to their joined table
    Properties(Vec<String>),
}

impl Projection {
    pub fn of<T: Model>() -> Self {
        Self::Type(T::TYPE_NAME.to_string())
    }
}

#[derive(Clone, Copy)]
enum SelectList<'a> {
    Projection(Option<&'a Projection>),
    Column { table: &'a str, column: &'a str },
    One,
}

#[derive(Clone, Copy)]
enum FilterRef<'a> {
    None,
    Predicate(&'a Expr),
    Parameters(&'a QueryParameters),
}

/// Alias and CTE counters scoped to one top-level call.
#[derive(Debug, Default)]
struct PlanContext {
    subqueries: usize,
    ctes: Vec<SqlStatement>,
    depth: usize,
}

impl PlanContext {
    fn next_prefix(&mut self) -> String {
        let prefix = format!("sq{}_", self.subqueries);
        self.subqueries += 1;
        prefix
    }

    /// Register a CTE body and return its name.
    fn push_cte(&mut self, body: SqlStatement) -> String {
        let name = format!("cte{}", self.ctes.len());
        self.ctes.push(
            SqlStatement::from_sql(format!("{name} AS ("))
                .append_statement(body)
                .append_sql(")"),
        );
        name
    }

    /// Prefix the main statement with the collected CTEs.
    fn finish(self, main: SqlStatement) -> Result<SqlStatement> {
        if self.ctes.is_empty() {
            return Ok(main);
        }
        let mut with = SqlStatement::from_sql("WITH ");
        for cte in self.ctes {
            with = with.append_statement(cte).append_sql(", ");
        }
        Ok(with.remove_last()?.append_sql(" ").append_statement(main))
    }
}

/// Partition of one relationship property's parameters.
///
/// Guards compare as value sets, so `[A|B]` and `[B|A]` share a partition
/// and the first spelling seen is the one planned.
#[derive(Debug, Clone)]
struct GroupKey {
    guard: Option<String>,
    cast: Option<String>,
    /// Sub-property starts with the reverse link marker
    reverse: bool,
}

impl GroupKey {
    fn guard_values(&self) -> Vec<String> {
        split_guard(self.guard.as_deref())
    }

    fn guard_set(&self) -> Option<BTreeSet<String>> {
        self.guard.as_ref().map(|_| self.guard_values().into_iter().collect())
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.guard_set() == other.guard_set()
            && self.cast == other.cast
            && self.reverse == other.reverse
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.guard_set().hash(state);
        self.cast.hash(state);
        self.reverse.hash(state);
    }
}

type Entry<'a> = (QueryKey, &'a QueryValue);

fn intersect(body: SqlStatement, next: SqlStatement) -> SqlStatement {
    if body.is_empty() {
        next
    } else {
        body.append_sql(" INTERSECT ").append_statement(next)
    }
}

fn in_subquery(column_sql: &str, body: SqlStatement) -> SqlStatement {
    SqlStatement::from_sql(format!("{column_sql} IN ("))
        .append_statement(body)
        .append_sql(")")
}

/// Compiles filters over domain types into SQL statements.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    registry: Arc<TableMappingRegistry>,
    dialect: Arc<dyn SqlDialect>,
    skeletons: Arc<SkeletonCache>,
    config: EngineConfig,
}

impl QueryBuilder {
    /// Builder with the dialect selected by `config` and a private skeleton cache.
    pub fn new(registry: Arc<TableMappingRegistry>, config: EngineConfig) -> Self {
        Self {
            registry,
            dialect: config.dialect.dialect(),
            skeletons: Arc::new(SkeletonCache::new()),
            config,
        }
    }

    #[must_use]
    pub fn with_dialect(mut self, dialect: Arc<dyn SqlDialect>) -> Self {
        self.dialect = dialect;
        self
    }

    /// Share a skeleton cache between builders.
    #[must_use]
    pub fn with_skeleton_cache(mut self, cache: Arc<SkeletonCache>) -> Self {
        self.skeletons = cache;
        self
    }

    pub fn registry(&self) -> &Arc<TableMappingRegistry> {
        &self.registry
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn skeleton_stats(&self) -> SkeletonCacheStats {
        self.skeletons.stats()
    }

    /// Join skeleton for `(alias_prefix, type_name)`, cached when enabled.
    pub fn skeleton(&self, type_name: &str, alias_prefix: &str) -> Result<Arc<Skeleton>> {
        if self.config.cache_skeletons {
            self.skeletons
                .get_or_build(&self.registry, type_name, alias_prefix)
        } else {
            Ok(Arc::new(Skeleton::build(
                &self.registry,
                type_name,
                alias_prefix,
            )?))
        }
    }

    /// Plan a query over `type_name`.
    ///
    /// `_count`, `_offset` and `_orderBy` parameters become LIMIT, OFFSET and
    /// ORDER BY; all other parameters must name members of the type.
    #[instrument(skip(self, filter, projection))]
    pub fn create_query(
        &self,
        type_name: &str,
        filter: &QueryFilter,
        alias_prefix: &str,
        projection: Option<&Projection>,
    ) -> Result<SqlStatement> {
        let mut ctx = PlanContext::default();
        let statement = match filter {
            QueryFilter::Parameters(params) => {
                let (params, controls) = params.split_controls()?;
                let statement = self.plan(
                    &mut ctx,
                    type_name,
                    alias_prefix,
                    SelectList::Projection(projection),
                    FilterRef::Parameters(&params),
                )?;
                let mut statement =
                    self.order_by(statement, type_name, alias_prefix, &controls.order_by)?;
                if let Some(count) = controls.count {
                    statement = statement.limit(count);
                }
                if let Some(offset) = controls.offset {
                    statement = statement.offset(offset);
                }
                statement
            }
            QueryFilter::Predicate(expr) => self.plan(
                &mut ctx,
                type_name,
                alias_prefix,
                SelectList::Projection(projection),
                FilterRef::Predicate(expr),
            )?,
            QueryFilter::None => self.plan(
                &mut ctx,
                type_name,
                alias_prefix,
                SelectList::Projection(projection),
                FilterRef::None,
            )?,
        };

        debug!(
            subqueries = ctx.subqueries,
            ctes = ctx.ctes.len(),
            "Planned query"
        );
        ctx.finish(statement)
    }

    /// `SELECT COUNT(*)` over the rows the filter matches.
    ///
    /// Paging and ordering parameters are ignored.
    #[instrument(skip(self, filter))]
    pub fn create_count_query(
        &self,
        type_name: &str,
        filter: &QueryFilter,
        alias_prefix: &str,
    ) -> Result<SqlStatement> {
        let mut ctx = PlanContext::default();
        let stripped;
        let filter = match filter {
            QueryFilter::None => FilterRef::None,
            QueryFilter::Predicate(expr) => FilterRef::Predicate(expr),
            QueryFilter::Parameters(params) => {
                stripped = params.split_controls()?.0;
                FilterRef::Parameters(&stripped)
            }
        };
        let inner = self.plan(&mut ctx, type_name, alias_prefix, SelectList::One, filter)?;
        let count = SqlStatement::from_sql("SELECT COUNT(*) FROM (")
            .append_statement(inner)
            .append_sql(") AS q");
        ctx.finish(count)
    }

    /// Append `ORDER BY` for `(member, descending)` pairs.
    pub fn order_by(
        &self,
        statement: SqlStatement,
        type_name: &str,
        alias_prefix: &str,
        fields: &[(String, bool)],
    ) -> Result<SqlStatement> {
        if fields.is_empty() {
            return Ok(statement);
        }
        let skeleton = self.skeleton(type_name, alias_prefix)?;
        let mut statement = statement.append_sql(" ORDER BY ");
        for (field, descending) in fields {
            let column = skeleton
                .column(field)
                .ok_or_else(|| CoreError::unresolvable_member(type_name, field))?;
            let direction = if *descending { "DESC" } else { "ASC" };
            statement = statement
                .append_sql(format!("{} {direction}", column.qualified()))
                .append_sql(", ");
        }
        statement.remove_last()
    }

    /// Inner-join `right_type` onto `statement`, inferring the key columns
    /// from the registry. Falls back to same-named columns only when the
    /// engine enables `natural_join_fallback`.
    pub fn inner_join(
        &self,
        statement: SqlStatement,
        left_type: &str,
        left_alias: &str,
        right_type: &str,
        right_alias: &str,
    ) -> Result<SqlStatement> {
        let left = self.registry.mapping(left_type)?;
        let right = self.registry.mapping(right_type)?;
        statement.inner_join(
            &left,
            left_alias,
            &right,
            right_alias,
            self.config.natural_join_fallback,
        )
    }

    fn plan(
        &self,
        ctx: &mut PlanContext,
        type_name: &str,
        alias_prefix: &str,
        select: SelectList<'_>,
        filter: FilterRef<'_>,
    ) -> Result<SqlStatement> {
        ctx.depth += 1;
        if ctx.depth > self.config.max_subquery_depth {
            return Err(QueryError::QueryTooComplex(format!(
                "sub-queries nested deeper than {} levels at {type_name}",
                self.config.max_subquery_depth
            )));
        }

        let skeleton = self.skeleton(type_name, alias_prefix)?;
        let select_list = self.select_list(&skeleton, select)?;
        let mut joins = SqlStatement::new();
        let conditions = match filter {
            FilterRef::None => SqlStatement::new(),
            FilterRef::Predicate(expr) => {
                PredicateTranslator::new(&skeleton, self.dialect.as_ref()).translate(expr)?
            }
            FilterRef::Parameters(params) => {
                self.plan_parameters(ctx, &skeleton, params, &mut joins)?
            }
        };
        ctx.depth -= 1;

        Ok(SqlStatement::from_sql("SELECT ")
            .append_statement(select_list)
            .append_sql(" FROM ")
            .append_sql(skeleton.from.clone())
            .append_statement(joins)
            .where_clause(conditions))
    }

    fn select_list(&self, skeleton: &Skeleton, select: SelectList<'_>) -> Result<SqlStatement> {
        let table_for = |type_name: &str| {
            skeleton.table_for_type(type_name).ok_or_else(|| {
                QueryError::cannot_resolve(
                    &skeleton.type_name,
                    type_name,
                    "type is not joined into the query",
                )
            })
        };

        let columns: Vec<String> = match select {
            SelectList::One => vec!["1".to_string()],
            SelectList::Projection(None | Some(Projection::Star)) => vec!["*".to_string()],
            SelectList::Projection(Some(Projection::Type(type_name))) => {
                let table = table_for(type_name.as_str())?;
                table.mapping.columns.iter().map(|c| table.qualify(&c.name)).collect()
            }
            SelectList::Projection(Some(Projection::Types(types))) => {
                let mut columns = Vec::new();
                for type_name in types {
                    let table = table_for(type_name.as_str())?;
                    columns.extend(table.mapping.columns.iter().map(|c| table.qualify(&c.name)));
                }
                columns
            }
            SelectList::Projection(Some(Projection::Properties(properties))) => properties
                .iter()
                .map(|p| {
                    skeleton
                        .column(p)
                        .map(|c| c.qualified())
                        .ok_or_else(|| {
                            QueryError::from(CoreError::unresolvable_member(&skeleton.type_name, p))
                        })
                })
                .collect::<Result<_>>()?,
            SelectList::Column { table, column } => {
                let scoped = skeleton.table(table).ok_or_else(|| {
                    QueryError::cannot_resolve(&skeleton.type_name, table, "table is not in scope")
                })?;
                vec![scoped.qualify(column)]
            }
        };

        let mut list = SqlStatement::new();
        for column in columns {
            list = list.append_sql(column).append_sql(", ");
        }
        list.remove_last()
    }

    fn plan_parameters(
        &self,
        ctx: &mut PlanContext,
        skeleton: &Skeleton,
        params: &QueryParameters,
        joins: &mut SqlStatement,
    ) -> Result<SqlStatement> {
        let mut groups: IndexMap<String, Vec<Entry<'_>>> = IndexMap::new();
        for (key, value) in params.iter() {
            let key = QueryKey::parse(key)?;
            groups.entry(key.property.clone()).or_default().push((key, value));
        }

        let mut conditions = SqlStatement::new();
        for (property, entries) in &groups {
            let (scope, member) = skeleton
                .member(property)
                .ok_or_else(|| CoreError::unresolvable_member(&skeleton.type_name, property))?;
            trace!(type_name = %skeleton.type_name, %property, kind = ?member.kind, "Planning member");

            let predicate = match &member.kind {
                MemberKind::Column { column } => {
                    self.column_predicate(skeleton, scope, column, entries)?
                }
                MemberKind::ToOne { column, target } => self.to_one_predicate(
                    ctx, skeleton, scope, property, column, target, entries, joins,
                )?,
                MemberKind::ToMany {
                    target,
                    associative: None,
                } => self.to_many_predicate(ctx, skeleton, scope, property, target, entries)?,
                MemberKind::ToMany {
                    target,
                    associative: Some(via),
                } => self.associative_predicate(ctx, skeleton, scope, property, target, via, entries)?,
            };
            conditions = conditions.and(predicate);
        }
        Ok(conditions)
    }

    fn column_predicate(
        &self,
        skeleton: &Skeleton,
        scope: &ScopedTable,
        column_name: &str,
        entries: &[Entry<'_>],
    ) -> Result<SqlStatement> {
        if let Some((key, _)) = entries.iter().find(|(k, _)| !k.is_simple()) {
            return Err(QueryError::cannot_resolve(
                &skeleton.type_name,
                key.to_string(),
                "a column member takes no guard, cast or sub-property",
            ));
        }
        let column = self.column(skeleton, scope, column_name)?;
        let values: Vec<String> = entries
            .iter()
            .flat_map(|(_, v)| v.values().iter().cloned())
            .collect();
        ColumnPredicateEncoder::new(self.dialect.as_ref()).encode(
            &scope.qualify(&column.name),
            column,
            &values,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn to_one_predicate(
        &self,
        ctx: &mut PlanContext,
        skeleton: &Skeleton,
        scope: &ScopedTable,
        property: &str,
        column_name: &str,
        target: &str,
        entries: &[Entry<'_>],
        joins: &mut SqlStatement,
    ) -> Result<SqlStatement> {
        let column = self.column(skeleton, scope, column_name)?;
        let referenced = referenced_column(skeleton, property, column)?;
        let (simple, nested): (Vec<&Entry<'_>>, Vec<&Entry<'_>>) =
            entries.iter().partition(|(k, _)| k.is_simple());

        // `name=<key>` filters the foreign key itself
        let mut conditions = SqlStatement::new();
        if !simple.is_empty() {
            let values: Vec<String> = simple
                .iter()
                .flat_map(|(_, v)| v.values().iter().cloned())
                .collect();
            conditions = ColumnPredicateEncoder::new(self.dialect.as_ref()).encode(
                &scope.qualify(&column.name),
                column,
                &values,
            )?;
        }

        if !nested.is_empty() {
            let mut body = SqlStatement::new();
            for (key, params) in self.partition(skeleton, property, &nested, false)? {
                let subquery =
                    self.subquery(ctx, skeleton, property, target, &key, params, referenced, true)?;
                body = intersect(body, subquery);
            }
            let cte = ctx.push_cte(body);
            *joins = std::mem::take(joins).join(
                JoinKind::Inner,
                &cte,
                None,
                &scope.qualify(&column.name),
                &format!("{cte}.{referenced}"),
            );
        }
        Ok(conditions)
    }

    fn to_many_predicate(
        &self,
        ctx: &mut PlanContext,
        skeleton: &Skeleton,
        scope: &ScopedTable,
        property: &str,
        target: &str,
        entries: &[Entry<'_>],
    ) -> Result<SqlStatement> {
        let target_mapping = self.registry.mapping(target)?;
        let candidates: Vec<&ColumnMapping> = target_mapping
            .foreign_keys_to(&scope.mapping.table_name)
            .collect();
        if candidates.is_empty() {
            return Err(QueryError::cannot_resolve(
                &skeleton.type_name,
                property,
                format!(
                    "no column of {target} references {}",
                    scope.mapping.table_name
                ),
            ));
        }

        let all: Vec<&Entry<'_>> = entries.iter().collect();
        let mut body = SqlStatement::new();
        let mut referenced: Option<&str> = None;
        for (key, params) in self.partition(skeleton, property, &all, candidates.len() > 1)? {
            let link = self.link_column(skeleton, property, &candidates, key.reverse)?;
            let link_ref = referenced_column(skeleton, property, link)?;
            match referenced {
                Some(existing) if existing != link_ref => {
                    return Err(QueryError::cannot_resolve(
                        &skeleton.type_name,
                        property,
                        "link columns reference different keys",
                    ));
                }
                _ => referenced = Some(link_ref),
            }
            let subquery =
                self.subquery(ctx, skeleton, property, target, &key, params, &link.name, true)?;
            body = intersect(body, subquery);
        }

        let referenced = referenced.unwrap_or("id");
        Ok(in_subquery(&scope.qualify(referenced), body))
    }

    #[allow(clippy::too_many_arguments)]
    fn associative_predicate(
        &self,
        ctx: &mut PlanContext,
        skeleton: &Skeleton,
        scope: &ScopedTable,
        property: &str,
        target: &str,
        via: &str,
        entries: &[Entry<'_>],
    ) -> Result<SqlStatement> {
        let via_mapping = self.registry.mapping(via)?;
        let target_mapping = self.registry.mapping(target)?;
        let this_fk = single_link(skeleton, property, &via_mapping, &scope.mapping.table_name)?;
        let that_fk = single_link(skeleton, property, &via_mapping, &target_mapping.table_name)?;
        let this_ref = referenced_column(skeleton, property, this_fk)?;
        let that_ref = referenced_column(skeleton, property, that_fk)?;

        let all: Vec<&Entry<'_>> = entries.iter().collect();
        let mut body = SqlStatement::new();
        for (key, params) in self.partition(skeleton, property, &all, false)? {
            // The guard classifies the association rows, not the target
            let inner =
                self.subquery(ctx, skeleton, property, target, &key, params, that_ref, false)?;
            let via_alias = format!("{}{}", ctx.next_prefix(), via_mapping.table_name);
            let mut select = SqlStatement::from_sql(format!(
                "SELECT {via_alias}.{} FROM {} AS {via_alias} WHERE ",
                this_fk.name, via_mapping.table_name
            ))
            .append_statement(in_subquery(&format!("{via_alias}.{}", that_fk.name), inner));

            if key.guard.is_some() {
                let classifier = via_mapping
                    .classifier
                    .as_deref()
                    .and_then(|c| via_mapping.member(c))
                    .and_then(|m| match &m.kind {
                        MemberKind::Column { column } => via_mapping.column(column),
                        _ => None,
                    })
                    .ok_or_else(|| {
                        QueryError::cannot_resolve(
                            &skeleton.type_name,
                            property,
                            format!("{via} declares no classifier column for the guard"),
                        )
                    })?;
                let guard = ColumnPredicateEncoder::new(self.dialect.as_ref()).encode(
                    &format!("{via_alias}.{}", classifier.name),
                    classifier,
                    &key.guard_values(),
                )?;
                select = select.and(guard);
            }
            body = intersect(body, select);
        }

        Ok(in_subquery(&scope.qualify(this_ref), body))
    }

    /// Partition relationship entries by guard and cast (and link direction
    /// when `split_reverse` is set), keeping first-seen order.
    fn partition(
        &self,
        skeleton: &Skeleton,
        property: &str,
        entries: &[&Entry<'_>],
        split_reverse: bool,
    ) -> Result<IndexMap<GroupKey, QueryParameters>> {
        let mut groups: IndexMap<GroupKey, QueryParameters> = IndexMap::new();
        for (key, value) in entries.iter().copied() {
            let Some(sub) = key.sub_property.as_deref() else {
                return Err(QueryError::cannot_resolve(
                    &skeleton.type_name,
                    key.to_string(),
                    format!("relationship member '{property}' needs a sub-property"),
                ));
            };
            let group = GroupKey {
                guard: key.guard.clone(),
                cast: key.cast.clone(),
                reverse: split_reverse && sub.starts_with(&self.config.reverse_link_marker),
            };
            groups.entry(group).or_default().add(sub, (*value).clone());
        }
        Ok(groups)
    }

    /// Plan one partition against the related type (or its cast subtype),
    /// selecting `select_column` of the declared target's table.
    #[allow(clippy::too_many_arguments)]
    fn subquery(
        &self,
        ctx: &mut PlanContext,
        owner: &Skeleton,
        property: &str,
        declared: &str,
        key: &GroupKey,
        mut params: QueryParameters,
        select_column: &str,
        apply_guard: bool,
    ) -> Result<SqlStatement> {
        let declared_mapping = self.registry.mapping(declared)?;
        let type_name = match key.cast.as_deref() {
            Some(cast) if !self.registry.contains(cast) => {
                return Err(QueryError::cannot_resolve(
                    &owner.type_name,
                    format!("{property}@{cast}"),
                    format!("unknown cast type '{cast}'"),
                ));
            }
            Some(cast) => cast,
            None => declared,
        };

        let prefix = ctx.next_prefix();
        let skeleton = self.skeleton(type_name, &prefix)?;
        if skeleton.table(&declared_mapping.table_name).is_none() {
            return Err(QueryError::cannot_resolve(
                &owner.type_name,
                format!("{property}@{type_name}"),
                format!("{type_name} does not extend {declared}"),
            ));
        }

        if apply_guard && key.guard.is_some() {
            let values = key.guard_values();
            if values.is_empty() {
                return Err(QueryError::invalid_parameter(
                    format!("{property}[]"),
                    "empty guard",
                ));
            }
            let classifier = skeleton.classifier().ok_or_else(|| {
                QueryError::cannot_resolve(
                    &owner.type_name,
                    property,
                    format!("{type_name} declares no classifier for the guard"),
                )
            })?;
            params.add(classifier, QueryValue::List(values));
        }

        let soft_delete = self.config.soft_delete_property.as_str();
        let filtered = params.iter().any(|(k, _)| {
            QueryKey::parse(k).is_ok_and(|k| k.property == soft_delete)
        });
        if !filtered && skeleton.column(soft_delete).is_some() {
            params.add(soft_delete, "null");
        }

        self.plan(
            ctx,
            type_name,
            &prefix,
            SelectList::Column {
                table: &declared_mapping.table_name,
                column: select_column,
            },
            FilterRef::Parameters(&params),
        )
    }

    fn column<'s>(
        &self,
        skeleton: &Skeleton,
        scope: &'s ScopedTable,
        column_name: &str,
    ) -> Result<&'s ColumnMapping> {
        scope.mapping.column(column_name).ok_or_else(|| {
            CoreError::unresolvable_member(&skeleton.type_name, column_name).into()
        })
    }

    /// Pick the link column among several candidates by link role.
    fn link_column<'m>(
        &self,
        skeleton: &Skeleton,
        property: &str,
        candidates: &[&'m ColumnMapping],
        reverse: bool,
    ) -> Result<&'m ColumnMapping> {
        if let [only] = candidates {
            return Ok(*only);
        }
        let role = if reverse {
            LinkRole::Target
        } else {
            LinkRole::Source
        };
        let matching: Vec<&ColumnMapping> = candidates
            .iter()
            .copied()
            .filter(|c| c.link_role == Some(role))
            .collect();
        match matching.as_slice() {
            [column] => Ok(*column),
            _ => Err(QueryError::cannot_resolve(
                &skeleton.type_name,
                property,
                format!(
                    "{} candidate link columns and no single {role:?} column",
                    candidates.len()
                ),
            )),
        }
    }
}

/// The one column of `via` referencing `table`.
fn single_link<'m>(
    skeleton: &Skeleton,
    property: &str,
    via: &'m TableMapping,
    table: &str,
) -> Result<&'m ColumnMapping> {
    let columns: Vec<&'m ColumnMapping> = via
        .columns
        .iter()
        .filter(|c| c.references(table))
        .collect();
    match columns.as_slice() {
        [column] => Ok(*column),
        _ => Err(QueryError::cannot_resolve(
            &skeleton.type_name,
            property,
            format!(
                "{} needs exactly one column referencing {table}",
                via.type_name
            ),
        )),
    }
}

/// Column a foreign key points at.
fn referenced_column<'m>(
    skeleton: &Skeleton,
    property: &str,
    column: &'m ColumnMapping,
) -> Result<&'m str> {
    column
        .foreign_key
        .as_ref()
        .map(|fk| fk.column.as_str())
        .ok_or_else(|| {
            QueryError::cannot_resolve(
                &skeleton.type_name,
                property,
                format!("column '{}' has no foreign key", column.name),
            )
        })
}
