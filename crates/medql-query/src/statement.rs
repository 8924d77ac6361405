//! Append-only SQL statement builder.
//!
//! A [`SqlStatement`] is an ordered list of fragments, each carrying its SQL
//! text and the parameters bound by the `?` placeholders inside it. Composing
//! statements concatenates fragment lists, so parameter order always follows
//! placeholder order. [`SqlStatement::build`] consumes the builder and yields a
//! [`BuiltStatement`], which has no mutating methods.

use std::fmt;

use medql_core::{SqlDialect, SqlValue, TableMapping};

use crate::error::{QueryError, Result};

/// Fragments that [`SqlStatement::remove_last`] may drop.
const SEPARATORS: &[&str] = &[",", "AND", "OR", "INTERSECT", "UNION"];

#[derive(Debug, Clone, PartialEq)]
struct Fragment {
    sql: String,
    params: Vec<SqlValue>,
}

/// Join flavor for explicit joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

/// A SQL statement under construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlStatement {
    fragments: Vec<Fragment>,
}

impl SqlStatement {
    pub fn new() -> Self {
        Self::default()
    }

    /// A statement holding one parameterless fragment.
    pub fn from_sql(sql: impl Into<String>) -> Self {
        Self::new().append_sql(sql)
    }

    pub fn with_params(sql: impl Into<String>, params: impl IntoIterator<Item = SqlValue>) -> Self {
        Self::new().append(sql, params)
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.iter().all(|f| f.sql.is_empty() && f.params.is_empty())
    }

    /// Number of parameters bound so far.
    pub fn param_count(&self) -> usize {
        self.fragments.iter().map(|f| f.params.len()).sum()
    }

    #[must_use]
    pub fn append(
        mut self,
        sql: impl Into<String>,
        params: impl IntoIterator<Item = SqlValue>,
    ) -> Self {
        self.fragments.push(Fragment {
            sql: sql.into(),
            params: params.into_iter().collect(),
        });
        self
    }

    #[must_use]
    pub fn append_sql(self, sql: impl Into<String>) -> Self {
        self.append(sql, std::iter::empty())
    }

    #[must_use]
    pub fn append_statement(mut self, other: SqlStatement) -> Self {
        self.fragments.extend(other.fragments);
        self
    }

    /// Append ` WHERE clause`; a plain append on an empty statement.
    #[must_use]
    pub fn where_clause(self, clause: SqlStatement) -> Self {
        self.connect(" WHERE ", clause)
    }

    /// Append ` AND clause`; a plain append on an empty statement.
    #[must_use]
    pub fn and(self, clause: SqlStatement) -> Self {
        self.connect(" AND ", clause)
    }

    /// Append ` OR clause`; a plain append on an empty statement.
    #[must_use]
    pub fn or(self, clause: SqlStatement) -> Self {
        self.connect(" OR ", clause)
    }

    fn connect(self, keyword: &str, clause: SqlStatement) -> Self {
        if clause.is_empty() {
            return self;
        }
        if self.is_empty() {
            return self.append_statement(clause);
        }
        self.append_sql(keyword).append_statement(clause)
    }

    /// Wrap the statement in parentheses.
    #[must_use]
    pub fn parenthesize(mut self) -> Self {
        if self.is_empty() {
            return self;
        }
        self.fragments.insert(
            0,
            Fragment {
                sql: "(".to_string(),
                params: Vec::new(),
            },
        );
        self.append_sql(")")
    }

    /// Append an explicit join.
    #[must_use]
    pub fn join(
        self,
        kind: JoinKind,
        table: &str,
        alias: Option<&str>,
        left: &str,
        right: &str,
    ) -> Self {
        let target = match alias {
            Some(alias) => format!("{table} AS {alias}"),
            None => table.to_string(),
        };
        self.append_sql(format!(
            " {} {target} ON ({left} = {right})",
            kind.as_sql()
        ))
    }

    /// Inner-join `right` to `left`, inferring the column pair.
    ///
    /// A foreign key in either direction is used when exactly one exists.
    /// Without one, same-named columns are tried when `natural_fallback` is
    /// set. Zero or several candidate pairs fail with
    /// [`QueryError::AmbiguousJoin`].
    pub fn inner_join(
        self,
        left: &TableMapping,
        left_alias: &str,
        right: &TableMapping,
        right_alias: &str,
        natural_fallback: bool,
    ) -> Result<Self> {
        let mut pairs: Vec<(&str, &str)> = left
            .foreign_keys_to(&right.table_name)
            .map(|c| (c.name.as_str(), fk_column(c)))
            .collect();
        pairs.extend(
            right
                .foreign_keys_to(&left.table_name)
                .map(|c| (fk_column(c), c.name.as_str())),
        );

        if pairs.is_empty() {
            if !natural_fallback {
                return Err(QueryError::ambiguous_join(
                    &left.table_name,
                    &right.table_name,
                    "no foreign key links the tables and natural join fallback is disabled",
                ));
            }
            pairs = left
                .columns
                .iter()
                .filter(|c| right.column(&c.name).is_some())
                .map(|c| (c.name.as_str(), c.name.as_str()))
                .collect();
        }

        match pairs.as_slice() {
            [(l, r)] => {
                let (l, r) = (format!("{left_alias}.{l}"), format!("{right_alias}.{r}"));
                Ok(self.join(
                    JoinKind::Inner,
                    &right.table_name,
                    Some(right_alias),
                    &l,
                    &r,
                ))
            }
            _ => Err(QueryError::ambiguous_join(
                &left.table_name,
                &right.table_name,
                format!("{} candidate column pairs", pairs.len()),
            )),
        }
    }

    /// Counts above `i64::MAX` are clamped to it.
    #[must_use]
    pub fn limit(self, count: u64) -> Self {
        self.append(" LIMIT ?", [SqlValue::Int(clamp_count(count))])
    }

    #[must_use]
    pub fn offset(self, count: u64) -> Self {
        self.append(" OFFSET ?", [SqlValue::Int(clamp_count(count))])
    }

    /// Drop a trailing separator fragment (e.g. the last `", "` of a list).
    pub fn remove_last(mut self) -> Result<Self> {
        let Some(last) = self.fragments.last() else {
            return Err(QueryError::invalid_state("statement is empty"));
        };
        if !last.params.is_empty() || !SEPARATORS.contains(&last.sql.trim()) {
            return Err(QueryError::invalid_state(format!(
                "last fragment '{}' is not a separator",
                last.sql
            )));
        }
        self.fragments.pop();
        Ok(self)
    }

    /// Flatten into SQL text and parameters.
    ///
    /// Fails with [`QueryError::InvalidState`] when the placeholders outside
    /// quoted literals do not match the bound parameters one to one.
    pub fn build(self) -> Result<BuiltStatement> {
        let mut sql = String::new();
        let mut params = Vec::with_capacity(self.param_count());
        for fragment in self.fragments {
            sql.push_str(&fragment.sql);
            params.extend(fragment.params);
        }

        let placeholders = placeholder_positions(&sql).len();
        if placeholders != params.len() {
            return Err(QueryError::invalid_state(format!(
                "{placeholders} placeholders but {} parameters",
                params.len()
            )));
        }
        Ok(BuiltStatement { sql, params })
    }
}

fn clamp_count(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn fk_column(column: &medql_core::ColumnMapping) -> &str {
    column
        .foreign_key
        .as_ref()
        .map_or(column.name.as_str(), |fk| fk.column.as_str())
}

/// Byte offsets of `?` placeholders outside single-quoted literals.
fn placeholder_positions(sql: &str) -> Vec<usize> {
    let mut quoted = false;
    sql.char_indices()
        .filter_map(|(i, c)| match c {
            '\'' => {
                quoted = !quoted;
                None
            }
            '?' if !quoted => Some(i),
            _ => None,
        })
        .collect()
}

/// Finalized SQL text with its ordered parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltStatement {
    sql: String,
    params: Vec<SqlValue>,
}

impl BuiltStatement {
    /// A statement without parameters (e.g. `BEGIN`).
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn into_parts(self) -> (String, Vec<SqlValue>) {
        (self.sql, self.params)
    }

    /// Copy with every `Null` parameter written inline as `NULL`.
    ///
    /// For providers that type each bound parameter and reject an untyped null.
    pub fn with_null_literals(&self) -> Self {
        if !self.params.iter().any(SqlValue::is_null) {
            return self.clone();
        }
        let mut sql = String::with_capacity(self.sql.len() + 8);
        let mut params = Vec::with_capacity(self.params.len());
        let mut last = 0;
        for (pos, param) in placeholder_positions(&self.sql).into_iter().zip(&self.params) {
            sql.push_str(&self.sql[last..pos]);
            if param.is_null() {
                sql.push_str("NULL");
            } else {
                sql.push('?');
                params.push(param.clone());
            }
            last = pos + 1;
        }
        sql.push_str(&self.sql[last..]);
        Self { sql, params }
    }

    /// SQL text with `?` rewritten to the dialect's positional placeholders.
    pub fn to_positional(&self, dialect: &dyn SqlDialect) -> String {
        let positions = placeholder_positions(&self.sql);
        let mut out = String::with_capacity(self.sql.len() + positions.len() * 2);
        let mut last = 0;
        for (index, pos) in positions.into_iter().enumerate() {
            out.push_str(&self.sql[last..pos]);
            out.push_str(&dialect.placeholder(index + 1));
            last = pos + 1;
        }
        out.push_str(&self.sql[last..]);
        out
    }
}

impl fmt::Display for BuiltStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.params.is_empty() {
            let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
            write!(f, " -- [{}]", params.join(", "))?;
        }
        Ok(())
    }
}
