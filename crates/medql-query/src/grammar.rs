//! Query-parameter grammar.
//!
//! Each key has the form `property[guard]@Cast.subProperty`, every part but
//! the property optional. The sub-property is itself a key, parsed again one
//! level down when the planner descends into the related type.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{QueryError, Result};

/// `property`, `[guard]`, `@cast`, `.subProperty`.
///
/// The guard excludes `]` so a nested key's guard is never swallowed by the
/// outer one.
static KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w*)(\[([^\]]*)\])?(@(\w+))?(\.(.*))?$").expect("valid query key pattern")
});

/// Parameters consumed by the planner itself rather than matched to members.
pub const COUNT_PARAM: &str = "_count";
pub const OFFSET_PARAM: &str = "_offset";
pub const ORDER_BY_PARAM: &str = "_orderBy";

/// One parsed parameter key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub property: String,
    /// Raw guard text, `|`-separated classifier values
    pub guard: Option<String>,
    pub cast: Option<String>,
    pub sub_property: Option<String>,
}

impl QueryKey {
    pub fn parse(key: &str) -> Result<Self> {
        let captures = KEY_PATTERN
            .captures(key)
            .ok_or_else(|| QueryError::invalid_parameter(key, "key does not match the grammar"))?;

        let property = captures.get(1).map_or("", |m| m.as_str());
        if property.is_empty() {
            return Err(QueryError::invalid_parameter(key, "missing property name"));
        }
        let group = |index: usize| captures.get(index).map(|m| m.as_str().to_string());

        Ok(Self {
            property: property.to_string(),
            guard: group(3),
            cast: group(5),
            sub_property: group(7),
        })
    }

    /// A key naming only a property.
    pub fn is_simple(&self) -> bool {
        self.guard.is_none() && self.cast.is_none() && self.sub_property.is_none()
    }

    /// Classifier values of the guard; empty without a guard.
    pub fn guard_values(&self) -> Vec<String> {
        split_guard(self.guard.as_deref())
    }
}

/// `MTH|FTH` into its non-empty alternatives.
pub(crate) fn split_guard(guard: Option<&str>) -> Vec<String> {
    guard
        .map(|g| {
            g.split('|')
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl FromStr for QueryKey {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.property)?;
        if let Some(guard) = &self.guard {
            write!(f, "[{guard}]")?;
        }
        if let Some(cast) = &self.cast {
            write!(f, "@{cast}")?;
        }
        if let Some(sub) = &self.sub_property {
            write!(f, ".{sub}")?;
        }
        Ok(())
    }
}

/// A parameter value: one scalar or a list ORed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Single(String),
    List(Vec<String>),
}

impl QueryValue {
    pub fn values(&self) -> &[String] {
        match self {
            Self::Single(v) => std::slice::from_ref(v),
            Self::List(values) => values,
        }
    }

    fn push(&mut self, value: String) {
        match self {
            Self::Single(existing) => {
                *self = Self::List(vec![std::mem::take(existing), value]);
            }
            Self::List(values) => values.push(value),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

impl From<Vec<&str>> for QueryValue {
    fn from(values: Vec<&str>) -> Self {
        Self::List(values.into_iter().map(str::to_string).collect())
    }
}

/// Ordered `(key, value)` parameter list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParameters {
    entries: Vec<(String, QueryValue)>,
}

impl QueryParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Replace every entry for `key` with a single one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        let key = key.into();
        self.entries.retain(|(k, _)| *k != key);
        self.add(key, value);
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.add(key, value);
        self
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<QueryValue>,
    {
        let mut params = Self::new();
        for (key, value) in pairs {
            params.add(key, value);
        }
        params
    }

    /// Parse an URL query string; repeated keys collect into a list.
    pub fn parse_query_string(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut params = Self::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match params.entries.iter_mut().find(|(k, _)| *k == key) {
                Some((_, existing)) => existing.push(value.into_owned()),
                None => params.add(key.into_owned(), value.into_owned()),
            }
        }
        params
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Split off the paging and ordering control parameters.
    pub fn split_controls(&self) -> Result<(QueryParameters, QueryControls)> {
        let mut rest = Self::new();
        let mut controls = QueryControls::default();
        for (key, value) in &self.entries {
            match key.as_str() {
                COUNT_PARAM => controls.count = Some(parse_count(key, value)?),
                OFFSET_PARAM => controls.offset = Some(parse_count(key, value)?),
                ORDER_BY_PARAM => {
                    for field in value.values().iter().flat_map(|v| v.split(',')) {
                        let field = field.trim();
                        if field.is_empty() {
                            continue;
                        }
                        controls.order_by.push(match field.strip_prefix('-') {
                            Some(name) => (name.to_string(), true),
                            None => (field.to_string(), false),
                        });
                    }
                }
                _ => rest.entries.push((key.clone(), value.clone())),
            }
        }
        Ok((rest, controls))
    }
}

impl<'a> IntoIterator for &'a QueryParameters {
    type Item = &'a (String, QueryValue);
    type IntoIter = std::slice::Iter<'a, (String, QueryValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Paging and ordering requested through control parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryControls {
    pub count: Option<u64>,
    pub offset: Option<u64>,
    /// `(member, descending)` in priority order
    pub order_by: Vec<(String, bool)>,
}

fn parse_count(key: &str, value: &QueryValue) -> Result<u64> {
    let [raw] = value.values() else {
        return Err(QueryError::invalid_parameter(key, "expects a single value"));
    };
    let count = raw
        .parse::<u64>()
        .map_err(|e| QueryError::invalid_parameter(key, e.to_string()))?;
    if i64::try_from(count).is_err() {
        return Err(QueryError::invalid_parameter(
            key,
            format!("{count} exceeds {}", i64::MAX),
        ));
    }
    Ok(count)
}
