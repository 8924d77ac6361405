//! Immutable table/column mappings derived from [`ModelSchema`] descriptors.

use crate::error::{CoreError, Result};
use crate::schema::{ForeignKeyDef, LinkRole, ModelSchema, RelationDef};
use crate::value::ColumnType;

/// Reference from a column to a column of another table.
pub type ForeignKey = ForeignKeyDef;

/// One persisted property of a domain type.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    pub name: String,
    pub property: String,
    pub serialized_name: String,
    pub column_type: ColumnType,
    pub is_primary_key: bool,
    pub is_auto_generated: bool,
    pub is_always_join: bool,
    pub is_non_null: bool,
    pub foreign_key: Option<ForeignKey>,
    pub link_role: Option<LinkRole>,
}

impl ColumnMapping {
    /// Does this column reference `table`?
    pub fn references(&self, table: &str) -> bool {
        self.foreign_key.as_ref().is_some_and(|fk| fk.table == table)
    }
}

/// How a query-parameter member maps onto the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberKind {
    Column {
        column: String,
    },
    ToOne {
        column: String,
        target: String,
    },
    ToMany {
        target: String,
        associative: Option<String>,
    },
}

/// A member addressable from query parameters, keyed by serialization name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub kind: MemberKind,
}

impl Member {
    pub fn is_relationship(&self) -> bool {
        !matches!(self.kind, MemberKind::Column { .. })
    }
}

/// The cached physical layout of one domain type.
///
/// Created once per type by the registry; never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMapping {
    pub type_name: String,
    pub table_name: String,
    pub columns: Vec<ColumnMapping>,
    pub members: Vec<Member>,
    pub classifier: Option<String>,
}

impl TableMapping {
    /// Validate a descriptor and derive its mapping.
    pub fn from_schema(schema: ModelSchema) -> Result<Self> {
        let type_name = schema.type_name;
        let invalid = |message: String| CoreError::invalid_schema(type_name.clone(), message);

        let mut columns: Vec<ColumnMapping> = Vec::with_capacity(schema.columns.len());
        for def in schema.columns {
            if def.always_join && def.foreign_key.is_none() {
                return Err(invalid(format!(
                    "column '{}' is always-joined but has no foreign key",
                    def.name
                )));
            }
            if columns.iter().any(|c| c.name == def.name) {
                return Err(invalid(format!("duplicate column '{}'", def.name)));
            }
            columns.push(ColumnMapping {
                serialized_name: def.serialized_name.unwrap_or_else(|| def.property.clone()),
                name: def.name,
                property: def.property,
                column_type: def.column_type,
                is_primary_key: def.primary_key,
                is_auto_generated: def.auto_generated,
                is_always_join: def.always_join,
                is_non_null: def.non_null,
                foreign_key: def.foreign_key,
                link_role: def.link_role,
            });
        }

        let mut members: Vec<Member> = columns
            .iter()
            .map(|c| Member {
                name: c.serialized_name.clone(),
                kind: MemberKind::Column {
                    column: c.name.clone(),
                },
            })
            .collect();

        for (name, relation) in schema.relations {
            if members.iter().any(|m| m.name == name) {
                return Err(invalid(format!("duplicate member '{name}'")));
            }
            let kind = match relation {
                RelationDef::ToOne { property, target } => {
                    let column = columns
                        .iter()
                        .find(|c| c.property == property)
                        .ok_or_else(|| {
                            invalid(format!("member '{name}' uses unknown property '{property}'"))
                        })?;
                    if column.foreign_key.is_none() {
                        return Err(invalid(format!(
                            "member '{name}' needs a foreign key on '{}'",
                            column.name
                        )));
                    }
                    MemberKind::ToOne {
                        column: column.name.clone(),
                        target,
                    }
                }
                RelationDef::ToMany {
                    target,
                    associative,
                } => MemberKind::ToMany {
                    target,
                    associative,
                },
            };
            members.push(Member { name, kind });
        }

        Ok(Self {
            type_name,
            table_name: schema.table_name,
            columns,
            members,
            classifier: schema.classifier,
        })
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMapping> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_by_property(&self, property: &str) -> Option<&ColumnMapping> {
        self.columns.iter().find(|c| c.property == property)
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }

    pub fn primary_keys(&self) -> impl Iterator<Item = &ColumnMapping> {
        self.columns.iter().filter(|c| c.is_primary_key)
    }

    pub fn always_join_columns(&self) -> impl Iterator<Item = &ColumnMapping> {
        self.columns.iter().filter(|c| c.is_always_join)
    }

    /// Columns of this table holding a foreign key into `table`.
    pub fn foreign_keys_to<'a>(
        &'a self,
        table: &'a str,
    ) -> impl Iterator<Item = &'a ColumnMapping> + 'a {
        self.columns.iter().filter(move |c| c.references(table))
    }
}
