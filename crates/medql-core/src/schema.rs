//! Static schema descriptors for domain types.
//!
//! A domain type describes its persisted shape once through [`Model::schema`].
//! The descriptor is plain data: the registry turns it into an immutable
//! [`TableMapping`](crate::mapping::TableMapping) on first use.
//!
//! ```ignore
//! ModelSchema::new("Patient", "patient")
//!     .column(ColumnDef::new("id", ColumnType::Uuid).primary_key().auto_generated())
//!     .column(ColumnDef::new("gender", ColumnType::Text))
//!     .column(ColumnDef::new("name_id", ColumnType::Uuid).serialize_as("nameKey").references("patient_name", "id"))
//!     .to_one("name", "name_id", "PatientName")
//!     .to_many("relationship", "PatientRelationship")
//! ```

use crate::error::Result;
use crate::value::{ColumnType, SqlValue};

/// Which end of a two-sided link a foreign-key column represents.
///
/// Used to disambiguate association tables that reference the same table
/// twice (e.g. a relationship's source and target).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkRole {
    Source,
    Target,
}

/// Reference from a column to a column of another table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKeyDef {
    pub table: String,
    pub column: String,
}

/// Description of one persisted property.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Physical column name
    pub name: String,
    /// Field name used by [`Model::get`] / [`Model::set`]
    pub property: String,
    /// Name used by query parameters; defaults to the property name
    pub serialized_name: Option<String>,
    pub column_type: ColumnType,
    pub primary_key: bool,
    pub auto_generated: bool,
    pub always_join: bool,
    pub non_null: bool,
    pub foreign_key: Option<ForeignKeyDef>,
    pub link_role: Option<LinkRole>,
}

impl ColumnDef {
    /// A column whose property has the same name as the column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        let name = name.into();
        Self {
            property: name.clone(),
            name,
            serialized_name: None,
            column_type,
            primary_key: false,
            auto_generated: false,
            always_join: false,
            non_null: false,
            foreign_key: None,
            link_role: None,
        }
    }

    #[must_use]
    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = property.into();
        self
    }

    #[must_use]
    pub fn serialize_as(mut self, name: impl Into<String>) -> Self {
        self.serialized_name = Some(name.into());
        self
    }

    /// Primary keys are implicitly non-null.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.non_null = true;
        self
    }

    #[must_use]
    pub fn auto_generated(mut self) -> Self {
        self.auto_generated = true;
        self
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.non_null = true;
        self
    }

    #[must_use]
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKeyDef {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    /// Every query against the owning table joins the referenced table.
    #[must_use]
    pub fn always_join(mut self) -> Self {
        self.always_join = true;
        self
    }

    #[must_use]
    pub fn link_role(mut self, role: LinkRole) -> Self {
        self.link_role = Some(role);
        self
    }
}

/// A relationship member exposed to query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationDef {
    /// This table holds a foreign key (by property name) pointing at the target.
    ToOne { property: String, target: String },
    /// The target table (or an associative table) points back at this one.
    ToMany {
        target: String,
        associative: Option<String>,
    },
}

/// Full static description of one domain type.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSchema {
    pub type_name: String,
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
    pub relations: Vec<(String, RelationDef)>,
    /// Member path whose value classifies rows of this type (guard filtering)
    pub classifier: Option<String>,
}

impl ModelSchema {
    pub fn new(type_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            table_name: table_name.into(),
            columns: Vec::new(),
            relations: Vec::new(),
            classifier: None,
        }
    }

    #[must_use]
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Declare a to-one member backed by the foreign key column with `property`.
    #[must_use]
    pub fn to_one(
        mut self,
        member: impl Into<String>,
        property: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.relations.push((
            member.into(),
            RelationDef::ToOne {
                property: property.into(),
                target: target.into(),
            },
        ));
        self
    }

    #[must_use]
    pub fn to_many(mut self, member: impl Into<String>, target: impl Into<String>) -> Self {
        self.relations.push((
            member.into(),
            RelationDef::ToMany {
                target: target.into(),
                associative: None,
            },
        ));
        self
    }

    /// Declare a to-many member reached through an associative type.
    #[must_use]
    pub fn to_many_via(
        mut self,
        member: impl Into<String>,
        target: impl Into<String>,
        associative: impl Into<String>,
    ) -> Self {
        self.relations.push((
            member.into(),
            RelationDef::ToMany {
                target: target.into(),
                associative: Some(associative.into()),
            },
        ));
        self
    }

    #[must_use]
    pub fn classifier(mut self, member_path: impl Into<String>) -> Self {
        self.classifier = Some(member_path.into());
        self
    }
}

/// A domain type persisted by the engine.
///
/// `get`/`set` address fields by [`ColumnDef::property`]; they replace the
/// dynamic property access a reflective ORM would use.
pub trait Model: Default + Send + Sync + 'static {
    /// Registered name of the type, used as registry and cache key.
    const TYPE_NAME: &'static str;

    fn schema() -> ModelSchema;

    /// Current value of a persisted property, `None` if the property is unknown.
    fn get(&self, property: &str) -> Option<SqlValue>;

    fn set(&mut self, property: &str, value: SqlValue) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_builder() {
        let col = ColumnDef::new("person_id", ColumnType::Uuid)
            .property("id")
            .primary_key()
            .references("person", "id")
            .always_join();

        assert_eq!(col.name, "person_id");
        assert_eq!(col.property, "id");
        assert!(col.primary_key && col.non_null && col.always_join);
        assert_eq!(
            col.foreign_key,
            Some(ForeignKeyDef {
                table: "person".into(),
                column: "id".into()
            })
        );
    }

    #[test]
    fn test_schema_builder() {
        let schema = ModelSchema::new("PatientRelationship", "patient_relationship")
            .column(ColumnDef::new("id", ColumnType::Uuid).primary_key())
            .to_one("target", "target_id", "Person")
            .to_many_via("practitioner", "Practitioner", "CareTeam")
            .classifier("relationshipType");

        assert_eq!(schema.columns.len(), 1);
        assert_eq!(schema.relations.len(), 2);
        assert_eq!(schema.classifier.as_deref(), Some("relationshipType"));
        assert!(matches!(
            &schema.relations[1].1,
            RelationDef::ToMany { associative: Some(a), .. } if a == "CareTeam"
        ));
    }
}
