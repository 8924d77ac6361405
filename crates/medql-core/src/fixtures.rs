//! Sample health-record schema.
//!
//! Entity <- Person <- Practitioner form an always-joined chain. Patient is
//! standalone with a to-one name, two-sided relationship and link tables, and
//! a care team associating patients with practitioners.

use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::registry::TableMappingRegistry;
use crate::schema::{ColumnDef, LinkRole, Model, ModelSchema};
use crate::value::{ColumnType, FromSqlValue, SqlValue};

macro_rules! model_accessors {
    ($($field:ident),+ $(,)?) => {
        fn get(&self, property: &str) -> Option<SqlValue> {
            match property {
                $(stringify!($field) => Some(self.$field.clone().into()),)+
                _ => None,
            }
        }

        fn set(&mut self, property: &str, value: SqlValue) -> Result<()> {
            match property {
                $(stringify!($field) => self.$field = FromSqlValue::from_sql_value(value)?,)+
                _ => return Err(CoreError::unresolvable_member(Self::TYPE_NAME, property)),
            }
            Ok(())
        }
    };
}

fn uuid_key() -> ColumnDef {
    ColumnDef::new("id", ColumnType::Uuid)
        .primary_key()
        .auto_generated()
}

fn obsoletion_time() -> ColumnDef {
    ColumnDef::new("obsoletion_time", ColumnType::Timestamp).serialize_as("obsoletionTime")
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    pub id: Option<Uuid>,
    pub class_code: Option<String>,
    pub obsoletion_time: Option<OffsetDateTime>,
}

impl Model for Entity {
    const TYPE_NAME: &'static str = "Entity";

    fn schema() -> ModelSchema {
        ModelSchema::new(Self::TYPE_NAME, "entity")
            .column(uuid_key())
            .column(ColumnDef::new("class_code", ColumnType::Text).serialize_as("classCode"))
            .column(obsoletion_time())
    }

    model_accessors!(id, class_code, obsoletion_time);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Person {
    pub id: Option<Uuid>,
    pub name: Option<String>,
}

impl Model for Person {
    const TYPE_NAME: &'static str = "Person";

    fn schema() -> ModelSchema {
        ModelSchema::new(Self::TYPE_NAME, "person")
            .column(
                ColumnDef::new("id", ColumnType::Uuid)
                    .primary_key()
                    .references("entity", "id")
                    .always_join(),
            )
            .column(ColumnDef::new("name", ColumnType::Text))
    }

    model_accessors!(id, name);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Practitioner {
    pub id: Option<Uuid>,
    pub specialty: Option<String>,
}

impl Model for Practitioner {
    const TYPE_NAME: &'static str = "Practitioner";

    fn schema() -> ModelSchema {
        ModelSchema::new(Self::TYPE_NAME, "practitioner")
            .column(
                ColumnDef::new("id", ColumnType::Uuid)
                    .primary_key()
                    .references("person", "id")
                    .always_join(),
            )
            .column(ColumnDef::new("specialty", ColumnType::Text))
    }

    model_accessors!(id, specialty);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientName {
    pub id: Option<Uuid>,
    pub given: Option<String>,
    pub family: Option<String>,
    pub name_use: Option<String>,
}

impl Model for PatientName {
    const TYPE_NAME: &'static str = "PatientName";

    fn schema() -> ModelSchema {
        ModelSchema::new(Self::TYPE_NAME, "patient_name")
            .column(uuid_key())
            .column(ColumnDef::new("given", ColumnType::Text))
            .column(ColumnDef::new("family", ColumnType::Text))
            .column(ColumnDef::new("name_use", ColumnType::Text).serialize_as("use"))
            .classifier("use")
    }

    model_accessors!(id, given, family, name_use);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patient {
    pub id: Option<Uuid>,
    pub gender: Option<String>,
    pub birth_date: Option<Date>,
    pub multiple_birth_order: Option<i64>,
    pub deceased: Option<bool>,
    pub name_id: Option<Uuid>,
    pub obsoletion_time: Option<OffsetDateTime>,
}

impl Model for Patient {
    const TYPE_NAME: &'static str = "Patient";

    fn schema() -> ModelSchema {
        ModelSchema::new(Self::TYPE_NAME, "patient")
            .column(uuid_key())
            .column(ColumnDef::new("gender", ColumnType::Text))
            .column(ColumnDef::new("birth_date", ColumnType::Date).serialize_as("birthDate"))
            .column(
                ColumnDef::new("multiple_birth_order", ColumnType::Integer)
                    .serialize_as("multipleBirthOrder"),
            )
            .column(ColumnDef::new("deceased", ColumnType::Boolean))
            .column(
                ColumnDef::new("name_id", ColumnType::Uuid)
                    .serialize_as("nameKey")
                    .references("patient_name", "id"),
            )
            .column(obsoletion_time())
            .to_one("name", "name_id", PatientName::TYPE_NAME)
            .to_many("relationship", PatientRelationship::TYPE_NAME)
            .to_many("link", PatientLink::TYPE_NAME)
            .to_many_via("practitioner", Practitioner::TYPE_NAME, CareTeam::TYPE_NAME)
    }

    model_accessors!(
        id,
        gender,
        birth_date,
        multiple_birth_order,
        deceased,
        name_id,
        obsoletion_time,
    );
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientRelationship {
    pub id: Option<Uuid>,
    pub source_id: Option<Uuid>,
    pub target_id: Option<Uuid>,
    pub relationship_type: Option<String>,
    pub obsoletion_time: Option<OffsetDateTime>,
}

impl Model for PatientRelationship {
    const TYPE_NAME: &'static str = "PatientRelationship";

    fn schema() -> ModelSchema {
        ModelSchema::new(Self::TYPE_NAME, "patient_relationship")
            .column(uuid_key())
            .column(
                ColumnDef::new("source_id", ColumnType::Uuid)
                    .serialize_as("sourceKey")
                    .not_null()
                    .references("patient", "id")
                    .link_role(LinkRole::Source),
            )
            .column(
                ColumnDef::new("target_id", ColumnType::Uuid)
                    .serialize_as("targetKey")
                    .not_null()
                    .references("person", "id")
                    .link_role(LinkRole::Target),
            )
            .column(
                ColumnDef::new("relationship_type", ColumnType::Text)
                    .serialize_as("relationshipType"),
            )
            .column(obsoletion_time())
            .to_one("source", "source_id", Patient::TYPE_NAME)
            .to_one("target", "target_id", Person::TYPE_NAME)
            .classifier("relationshipType")
    }

    model_accessors!(id, source_id, target_id, relationship_type, obsoletion_time);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientLink {
    pub id: Option<Uuid>,
    pub source_id: Option<Uuid>,
    pub target_id: Option<Uuid>,
    pub link_type: Option<String>,
}

impl Model for PatientLink {
    const TYPE_NAME: &'static str = "PatientLink";

    fn schema() -> ModelSchema {
        ModelSchema::new(Self::TYPE_NAME, "patient_link")
            .column(uuid_key())
            .column(
                ColumnDef::new("source_id", ColumnType::Uuid)
                    .serialize_as("sourceKey")
                    .references("patient", "id")
                    .link_role(LinkRole::Source),
            )
            .column(
                ColumnDef::new("target_id", ColumnType::Uuid)
                    .serialize_as("targetKey")
                    .references("patient", "id")
                    .link_role(LinkRole::Target),
            )
            .column(ColumnDef::new("link_type", ColumnType::Text).serialize_as("type"))
            .to_one("source", "source_id", Patient::TYPE_NAME)
            .to_one("target", "target_id", Patient::TYPE_NAME)
            .classifier("type")
    }

    model_accessors!(id, source_id, target_id, link_type);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CareTeam {
    pub id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub practitioner_id: Option<Uuid>,
    pub role: Option<String>,
}

impl Model for CareTeam {
    const TYPE_NAME: &'static str = "CareTeam";

    fn schema() -> ModelSchema {
        ModelSchema::new(Self::TYPE_NAME, "care_team")
            .column(uuid_key())
            .column(
                ColumnDef::new("patient_id", ColumnType::Uuid)
                    .serialize_as("patientKey")
                    .references("patient", "id"),
            )
            .column(
                ColumnDef::new("practitioner_id", ColumnType::Uuid)
                    .serialize_as("practitionerKey")
                    .references("practitioner", "id"),
            )
            .column(ColumnDef::new("role", ColumnType::Text))
            .classifier("role")
    }

    model_accessors!(id, patient_id, practitioner_id, role);
}

/// Registry with every fixture type registered.
pub fn fixture_registry() -> TableMappingRegistry {
    TableMappingRegistry::new()
        .with::<Entity>()
        .with::<Person>()
        .with::<Practitioner>()
        .with::<PatientName>()
        .with::<Patient>()
        .with::<PatientRelationship>()
        .with::<PatientLink>()
        .with::<CareTeam>()
}
