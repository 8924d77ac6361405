mod common;

use common::ScriptedProvider;
use futures_util::{StreamExt, TryStreamExt};
use medql_core::fixtures::{Entity, Patient, Person, Practitioner};
use medql_core::{CompositeResult, Row, SqlValue};
use medql_query::{Expr, QueryFilter, QueryParameters};
use medql_storage::StorageError;
use time::macros::date;
use uuid::Uuid;

fn patient_row(id: Uuid, gender: &str) -> Row {
    Row::from_values(vec![
        SqlValue::Uuid(id),
        SqlValue::Text(gender.into()),
        SqlValue::Date(date!(1984 - 03 - 09)),
        SqlValue::Null,
        SqlValue::Bool(false),
        SqlValue::Null,
        SqlValue::Null,
    ])
}

#[tokio::test]
async fn test_insert_reads_back_generated_key() {
    let provider = ScriptedProvider::new();
    let id = Uuid::new_v4();
    provider.push_rows(vec![Row::from_values(vec![SqlValue::Uuid(id)])]);

    let mut patient = Patient {
        gender: Some("female".into()),
        ..Default::default()
    };
    provider.context().insert(&mut patient).await.unwrap();

    assert_eq!(patient.id, Some(id));
    assert_eq!(
        provider.log(),
        vec![
            "conn0: INSERT INTO patient (gender, birth_date, multiple_birth_order, deceased, \
             name_id, obsoletion_time) VALUES ($1, $2, $3, $4, $5, $6) RETURNING id"
        ]
    );
}

#[tokio::test]
async fn test_query_materializes_rows() {
    let provider = ScriptedProvider::new();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    provider.push_rows(vec![patient_row(a, "female"), patient_row(b, "male")]);

    let result = provider
        .context()
        .query::<Patient>(QueryParameters::new().with("name.given", "Jo*"))
        .await
        .unwrap();
    assert_eq!(result.remaining(), 2);
    let patients = result.try_collect().unwrap();

    assert_eq!(patients.len(), 2);
    assert_eq!(patients[0].id, Some(a));
    assert_eq!(patients[1].gender.as_deref(), Some("male"));
    assert_eq!(patients[0].birth_date, Some(date!(1984 - 03 - 09)));

    let log = provider.log();
    assert!(log[0].starts_with("conn0: WITH cte0 AS (SELECT sq0_patient_name.id"));
    assert!(log[0].contains("SELECT patient.id, patient.gender, patient.birth_date"));
    assert!(log[0].contains("ILIKE $1 ESCAPE"));
}

#[tokio::test]
async fn test_composite_rows_split_in_slot_order() {
    let provider = ScriptedProvider::new();
    let id = Uuid::new_v4();
    provider.push_rows(vec![Row::from_values(vec![
        SqlValue::Uuid(id),
        SqlValue::Text("cardiology".into()),
        SqlValue::Uuid(id),
        SqlValue::Text("Dr. Grey".into()),
        SqlValue::Uuid(id),
        SqlValue::Text("PSN".into()),
        SqlValue::Null,
    ])]);

    let rows = provider
        .context()
        .query::<CompositeResult<(Practitioner, Person, Entity)>>(
            Expr::member("specialty").eq("cardiology"),
        )
        .await
        .unwrap()
        .try_collect()
        .unwrap();

    let CompositeResult((practitioner, person, entity)) = rows.into_iter().next().unwrap();
    assert_eq!(practitioner.specialty.as_deref(), Some("cardiology"));
    assert_eq!(person.name.as_deref(), Some("Dr. Grey"));
    assert_eq!(entity.class_code.as_deref(), Some("PSN"));

    assert_eq!(
        provider.log()[0],
        "conn0: SELECT practitioner.id, practitioner.specialty, person.id, person.name, \
         entity.id, entity.class_code, entity.obsoletion_time \
         FROM practitioner AS practitioner \
         INNER JOIN person AS person ON (practitioner.id = person.id) \
         INNER JOIN entity AS entity ON (person.id = entity.id) \
         WHERE practitioner.specialty = $1"
    );
}

#[tokio::test]
async fn test_bad_row_shape_is_a_materialization_error() {
    let provider = ScriptedProvider::new();
    provider.push_rows(vec![Row::from_values(vec![SqlValue::Null])]);

    let err = provider
        .context()
        .query::<Patient>(QueryFilter::None)
        .await
        .unwrap()
        .try_collect()
        .unwrap_err();
    assert!(matches!(err, StorageError::Materialization { .. }));
}

#[tokio::test]
async fn test_first_count_and_exists() {
    let provider = ScriptedProvider::new();
    let context = provider.context();

    provider.push_rows(vec![]);
    assert!(
        context
            .first::<Patient>(QueryParameters::new().with("gender", "male"))
            .await
            .unwrap()
            .is_none()
    );

    provider.push_rows(vec![Row::from_values(vec![SqlValue::Int(3)])]);
    let count = context
        .count::<Patient>(QueryParameters::new().with("gender", "male").with("_count", "1"))
        .await
        .unwrap();
    assert_eq!(count, 3);

    provider.push_rows(vec![Row::from_values(vec![SqlValue::Int(0)])]);
    assert!(!context.exists::<Patient>(QueryFilter::None).await.unwrap());

    let log = provider.log();
    assert!(log[0].ends_with("WHERE patient.gender = $1 LIMIT $2"));
    assert_eq!(
        log[1],
        "conn1: SELECT COUNT(*) FROM (SELECT 1 FROM patient AS patient \
         WHERE patient.gender = $1) AS q"
    );
    // Without a transaction every call gets its own connection
    assert_eq!(provider.connections(), 3);
}

#[tokio::test]
async fn test_first_overrides_requested_page_size() {
    let provider = ScriptedProvider::new();
    let id = Uuid::new_v4();
    provider.push_rows(vec![patient_row(id, "male")]);

    let patient = provider
        .context()
        .first::<Patient>(
            QueryParameters::new()
                .with("gender", "male")
                .with("_count", "5")
                .with("_offset", "10"),
        )
        .await
        .unwrap();
    assert_eq!(patient.and_then(|p| p.id), Some(id));

    let log = provider.log();
    assert!(log[0].ends_with("WHERE patient.gender = $1 LIMIT $2 OFFSET $3"), "{}", log[0]);
    assert_eq!(log[0].matches("LIMIT").count(), 1);
}

#[tokio::test]
async fn test_result_set_streams_rows() {
    let provider = ScriptedProvider::new();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    provider.push_rows(vec![patient_row(a, "female"), patient_row(b, "male")]);

    let ids: Vec<Option<Uuid>> = provider
        .context()
        .query::<Patient>(QueryFilter::None)
        .await
        .unwrap()
        .into_stream()
        .map(|patient| patient.map(|p| p.id))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(ids, vec![Some(a), Some(b)]);
}

#[tokio::test]
async fn test_transaction_reuses_one_connection() {
    let provider = ScriptedProvider::new();
    let context = provider.context();

    let tx = context.begin().await.unwrap();
    let nested = tx.begin().await.unwrap();
    assert!(tx.transaction().unwrap().same_as(nested.transaction().unwrap()));

    provider.push_rows(vec![Row::from_values(vec![SqlValue::Uuid(Uuid::new_v4())])]);
    let mut patient = Patient::default();
    tx.insert(&mut patient).await.unwrap();

    provider.push_rows(vec![Row::from_values(vec![SqlValue::Int(1)])]);
    assert_eq!(nested.count::<Patient>(QueryFilter::None).await.unwrap(), 1);

    nested.commit().await.unwrap();
    assert_eq!(provider.connections(), 1);

    let log = provider.log();
    assert_eq!(log.len(), 4);
    assert!(log.iter().all(|l| l.starts_with("conn0: ")));
    assert_eq!(log[0], "conn0: BEGIN");
    assert_eq!(log[3], "conn0: COMMIT");

    let err = tx.count::<Patient>(QueryFilter::None).await.unwrap_err();
    assert!(matches!(err, StorageError::TransactionError { .. }));
    assert!(!context.in_transaction());
}

#[tokio::test]
async fn test_concurrent_statements_share_the_transaction() {
    let provider = ScriptedProvider::new();
    let tx = provider.context().begin().await.unwrap();
    let (a, b) = (tx.clone(), tx.clone());

    let (first, second) = tokio::join!(
        a.execute(medql_query::SqlStatement::from_sql("UPDATE patient SET deceased = FALSE")),
        b.execute(medql_query::SqlStatement::from_sql("UPDATE patient SET gender = NULL")),
    );
    assert_eq!(first.unwrap() + second.unwrap(), 2);
    tx.rollback().await.unwrap();

    let log = provider.log();
    assert_eq!(log.len(), 4);
    assert!(log.iter().all(|l| l.starts_with("conn0: ")));
    assert_eq!(log[3], "conn0: ROLLBACK");
}

#[tokio::test]
async fn test_commit_without_transaction_fails() {
    let provider = ScriptedProvider::new();
    let err = provider.context().commit().await.unwrap_err();
    assert!(matches!(err, StorageError::TransactionError { .. }));
}

#[tokio::test]
async fn test_update_and_delete_report_missing_rows() {
    let provider = ScriptedProvider::new();
    let context = provider.context();
    let patient = Patient {
        id: Some(Uuid::new_v4()),
        gender: Some("male".into()),
        ..Default::default()
    };

    context.update(&patient).await.unwrap();
    provider.push_affected(0);
    let err = context.delete(&patient).await.unwrap_err();
    assert!(err.is_not_found());

    let log = provider.log();
    assert!(log[0].starts_with("conn0: UPDATE patient SET gender = $1, "));
    assert!(log[0].ends_with("WHERE id = $7"));
    assert_eq!(log[1], "conn1: DELETE FROM patient WHERE id = $1");
}
