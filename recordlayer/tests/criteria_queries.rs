//! Criteria construction exercised end to end against the in-memory driver.

use recordlayer::bson::{Bson, doc};
use recordlayer::memory::InMemoryDriver;
use recordlayer::prelude::*;

fn store() -> RecordStore {
    schema::register(
        EntityDescriptor::builder("call", "calls")
            .attribute("status", AttributeType::String)
            .attribute("duration", AttributeType::Int)
            .attribute("caller", AttributeType::String)
            .attribute("meta", AttributeType::Document)
            .build(),
    );
    RecordStore::new(InMemoryDriver::new().shared())
}

async fn seed(store: &RecordStore, status: &str, duration: i32, caller: &str) {
    let mut call = store.record("call").unwrap();
    call.set("status", status).unwrap();
    call.set("duration", duration).unwrap();
    call.set("caller", caller).unwrap();
    assert!(call.insert(None).await.unwrap());
}

async fn seeded() -> RecordStore {
    let store = store();
    seed(&store, "active", 30, "Alice Jones").await;
    seed(&store, "active", 90, "Bob Ray").await;
    seed(&store, "closed", 60, "alice smith").await;
    store
}

#[tokio::test]
async fn disjunctions_match_either_branch() {
    let store = seeded().await;

    let mut criteria = Criteria::new();
    criteria
        .add_condition("status", "=", "closed", Connective::Or)
        .add_condition("duration", ">", 80, Connective::Or);

    let mut finder = store.record("call").unwrap();
    let rows = finder.find_all(Some(criteria.into())).await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn conjunction_after_disjunction_restricts_it() {
    let store = seeded().await;

    let mut criteria = Criteria::new();
    criteria
        .add_condition("status", "=", "active", Connective::Or)
        .add_condition("status", "=", "closed", Connective::Or)
        .add_condition("duration", "<", 70, Connective::And);

    let mut finder = store.record("call").unwrap();
    let rows = finder.find_all(Some(criteria.into())).await.unwrap();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        let Bson::Int32(duration) = row.get("duration").unwrap() else {
            panic!("duration must be an int");
        };
        assert!(duration < 70);
    }
}

#[tokio::test]
async fn like_conditions_match_substrings_case_insensitively() {
    let store = seeded().await;

    let mut criteria = Criteria::new();
    criteria.add_like_condition("caller", "alice", Connective::And);

    let mut finder = store.record("call").unwrap();
    let rows = finder.find_all(Some(criteria.into())).await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn membership_and_exclusion_conditions() {
    let store = seeded().await;

    let mut included = Criteria::new();
    included.add_in_condition("duration", [30, 60], Connective::And);
    let finder = store.record("call").unwrap();
    assert_eq!(finder.count(Some(included.into())).await.unwrap(), 2);

    let mut excluded = Criteria::new();
    excluded.add_not_in_condition("status", ["closed"], Connective::And);
    assert_eq!(finder.count(Some(excluded.into())).await.unwrap(), 2);
}

#[tokio::test]
async fn sub_document_conditions_pair_operators_with_values() {
    let store = store();
    let mut call = store.record("call").unwrap();
    call.set("status", "active").unwrap();
    call.set("meta", doc! { "rate": 48000 }).unwrap();
    assert!(call.insert(None).await.unwrap());

    let mut criteria = Criteria::new();
    criteria
        .add_sub_document_condition("meta", "rate", &[">=", "<"], vec![44100, 96000], Connective::And)
        .unwrap();

    let finder = store.record("call").unwrap();
    assert_eq!(finder.count(Some(criteria.into())).await.unwrap(), 1);

    let mut criteria = Criteria::new();
    assert!(matches!(
        criteria.add_sub_document_condition("meta", "rate", &[">="], Vec::<i32>::new(), Connective::And),
        Err(RecordStoreError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn paging_and_sorting_flow_through_the_cursor() {
    let store = seeded().await;

    let mut criteria = Criteria::new();
    criteria
        .order_by("duration", SortDirection::Asc, false)
        .set_offset(1)
        .set_limit(1);

    let mut finder = store.record("call").unwrap();
    let rows = finder.find_all(Some(criteria.into())).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("duration").unwrap(), Bson::Int32(60));
}

#[tokio::test]
async fn projections_narrow_materialized_records() {
    let store = seeded().await;

    let mut criteria = Criteria::new();
    criteria
        .compare("status", "closed", Connective::And)
        .select(vec!["status".to_string()]);

    let mut finder = store.record("call").unwrap();
    let rows = finder.find_all(Some(criteria.into())).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("status").unwrap(), Bson::String("closed".to_string()));
    // Unprojected attributes materialize unset.
    assert_eq!(rows[0].get("duration").unwrap(), Bson::Null);
}

#[tokio::test]
async fn merged_specs_add_paging_to_an_existing_scope() {
    let store = seeded().await;

    let mut finder = store.record("call").unwrap();
    finder.criteria_mut().compare("status", "active", Connective::And);

    let spec = CriteriaSpec::new()
        .sort(doc! { "duration": -1 })
        .limit(1);
    let rows = finder.find_all(None).await.unwrap();
    assert_eq!(rows.len(), 3); // standalone query ignores the instance scope

    finder.criteria_mut().merge_with_spec(spec);
    let scoped = finder.active_criteria().unwrap().clone();
    let rows = finder.find_all(Some(scoped.into())).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("duration").unwrap(), Bson::Int32(90));
}

#[tokio::test]
async fn removed_conditions_stop_filtering() {
    let store = seeded().await;

    let mut criteria = Criteria::new();
    criteria
        .compare("status", "closed", Connective::And)
        .compare("duration", 60, Connective::And);
    criteria.remove_condition("status");

    let finder = store.record("call").unwrap();
    assert_eq!(finder.count(Some(criteria.into())).await.unwrap(), 1);
}

#[tokio::test]
async fn validation_rejects_undeclared_fields() {
    let store = store();
    let record = store.record("call").unwrap();
    let declared = record.descriptor().attribute_names();

    let mut criteria = Criteria::new();
    criteria.order_by("duration", SortDirection::Asc, false);
    assert!(criteria.validate(&declared).is_ok());

    criteria.order_by("ghost", SortDirection::Asc, true);
    assert!(matches!(
        criteria.validate(&declared),
        Err(RecordStoreError::SchemaMismatch(_))
    ));
}
