//! Aggregation pipelines and reducers over the in-memory driver.

use recordlayer::bson::{Bson, doc};
use recordlayer::memory::InMemoryDriver;
use recordlayer::prelude::*;

fn store() -> RecordStore {
    schema::register(
        EntityDescriptor::builder("call", "calls")
            .attribute("status", AttributeType::String)
            .attribute("duration", AttributeType::Int)
            .build(),
    );
    RecordStore::new(InMemoryDriver::new().shared())
}

async fn seed(store: &RecordStore, status: &str, duration: i32) {
    let mut call = store.record("call").unwrap();
    call.set("status", status).unwrap();
    call.set("duration", duration).unwrap();
    assert!(call.insert(None).await.unwrap());
}

#[tokio::test]
async fn reducers_respect_the_record_scope() {
    let store = store();
    seed(&store, "active", 30).await;
    seed(&store, "active", 90).await;
    seed(&store, "closed", 600).await;

    let mut scoped = store.record("call").unwrap();
    scoped.criteria_mut().compare("status", "active", Connective::And);
    let aggregation = scoped.aggregation();

    assert_eq!(aggregation.max("duration").await.unwrap(), Bson::Int32(90));
    assert_eq!(aggregation.min("duration").await.unwrap(), Bson::Int32(30));
    assert_eq!(aggregation.sum("duration").await.unwrap(), Bson::Int64(120));
    assert_eq!(aggregation.avg("duration").await.unwrap(), Bson::Double(60.0));
}

#[tokio::test]
async fn reducers_without_scope_cover_the_collection() {
    let store = store();
    seed(&store, "active", 30).await;
    seed(&store, "closed", 600).await;

    let unscoped = store.record("call").unwrap();
    let aggregation = unscoped.aggregation();
    assert_eq!(aggregation.sum("duration").await.unwrap(), Bson::Int64(630));
}

#[tokio::test]
async fn staged_pipelines_execute_in_order() {
    let store = store();
    seed(&store, "active", 30).await;
    seed(&store, "active", 90).await;
    seed(&store, "closed", 600).await;

    let record = store.record("call").unwrap();
    let mut aggregation = record.aggregation();
    aggregation
        .match_stage(doc! { "duration": { "$lt": 100 } })
        .group(doc! { "_id": "$status", "total": { "$sum": "$duration" } })
        .sort(doc! { "total": -1 })
        .limit(1);
    let rows = aggregation.aggregate().await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("_id"), Some(&Bson::String("active".to_string())));
    assert_eq!(rows[0].get("total"), Some(&Bson::Int64(120)));

    // Execution cleared the stages; the builder is reusable.
    assert!(aggregation.stages().is_empty());
}

#[tokio::test]
async fn projection_and_unwind_reshape_rows() {
    let record_store = RecordStore::new(InMemoryDriver::new().shared());
    let collection = record_store.select_collection("conferences");
    collection
        .insert(
            doc! { "name": "standup", "members": ["ana", "bo"] },
            &WriteOptions::default(),
        )
        .await
        .unwrap();

    let mut aggregation = Aggregation::new(collection, doc! {});
    aggregation
        .unwind("$members")
        .select(doc! { "_id": 0, "member": "$members" })
        .sort(doc! { "member": 1 });
    let rows = aggregation.aggregate().await.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], doc! { "member": "ana" });
    assert_eq!(rows[1], doc! { "member": "bo" });
}
