//! Relation resolution and caching over the in-memory driver.

use recordlayer::bson::Bson;
use recordlayer::memory::InMemoryDriver;
use recordlayer::prelude::*;

fn register_entities() {
    schema::register(
        EntityDescriptor::builder("place", "places")
            .attribute("name", AttributeType::String)
            .relation("primary_call", RelationKind::HasOne, "call", "place_key")
            .relation("calls", RelationKind::HasMany, "call", "place_ref")
            .relation("has_calls", RelationKind::HasRelationWith, "call", "place_key")
            .relation("ghost_target", RelationKind::HasMany, "unregistered", "place_ref")
            .relation("missing_field", RelationKind::HasOne, "call", "undeclared")
            .build(),
    );
    schema::register(
        EntityDescriptor::builder("call", "calls")
            .attribute("status", AttributeType::String)
            .attribute("place_id", AttributeType::String)
            .attribute("place_key", AttributeType::String)
            .attribute("place_ref", AttributeType::ObjectId)
            .relation("place", RelationKind::BelongsTo, "place", "place_id")
            .build(),
    );
}

fn store() -> RecordStore {
    register_entities();
    RecordStore::new(InMemoryDriver::new().shared())
}

async fn seed_place(store: &RecordStore, name: &str) -> Record {
    let mut place = store.record("place").unwrap();
    place.set("name", name).unwrap();
    assert!(place.insert(None).await.unwrap());
    place
}

#[tokio::test]
async fn belongs_to_resolves_through_the_foreign_value() {
    let store = store();
    let place = seed_place(&store, "central office").await;

    let mut call = store.record("call").unwrap();
    call.set("status", "active").unwrap();
    call.set("place_id", place.primary_key()).unwrap();
    assert!(call.insert(None).await.unwrap());

    match call.get_related("place").await.unwrap() {
        Related::One(Some(found)) => {
            assert_eq!(found.get("name").unwrap(), Bson::String("central office".to_string()));
            assert_eq!(found.primary_key(), place.primary_key());
        }
        other => panic!("expected a resolved target, got {other:?}"),
    }
}

#[tokio::test]
async fn belongs_to_without_a_foreign_value_is_broken() {
    let store = store();
    let mut call = store.record("call").unwrap();
    call.set("status", "active").unwrap();
    assert!(call.insert(None).await.unwrap());

    assert!(matches!(
        call.get_related("place").await,
        Err(RecordStoreError::BrokenRelation(_))
    ));
}

#[tokio::test]
async fn has_one_joins_on_the_identity_string() {
    let store = store();
    let mut place = seed_place(&store, "branch office").await;

    let mut call = store.record("call").unwrap();
    call.set("status", "active").unwrap();
    call.set("place_key", place.primary_key()).unwrap();
    assert!(call.insert(None).await.unwrap());

    match place.get_related("primary_call").await.unwrap() {
        Related::One(Some(found)) => {
            assert_eq!(found.get("status").unwrap(), Bson::String("active".to_string()));
        }
        other => panic!("expected a resolved target, got {other:?}"),
    }
}

#[tokio::test]
async fn has_many_joins_on_the_raw_identity() {
    let store = store();
    let mut place = seed_place(&store, "warehouse").await;
    let place_id = place.id().cloned().unwrap();

    for status in ["active", "closed"] {
        let mut call = store.record("call").unwrap();
        call.set("status", status).unwrap();
        call.set("place_ref", place_id.clone()).unwrap();
        assert!(call.insert(None).await.unwrap());
    }

    match place.get_related("calls").await.unwrap() {
        Related::Many(calls) => assert_eq!(calls.len(), 2),
        other => panic!("expected a record set, got {other:?}"),
    }
}

#[tokio::test]
async fn existence_probe_answers_both_ways() {
    let store = store();
    let mut linked = seed_place(&store, "linked").await;
    let mut lonely = seed_place(&store, "lonely").await;

    let mut call = store.record("call").unwrap();
    call.set("status", "active").unwrap();
    call.set("place_key", linked.primary_key()).unwrap();
    assert!(call.insert(None).await.unwrap());

    assert!(matches!(
        linked.get_related("has_calls").await.unwrap(),
        Related::Exists(true)
    ));
    assert!(matches!(
        lonely.get_related("has_calls").await.unwrap(),
        Related::Exists(false)
    ));
}

#[tokio::test]
async fn resolved_relations_are_cached_for_the_instance() {
    let store = store();
    let mut place = seed_place(&store, "cached").await;
    let place_id = place.id().cloned().unwrap();

    let mut first = store.record("call").unwrap();
    first.set("status", "active").unwrap();
    first.set("place_ref", place_id.clone()).unwrap();
    assert!(first.insert(None).await.unwrap());

    let resolved = place.get_related("calls").await.unwrap();
    assert!(matches!(&resolved, Related::Many(calls) if calls.len() == 1));

    // The store changes underneath; the cached result does not.
    let mut second = store.record("call").unwrap();
    second.set("status", "closed").unwrap();
    second.set("place_ref", place_id).unwrap();
    assert!(second.insert(None).await.unwrap());

    let cached = place.get_related("calls").await.unwrap();
    assert!(matches!(&cached, Related::Many(calls) if calls.len() == 1));

    // A fresh instance starts with an empty cache and sees both.
    let mut finder = store.record("place").unwrap();
    let mut fresh = finder
        .find_by_id(place.primary_key())
        .await
        .unwrap()
        .expect("place still stored");
    let reloaded = fresh.get_related("calls").await.unwrap();
    assert!(matches!(&reloaded, Related::Many(calls) if calls.len() == 2));
}

#[tokio::test]
async fn misdeclared_relations_surface_as_broken() {
    let store = store();
    let mut place = seed_place(&store, "misconfigured").await;

    assert!(matches!(
        place.get_related("ghost_target").await,
        Err(RecordStoreError::BrokenRelation(_))
    ));
    assert!(matches!(
        place.get_related("missing_field").await,
        Err(RecordStoreError::BrokenRelation(_))
    ));
    assert!(matches!(
        place.get_related("undeclared_name").await,
        Err(RecordStoreError::InvalidArgument(_))
    ));
}
