//! In-memory storage driver.
//!
//! Documents live in nested HashMaps behind an async-aware read-write lock,
//! keyed by collection name and then by the string form of their identity.
//! Every query scans the target collection; there is no indexing.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;

use recordlayer_core::{
    driver::{FindDirectives, RemoveOptions, StoreDriver, UpdateReport, WriteOptions},
    error::{RecordStoreError, RecordStoreResult},
};

use crate::{evaluator, pipeline};

type CollectionMap = HashMap<String, Document>;
type StoreMap = HashMap<String, CollectionMap>;

/// Thread-safe in-memory storage driver.
///
/// Implements [`StoreDriver`] entirely in memory, which makes it the natural
/// backend for tests and development. Cloning is cheap; clones share the
/// same underlying data.
///
/// Write acknowledgement and fsync options are accepted and ignored, since
/// every write is immediately visible. Geospatial filters are rejected with
/// a `Backend` error.
#[derive(Default, Clone, Debug)]
pub struct InMemoryDriver {
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryDriver {
    /// Creates a new empty in-memory driver.
    pub fn new() -> Self {
        Self { store: Arc::new(RwLock::new(StoreMap::new())) }
    }

    /// Wraps the driver for handing to a record store.
    pub fn shared(self) -> Arc<dyn StoreDriver> {
        Arc::new(self)
    }
}

/// String form of an identity value, used as the storage key.
fn identity_key(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(value) => value.clone(),
        other => other.to_string(),
    }
}

/// Narrows a document to the projected fields. The identity field always
/// survives projection.
fn project(document: Document, projection: &[String]) -> Document {
    if projection.is_empty() {
        return document;
    }
    let mut shaped = Document::new();
    if let Some(id) = document.get("_id") {
        shaped.insert("_id", id.clone());
    }
    for field in projection {
        if field == "_id" {
            continue;
        }
        if let Some(value) = evaluator::resolve_path(&document, field) {
            shaped.insert(field.clone(), value.clone());
        }
    }
    shaped
}

/// Applies an update document to `target`, returning whether anything
/// changed. Operator documents are applied field by field; a plain document
/// replaces everything but the identity.
fn apply_update(target: &mut Document, update: &Document) -> RecordStoreResult<bool> {
    let has_operators = update.iter().any(|(key, _)| {
        let key: &str = key.as_ref();
        key.starts_with('$')
    });
    let before = target.clone();

    if has_operators {
        for (operator, params) in update {
            let operator: &str = operator.as_ref();
            let params = params.as_document().ok_or_else(|| {
                RecordStoreError::InvalidArgument(format!(
                    "update operator '{operator}' expects a document"
                ))
            })?;
            match operator {
                "$set" => {
                    for (path, value) in params {
                        let path: &str = path.as_ref();
                        evaluator::set_path(target, path, value.clone());
                    }
                }
                "$unset" => {
                    for (path, _) in params {
                        let path: &str = path.as_ref();
                        evaluator::unset_path(target, path);
                    }
                }
                "$inc" => {
                    for (path, amount) in params {
                        let path: &str = path.as_ref();
                        let current = evaluator::resolve_path(target, path);
                        let updated = add_numeric(current, amount).ok_or_else(|| {
                            RecordStoreError::InvalidArgument(
                                "'$inc' expects numeric operands".to_string(),
                            )
                        })?;
                        evaluator::set_path(target, path, updated);
                    }
                }
                other => {
                    return Err(RecordStoreError::Backend(format!(
                        "unsupported update operator '{other}'"
                    )));
                }
            }
        }
    } else {
        let id = target.get("_id").cloned();
        *target = update.clone();
        if let Some(id) = id {
            target.insert("_id", id);
        }
    }

    Ok(*target != before)
}

fn add_numeric(current: Option<&Bson>, amount: &Bson) -> Option<Bson> {
    fn as_i64(value: &Bson) -> Option<i64> {
        match value {
            Bson::Int32(v) => Some(*v as i64),
            Bson::Int64(v) => Some(*v),
            _ => None,
        }
    }
    fn as_f64(value: &Bson) -> Option<f64> {
        match value {
            Bson::Int32(v) => Some(*v as f64),
            Bson::Int64(v) => Some(*v as f64),
            Bson::Double(v) => Some(*v),
            _ => None,
        }
    }

    let amount_value = as_f64(amount)?;
    match current {
        None => Some(amount.clone()),
        Some(value) => match (as_i64(value), as_i64(amount)) {
            (Some(a), Some(b)) => Some(Bson::Int64(a + b)),
            _ => Some(Bson::Double(as_f64(value)? + amount_value)),
        },
    }
}

#[async_trait]
impl StoreDriver for InMemoryDriver {
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: &[String],
    ) -> RecordStoreResult<Option<Document>> {
        let directives = FindDirectives { limit: Some(1), ..FindDirectives::default() };
        let rows = self.find(collection, filter, projection, directives).await?;
        Ok(rows.into_iter().next())
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: &[String],
        directives: FindDirectives,
    ) -> RecordStoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(map) = store.get(collection) else {
            return Ok(Vec::new());
        };

        let mut rows = Vec::new();
        for document in map.values() {
            if evaluator::matches(document, &filter)? {
                rows.push(document.clone());
            }
        }

        if let Some(sort) = &directives.sort
            && !sort.is_empty()
        {
            rows.sort_by(|a, b| evaluator::compare_documents(a, b, sort));
        }

        let skip = directives.skip.unwrap_or(0) as usize;
        let limit = match directives.limit {
            Some(limit) if limit >= 0 => limit as usize,
            _ => usize::MAX,
        };

        Ok(rows
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|document| project(document, projection))
            .collect())
    }

    async fn insert(
        &self,
        collection: &str,
        mut document: Document,
        _options: &WriteOptions,
    ) -> RecordStoreResult<Bson> {
        let id = match document.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                document.insert("_id", id.clone());
                id
            }
        };
        let key = identity_key(&id);

        let mut store = self.store.write().await;
        let map = store.entry(collection.to_string()).or_default();
        if map.contains_key(&key) {
            return Err(RecordStoreError::WriteConflict(format!(
                "duplicate identity '{key}' in collection '{collection}'"
            )));
        }
        map.insert(key, document);
        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: &WriteOptions,
    ) -> RecordStoreResult<UpdateReport> {
        let mut store = self.store.write().await;
        let Some(map) = store.get_mut(collection) else {
            return Ok(UpdateReport::default());
        };

        let mut targets = Vec::new();
        for (key, document) in map.iter() {
            if evaluator::matches(document, &filter)? {
                targets.push(key.clone());
            }
        }

        let mut report = UpdateReport::default();
        for key in targets {
            if let Some(document) = map.get_mut(&key) {
                report.matched += 1;
                if apply_update(document, &update)? {
                    report.modified += 1;
                }
            }
            if !options.multiple {
                break;
            }
        }
        Ok(report)
    }

    async fn remove(
        &self,
        collection: &str,
        filter: Document,
        options: &RemoveOptions,
    ) -> RecordStoreResult<u64> {
        let mut store = self.store.write().await;
        let Some(map) = store.get_mut(collection) else {
            return Ok(0);
        };

        let mut targets = Vec::new();
        for (key, document) in map.iter() {
            if evaluator::matches(document, &filter)? {
                targets.push(key.clone());
            }
        }
        if options.just_one {
            targets.truncate(1);
        }

        for key in &targets {
            map.remove(key);
        }
        Ok(targets.len() as u64)
    }

    async fn count(&self, collection: &str, filter: Document) -> RecordStoreResult<u64> {
        let store = self.store.read().await;
        let Some(map) = store.get(collection) else {
            return Ok(0);
        };

        let mut total = 0;
        for document in map.values() {
            if evaluator::matches(document, &filter)? {
                total += 1;
            }
        }
        Ok(total)
    }

    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Document,
    ) -> RecordStoreResult<Vec<Bson>> {
        let store = self.store.read().await;
        let Some(map) = store.get(collection) else {
            return Ok(Vec::new());
        };

        let mut values: Vec<Bson> = Vec::new();
        let mut consider = |value: &Bson, values: &mut Vec<Bson>| {
            if !values.contains(value) {
                values.push(value.clone());
            }
        };
        for document in map.values() {
            if !evaluator::matches(document, &filter)? {
                continue;
            }
            match evaluator::resolve_path(document, field) {
                // Array fields contribute their elements, not the array.
                Some(Bson::Array(elements)) => {
                    for element in elements {
                        consider(element, &mut values);
                    }
                }
                Some(value) => consider(value, &mut values),
                None => {}
            }
        }
        Ok(values)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> RecordStoreResult<Vec<Document>> {
        let rows = {
            let store = self.store.read().await;
            store
                .get(collection)
                .map(|map| map.values().cloned().collect::<Vec<_>>())
                .unwrap_or_default()
        };
        pipeline::execute(rows, pipeline)
    }
}
