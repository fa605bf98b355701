//! Storage driver abstraction for the mapper.
//!
//! This module defines the transport-facing traits and option types that
//! abstract over concrete document stores. The core issues at most one or two
//! sequential round-trips per operation through [`StoreDriver`]; pooling,
//! retry and timeout policy belong to the driver implementation.
//!
//! # Overview
//!
//! [`StoreDriver`] is an object-safe async trait; every method takes the
//! target collection name per call. [`CollectionHandle`] binds a collection
//! name to a shared driver and is the value the record and criteria layers
//! actually hold.

use async_trait::async_trait;
use bson::{Bson, Document};
use std::{fmt::Debug, sync::Arc};

use crate::{cursor::Cursor, error::RecordStoreResult};

/// Write acknowledgement level, the `w` option of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAck {
    /// Fire-and-forget; the driver does not wait for confirmation.
    Unacknowledged,
    /// Acknowledged by the primary.
    Acknowledged,
    /// Acknowledged by the given number of replica set members.
    Replicas(u32),
}

/// Options recognized by insert and update operations.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Force the store to flush pending writes to disk before returning.
    pub fsync: bool,
    /// Apply the update to every matching document instead of the first.
    pub multiple: bool,
    /// Acknowledgement level for the write.
    pub w: WriteAck,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { fsync: false, multiple: false, w: WriteAck::Acknowledged }
    }
}

/// Options recognized by remove operations.
#[derive(Debug, Clone)]
pub struct RemoveOptions {
    /// Remove only the first matching document.
    pub just_one: bool,
    /// Acknowledgement level for the removal.
    pub w: WriteAck,
}

impl Default for RemoveOptions {
    fn default() -> Self {
        Self { just_one: false, w: WriteAck::Acknowledged }
    }
}

/// Outcome of an update round-trip.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateReport {
    /// Number of documents the filter matched.
    pub matched: u64,
    /// Number of documents the store actually changed.
    pub modified: u64,
}

/// Cursor configuration resolved at fetch time.
///
/// A [`Cursor`] accumulates these between `find` and first iteration, so
/// skip/limit/sort still reach the store in a single round-trip.
#[derive(Debug, Clone, Default)]
pub struct FindDirectives {
    /// Number of documents to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<i64>,
    /// Sort specification, field name to +1/-1, evaluated in insertion order.
    pub sort: Option<Document>,
}

/// Abstract interface for document store drivers.
///
/// Implementers provide the concrete transport to a store: the in-memory
/// driver for development and tests, the MongoDB driver for production.
/// Filters, update documents and pipelines are passed in the store's native
/// operator syntax (`$eq`, `$set`, `$group`, ...); drivers translate or
/// evaluate them as needed.
///
/// # Error Handling
///
/// Driver-level failures surface as [`RecordStoreError`](crate::error::RecordStoreError)
/// variants (`Backend`, `WriteConflict`, `Connection`); a filter matching
/// nothing is not an error.
#[async_trait]
pub trait StoreDriver: Send + Sync + Debug {
    /// Resolves at most one document matching `filter`.
    ///
    /// An empty `projection` means all fields.
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: &[String],
    ) -> RecordStoreResult<Option<Document>>;

    /// Resolves every document matching `filter`, honoring the directives.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: &[String],
        directives: FindDirectives,
    ) -> RecordStoreResult<Vec<Document>>;

    /// Writes a new document and returns the store-assigned identity.
    ///
    /// If the document carries no `_id`, the driver assigns one.
    async fn insert(
        &self,
        collection: &str,
        document: Document,
        options: &WriteOptions,
    ) -> RecordStoreResult<Bson>;

    /// Applies `update` (an operator document, e.g. `{"$set": {...}}`) to the
    /// first matching document, or to all of them when `options.multiple`.
    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: &WriteOptions,
    ) -> RecordStoreResult<UpdateReport>;

    /// Removes matching documents and returns the number removed.
    async fn remove(
        &self,
        collection: &str,
        filter: Document,
        options: &RemoveOptions,
    ) -> RecordStoreResult<u64>;

    /// Counts documents matching `filter`.
    async fn count(&self, collection: &str, filter: Document) -> RecordStoreResult<u64>;

    /// Returns the distinct values of `field` across matching documents.
    ///
    /// A filter matching nothing yields an empty sequence, never an error.
    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Document,
    ) -> RecordStoreResult<Vec<Bson>>;

    /// Executes an aggregation pipeline and returns the result rows.
    ///
    /// Drivers unwrap any result envelope of their wire protocol; callers
    /// always see the plain row sequence.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> RecordStoreResult<Vec<Document>>;
}

/// A named collection bound to a shared storage driver.
///
/// This is the handle the record and criteria layers operate through. It is
/// cheap to clone; clones share the same driver.
#[derive(Debug, Clone)]
pub struct CollectionHandle {
    name: String,
    driver: Arc<dyn StoreDriver>,
}

impl CollectionHandle {
    /// Creates a handle binding `name` to `driver`.
    pub fn new(name: impl Into<String>, driver: Arc<dyn StoreDriver>) -> Self {
        Self { name: name.into(), driver }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a handle to another collection on the same driver.
    pub fn with_collection(&self, name: impl Into<String>) -> CollectionHandle {
        CollectionHandle { name: name.into(), driver: Arc::clone(&self.driver) }
    }

    /// Resolves at most one document matching `filter`.
    pub async fn find_one(
        &self,
        filter: Document,
        projection: &[String],
    ) -> RecordStoreResult<Option<Document>> {
        self.driver
            .find_one(&self.name, filter, projection)
            .await
    }

    /// Issues a find and returns a lazy cursor over the results.
    ///
    /// The query is not sent until the cursor is first iterated, so
    /// skip/limit/sort applied to the cursor still reach the store.
    pub fn find(&self, filter: Document, projection: &[String]) -> Cursor {
        Cursor::new(self.clone(), filter, projection.to_vec())
    }

    /// Fetches documents directly, bypassing the cursor layer.
    pub(crate) async fn find_with_directives(
        &self,
        filter: Document,
        projection: &[String],
        directives: FindDirectives,
    ) -> RecordStoreResult<Vec<Document>> {
        self.driver
            .find(&self.name, filter, projection, directives)
            .await
    }

    /// Writes a new document and returns the store-assigned identity.
    pub async fn insert(
        &self,
        document: Document,
        options: &WriteOptions,
    ) -> RecordStoreResult<Bson> {
        self.driver
            .insert(&self.name, document, options)
            .await
    }

    /// Applies an operator update document to matching documents.
    pub async fn update(
        &self,
        filter: Document,
        update: Document,
        options: &WriteOptions,
    ) -> RecordStoreResult<UpdateReport> {
        self.driver
            .update(&self.name, filter, update, options)
            .await
    }

    /// Removes matching documents and returns the number removed.
    pub async fn remove(
        &self,
        filter: Document,
        options: &RemoveOptions,
    ) -> RecordStoreResult<u64> {
        self.driver
            .remove(&self.name, filter, options)
            .await
    }

    /// Counts documents matching `filter`.
    pub async fn count(&self, filter: Document) -> RecordStoreResult<u64> {
        self.driver.count(&self.name, filter).await
    }

    /// Returns the distinct values of `field` across matching documents.
    pub async fn distinct(
        &self,
        field: &str,
        filter: Document,
    ) -> RecordStoreResult<Vec<Bson>> {
        self.driver
            .distinct(&self.name, field, filter)
            .await
    }

    /// Executes an aggregation pipeline and returns the result rows.
    pub async fn aggregate(&self, pipeline: Vec<Document>) -> RecordStoreResult<Vec<Document>> {
        self.driver
            .aggregate(&self.name, pipeline)
            .await
    }
}
