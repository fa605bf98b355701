//! MongoDB storage driver.

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection,
    options::{
        Acknowledgment, ClientOptions, DeleteOptions, FindOneOptions, FindOptions,
        InsertOneOptions, UpdateOptions, WriteConcern,
    },
};

use recordlayer_core::{
    driver::{FindDirectives, RemoveOptions, StoreDriver, UpdateReport, WriteAck, WriteOptions},
    error::{RecordStoreError, RecordStoreResult},
};

use crate::config::ConnectionConfig;

/// Storage driver backed by a MongoDB deployment.
///
/// Filters, update documents and pipelines pass through unchanged; the
/// operator syntax the criteria layer builds is the server's native one.
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct MongoDriver {
    client: Client,
    database: String,
}

impl MongoDriver {
    /// Wraps an already-connected client.
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self { client, database: database.into() }
    }

    /// Connects using a `mongodb://` connection string.
    pub async fn connect(dsn: &str, database: &str) -> RecordStoreResult<Self> {
        let options = ClientOptions::parse(dsn)
            .await
            .map_err(|e| RecordStoreError::Connection(e.to_string()))?;
        let client = Client::with_options(options)
            .map_err(|e| RecordStoreError::Connection(e.to_string()))?;
        tracing::debug!(database, "connected to MongoDB");
        Ok(Self::new(client, database))
    }

    /// Connects using declarative settings.
    pub async fn from_config(config: &ConnectionConfig) -> RecordStoreResult<Self> {
        Self::connect(&config.dsn(), &config.database).await
    }

    /// Wraps the driver for handing to a record store.
    pub fn shared(self) -> std::sync::Arc<dyn StoreDriver> {
        std::sync::Arc::new(self)
    }

    /// Releases the connection pool.
    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }

    fn collection(&self, name: &str) -> MongoCollection<Document> {
        self.client.database(&self.database).collection(name)
    }
}

fn write_concern(w: &WriteAck, fsync: bool) -> WriteConcern {
    let mut concern = WriteConcern::default();
    concern.w = Some(match w {
        WriteAck::Unacknowledged => Acknowledgment::Nodes(0),
        WriteAck::Acknowledged => Acknowledgment::Nodes(1),
        WriteAck::Replicas(nodes) => Acknowledgment::Nodes(*nodes),
    });
    if fsync {
        concern.journal = Some(true);
    }
    concern
}

fn projection_document(projection: &[String]) -> Option<Document> {
    if projection.is_empty() {
        return None;
    }
    let mut fields = Document::new();
    for field in projection {
        fields.insert(field.clone(), 1);
    }
    Some(fields)
}

#[async_trait]
impl StoreDriver for MongoDriver {
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: &[String],
    ) -> RecordStoreResult<Option<Document>> {
        let mut options = FindOneOptions::default();
        options.projection = projection_document(projection);

        self.collection(collection)
            .find_one(filter)
            .with_options(options)
            .await
            .map_err(|e| RecordStoreError::Backend(e.to_string()))
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: &[String],
        directives: FindDirectives,
    ) -> RecordStoreResult<Vec<Document>> {
        let mut options = FindOptions::default();
        options.projection = projection_document(projection);
        options.skip = directives.skip;
        if let Some(limit) = directives.limit
            && limit >= 0
        {
            options.limit = Some(limit);
        }
        if let Some(sort) = directives.sort
            && !sort.is_empty()
        {
            options.sort = Some(sort);
        }

        self.collection(collection)
            .find(filter)
            .with_options(options)
            .await
            .map_err(|e| RecordStoreError::Backend(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| RecordStoreError::Backend(e.to_string()))
    }

    async fn insert(
        &self,
        collection: &str,
        document: Document,
        options: &WriteOptions,
    ) -> RecordStoreResult<Bson> {
        let mut insert_options = InsertOneOptions::default();
        insert_options.write_concern = Some(write_concern(&options.w, options.fsync));

        let result = self
            .collection(collection)
            .insert_one(document)
            .with_options(insert_options)
            .await
            .map_err(|e| RecordStoreError::Backend(e.to_string()))?;
        Ok(result.inserted_id)
    }

    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: &WriteOptions,
    ) -> RecordStoreResult<UpdateReport> {
        let mut update_options = UpdateOptions::default();
        update_options.write_concern = Some(write_concern(&options.w, options.fsync));

        let handle = self.collection(collection);
        let result = if options.multiple {
            handle
                .update_many(filter, update)
                .with_options(update_options)
                .await
        } else {
            handle
                .update_one(filter, update)
                .with_options(update_options)
                .await
        }
        .map_err(|e| RecordStoreError::Backend(e.to_string()))?;

        Ok(UpdateReport {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn remove(
        &self,
        collection: &str,
        filter: Document,
        options: &RemoveOptions,
    ) -> RecordStoreResult<u64> {
        let mut delete_options = DeleteOptions::default();
        delete_options.write_concern = Some(write_concern(&options.w, false));

        let handle = self.collection(collection);
        let result = if options.just_one {
            handle.delete_one(filter).with_options(delete_options).await
        } else {
            handle.delete_many(filter).with_options(delete_options).await
        }
        .map_err(|e| RecordStoreError::Backend(e.to_string()))?;

        Ok(result.deleted_count)
    }

    async fn count(&self, collection: &str, filter: Document) -> RecordStoreResult<u64> {
        self.collection(collection)
            .count_documents(filter)
            .await
            .map_err(|e| RecordStoreError::Backend(e.to_string()))
    }

    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Document,
    ) -> RecordStoreResult<Vec<Bson>> {
        self.collection(collection)
            .distinct(field, filter)
            .await
            .map_err(|e| RecordStoreError::Backend(e.to_string()))
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> RecordStoreResult<Vec<Document>> {
        self.collection(collection)
            .aggregate(pipeline)
            .await
            .map_err(|e| RecordStoreError::Backend(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| RecordStoreError::Backend(e.to_string()))
    }
}
