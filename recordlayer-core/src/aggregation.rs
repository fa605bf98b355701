//! Staged aggregation pipeline builder.
//!
//! An [`Aggregation`] accumulates pipeline stages fluently and executes them
//! against a bound collection. Execution consumes the stage list, so the
//! same builder can be reused immediately for a new pipeline. The
//! convenience reducers issue their own two-stage pipeline seeded with the
//! owning record's current criteria conditions as an implicit match.

use bson::{Bson, Document, doc};

use crate::{driver::CollectionHandle, error::RecordStoreResult};

/// Fluent pipeline accumulator over one collection.
#[derive(Debug, Clone)]
pub struct Aggregation {
    collection: CollectionHandle,
    base_conditions: Document,
    stages: Vec<Document>,
}

impl Aggregation {
    /// Creates a builder over `collection`.
    ///
    /// `base_conditions` seed the implicit `$match` of the reducers; staged
    /// pipelines ignore them.
    pub fn new(collection: CollectionHandle, base_conditions: Document) -> Self {
        Self { collection, base_conditions, stages: Vec::new() }
    }

    /// Appends a `$match` stage.
    pub fn match_stage(&mut self, params: Document) -> &mut Self {
        self.stages.push(doc! { "$match": params });
        self
    }

    /// Appends a `$group` stage.
    pub fn group(&mut self, params: Document) -> &mut Self {
        self.stages.push(doc! { "$group": params });
        self
    }

    /// Appends a `$project` stage.
    pub fn select(&mut self, params: Document) -> &mut Self {
        self.stages.push(doc! { "$project": params });
        self
    }

    /// Appends an `$unwind` stage.
    pub fn unwind(&mut self, expression: impl Into<Bson>) -> &mut Self {
        self.stages.push(doc! { "$unwind": expression.into() });
        self
    }

    /// Appends a `$sort` stage.
    pub fn sort(&mut self, fields: Document) -> &mut Self {
        self.stages.push(doc! { "$sort": fields });
        self
    }

    /// Appends a `$limit` stage.
    pub fn limit(&mut self, limit: i64) -> &mut Self {
        self.stages.push(doc! { "$limit": limit });
        self
    }

    /// The accumulated stages, in order.
    pub fn stages(&self) -> &[Document] {
        &self.stages
    }

    /// Executes the accumulated pipeline and clears it.
    ///
    /// The builder is reusable immediately after; the driver boundary has
    /// already unwrapped any result envelope.
    pub async fn aggregate(&mut self) -> RecordStoreResult<Vec<Document>> {
        let pipeline = std::mem::take(&mut self.stages);
        tracing::trace!(
            collection = self.collection.name(),
            stages = pipeline.len(),
            "aggregate"
        );
        self.collection.aggregate(pipeline).await
    }

    /// The maximum value of `field` across the matched documents.
    pub async fn max(&self, field: &str) -> RecordStoreResult<Bson> {
        self.reduce("$max", field).await
    }

    /// The minimum value of `field` across the matched documents.
    pub async fn min(&self, field: &str) -> RecordStoreResult<Bson> {
        self.reduce("$min", field).await
    }

    /// The average of `field` across the matched documents.
    pub async fn avg(&self, field: &str) -> RecordStoreResult<Bson> {
        self.reduce("$avg", field).await
    }

    /// The sum of `field` across the matched documents.
    pub async fn sum(&self, field: &str) -> RecordStoreResult<Bson> {
        self.reduce("$sum", field).await
    }

    /// Runs match-then-group over the base conditions and extracts the
    /// reduced value from the first result row. When the expected shape is
    /// absent the raw rows come back unshaped, as an array.
    async fn reduce(&self, operator: &str, field: &str) -> RecordStoreResult<Bson> {
        let mut pipeline = Vec::new();
        if !self.base_conditions.is_empty() {
            pipeline.push(doc! { "$match": self.base_conditions.clone() });
        }
        let mut reducer = Document::new();
        reducer.insert(operator, format!("${field}"));
        let mut group = Document::new();
        group.insert("_id", Bson::Null);
        group.insert("value", reducer);
        pipeline.push(doc! { "$group": group });

        let rows = self.collection.aggregate(pipeline).await?;
        match rows.first().and_then(|row| row.get("value")) {
            Some(value) => Ok(value.clone()),
            None => Ok(Bson::Array(rows.into_iter().map(Bson::Document).collect())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{FindDirectives, StoreDriver, UpdateReport};
    use crate::driver::{RemoveOptions, WriteOptions};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct PipelineProbe {
        seen: Mutex<Vec<Vec<Document>>>,
        rows: Mutex<Vec<Document>>,
    }

    #[async_trait]
    impl StoreDriver for PipelineProbe {
        async fn find_one(
            &self,
            _collection: &str,
            _filter: Document,
            _projection: &[String],
        ) -> RecordStoreResult<Option<Document>> {
            Ok(None)
        }

        async fn find(
            &self,
            _collection: &str,
            _filter: Document,
            _projection: &[String],
            _directives: FindDirectives,
        ) -> RecordStoreResult<Vec<Document>> {
            Ok(Vec::new())
        }

        async fn insert(
            &self,
            _collection: &str,
            _document: Document,
            _options: &WriteOptions,
        ) -> RecordStoreResult<Bson> {
            Ok(Bson::Null)
        }

        async fn update(
            &self,
            _collection: &str,
            _filter: Document,
            _update: Document,
            _options: &WriteOptions,
        ) -> RecordStoreResult<UpdateReport> {
            Ok(UpdateReport::default())
        }

        async fn remove(
            &self,
            _collection: &str,
            _filter: Document,
            _options: &RemoveOptions,
        ) -> RecordStoreResult<u64> {
            Ok(0)
        }

        async fn count(&self, _collection: &str, _filter: Document) -> RecordStoreResult<u64> {
            Ok(0)
        }

        async fn distinct(
            &self,
            _collection: &str,
            _field: &str,
            _filter: Document,
        ) -> RecordStoreResult<Vec<Bson>> {
            Ok(Vec::new())
        }

        async fn aggregate(
            &self,
            _collection: &str,
            pipeline: Vec<Document>,
        ) -> RecordStoreResult<Vec<Document>> {
            self.seen.lock().unwrap().push(pipeline);
            Ok(self.rows.lock().unwrap().clone())
        }
    }

    fn builder(probe: Arc<PipelineProbe>, base: Document) -> Aggregation {
        Aggregation::new(CollectionHandle::new("calls", probe), base)
    }

    #[test]
    fn stages_accumulate_in_call_order() {
        let probe = Arc::new(PipelineProbe::default());
        let mut aggregation = builder(probe, Document::new());
        aggregation
            .match_stage(doc! { "status": "active" })
            .unwind("$tags")
            .group(doc! { "_id": "$tags", "total": { "$sum": 1 } })
            .select(doc! { "total": 1 })
            .sort(doc! { "total": -1 })
            .limit(5);
        let stages = aggregation.stages();
        assert_eq!(stages.len(), 6);
        assert!(stages[0].contains_key("$match"));
        assert!(stages[1].contains_key("$unwind"));
        assert!(stages[2].contains_key("$group"));
        assert!(stages[3].contains_key("$project"));
        assert!(stages[4].contains_key("$sort"));
        assert!(stages[5].contains_key("$limit"));
    }

    #[tokio::test]
    async fn aggregate_consumes_the_stages() {
        let probe = Arc::new(PipelineProbe::default());
        let mut aggregation = builder(probe.clone(), Document::new());
        aggregation.match_stage(doc! { "status": "active" });
        aggregation.aggregate().await.unwrap();
        assert!(aggregation.stages().is_empty());

        aggregation.limit(1);
        aggregation.aggregate().await.unwrap();
        let seen = probe.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0][0].contains_key("$match"));
        assert!(seen[1][0].contains_key("$limit"));
    }

    #[tokio::test]
    async fn reducers_issue_match_then_group() {
        let probe = Arc::new(PipelineProbe::default());
        *probe.rows.lock().unwrap() = vec![doc! { "_id": Bson::Null, "value": 42 }];
        let aggregation = builder(probe.clone(), doc! { "status": { "$eq": "active" } });

        let value = aggregation.max("duration").await.unwrap();
        assert_eq!(value, Bson::Int32(42));

        let seen = probe.seen.lock().unwrap();
        let pipeline = &seen[0];
        assert_eq!(pipeline.len(), 2);
        assert_eq!(
            pipeline[0],
            doc! { "$match": { "status": { "$eq": "active" } } }
        );
        assert_eq!(
            pipeline[1],
            doc! { "$group": { "_id": Bson::Null, "value": { "$max": "$duration" } } }
        );
    }

    #[tokio::test]
    async fn reducer_falls_back_to_raw_rows_when_shape_is_absent() {
        let probe = Arc::new(PipelineProbe::default());
        *probe.rows.lock().unwrap() = vec![doc! { "unexpected": true }];
        let aggregation = builder(probe, Document::new());

        let value = aggregation.sum("duration").await.unwrap();
        assert_eq!(
            value,
            Bson::Array(vec![Bson::Document(doc! { "unexpected": true })])
        );
    }
}
