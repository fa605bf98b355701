//! Lazy, forward-only result cursor.
//!
//! A [`Cursor`] is created by [`CollectionHandle::find`] but does not touch
//! the store until first iterated. Skip, limit and sort applied before that
//! point are folded into the single fetch, so configuring a cursor after the
//! find call still costs one round-trip.

use bson::Document;

use crate::{
    driver::{CollectionHandle, FindDirectives},
    error::RecordStoreResult,
};

/// A forward-only cursor over the documents matching a filter.
///
/// The fetch happens on the first call to [`next`](Cursor::next) or
/// [`to_vec`](Cursor::to_vec); after that the directives are frozen.
#[derive(Debug)]
pub struct Cursor {
    collection: CollectionHandle,
    filter: Document,
    projection: Vec<String>,
    directives: FindDirectives,
    buffer: Option<std::vec::IntoIter<Document>>,
}

impl Cursor {
    pub(crate) fn new(
        collection: CollectionHandle,
        filter: Document,
        projection: Vec<String>,
    ) -> Self {
        Self {
            collection,
            filter,
            projection,
            directives: FindDirectives::default(),
            buffer: None,
        }
    }

    /// Skips the first `n` matching documents.
    ///
    /// No effect once the cursor has been iterated.
    pub fn skip(mut self, n: u64) -> Self {
        if self.buffer.is_none() {
            self.directives.skip = Some(n);
        }
        self
    }

    /// Caps the number of returned documents at `n`.
    ///
    /// No effect once the cursor has been iterated.
    pub fn limit(mut self, n: i64) -> Self {
        if self.buffer.is_none() {
            self.directives.limit = Some(n);
        }
        self
    }

    /// Sets the sort specification, field name to `1`/`-1`, applied in
    /// insertion order.
    ///
    /// No effect once the cursor has been iterated.
    pub fn sort(mut self, spec: Document) -> Self {
        if self.buffer.is_none() {
            self.directives.sort = Some(spec);
        }
        self
    }

    async fn fill(&mut self) -> RecordStoreResult<()> {
        if self.buffer.is_none() {
            let rows = self
                .collection
                .find_with_directives(
                    self.filter.clone(),
                    &self.projection,
                    self.directives.clone(),
                )
                .await?;
            self.buffer = Some(rows.into_iter());
        }
        Ok(())
    }

    /// Advances the cursor, fetching the result set on the first call.
    pub async fn next(&mut self) -> RecordStoreResult<Option<Document>> {
        self.fill().await?;
        Ok(self.buffer.as_mut().and_then(|it| it.next()))
    }

    /// Drains the remaining documents into a vector.
    pub async fn to_vec(mut self) -> RecordStoreResult<Vec<Document>> {
        self.fill().await?;
        Ok(self.buffer.take().map(Iterator::collect).unwrap_or_default())
    }
}
