//! Main entry point for binding records to a storage driver.
//!
//! A [`RecordStore`] wraps one shared [`StoreDriver`] and hands out
//! collection handles and record instances bound to it.

use std::sync::Arc;

use crate::{
    driver::{CollectionHandle, StoreDriver},
    error::{RecordStoreError, RecordStoreResult},
    record::Record,
    schema::{self, EntityDescriptor},
};

/// A record store over one shared storage driver.
///
/// Cheap to clone; clones share the driver.
#[derive(Debug, Clone)]
pub struct RecordStore {
    driver: Arc<dyn StoreDriver>,
}

impl RecordStore {
    /// Creates a store over `driver`.
    pub fn new(driver: Arc<dyn StoreDriver>) -> Self {
        Self { driver }
    }

    /// The underlying driver.
    pub fn driver(&self) -> Arc<dyn StoreDriver> {
        Arc::clone(&self.driver)
    }

    /// Returns a handle to the named collection.
    pub fn select_collection(&self, name: impl Into<String>) -> CollectionHandle {
        CollectionHandle::new(name, Arc::clone(&self.driver))
    }

    /// Constructs a fresh record of the entity type registered under `key`.
    ///
    /// Fails with `NotConfigured` when no descriptor is registered.
    pub fn record(&self, key: &str) -> RecordStoreResult<Record> {
        let descriptor = schema::lookup(key).ok_or_else(|| {
            RecordStoreError::NotConfigured(format!(
                "no entity descriptor registered under key '{key}'"
            ))
        })?;
        Ok(self.record_for(descriptor))
    }

    /// Constructs a fresh record of the described entity type.
    pub fn record_for(&self, descriptor: Arc<EntityDescriptor>) -> Record {
        let collection = self.select_collection(descriptor.collection());
        Record::new(descriptor, collection)
    }
}
