//! Convenient re-exports of commonly used types from recordlayer.
//!
//! Import this prelude module to quickly access the most frequently used
//! types and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use recordlayer::prelude::*;
//! ```
//!
//! This provides access to:
//! - Record lifecycle types and hooks
//! - Criteria construction and merging
//! - Entity descriptors and the schema registry
//! - Driver traits and write options
//! - Error types and the aggregation builder

pub use recordlayer_core::{
    aggregation::Aggregation,
    criteria::{
        Connective, Criteria, CriteriaSpec, DateValue, FieldList, GeoPoint, OrderField,
        SortDirection,
    },
    cursor::Cursor,
    driver::{
        CollectionHandle, FindDirectives, RemoveOptions, StoreDriver, UpdateReport, WriteAck,
        WriteOptions,
    },
    error::{RecordStoreError, RecordStoreResult},
    record::{QueryArg, Record, RecordHooks, RecordState, Related},
    schema::{self, AttributeType, EntityDescriptor, EntityDescriptorBuilder, RelationKind},
    store::RecordStore,
};
