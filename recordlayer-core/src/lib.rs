//! A lightweight object-document mapper for schema-flexible document stores.
//!
//! This crate is the core of the recordlayer project and provides:
//!
//! - **Query criteria** ([`criteria`]) - Accumulating filter/sort/projection/paging
//!   specifications with merge and normalization
//! - **Record lifecycle** ([`record`]) - Entity identity, typed attributes,
//!   save/find/delete state machine, lazy relations and lifecycle hooks
//! - **Aggregation builder** ([`aggregation`]) - Staged pipelines and
//!   convenience reducers
//! - **Entity schema** ([`schema`]) - Declared attributes, relations and the
//!   process-wide descriptor registry
//! - **Driver abstraction** ([`driver`]) - Traits for implementing storage
//!   drivers, plus collection handles and write options
//! - **Record store** ([`store`]) - Entry point binding records to a driver
//! - **Error handling** ([`error`]) - Comprehensive error types and result types
//!
//! # Example
//!
//! ```ignore
//! use recordlayer_core::schema::{self, AttributeType, EntityDescriptor, RelationKind};
//! use recordlayer_core::store::RecordStore;
//!
//! schema::register(
//!     EntityDescriptor::builder("call", "calls")
//!         .attribute("call_id", AttributeType::String)
//!         .attribute("place_id", AttributeType::String)
//!         .relation("place", RelationKind::BelongsTo, "place", "place_id")
//!         .build(),
//! );
//!
//! let store = RecordStore::new(driver);
//! let mut call = store.record("call")?;
//! call.set("call_id", "abc-123")?;
//! call.insert(None).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as recordlayer_core;

pub mod aggregation;
pub mod criteria;
pub mod cursor;
pub mod driver;
pub mod error;
pub mod record;
pub mod schema;
pub mod store;
