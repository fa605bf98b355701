//! Main recordlayer crate providing a unified interface for the mapper.
//!
//! This crate is the primary entry point for users of the recordlayer
//! framework. It re-exports the core modules and provides convenient access
//! to the storage drivers.
//!
//! # Features
//!
//! - **Schema-flexible records** - Declared attributes with typed accessors
//!   over free-form documents
//! - **Composable criteria** - Accumulating filter, projection, sort and
//!   paging specifications with deep merging
//! - **Lazy relations** - belongs-to, has-one, has-many and existence probes
//!   resolved on demand and cached
//! - **Aggregation pipelines** - Staged builders plus max/min/avg/sum
//!   reducers
//! - **Multiple drivers** - In-memory for tests and development, MongoDB for
//!   production (behind the `mongodb` feature)
//!
//! # Quick Start
//!
//! ```ignore
//! use recordlayer::{prelude::*, memory::InMemoryDriver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     schema::register(
//!         EntityDescriptor::builder("call", "calls")
//!             .attribute("status", AttributeType::String)
//!             .attribute("duration", AttributeType::Int)
//!             .build(),
//!     );
//!
//!     let store = RecordStore::new(InMemoryDriver::new().shared());
//!
//!     // Insert a record
//!     let mut call = store.record("call")?;
//!     call.set("status", "active")?;
//!     call.set("duration", 120)?;
//!     call.insert(None).await?;
//!
//!     // Query it back
//!     let mut probe = store.record("call")?;
//!     probe.criteria_mut().compare("status", "active", Connective::And);
//!     let found = probe.find(None, true).await?;
//!     assert!(found.is_some());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Drivers
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB driver (requires the `mongodb` feature)

pub mod prelude;

pub use recordlayer_core::{aggregation, criteria, cursor, driver, error, record, schema, store};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage driver implementations.
pub mod memory {
    pub use recordlayer_memory::InMemoryDriver;
}

/// MongoDB storage driver implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use recordlayer_mongodb::{ConnectionConfig, MongoDriver};
}
