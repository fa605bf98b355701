//! MongoDB storage driver for recordlayer.
//!
//! This crate implements the `StoreDriver` trait on top of the official
//! MongoDB driver. Filters, update documents and aggregation pipelines pass
//! through to the server unchanged, since the criteria layer already builds
//! them in the server's operator syntax.
//!
//! # Quick Start
//!
//! ```ignore
//! use recordlayer_core::store::RecordStore;
//! use recordlayer_mongodb::MongoDriver;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = MongoDriver::connect("mongodb://localhost:27017/calls", "calls").await?;
//!     let store = RecordStore::new(driver.shared());
//!     let call = store.record("call")?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as recordlayer_mongodb;

pub mod config;
pub mod store;

pub use config::ConnectionConfig;
pub use store::MongoDriver;
