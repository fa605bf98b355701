//! In-memory storage driver for recordlayer.
//!
//! This crate provides a thread-safe, in-memory implementation of the
//! `StoreDriver` trait. It uses async-aware read-write locks for concurrent
//! access and is ideal for development, testing, and small-scale deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Operator-syntax filters** - Evaluates the same `$eq`/`$in`/`$regex`
//!   filter documents the criteria layer builds
//! - **Aggregation support** - Executes `$match`, `$group`, `$project`,
//!   `$unwind`, `$sort` and `$limit` stages in memory
//!
//! # Quick Start
//!
//! ```ignore
//! use recordlayer_core::store::RecordStore;
//! use recordlayer_memory::InMemoryDriver;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = RecordStore::new(InMemoryDriver::new().shared());
//!     let mut call = store.record("call")?;
//!     call.set("status", "active")?;
//!     call.insert(None).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as recordlayer_memory;

pub mod store;

mod evaluator;
mod pipeline;

pub use store::InMemoryDriver;
