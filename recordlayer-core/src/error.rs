//! Error types and result types for mapper operations.
//!
//! This module provides comprehensive error handling for all record and
//! criteria operations. Use [`RecordStoreResult<T>`] as the return type for
//! fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when mapping records to a
/// document store.
///
/// Construction-time and validation-time errors (`InvalidArgument`,
/// `SchemaMismatch`, `NotConfigured`, `InvalidState`, `BrokenRelation`) are
/// raised before any I/O is issued. Driver failures are wrapped, never
/// swallowed; "not found"/"no effect" outcomes travel through boolean return
/// values instead of this type.
#[derive(Error, Debug)]
pub enum RecordStoreError {
    /// The transport is unreachable or misconfigured, raised at connection
    /// acquisition time.
    #[error("Connection error: {0}")]
    Connection(String),
    /// The store rejected a write. Wraps the driver's native error message.
    #[error("Write conflict: {0}")]
    WriteConflict(String),
    /// An operation was attempted in the wrong lifecycle state, e.g. update
    /// before insert or delete twice.
    #[error("Invalid record state: {0}")]
    InvalidState(String),
    /// A criteria references a field the target entity type does not declare.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
    /// A declared relation's foreign-key configuration is inconsistent with
    /// the target entity's declared attributes.
    #[error("Broken relation: {0}")]
    BrokenRelation(String),
    /// Malformed condition construction or an undeclared attribute name.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// An operation required a collaborator that was never bound, e.g. a
    /// cursor built from a criteria with no collection handle.
    #[error("Not configured: {0}")]
    NotConfigured(String),
    /// Serialization/deserialization error when converting between document
    /// formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// An error occurred in the underlying storage driver.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for mapper operations.
pub type RecordStoreResult<T> = Result<T, RecordStoreError>;

impl From<BsonError> for RecordStoreError {
    fn from(err: BsonError) -> Self {
        RecordStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for RecordStoreError {
    fn from(err: SerdeJsonError) -> Self {
        RecordStoreError::Serialization(err.to_string())
    }
}
