//! Error types for store and resolver operations

use odm_path::{Location, PathError};

/// Errors from backing stores and the resolver
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Malformed path or failed traversal
    #[error(transparent)]
    Path(#[from] PathError),

    /// Synchronous access to a store that requires a fetch
    #[error("cannot synchronously access non-static storage: {0}")]
    UnsupportedLocation(Location),

    /// Bundle or its payload is absent
    #[error("missing metadata for {location}: {reason}")]
    MissingMetadata {
        location: Location,
        reason: &'static str,
    },

    /// Write attempted against a read-only store
    #[error("store is read-only: {0}")]
    ReadOnlyWrite(Location),

    /// No store registered under the location
    #[error("no store registered for location: {0}")]
    NoStore(Location),

    /// Write target is not a terminal address
    #[error("path does not address a concrete value: {0}")]
    NotTerminal(String),

    /// Remote store constructed for the static location
    #[error("remote store cannot serve location: {0}")]
    InvalidScope(Location),

    /// Value could not be decoded into the requested type
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Unclassified failure from the metadata backend
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
