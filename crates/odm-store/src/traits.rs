//! Store contracts consumed by the resolver
//!
//! [`BackingStore`] is the uniform bundle-fetch contract every location
//! implements. [`MetadataSource`] is the boundary to the host integration
//! that actually fetches and writes page/document metadata.

use crate::bundle::MetadataBundle;
use crate::error::StoreResult;
use async_trait::async_trait;
use odm_path::Location;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// A named source of metadata
///
/// Exactly one variant (the static table) is readable without I/O; the
/// others must be fetched.
#[async_trait]
pub trait BackingStore: Send + Sync + Debug {
    /// Location this store serves
    fn location(&self) -> Location;

    /// Bundle available without awaiting
    fn is_synchronous(&self) -> bool;

    /// Rejects writes
    fn is_read_only(&self) -> bool;

    /// Synchronous bundle access
    ///
    /// Only synchronous stores return a bundle; the default is `None`.
    fn metadata_bundle(&self) -> Option<Arc<MetadataBundle>> {
        None
    }

    /// Obtain the bundle, fetching if necessary
    ///
    /// `Ok(None)` means the bundle does not exist (yet).
    async fn fetch_metadata_bundle(&self) -> StoreResult<Option<Arc<MetadataBundle>>>;

    /// Write `value` at `fragments`
    ///
    /// Returns whether the backend accepted the write.
    async fn write_metadata_value(&self, value: Value, fragments: &[String]) -> StoreResult<bool>;
}

/// Host integration that fetches and writes one entity's metadata
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch the current bundle; `Ok(None)` when none exists
    async fn fetch_metadata_bundle(&self) -> StoreResult<Option<MetadataBundle>>;

    /// Persist `value` at `fragments`, creating the bundle if the backend's
    /// policy allows it
    async fn write_metadata_value(&self, value: Value, fragments: &[String]) -> StoreResult<bool>;
}
