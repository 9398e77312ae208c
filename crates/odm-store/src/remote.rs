//! Page- and document-scoped stores backed by a fetched bundle

use crate::bundle::MetadataBundle;
use crate::error::{StoreError, StoreResult};
use crate::traits::{BackingStore, MetadataSource};
use async_trait::async_trait;
use odm_path::Location;
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Remote metadata store scoped to one entity
///
/// The fetched bundle is cached for the lifetime of the store. Concurrent
/// fetches are coalesced: only the first caller reaches the source, the
/// rest observe its result. An absent bundle is not cached, so a later
/// fetch can observe lazy creation upstream. A fetch that overlaps an
/// accepted write is returned to its caller but never cached.
pub struct RemoteStore {
    location: Location,
    read_only: bool,
    source: Arc<dyn MetadataSource>,
    cached: RwLock<Option<Arc<MetadataBundle>>>,
    fetch_lock: Mutex<()>,
    /// Bumped by every accepted write
    epoch: AtomicU64,
}

impl RemoteStore {
    /// Store for the page scope
    #[must_use]
    pub fn page(source: Arc<dyn MetadataSource>) -> Self {
        Self::build(Location::Page, source)
    }

    /// Store for the document scope
    #[must_use]
    pub fn document(source: Arc<dyn MetadataSource>) -> Self {
        Self::build(Location::Document, source)
    }

    /// Store for an arbitrary remote location
    ///
    /// # Errors
    /// Returns `InvalidScope` for [`Location::Static`], which has no fetch
    pub fn new(location: Location, source: Arc<dyn MetadataSource>) -> StoreResult<Self> {
        if location == Location::Static {
            return Err(StoreError::InvalidScope(location));
        }
        Ok(Self::build(location, source))
    }

    fn build(location: Location, source: Arc<dyn MetadataSource>) -> Self {
        Self {
            location,
            read_only: false,
            source,
            cached: RwLock::new(None),
            fetch_lock: Mutex::new(()),
            epoch: AtomicU64::new(0),
        }
    }

    /// Reject all writes
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Drop the cached bundle so the next access refetches
    pub fn invalidate(&self) {
        *self.cached.write() = None;
    }

    /// Currently cached bundle
    #[inline]
    #[must_use]
    pub fn cached(&self) -> Option<Arc<MetadataBundle>> {
        self.cached.read().clone()
    }
}

impl fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStore")
            .field("location", &self.location)
            .field("read_only", &self.read_only)
            .field("cached", &self.cached.read().is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BackingStore for RemoteStore {
    fn location(&self) -> Location {
        self.location
    }

    fn is_synchronous(&self) -> bool {
        false
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    async fn fetch_metadata_bundle(&self) -> StoreResult<Option<Arc<MetadataBundle>>> {
        if let Some(bundle) = self.cached() {
            return Ok(Some(bundle));
        }

        let _guard = self.fetch_lock.lock().await;
        // Another caller may have filled the cache while we waited
        if let Some(bundle) = self.cached() {
            return Ok(Some(bundle));
        }

        debug!(location = %self.location, "fetching metadata bundle");
        let epoch = self.epoch.load(Ordering::Acquire);
        let fetched = self.source.fetch_metadata_bundle().await?.map(Arc::new);
        if fetched.is_none() {
            debug!(location = %self.location, "metadata bundle absent");
        }

        let mut cached = self.cached.write();
        if self.epoch.load(Ordering::Acquire) == epoch {
            *cached = fetched.clone();
        } else {
            debug!(location = %self.location, "write landed during fetch, not caching");
        }
        Ok(fetched)
    }

    async fn write_metadata_value(&self, value: Value, fragments: &[String]) -> StoreResult<bool> {
        if self.read_only {
            return Err(StoreError::ReadOnlyWrite(self.location));
        }

        let accepted = self.source.write_metadata_value(value, fragments).await?;
        if accepted {
            let mut cached = self.cached.write();
            self.epoch.fetch_add(1, Ordering::AcqRel);
            *cached = None;
        } else {
            warn!(location = %self.location, path = %fragments.join("."), "metadata write rejected");
        }
        Ok(accepted)
    }
}
