//! In-memory metadata source

use crate::bundle::MetadataBundle;
use crate::error::StoreResult;
use crate::traits::MetadataSource;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Metadata source held in memory
///
/// Useful as a local cache or in tests. A missing bundle is created lazily
/// on the first write.
#[derive(Debug, Default)]
pub struct InMemorySource {
    bundle: RwLock<Option<MetadataBundle>>,
    latency: Option<Duration>,
    fetches: AtomicUsize,
    writes: AtomicUsize,
}

impl InMemorySource {
    /// Source with no bundle
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Source holding `payload`
    #[must_use]
    pub fn with_payload(payload: Value) -> Self {
        Self {
            bundle: RwLock::new(Some(MetadataBundle::new(payload))),
            ..Self::default()
        }
    }

    /// Source holding a bundle without payload
    #[must_use]
    pub fn with_empty_bundle() -> Self {
        Self {
            bundle: RwLock::new(Some(MetadataBundle::empty())),
            ..Self::default()
        }
    }

    /// Delay every fetch and write by `latency`
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of fetches served
    #[inline]
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of writes applied
    #[inline]
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of the current bundle
    #[must_use]
    pub fn snapshot(&self) -> Option<MetadataBundle> {
        self.bundle.read().clone()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl MetadataSource for InMemorySource {
    async fn fetch_metadata_bundle(&self) -> StoreResult<Option<MetadataBundle>> {
        self.delay().await;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.bundle.read().clone())
    }

    async fn write_metadata_value(&self, value: Value, fragments: &[String]) -> StoreResult<bool> {
        self.delay().await;
        let mut guard = self.bundle.write();
        guard
            .get_or_insert_with(MetadataBundle::empty)
            .set_value(fragments, value)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn write_creates_bundle_lazily() {
        let source = InMemorySource::new();
        assert_eq!(source.fetch_metadata_bundle().await.unwrap(), None);

        let path: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        assert!(source.write_metadata_value(json!(true), &path).await.unwrap());

        let bundle = source.fetch_metadata_bundle().await.unwrap().unwrap();
        assert_eq!(bundle.payload(), Some(&json!({ "a": { "b": { "c": { "d": true } } } })));
        assert_eq!(source.fetch_count(), 2);
        assert_eq!(source.write_count(), 1);
    }
}
