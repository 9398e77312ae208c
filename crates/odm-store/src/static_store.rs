//! Static in-memory table

use crate::bundle::MetadataBundle;
use crate::error::{StoreError, StoreResult};
use crate::traits::BackingStore;
use async_trait::async_trait;
use odm_path::Location;
use serde_json::Value;
use std::sync::Arc;

/// Read-only table available without I/O
#[derive(Debug, Clone)]
pub struct StaticStore {
    bundle: Arc<MetadataBundle>,
}

impl StaticStore {
    /// Store serving `table`
    #[inline]
    #[must_use]
    pub fn new(table: Value) -> Self {
        Self {
            bundle: Arc::new(MetadataBundle::new(table)),
        }
    }

    /// Store parsed from a JSON document
    ///
    /// # Errors
    /// Returns `StoreError::Decode` if the text is not valid JSON
    pub fn from_json_str(text: &str) -> StoreResult<Self> {
        let table: Value = serde_json::from_str(text)?;
        Ok(Self::new(table))
    }

    /// Table reference
    #[inline]
    #[must_use]
    pub fn table(&self) -> Option<&Value> {
        self.bundle.payload()
    }
}

impl Default for StaticStore {
    fn default() -> Self {
        Self::new(Value::Object(serde_json::Map::new()))
    }
}

#[async_trait]
impl BackingStore for StaticStore {
    fn location(&self) -> Location {
        Location::Static
    }

    fn is_synchronous(&self) -> bool {
        true
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn metadata_bundle(&self) -> Option<Arc<MetadataBundle>> {
        Some(Arc::clone(&self.bundle))
    }

    async fn fetch_metadata_bundle(&self) -> StoreResult<Option<Arc<MetadataBundle>>> {
        Ok(self.metadata_bundle())
    }

    async fn write_metadata_value(&self, _value: Value, _fragments: &[String]) -> StoreResult<bool> {
        Err(StoreError::ReadOnlyWrite(Location::Static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn static_store_is_synchronous() {
        let store = StaticStore::new(json!({ "a": 1 }));
        assert!(store.is_synchronous());
        assert!(store.is_read_only());
        assert_eq!(store.location(), Location::Static);
        assert_eq!(store.table(), Some(&json!({ "a": 1 })));
    }

    #[test]
    fn static_store_from_json() {
        let store = StaticStore::from_json_str(r#"{"x":{"y":2}}"#).unwrap();
        let bundle = store.metadata_bundle().unwrap();
        assert_eq!(bundle.payload(), Some(&json!({ "x": { "y": 2 } })));

        assert!(StaticStore::from_json_str("{not json").is_err());
    }

    #[tokio::test]
    async fn static_store_rejects_writes() {
        let store = StaticStore::default();
        let result = store.write_metadata_value(json!(1), &["a".into()]).await;
        assert!(matches!(result, Err(StoreError::ReadOnlyWrite(Location::Static))));
    }
}
