//! Metadata bundles returned by backing stores

use crate::error::StoreResult;
use odm_path::PathError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload container fetched from a backing store
///
/// The payload is an opaque nested mapping reachable by fragment traversal.
/// A bundle may exist without a payload (e.g. freshly created upstream).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetadataBundle {
    /// Traversable metadata
    #[serde(default)]
    pub payload: Option<Value>,

    /// Upstream revision, bumped on every accepted write
    #[serde(default)]
    pub revision: u64,
}

impl MetadataBundle {
    /// Bundle wrapping a payload
    #[inline]
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self {
            payload: Some(payload),
            revision: 0,
        }
    }

    /// Bundle without a payload
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Payload reference
    #[inline]
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Set the value at `fragments`, creating intermediate objects
    ///
    /// # Errors
    /// Returns `PrimitiveTraversal` if an intermediate node exists but is
    /// not an object.
    pub fn set_value(&mut self, fragments: &[String], value: Value) -> StoreResult<()> {
        let Some((last, parents)) = fragments.split_last() else {
            self.payload = Some(value);
            self.revision += 1;
            return Ok(());
        };

        let mut node = self
            .payload
            .get_or_insert_with(|| Value::Object(Map::new()));
        for (i, key) in parents.iter().enumerate() {
            if node.is_null() {
                *node = Value::Object(Map::new());
            }
            node = match node {
                Value::Object(map) => map
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new())),
                _ => return Err(PathError::PrimitiveTraversal(fragments[..=i].join(".")).into()),
            };
        }

        if node.is_null() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return Err(PathError::PrimitiveTraversal(parents.join(".")).into());
        };
        map.insert(last.clone(), value);
        self.revision += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_value_creates_intermediates() {
        let mut bundle = MetadataBundle::empty();
        let path: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        bundle.set_value(&path, json!(1)).unwrap();

        assert_eq!(bundle.payload, Some(json!({ "a": { "b": { "c": { "d": 1 } } } })));
        assert_eq!(bundle.revision, 1);
    }

    #[test]
    fn set_value_overwrites_leaf() {
        let mut bundle = MetadataBundle::new(json!({ "a": { "b": { "c": { "d": 1, "e": 2 } } } }));
        let path: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        bundle.set_value(&path, json!("x")).unwrap();

        assert_eq!(bundle.payload, Some(json!({ "a": { "b": { "c": { "d": "x", "e": 2 } } } })));
    }

    #[test]
    fn set_value_rejects_primitive_parent() {
        let mut bundle = MetadataBundle::new(json!({ "a": 5 }));
        let path: Vec<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        assert!(bundle.set_value(&path, json!(1)).is_err());
        assert_eq!(bundle.revision, 0);
    }

    #[test]
    fn bundle_deserializes_without_revision() {
        let bundle: MetadataBundle = serde_json::from_value(json!({ "payload": { "k": 1 } })).unwrap();
        assert_eq!(bundle.revision, 0);
        assert_eq!(bundle.payload(), Some(&json!({ "k": 1 })));
    }
}
