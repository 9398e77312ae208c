//! Path-addressed resolver over the registered backing stores

use crate::bundle::MetadataBundle;
use crate::error::{StoreError, StoreResult};
use crate::static_store::StaticStore;
use crate::traits::BackingStore;
use indexmap::IndexMap;
use odm_path::{access, flatten, Accessed, Location, PathAddress};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Maps path addresses to values by selecting the store for each location
///
/// The static store is always registered and is the only one readable
/// synchronously. Remote stores are added with [`ObjectStore::with_store`].
#[derive(Debug, Clone)]
pub struct ObjectStore {
    stores: IndexMap<Location, Arc<dyn BackingStore>>,
}

impl ObjectStore {
    /// Resolver with only the static table registered
    #[must_use]
    pub fn new(static_store: StaticStore) -> Self {
        let mut stores: IndexMap<Location, Arc<dyn BackingStore>> = IndexMap::new();
        stores.insert(Location::Static, Arc::new(static_store));
        Self { stores }
    }

    /// Register a store under its own location, replacing any previous one
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn BackingStore>) -> Self {
        self.stores.insert(store.location(), store);
        self
    }

    /// Store registered for `location`
    ///
    /// # Errors
    /// Returns `NoStore` if nothing is registered there
    pub fn store(&self, location: Location) -> StoreResult<&Arc<dyn BackingStore>> {
        self.stores.get(&location).ok_or(StoreError::NoStore(location))
    }

    /// Registered locations, static first
    pub fn locations(&self) -> impl Iterator<Item = Location> + '_ {
        self.stores.keys().copied()
    }

    /// Resolve a static path without awaiting
    ///
    /// # Errors
    /// - `UnsupportedLocation` for every location other than static
    /// - `Path` for syntax or traversal failures
    /// - `Decode` if the value does not match `T`
    pub fn resolve_sync<T: DeserializeOwned>(&self, path: &str) -> StoreResult<T> {
        let value = self.resolve_value_sync(path)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Untyped form of [`ObjectStore::resolve_sync`]
    ///
    /// # Errors
    /// See [`ObjectStore::resolve_sync`]
    pub fn resolve_value_sync(&self, path: &str) -> StoreResult<Value> {
        let address: PathAddress = path.parse()?;
        let payload = self.sync_bundle(address.location())?;
        shape(&address, payload_of(address.location(), &payload)?)
    }

    /// Resolve a path against any store, fetching its bundle if necessary
    ///
    /// # Errors
    /// - `MissingMetadata` if the bundle or its payload is absent
    /// - `Path` for syntax or traversal failures
    /// - `Decode` if the value does not match `T`
    /// - any error raised by the store's fetch
    pub async fn resolve<T: DeserializeOwned>(&self, path: &str) -> StoreResult<T> {
        let value = self.resolve_value(path).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Untyped form of [`ObjectStore::resolve`]
    ///
    /// # Errors
    /// See [`ObjectStore::resolve`]
    pub async fn resolve_value(&self, path: &str) -> StoreResult<Value> {
        let address: PathAddress = path.parse()?;
        debug!(path, "resolving");
        let bundle = self.fetch_bundle(address.location()).await?;
        shape(&address, payload_of(address.location(), &bundle)?)
    }

    /// Flattened children of a static path, keyed by full path
    ///
    /// # Errors
    /// Same conditions as [`ObjectStore::resolve_sync`]
    pub fn options_sync<T: DeserializeOwned>(&self, path: &str) -> StoreResult<IndexMap<String, T>> {
        let address: PathAddress = path.parse()?;
        let bundle = self.sync_bundle(address.location())?;
        collect_options(&address, payload_of(address.location(), &bundle)?)
    }

    /// Flattened children of any path, keyed by full path
    ///
    /// A path shallower than the terminal depth (or ending in `**`) is
    /// expanded through every intermediate level; `*` expands one level.
    ///
    /// # Errors
    /// Same conditions as [`ObjectStore::resolve`]
    pub async fn options<T: DeserializeOwned>(&self, path: &str) -> StoreResult<IndexMap<String, T>> {
        let address: PathAddress = path.parse()?;
        let bundle = self.fetch_bundle(address.location()).await?;
        collect_options(&address, payload_of(address.location(), &bundle)?)
    }

    /// Write `value` at a terminal path
    ///
    /// Returns whether the backend accepted the write.
    ///
    /// # Errors
    /// - `NotTerminal` if the path does not address a concrete value
    /// - `ReadOnlyWrite` if the target store is read-only
    /// - any error raised by the store's write
    pub async fn commit<V: Serialize + ?Sized>(&self, path: &str, value: &V) -> StoreResult<bool> {
        let address: PathAddress = path.parse()?;
        if !address.is_terminal() {
            return Err(StoreError::NotTerminal(address.to_string()));
        }

        let store = self.store(address.location())?;
        if store.is_read_only() {
            return Err(StoreError::ReadOnlyWrite(address.location()));
        }

        let value = serde_json::to_value(value)?;
        let fragments: Vec<String> = address.keys().into_iter().map(str::to_owned).collect();
        debug!(path = %address, "committing metadata value");
        store.write_metadata_value(value, &fragments).await
    }

    fn sync_bundle(&self, location: Location) -> StoreResult<Arc<MetadataBundle>> {
        if location != Location::Static {
            return Err(StoreError::UnsupportedLocation(location));
        }
        let store = self.store(location)?;
        if !store.is_synchronous() {
            return Err(StoreError::UnsupportedLocation(location));
        }
        store.metadata_bundle().ok_or(StoreError::MissingMetadata {
            location,
            reason: "bundle not found",
        })
    }

    async fn fetch_bundle(&self, location: Location) -> StoreResult<Arc<MetadataBundle>> {
        let store = self.store(location)?;
        store
            .fetch_metadata_bundle()
            .await?
            .ok_or(StoreError::MissingMetadata {
                location,
                reason: "bundle not found",
            })
    }
}

fn payload_of(location: Location, bundle: &MetadataBundle) -> StoreResult<&Value> {
    bundle.payload().ok_or(StoreError::MissingMetadata {
        location,
        reason: "bundle has no payload",
    })
}

/// Leaf values pass through (`null` when absent); wildcard results become an
/// object keyed by full path
fn shape(address: &PathAddress, payload: &Value) -> StoreResult<Value> {
    match access(payload, address.fragments())? {
        Accessed::Leaf(leaf) => Ok(leaf.cloned().unwrap_or(Value::Null)),
        Accessed::Children(children) => Ok(Value::Object(
            children
                .into_iter()
                .map(|(dotted, value)| (address.qualify(&dotted), value.clone()))
                .collect::<Map<_, _>>(),
        )),
    }
}

fn collect_options<T: DeserializeOwned>(
    address: &PathAddress,
    payload: &Value,
) -> StoreResult<IndexMap<String, T>> {
    let flat = flatten(payload, address.fragments())?;
    let mut out = IndexMap::with_capacity(flat.len());
    for (dotted, value) in flat {
        out.insert(address.qualify(&dotted), T::deserialize(value)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> ObjectStore {
        ObjectStore::new(StaticStore::new(json!({ "x": { "y": { "z": { "w": 5 } } } })))
    }

    #[test]
    fn resolve_sync_terminal() {
        let value: i64 = store().resolve_sync("static#x.y.z.w").unwrap();
        assert_eq!(value, 5);
    }

    #[test]
    fn resolve_sync_wildcard_keys_are_full_paths() {
        let value = store().resolve_value_sync("static#x.y.*").unwrap();
        assert_eq!(value, json!({ "static#x.y.z": { "w": 5 } }));
    }

    #[test]
    fn resolve_sync_missing_terminal_is_null() {
        let value = store().resolve_value_sync("static#x.y.z.nope").unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn resolve_sync_rejects_every_remote_location() {
        let err = store().resolve_value_sync("page#a.b.c.d").unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedLocation(Location::Page)));

        let err = store().resolve_value_sync("document#a.b.c.d").unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedLocation(Location::Document)));
    }

    #[test]
    fn decode_mismatch_is_reported() {
        let err = store().resolve_sync::<String>("static#x.y.z.w").unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }

    #[tokio::test]
    async fn commit_to_static_is_read_only() {
        let err = store().commit("static#x.y.z.w", &6).await.unwrap_err();
        assert!(matches!(err, StoreError::ReadOnlyWrite(Location::Static)));
    }

    #[tokio::test]
    async fn commit_requires_terminal_path() {
        let err = store().commit("static#x.y.*", &6).await.unwrap_err();
        assert!(matches!(err, StoreError::NotTerminal(_)));
    }
}
