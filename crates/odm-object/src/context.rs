//! Shared resolution context for domain objects

use crate::config::{FailureVisibility, ObjectConfig};
use crate::error::{ObjectError, ObjectResult};
use crate::object::{DomainObject, Model};
use crate::registry::{IdentityKey, IdentityRegistry};
use indexmap::IndexMap;
use odm_store::ObjectStore;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error};

/// Handle shared by every object constructed through it
///
/// Holds the resolver, the weak identity registry and failure reporting.
/// Cloning is cheap; all clones share state. Objects hold the context, the
/// context only holds weak references back to objects.
#[derive(Clone)]
pub struct ObjectContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    store: Arc<ObjectStore>,
    registry: IdentityRegistry,
    config: ObjectConfig,
    failures: broadcast::Sender<Arc<ObjectError>>,
}

impl ObjectContext {
    /// Context with default configuration
    #[must_use]
    pub fn new(store: ObjectStore) -> Self {
        Self::with_config(store, ObjectConfig::default())
    }

    /// Context with explicit configuration
    #[must_use]
    pub fn with_config(store: ObjectStore, config: ObjectConfig) -> Self {
        let (failures, _) = broadcast::channel(config.failure_buffer.max(1));
        Self {
            inner: Arc::new(ContextInner {
                store: Arc::new(store),
                registry: IdentityRegistry::default(),
                config,
                failures,
            }),
        }
    }

    /// Shared resolver
    #[inline]
    #[must_use]
    pub fn store(&self) -> &ObjectStore {
        &self.inner.store
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &ObjectConfig {
        &self.inner.config
    }

    /// Construct an object from a value, reusing a live instance with the
    /// same identity
    ///
    /// # Errors
    /// - `Encode` if the value cannot be serialized for its identity
    /// - `NoRuntime` outside a tokio runtime
    pub fn construct<M: Model>(&self, value: M::Serialized) -> ObjectResult<Arc<DomainObject<M>>> {
        let key = IdentityKey::of::<M>(&value)?;
        if let Some(existing) = self.inner.registry.get::<M>(&key) {
            debug!(?key, "reusing registered object");
            return Ok(existing);
        }

        let created = DomainObject::<M>::spawn(self.clone(), value)?;
        Ok(self.inner.registry.insert(key, created))
    }

    /// Resolve `path` from any store and wrap the value
    ///
    /// # Errors
    /// Resolver errors, plus those of [`ObjectContext::construct`]
    pub async fn object<M: Model>(&self, path: &str) -> ObjectResult<Arc<DomainObject<M>>> {
        let value: M::Serialized = self.store().resolve(path).await?;
        self.construct::<M>(value)
    }

    /// Resolve a static `path` without awaiting and wrap the value
    ///
    /// # Errors
    /// Resolver errors, plus those of [`ObjectContext::construct`]
    pub fn object_sync<M: Model>(&self, path: &str) -> ObjectResult<Arc<DomainObject<M>>> {
        let value: M::Serialized = self.store().resolve_sync(path)?;
        self.construct::<M>(value)
    }

    /// Flattened children of `path`, each wrapped as an object
    ///
    /// # Errors
    /// Resolver errors, plus those of [`ObjectContext::construct`]
    pub async fn options<M: Model>(
        &self,
        path: &str,
    ) -> ObjectResult<IndexMap<String, Arc<DomainObject<M>>>> {
        let values = self.store().options::<M::Serialized>(path).await?;
        self.wrap_all(values)
    }

    /// Static analogue of [`ObjectContext::options`]
    ///
    /// # Errors
    /// Resolver errors, plus those of [`ObjectContext::construct`]
    pub fn options_sync<M: Model>(
        &self,
        path: &str,
    ) -> ObjectResult<IndexMap<String, Arc<DomainObject<M>>>> {
        let values = self.store().options_sync::<M::Serialized>(path)?;
        self.wrap_all(values)
    }

    fn wrap_all<M: Model>(
        &self,
        values: IndexMap<String, M::Serialized>,
    ) -> ObjectResult<IndexMap<String, Arc<DomainObject<M>>>> {
        values
            .into_iter()
            .map(|(path, value)| Ok((path, self.construct::<M>(value)?)))
            .collect()
    }

    /// Subscribe to annotated async-init failures
    #[must_use]
    pub fn failures(&self) -> broadcast::Receiver<Arc<ObjectError>> {
        self.inner.failures.subscribe()
    }

    /// Registered objects that are still alive
    #[must_use]
    pub fn live_objects(&self) -> usize {
        self.inner.registry.live()
    }

    /// Drop registry entries whose objects are gone
    pub fn prune(&self) {
        self.inner.registry.prune();
    }

    pub(crate) fn rekey<M: Model>(&self, old: &IdentityKey, new: IdentityKey, object: &Arc<DomainObject<M>>) {
        self.inner.registry.rekey(old, new, object);
    }

    pub(crate) fn report(&self, failure: &Arc<ObjectError>) {
        match self.inner.config.failure_visibility {
            FailureVisibility::Log => error!(error = %failure, "object initialisation failed"),
            FailureVisibility::Silent => debug!(error = %failure, "object initialisation failed"),
        }
        // No subscribers is fine
        let _ = self.inner.failures.send(Arc::clone(failure));
    }
}

impl fmt::Debug for ObjectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectContext")
            .field("store", &self.inner.store)
            .field("registry", &self.inner.registry)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
