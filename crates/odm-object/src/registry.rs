//! Weak identity registry for constructed objects
//!
//! Keyed by model type and the blake3 digest of the serialized value, so
//! resolving the same value twice yields the same instance. Entries are weak:
//! the registry never keeps an object alive.

use crate::error::ObjectResult;
use crate::object::{DomainObject, Model};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, Weak};

/// Dead entries are pruned once the registry grows past this
const PRUNE_THRESHOLD: usize = 256;

/// Construction identity of a domain object
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    type_id: TypeId,
    type_name: &'static str,
    digest: [u8; 32],
}

impl IdentityKey {
    /// Identity of `value` under model `M`
    ///
    /// # Errors
    /// Returns `Encode` if the value cannot be serialized
    pub fn of<M: Model>(value: &M::Serialized) -> ObjectResult<Self> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Self {
            type_id: TypeId::of::<M>(),
            type_name: M::TYPE_NAME,
            digest: *blake3::hash(&bytes).as_bytes(),
        })
    }

    /// Hex digest of the serialized value
    #[must_use]
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityKey({}:{})", self.type_name, &self.digest_hex()[..16])
    }
}

#[derive(Default)]
pub(crate) struct IdentityRegistry {
    entries: DashMap<IdentityKey, Weak<dyn Any + Send + Sync>>,
}

impl IdentityRegistry {
    pub(crate) fn get<M: Model>(&self, key: &IdentityKey) -> Option<Arc<DomainObject<M>>> {
        let weak = self.entries.get(key)?.clone();
        weak.upgrade()?.downcast::<DomainObject<M>>().ok()
    }

    /// Register `object`, or return the live instance another caller
    /// registered first
    pub(crate) fn insert<M: Model>(
        &self,
        key: IdentityKey,
        object: Arc<DomainObject<M>>,
    ) -> Arc<DomainObject<M>> {
        if self.entries.len() >= PRUNE_THRESHOLD {
            self.prune();
        }

        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if let Some(existing) = occupied
                    .get()
                    .upgrade()
                    .and_then(|live| live.downcast::<DomainObject<M>>().ok())
                {
                    return existing;
                }
                occupied.insert(erase(&object));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(erase(&object));
            }
        }
        object
    }

    /// Move `object` from `old` to `new` after its value changed
    ///
    /// The old entry is dropped only while it still points at `object`. A
    /// different live instance already holding `new` keeps the entry.
    pub(crate) fn rekey<M: Model>(&self, old: &IdentityKey, new: IdentityKey, object: &Arc<DomainObject<M>>) {
        if *old == new {
            return;
        }
        self.entries
            .remove_if(old, |_, weak| match weak.upgrade() {
                Some(live) => live
                    .downcast::<DomainObject<M>>()
                    .is_ok_and(|live| Arc::ptr_eq(&live, object)),
                None => true,
            });

        match self.entries.entry(new) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().strong_count() == 0 {
                    occupied.insert(erase(object));
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(erase(object));
            }
        }
    }

    pub(crate) fn prune(&self) {
        self.entries.retain(|_, weak| weak.strong_count() > 0);
    }

    pub(crate) fn live(&self) -> usize {
        self.entries.iter().filter(|e| e.strong_count() > 0).count()
    }
}

fn erase<M: Model>(object: &Arc<DomainObject<M>>) -> Weak<dyn Any + Send + Sync> {
    let erased: Arc<dyn Any + Send + Sync> = object.clone();
    Arc::downgrade(&erased)
}

impl fmt::Debug for IdentityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}
