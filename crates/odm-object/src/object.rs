//! Domain objects and the model trait
//!
//! A [`DomainObject`] pairs a serialized value with the shared
//! [`ObjectContext`]. Construction runs the model's synchronous hook
//! immediately, then its asynchronous hook on the runtime. Every consumer
//! awaits [`DomainObject::ready`] to observe the outcome.

use crate::context::ObjectContext;
use crate::error::{ObjectError, ObjectResult};
use crate::lifecycle::{validate_transition, Lifecycle};
use crate::registry::IdentityKey;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

/// Shape and initialisation hooks of a domain object type
#[async_trait]
pub trait Model: Send + Sync + Sized + 'static {
    /// Name used in failure annotations
    const TYPE_NAME: &'static str;

    /// Value resolved from the store
    type Serialized: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static;

    /// State computed during initialisation
    type Derived: Clone + Send + Sync + 'static;

    /// Seed derived state; must not block or await
    fn init_sync(value: &Self::Serialized) -> Self::Derived;

    /// Seed derived state when the value is replaced
    ///
    /// `previous` is the state of the superseded value. Defaults to
    /// [`Model::init_sync`]; override to carry resources across a replace.
    fn reinit_sync(value: &Self::Serialized, _previous: &Self::Derived) -> Self::Derived {
        Self::init_sync(value)
    }

    /// Complete derived state, possibly resolving further paths
    ///
    /// # Errors
    /// Any error fails the object; it is annotated and reported by the context
    async fn init_async(
        _value: &Self::Serialized,
        derived: Self::Derived,
        _context: &ObjectContext,
    ) -> ObjectResult<Self::Derived> {
        Ok(derived)
    }
}

type Waiter = oneshot::Sender<Result<(), Arc<ObjectError>>>;

struct Slot<M: Model> {
    value: Arc<M::Serialized>,
    derived: Arc<M::Derived>,
    lifecycle: Lifecycle,
    generation: u64,
    waiters: Vec<Waiter>,
}

impl<M: Model> Slot<M> {
    fn advance(&mut self, to: Lifecycle) {
        let from = self.lifecycle.phase();
        let checked = validate_transition(from, to.phase());
        debug_assert!(checked.is_ok(), "illegal lifecycle transition from {from:?}");
        if let Err(err) = checked {
            warn!(object = M::TYPE_NAME, error = %err, "forcing lifecycle transition");
        }
        trace!(object = M::TYPE_NAME, generation = self.generation, ?from, to = ?to.phase(), "lifecycle");
        self.lifecycle = to;
    }
}

/// Lazily-initialised wrapper around a serialized value
pub struct DomainObject<M: Model> {
    context: ObjectContext,
    slot: Mutex<Slot<M>>,
}

impl<M: Model> DomainObject<M> {
    /// Construct and start initialisation
    ///
    /// The synchronous hook has run when this returns; the asynchronous hook
    /// runs on the current tokio runtime.
    ///
    /// # Errors
    /// Returns `NoRuntime` outside a tokio runtime
    pub(crate) fn spawn(context: ObjectContext, value: M::Serialized) -> ObjectResult<Arc<Self>> {
        let handle = Handle::try_current().map_err(|_| ObjectError::NoRuntime)?;
        let value = Arc::new(value);
        let derived = M::init_sync(&value);

        let mut slot = Slot {
            value: Arc::clone(&value),
            derived: Arc::new(derived.clone()),
            lifecycle: Lifecycle::Constructed,
            generation: 0,
            waiters: Vec::new(),
        };
        slot.advance(Lifecycle::SyncInitDone);

        let object = Arc::new(Self {
            context,
            slot: Mutex::new(slot),
        });
        object.start_async(&handle, 0, value, derived);
        Ok(object)
    }

    fn start_async(self: &Arc<Self>, handle: &Handle, generation: u64, value: Arc<M::Serialized>, derived: M::Derived) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let context = self.context.clone();
        handle.spawn(async move {
            let outcome = M::init_async(&value, derived, &context).await;
            match weak.upgrade() {
                Some(object) => object.complete(generation, outcome),
                None => trace!(object = M::TYPE_NAME, "object dropped before initialisation settled"),
            }
        });
    }

    fn complete(&self, generation: u64, outcome: ObjectResult<M::Derived>) {
        let (waiters, result) = {
            let mut slot = self.slot.lock();
            if slot.generation != generation {
                debug!(
                    object = M::TYPE_NAME,
                    stale = generation,
                    current = slot.generation,
                    "discarding superseded initialisation"
                );
                return;
            }

            let result = match outcome {
                Ok(derived) => {
                    slot.derived = Arc::new(derived);
                    slot.advance(Lifecycle::Ready);
                    Ok(())
                }
                Err(source) => {
                    let failure = Arc::new(ObjectError::InitFailed {
                        type_name: M::TYPE_NAME,
                        value: describe(slot.value.as_ref()),
                        source: Box::new(source),
                    });
                    slot.advance(Lifecycle::Failed(Arc::clone(&failure)));
                    Err(failure)
                }
            };
            (std::mem::take(&mut slot.waiters), result)
        };

        if let Err(failure) = &result {
            self.context.report(failure);
        }
        // Release in call order
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }

    /// Wait for initialisation to settle
    ///
    /// Resolves immediately once the object is `Ready` or `Failed`.
    ///
    /// # Errors
    /// Returns `Failed` carrying the annotated init failure
    pub async fn ready(&self) -> ObjectResult<()> {
        let pending = {
            let mut slot = self.slot.lock();
            match &slot.lifecycle {
                Lifecycle::Ready => return Ok(()),
                Lifecycle::Failed(failure) => return Err(ObjectError::Failed(Arc::clone(failure))),
                Lifecycle::Constructed | Lifecycle::SyncInitDone => {
                    let (tx, rx) = oneshot::channel();
                    slot.waiters.push(tx);
                    rx
                }
            }
        };

        match pending.await {
            Ok(result) => result.map_err(ObjectError::Failed),
            Err(_) => Err(ObjectError::init("initialisation task was dropped")),
        }
    }

    /// Replace the serialized value and re-run the whole lifecycle
    ///
    /// Pending waiters are released by the new generation; a completion of
    /// the superseded generation is discarded. The context's identity
    /// registry follows the new value.
    ///
    /// # Errors
    /// - `NoRuntime` outside a tokio runtime
    /// - `Encode` if the new value cannot be serialized for its identity
    pub fn replace(self: &Arc<Self>, value: M::Serialized) -> ObjectResult<()> {
        let handle = Handle::try_current().map_err(|_| ObjectError::NoRuntime)?;
        let new_key = IdentityKey::of::<M>(&value)?;
        let value = Arc::new(value);

        let (old_key, derived, generation) = {
            let mut slot = self.slot.lock();
            let old_key = IdentityKey::of::<M>(slot.value.as_ref())?;
            let derived = M::reinit_sync(&value, &slot.derived);
            slot.generation += 1;
            slot.advance(Lifecycle::Constructed);
            slot.value = Arc::clone(&value);
            slot.derived = Arc::new(derived.clone());
            slot.advance(Lifecycle::SyncInitDone);
            (old_key, derived, slot.generation)
        };
        self.context.rekey(&old_key, new_key, self);
        debug!(object = M::TYPE_NAME, generation, "replacing value");

        self.start_async(&handle, generation, value, derived);
        Ok(())
    }

    /// Current serialized value
    #[must_use]
    pub fn value(&self) -> Arc<M::Serialized> {
        Arc::clone(&self.slot.lock().value)
    }

    /// Current derived state
    ///
    /// Before `Ready` this is whatever the synchronous hook seeded.
    #[must_use]
    pub fn derived(&self) -> Arc<M::Derived> {
        Arc::clone(&self.slot.lock().derived)
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> Lifecycle {
        self.slot.lock().lifecycle.clone()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.slot.lock().lifecycle, Lifecycle::Ready)
    }

    /// Number of times the value has been replaced
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.slot.lock().generation
    }

    /// Shared context
    #[inline]
    #[must_use]
    pub fn context(&self) -> &ObjectContext {
        &self.context
    }
}

impl<M: Model> Debug for DomainObject<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.lock();
        f.debug_struct("DomainObject")
            .field("type", &M::TYPE_NAME)
            .field("value", &slot.value)
            .field("state", &slot.lifecycle.phase())
            .field("generation", &slot.generation)
            .finish_non_exhaustive()
    }
}

fn describe<T: Serialize + Debug>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"))
}
