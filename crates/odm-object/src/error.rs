//! Error types for domain objects

use crate::lifecycle::Phase;
use odm_store::StoreError;
use std::sync::Arc;

/// Errors raised while constructing or initialising domain objects
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    /// Resolver failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Async initialisation failed, annotated with the object's identity
    #[error("failed to initialise {type_name} from {value}: {source}")]
    InitFailed {
        /// Model type name
        type_name: &'static str,
        /// Best-effort serialization of the value
        value: String,
        /// Underlying failure
        source: Box<ObjectError>,
    },

    /// Failure reported by a model's init hook
    #[error("initialisation failed: {0}")]
    Init(String),

    /// Terminal failure shared with every waiter of one object
    #[error(transparent)]
    Failed(Arc<ObjectError>),

    /// Lifecycle state machine rejected a transition
    #[error("illegal lifecycle transition: {from:?} -> {to:?}")]
    IllegalTransition { from: Phase, to: Phase },

    /// No tokio runtime to run the async phase on
    #[error("no async runtime available for object initialisation")]
    NoRuntime,

    /// Value could not be serialized for identity or annotation
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ObjectError {
    /// Model-level failure with a message
    #[must_use]
    pub fn init(message: impl Into<String>) -> Self {
        Self::Init(message.into())
    }

    /// Innermost cause, looking through annotations and shared failures
    #[must_use]
    pub fn root_cause(&self) -> &ObjectError {
        match self {
            Self::InitFailed { source, .. } => source.root_cause(),
            Self::Failed(shared) => shared.root_cause(),
            other => other,
        }
    }
}

/// Result alias for object operations
pub type ObjectResult<T> = Result<T, ObjectError>;
