//! ODM Objects
//!
//! Lazily-initialised domain objects resolved through the path-addressed
//! [`ObjectStore`](odm_store::ObjectStore).
//!
//! # Core Concepts
//!
//! - [`Model`]: serialized shape plus sync and async init hooks
//! - [`DomainObject`]: wrapper running the two-phase lifecycle
//! - [`Lifecycle`]: `Constructed -> SyncInitDone -> Ready | Failed`
//! - [`ObjectContext`]: shared resolver, identity registry, failure reporting
//!
//! # Example
//!
//! ```rust,ignore
//! use odm_object::{Model, ObjectContext};
//!
//! let context = ObjectContext::new(store);
//! let page = context.object::<PageModel>("page#site.pages.main.record").await?;
//! page.ready().await?;
//! println!("{}", page.derived().slug);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod config;
mod context;
mod error;
mod lifecycle;
mod object;
mod registry;

pub use config::{FailureVisibility, ObjectConfig};
pub use context::ObjectContext;
pub use error::{ObjectError, ObjectResult};
pub use lifecycle::{allowed_transitions, validate_transition, Lifecycle, Phase};
pub use object::{DomainObject, Model};
pub use registry::IdentityKey;

/// Re-export of `async_trait` for implementing [`Model`]
pub use async_trait::async_trait;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
