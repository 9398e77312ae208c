//! ODM Store
//!
//! Backing stores and the path-addressed resolver.
//!
//! # Core Concepts
//!
//! - [`BackingStore`]: uniform bundle-fetch contract for one location
//! - [`StaticStore`]: in-memory table, the only synchronously readable store
//! - [`RemoteStore`]: page/document scope over a [`MetadataSource`]
//! - [`ObjectStore`]: resolves path addresses against the right store
//!
//! # Example
//!
//! ```rust,ignore
//! use odm_store::{InMemorySource, ObjectStore, RemoteStore, StaticStore};
//!
//! let source = Arc::new(InMemorySource::with_payload(json!({ "a": { "b": { "c": { "d": 1 } } } })));
//! let store = ObjectStore::new(StaticStore::new(table))
//!     .with_store(Arc::new(RemoteStore::page(source)));
//!
//! let flag: bool = store.resolve_sync("static#ui.flags.search.enabled")?;
//! let count: u32 = store.resolve("page#a.b.c.d").await?;
//! store.commit("page#a.b.c.d", &2).await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod bundle;
mod error;
mod memory;
mod remote;
mod resolver;
mod static_store;
mod traits;

pub use bundle::MetadataBundle;
pub use error::{StoreError, StoreResult};
pub use memory::InMemorySource;
pub use remote::RemoteStore;
pub use resolver::ObjectStore;
pub use static_store::StaticStore;
pub use traits::{BackingStore, MetadataSource};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
