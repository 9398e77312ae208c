//! ODM Search
//!
//! Bounded-concurrency, cancellable search sessions over connections
//! resolved through the ODM object layer.
//!
//! # Core Concepts
//!
//! - [`Semaphore`]: FIFO-fair fixed-capacity lock pool
//! - [`Connection`]: domain object owning one endpoint and its semaphore
//! - [`SearchChannel`]: (connection, mask, limit) line keyed by [`ChannelHash`]
//! - [`SearchSession`]: concurrent fan-out, debounce, cache, precache and
//!   cancellation of stale work
//!
//! # Example
//!
//! ```rust,ignore
//! use odm_search::{Connection, QueryMask, SearchChannel, SearchConfig, SearchSession};
//!
//! let connection = Connection::open(&context, "static#conn.sparql.wikidata.spec", endpoint).await?;
//! let session = SearchSession::new(SearchConfig::default());
//! session.add_channel(SearchChannel::new(connection.clone(), QueryMask::Label, 10));
//! session.add_channel(SearchChannel::new(connection, QueryMask::Identifier, 1));
//!
//! session.abort_all();
//! session.search_debounced("dou")?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod channel;
mod config;
mod connection;
mod endpoint;
mod error;
mod hash;
mod precache;
mod query;
mod semaphore;
mod session;

pub use channel::SearchChannel;
pub use config::{ConnectionSpec, SearchConfig};
pub use connection::{Connection, ConnectionModel, ConnectionState};
pub use endpoint::Endpoint;
pub use error::{ChannelFailure, SearchError, SearchResult};
pub use hash::ChannelHash;
pub use precache::{PrecacheEntry, PrecacheReport};
pub use query::{Dialect, Query, QueryMask, Row};
pub use semaphore::{Permit, Semaphore};
pub use session::{Dispatch, GroupState, RowGroup, SearchSession, UpdateOutcome};

/// Re-export for implementing [`Endpoint`]
pub use async_trait::async_trait;
/// Re-export of the cancellation handle passed to endpoints
pub use tokio_util::sync::CancellationToken;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
