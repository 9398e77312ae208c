//! Search connections
//!
//! A connection is a domain object whose serialized value is a
//! [`ConnectionSpec`]. Its derived state owns the endpoint's [`Semaphore`],
//! so every query through one connection shares a single concurrency bound.

use crate::config::ConnectionSpec;
use crate::endpoint::Endpoint;
use crate::error::{SearchError, SearchResult};
use crate::query::{Dialect, Query, QueryMask, Row};
use crate::semaphore::Semaphore;
use indexmap::IndexMap;
use odm_object::{async_trait, DomainObject, IdentityKey, Model, ObjectContext, ObjectResult};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Derived state of a connection
#[derive(Debug, Clone)]
pub struct ConnectionState {
    /// Endpoint-level concurrency bound
    pub semaphore: Arc<Semaphore>,
    /// SPARQL prefix table, resolved during async init
    pub prefixes: Arc<IndexMap<String, String>>,
}

/// Model of a search connection
pub struct ConnectionModel;

#[async_trait]
impl Model for ConnectionModel {
    const TYPE_NAME: &'static str = "Connection";
    type Serialized = ConnectionSpec;
    type Derived = ConnectionState;

    fn init_sync(spec: &ConnectionSpec) -> ConnectionState {
        ConnectionState {
            semaphore: Semaphore::shared(spec.concurrency()),
            prefixes: Arc::new(IndexMap::new()),
        }
    }

    /// Keeps the semaphore while the concurrency is unchanged, so in-flight
    /// permits still count against the bound
    fn reinit_sync(spec: &ConnectionSpec, previous: &ConnectionState) -> ConnectionState {
        let mut state = Self::init_sync(spec);
        if previous.semaphore.capacity() == spec.concurrency() {
            state.semaphore = Arc::clone(&previous.semaphore);
        }
        state
    }

    async fn init_async(
        spec: &ConnectionSpec,
        mut state: ConnectionState,
        context: &ObjectContext,
    ) -> ObjectResult<ConnectionState> {
        if let ConnectionSpec::Sparql {
            prefixes: Some(table),
            ..
        } = spec
        {
            let resolved = context
                .store()
                .options::<String>(&table.to_string())
                .await?;
            // Keys are full paths; the prefix name is the last fragment
            let prefixes = resolved
                .into_iter()
                .filter_map(|(path, iri)| Some((path.rsplit('.').next()?.to_string(), iri)))
                .collect();
            state.prefixes = Arc::new(prefixes);
        }
        Ok(state)
    }
}

/// Handle pairing a connection object with its wire client
#[derive(Clone)]
pub struct Connection {
    object: Arc<DomainObject<ConnectionModel>>,
    endpoint: Arc<dyn Endpoint>,
    identity: String,
}

impl Connection {
    /// Wrap an existing connection object
    ///
    /// # Errors
    /// Returns `Object` if the spec cannot be serialized for its identity
    pub fn new(object: Arc<DomainObject<ConnectionModel>>, endpoint: Arc<dyn Endpoint>) -> SearchResult<Self> {
        let identity = IdentityKey::of::<ConnectionModel>(&object.value())?.digest_hex();
        Ok(Self {
            object,
            endpoint,
            identity,
        })
    }

    /// Construct from a spec through the context's identity registry
    ///
    /// # Errors
    /// Returns `Object` if construction fails
    pub fn from_spec(context: &ObjectContext, spec: ConnectionSpec, endpoint: Arc<dyn Endpoint>) -> SearchResult<Self> {
        let object = context.construct::<ConnectionModel>(spec)?;
        Self::new(object, endpoint)
    }

    /// Resolve the spec at `path` and construct the connection
    ///
    /// # Errors
    /// Returns `Object` if resolution or construction fails
    pub async fn open(context: &ObjectContext, path: &str, endpoint: Arc<dyn Endpoint>) -> SearchResult<Self> {
        let object = context.object::<ConnectionModel>(path).await?;
        Self::new(object, endpoint)
    }

    /// Connection id from the spec
    #[must_use]
    pub fn id(&self) -> String {
        self.object.value().id().to_string()
    }

    /// Stable identity derived from the full spec
    #[inline]
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[must_use]
    pub fn spec(&self) -> Arc<ConnectionSpec> {
        self.object.value()
    }

    /// Backing domain object
    #[inline]
    #[must_use]
    pub fn object(&self) -> &Arc<DomainObject<ConnectionModel>> {
        &self.object
    }

    /// Endpoint concurrency bound
    #[must_use]
    pub fn semaphore(&self) -> Arc<Semaphore> {
        Arc::clone(&self.object.derived().semaphore)
    }

    /// Wait for the connection to finish initialising
    ///
    /// # Errors
    /// Returns `Object` carrying the init failure
    pub async fn ready(&self) -> SearchResult<()> {
        Ok(self.object.ready().await?)
    }

    /// Search query for `input` shaped by `mask`
    #[must_use]
    pub fn search(&self, input: &str, mask: QueryMask) -> Query {
        Query::Search {
            dialect: self.dialect(),
            input: input.to_string(),
            mask,
        }
    }

    /// Detail query for one item
    #[must_use]
    pub fn detail(&self, item_id: &str) -> Query {
        Query::Detail {
            dialect: self.dialect(),
            item: item_id.to_string(),
        }
    }

    fn dialect(&self) -> Dialect {
        match self.object.value().as_ref() {
            ConnectionSpec::Sparql { .. } => Dialect::Sparql {
                prefixes: self.object.derived().prefixes.as_ref().clone(),
            },
            ConnectionSpec::Wikibase { language, .. } => Dialect::Wikibase {
                language: language.clone(),
            },
        }
    }

    /// Execute a rendered query within the connection's concurrency bound
    ///
    /// # Errors
    /// - `Aborted` once `cancel` fires, whether queued or in flight
    /// - `Object` if the connection failed to initialise
    /// - any endpoint error
    pub async fn execute(&self, query: &str, cancel: &CancellationToken) -> SearchResult<Vec<Row>> {
        self.ready().await?;
        let id = self.id();
        let semaphore = self.semaphore();

        let _permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SearchError::Aborted),
            permit = semaphore.acquire(Some(id.as_str())) => permit,
        };

        debug!(connection = %id, "executing query");
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(SearchError::Aborted),
            rows = self.endpoint.execute(query, cancel) => rows,
        }
    }

    /// Fetch the details of one item
    ///
    /// # Errors
    /// Same as [`Connection::execute`]
    pub async fn fetch_detail(&self, item_id: &str, cancel: &CancellationToken) -> SearchResult<Vec<Row>> {
        self.ready().await?;
        let Some(query) = self.detail(item_id).paginate(1) else {
            return Ok(Vec::new());
        };
        self.execute(&query, cancel).await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("identity", &&self.identity[..16])
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
