//! Testing utilities for ODM workspace
//!
//! Shared test helpers, fixtures, and a scripted search endpoint.

#![allow(missing_docs)]

use async_trait::async_trait;
use odm_object::ObjectContext;
use odm_search::{CancellationToken, Connection, ConnectionSpec, Endpoint, Row, SearchError, SearchResult};
use odm_store::{InMemorySource, ObjectStore, RemoteStore, StaticStore};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Install a test subscriber honouring `RUST_LOG`; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

type Responder = dyn Fn(&str) -> SearchResult<Vec<Row>> + Send + Sync;

/// Endpoint that answers from a script and records every call
pub struct ScriptedEndpoint {
    latency: Option<Duration>,
    responder: Box<Responder>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl ScriptedEndpoint {
    /// Echo endpoint: one row labelled with the query
    pub fn new() -> Self {
        Self::with_responder(|query| Ok(vec![Row::new("Q1", query)]))
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&str) -> SearchResult<Vec<Row>> + Send + Sync + 'static,
    {
        Self {
            latency: None,
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Endpoint failing every query containing `needle`
    pub fn failing_on(needle: &'static str) -> Self {
        Self::with_responder(move |query| {
            if query.contains(needle) {
                Err(SearchError::endpoint(format!("scripted failure for {needle}")))
            } else {
                Ok(vec![Row::new("Q1", query)])
            }
        })
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous executions observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

impl Default for ScriptedEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScriptedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedEndpoint")
            .field("latency", &self.latency)
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Endpoint for ScriptedEndpoint {
    async fn execute(&self, query: &str, cancel: &CancellationToken) -> SearchResult<Vec<Row>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push(query.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        if let Some(latency) = self.latency {
            tokio::select! {
                () = cancel.cancelled() => return Err(SearchError::Aborted),
                () = tokio::time::sleep(latency) => {}
            }
        }
        (self.responder)(query)
    }
}

/// Static table with connection specs and a SPARQL prefix table
pub fn fixture_table() -> Value {
    json!({
        "conn": {
            "sparql": {
                "wikidata": {
                    "spec": {
                        "type": "sparql",
                        "id": "wikidata",
                        "endpoint": "https://query.example.org/sparql",
                        "concurrency": 2,
                        "prefixes": "static#conn.prefixes.wikidata"
                    }
                },
                "local": {
                    "spec": {
                        "type": "sparql",
                        "id": "local",
                        "endpoint": "http://localhost:7878/query",
                        "concurrency": 1
                    }
                }
            },
            "prefixes": {
                "wikidata": {
                    "wd": "http://www.wikidata.org/entity/",
                    "wdt": "http://www.wikidata.org/prop/direct/"
                }
            }
        }
    })
}

/// Page payload used by remote-store fixtures
pub fn fixture_page() -> Value {
    json!({
        "page": {
            "meta": {
                "title": { "en": "Main" }
            }
        }
    })
}

/// Resolver over [`fixture_table`] with an in-memory page store
pub fn fixture_store() -> ObjectStore {
    let page = Arc::new(InMemorySource::with_payload(fixture_page()));
    ObjectStore::new(StaticStore::new(fixture_table())).with_store(Arc::new(RemoteStore::page(page)))
}

pub fn fixture_context() -> ObjectContext {
    ObjectContext::new(fixture_store())
}

/// SPARQL spec without prefixes
pub fn sparql_spec(id: &str, concurrency: usize) -> ConnectionSpec {
    ConnectionSpec::Sparql {
        id: id.to_string(),
        endpoint: format!("https://{id}.example.org/sparql"),
        concurrency,
        prefixes: None,
    }
}

/// Connection for `spec` over `endpoint`
///
/// # Panics
/// Panics outside a tokio runtime
pub fn connection(context: &ObjectContext, spec: ConnectionSpec, endpoint: Arc<ScriptedEndpoint>) -> Connection {
    Connection::from_spec(context, spec, endpoint).expect("connection constructs")
}
