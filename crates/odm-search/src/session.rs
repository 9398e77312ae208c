//! Search sessions
//!
//! A [`SearchSession`] fans each input out to its enabled channels
//! concurrently, merges results into per-channel row groups, debounces
//! interactive input and caches results by `(channel, input)`.
//!
//! Stale work is kept out of the row groups twice over: [`SearchSession::abort_all`]
//! cancels in-flight queries, and every fired pass carries a generation that
//! must still be current when its rows are applied.

use crate::channel::SearchChannel;
use crate::config::{ConnectionSpec, SearchConfig};
use crate::connection::Connection;
use crate::endpoint::Endpoint;
use crate::error::{ChannelFailure, SearchError, SearchResult};
use crate::hash::ChannelHash;
use crate::precache::PrecacheEntry;
use crate::query::{QueryMask, Row};
use dashmap::DashMap;
use futures::future::join_all;
use indexmap::IndexMap;
use moka::future::Cache;
use odm_object::ObjectContext;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Whether a row group matches the current input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Fresh,
    /// Stale or placeholder
    Dirty,
}

/// Rows of one channel
#[derive(Debug, Clone, PartialEq)]
pub struct RowGroup {
    pub state: GroupState,
    pub rows: Arc<Vec<Row>>,
    /// Input the rows answer
    pub input: String,
}

impl RowGroup {
    #[must_use]
    pub fn fresh(input: &str, rows: Arc<Vec<Row>>) -> Self {
        Self {
            state: GroupState::Fresh,
            rows,
            input: input.to_string(),
        }
    }

    /// Empty dirty group for a channel that produced nothing
    #[must_use]
    pub fn placeholder(input: &str) -> Self {
        Self {
            state: GroupState::Dirty,
            rows: Arc::new(Vec::new()),
            input: input.to_string(),
        }
    }
}

/// Per-channel result of one update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Rows fetched and delivered
    pub delivered: Vec<ChannelHash>,
    /// Rows served from cache
    pub cached: Vec<ChannelHash>,
    /// Nothing to query for the input
    pub skipped: Vec<ChannelHash>,
    /// Cancelled; rows were not delivered
    pub aborted: Vec<ChannelHash>,
}

impl UpdateOutcome {
    /// Channels whose rows reached the callback
    pub fn covered(&self) -> impl Iterator<Item = ChannelHash> + '_ {
        self.delivered.iter().chain(&self.cached).copied()
    }
}

/// How a [`SearchSession::search`] call was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Answered synchronously from a ready precache entry
    Precached,
    /// Pass scheduled after the debounce window
    Scheduled { generation: u64 },
}

enum ChannelOutcome {
    Delivered,
    Cached,
    Skipped,
    Aborted,
}

struct ChannelSlot {
    channel: SearchChannel,
    enabled: bool,
}

/// Concurrent, cancellable, debounced and cached search over many channels
///
/// Cloning is cheap; clones share the session.
#[derive(Clone)]
pub struct SearchSession {
    pub(crate) inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    pub(crate) config: SearchConfig,
    channels: RwLock<Vec<ChannelSlot>>,
    active: Mutex<HashMap<u64, CancellationToken>>,
    next_token: AtomicU64,
    debounce: Mutex<Option<JoinHandle<()>>>,
    groups: RwLock<IndexMap<ChannelHash, RowGroup>>,
    cache: Cache<(ChannelHash, String), Arc<Vec<Row>>>,
    pub(crate) precache: DashMap<String, PrecacheEntry>,
    generation: AtomicU64,
    applied: watch::Sender<u64>,
}

/// Removes a registered cancellation handle however the task exits
struct ActiveGuard<'a> {
    active: &'a Mutex<HashMap<u64, CancellationToken>>,
    id: u64,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.lock().remove(&self.id);
    }
}

impl SearchSession {
    /// Empty session
    #[must_use]
    pub fn new(config: SearchConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.cache_capacity)
            .time_to_live(config.cache_ttl())
            .build();
        let (applied, _) = watch::channel(0);
        Self {
            inner: Arc::new(SessionInner {
                config,
                channels: RwLock::new(Vec::new()),
                active: Mutex::new(HashMap::new()),
                next_token: AtomicU64::new(0),
                debounce: Mutex::new(None),
                groups: RwLock::new(IndexMap::new()),
                cache,
                precache: DashMap::new(),
                generation: AtomicU64::new(0),
                applied,
            }),
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &SearchConfig {
        &self.inner.config
    }

    /// Register a channel (enabled); a channel with the same hash is kept
    pub fn add_channel(&self, channel: SearchChannel) -> ChannelHash {
        let hash = channel.hash();
        let mut channels = self.inner.channels.write();
        if !channels.iter().any(|slot| slot.channel.hash() == hash) {
            channels.push(ChannelSlot {
                channel,
                enabled: true,
            });
        }
        hash
    }

    /// Register one channel per mask over `connection`, limited to the
    /// configured default
    pub fn add_connection(&self, connection: &Connection, masks: &[QueryMask]) -> Vec<ChannelHash> {
        let limit = self.inner.config.default_limit;
        masks
            .iter()
            .map(|mask| self.add_channel(SearchChannel::new(connection.clone(), *mask, limit)))
            .collect()
    }

    /// Construct every configured connection through `context`
    ///
    /// # Errors
    /// Returns `Object` if a connection cannot be constructed
    pub fn open_connections<F>(&self, context: &ObjectContext, endpoint_for: F) -> SearchResult<Vec<Connection>>
    where
        F: Fn(&ConnectionSpec) -> Arc<dyn Endpoint>,
    {
        self.inner
            .config
            .connections
            .iter()
            .map(|spec| Connection::from_spec(context, spec.clone(), endpoint_for(spec)))
            .collect()
    }

    /// Enable or disable a channel; returns whether it exists
    pub fn set_enabled(&self, hash: ChannelHash, enabled: bool) -> bool {
        let mut channels = self.inner.channels.write();
        match channels.iter_mut().find(|slot| slot.channel.hash() == hash) {
            Some(slot) => {
                slot.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// All channels in registration order
    #[must_use]
    pub fn channels(&self) -> Vec<SearchChannel> {
        self.inner
            .channels
            .read()
            .iter()
            .map(|slot| slot.channel.clone())
            .collect()
    }

    fn enabled_channels(&self) -> Vec<SearchChannel> {
        self.inner
            .channels
            .read()
            .iter()
            .filter(|slot| slot.enabled)
            .map(|slot| slot.channel.clone())
            .collect()
    }

    /// Snapshot of every row group
    #[must_use]
    pub fn groups(&self) -> IndexMap<ChannelHash, RowGroup> {
        self.inner.groups.read().clone()
    }

    #[must_use]
    pub fn group(&self, hash: ChannelHash) -> Option<RowGroup> {
        self.inner.groups.read().get(&hash).cloned()
    }

    /// Watch the generation of the most recently applied pass
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.applied.subscribe()
    }

    /// Current search generation
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Channel tasks currently registered for cancellation
    #[must_use]
    pub fn active_queries(&self) -> usize {
        self.inner.active.lock().len()
    }

    /// Cached rows for a channel and input
    pub async fn cached(&self, hash: ChannelHash, input: &str) -> Option<Arc<Vec<Row>>> {
        self.inner.cache.get(&(hash, input.to_string())).await
    }

    /// Query every enabled channel for `input`
    ///
    /// Channels run concurrently. Cached results are delivered without a
    /// network call; channels with nothing to query are skipped; cancelled
    /// channels never reach `on_rows`. Resolves once every channel settled.
    ///
    /// # Errors
    /// Returns `Channels` listing every non-cancellation failure; the other
    /// channels still completed.
    pub async fn update<F>(&self, input: &str, on_rows: F, use_cache: bool) -> SearchResult<UpdateOutcome>
    where
        F: Fn(&SearchChannel, Arc<Vec<Row>>) + Send + Sync,
    {
        let channels = self.enabled_channels();
        debug!(input, channels = channels.len(), "search update");

        let on_rows = &on_rows;
        let tasks = channels.iter().map(|channel| async move {
            let result = self.run_channel(channel, input, on_rows, use_cache).await;
            (channel, result)
        });

        let mut outcome = UpdateOutcome::default();
        let mut failures = Vec::new();
        for (channel, result) in join_all(tasks).await {
            let hash = channel.hash();
            match result {
                Ok(ChannelOutcome::Delivered) => outcome.delivered.push(hash),
                Ok(ChannelOutcome::Cached) => outcome.cached.push(hash),
                Ok(ChannelOutcome::Skipped) => outcome.skipped.push(hash),
                Ok(ChannelOutcome::Aborted) => outcome.aborted.push(hash),
                Err(error) => {
                    warn!(channel = %hash.short(), error = %error, "search channel failed");
                    failures.push(ChannelFailure {
                        channel: hash,
                        connection: channel.connection().id(),
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(outcome)
        } else {
            Err(SearchError::Channels(failures))
        }
    }

    async fn run_channel<F>(
        &self,
        channel: &SearchChannel,
        input: &str,
        on_rows: &F,
        use_cache: bool,
    ) -> SearchResult<ChannelOutcome>
    where
        F: Fn(&SearchChannel, Arc<Vec<Row>>) + Send + Sync,
    {
        // Registered before the first await so abort_all reaches every stage
        let (token, _guard) = self.register();

        let key = (channel.hash(), input.to_string());
        if let Some(rows) = self.inner.cache.get(&key).await {
            if token.is_cancelled() {
                return Ok(ChannelOutcome::Aborted);
            }
            trace!(channel = %channel.hash().short(), input, "cache hit");
            on_rows(channel, rows);
            return Ok(ChannelOutcome::Cached);
        }

        tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!(channel = %channel.hash().short(), input, "aborted while connection initialised");
                return Ok(ChannelOutcome::Aborted);
            }
            ready = channel.connection().ready() => ready?,
        }
        let Some(query) = channel.query(input) else {
            trace!(channel = %channel.hash().short(), input, "nothing to query");
            return Ok(ChannelOutcome::Skipped);
        };

        match channel.connection().execute(&query, &token).await {
            Ok(rows) => {
                let rows = Arc::new(rows);
                if use_cache {
                    self.inner.cache.insert(key, Arc::clone(&rows)).await;
                }
                if token.is_cancelled() {
                    return Ok(ChannelOutcome::Aborted);
                }
                on_rows(channel, rows);
                Ok(ChannelOutcome::Delivered)
            }
            Err(err) if err.is_abort() => {
                debug!(channel = %channel.hash().short(), input, "search channel aborted");
                Ok(ChannelOutcome::Aborted)
            }
            Err(err) => Err(err),
        }
    }

    fn register(&self) -> (CancellationToken, ActiveGuard<'_>) {
        let id = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.inner.active.lock().insert(id, token.clone());
        let guard = ActiveGuard {
            active: &self.inner.active,
            id,
        };
        (token, guard)
    }

    /// Cancel every in-flight query; returns how many were cancelled
    pub fn abort_all(&self) -> usize {
        let tokens: Vec<CancellationToken> = self.inner.active.lock().drain().map(|(_, t)| t).collect();
        for token in &tokens {
            token.cancel();
        }
        if !tokens.is_empty() {
            debug!(count = tokens.len(), "aborted in-flight queries");
        }
        tokens.len()
    }

    /// Interactive search for `input`
    ///
    /// A ready precache entry is swapped in immediately. Otherwise the single
    /// debounce timer is reset so only the last call within `debounce` fires.
    /// A fired pass marks delivering channels `Fresh` and resets the others to
    /// empty `Dirty` groups. In-flight queries of earlier passes are not
    /// cancelled here; call [`SearchSession::abort_all`] for that.
    ///
    /// # Errors
    /// Returns `NoRuntime` outside a tokio runtime
    pub fn search(&self, input: &str, debounce: Duration) -> SearchResult<Dispatch> {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(groups) = self.ready_precache(input) {
            self.cancel_pending();
            debug!(input, generation, "serving precached results");
            let covered: HashSet<ChannelHash> = groups.keys().copied().collect();
            self.inner.groups.write().extend(groups);
            self.settle(generation, input, &covered);
            return Ok(Dispatch::Precached);
        }

        let handle = Handle::try_current().map_err(|_| SearchError::NoRuntime)?;
        let session = self.clone();
        let pass_input = input.to_string();
        let timer = handle.spawn(async move {
            tokio::time::sleep(debounce).await;
            // Detached so resetting the timer never cancels a fired pass
            tokio::spawn(session.fire(generation, pass_input));
        });
        if let Some(previous) = self.inner.debounce.lock().replace(timer) {
            previous.abort();
        }
        trace!(input, generation, "search scheduled");
        Ok(Dispatch::Scheduled { generation })
    }

    /// [`SearchSession::search`] with the configured debounce window
    ///
    /// # Errors
    /// Returns `NoRuntime` outside a tokio runtime
    pub fn search_debounced(&self, input: &str) -> SearchResult<Dispatch> {
        self.search(input, self.inner.config.debounce())
    }

    async fn fire(self, generation: u64, input: String) {
        if !self.is_current(generation) {
            trace!(generation, "pass superseded before firing");
            return;
        }
        debug!(input = %input, generation, "debounce fired");

        let covered = Mutex::new(HashSet::new());
        let apply = |channel: &SearchChannel, rows: Arc<Vec<Row>>| {
            let mut groups = self.inner.groups.write();
            if self.is_current(generation) {
                covered.lock().insert(channel.hash());
                groups.insert(channel.hash(), RowGroup::fresh(&input, rows));
            }
        };
        if let Err(err) = self.update(&input, apply, true).await {
            warn!(input = %input, error = %err, "search pass failed");
        }
        self.settle(generation, &input, &covered.into_inner());
    }

    /// Reset uncovered channels and publish the pass
    fn settle(&self, generation: u64, input: &str, covered: &HashSet<ChannelHash>) {
        let mut groups = self.inner.groups.write();
        if !self.is_current(generation) {
            return;
        }
        for channel in self.enabled_channels() {
            if !covered.contains(&channel.hash()) {
                groups.insert(channel.hash(), RowGroup::placeholder(input));
            }
        }
        drop(groups);
        self.inner.applied.send_replace(generation);
    }

    fn ready_precache(&self, input: &str) -> Option<IndexMap<ChannelHash, RowGroup>> {
        let entry = self.inner.precache.get(input)?;
        entry.ready.then(|| entry.groups.clone())
    }

    /// Drop an unfired debounce timer; returns whether one was pending
    pub fn cancel_pending(&self) -> bool {
        match self.inner.debounce.lock().take() {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }

    /// End the session: cancel all work and clear every cache
    pub fn close(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.cancel_pending();
        self.abort_all();
        self.inner.cache.invalidate_all();
        self.inner.precache.clear();
        self.inner.groups.write().clear();
        debug!("search session closed");
    }
}

impl fmt::Debug for SearchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchSession")
            .field("channels", &self.inner.channels.read().len())
            .field("groups", &self.inner.groups.read().len())
            .field("active", &self.inner.active.lock().len())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}
