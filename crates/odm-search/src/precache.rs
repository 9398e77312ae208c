//! Precache warm-up
//!
//! Pre-issues searches for every alphabet character and the curated
//! prefixes through a bounded pool, so typing those inputs is answered
//! from the session without waiting.

use crate::channel::SearchChannel;
use crate::hash::ChannelHash;
use crate::semaphore::Semaphore;
use crate::session::{RowGroup, SearchSession};
use futures::future::join_all;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Pre-warmed results for one input
#[derive(Debug, Clone, PartialEq)]
pub struct PrecacheEntry {
    pub input: String,
    /// All channels settled without failure or cancellation
    pub ready: bool,
    pub groups: IndexMap<ChannelHash, RowGroup>,
}

impl PrecacheEntry {
    fn pending(input: &str) -> Self {
        Self {
            input: input.to_string(),
            ready: false,
            groups: IndexMap::new(),
        }
    }
}

/// Outcome of a warm-up run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrecacheReport {
    /// Inputs now answered from the precache
    pub ready: usize,
    /// Inputs that failed or were cancelled
    pub failed: usize,
}

impl SearchSession {
    /// Warm the precache for every configured input
    ///
    /// At most `precache_pool_size` inputs are in flight at once; a pool slot
    /// frees as soon as all channels for its input settle.
    pub async fn precache(&self) -> PrecacheReport {
        let inputs = self.config().precache_inputs();
        let pool = Semaphore::shared(self.config().precache_pool_size);
        info!(inputs = inputs.len(), pool = pool.capacity(), "precache warm-up started");

        let pool = &pool;
        let tasks = inputs.iter().map(|input| async move {
            let _slot = pool.acquire(Some(input.as_str())).await;
            self.warm(input).await
        });
        let results = join_all(tasks).await;

        let ready = results.iter().filter(|ok| **ok).count();
        let report = PrecacheReport {
            ready,
            failed: results.len() - ready,
        };
        info!(ready = report.ready, failed = report.failed, "precache warm-up finished");
        report
    }

    async fn warm(&self, input: &str) -> bool {
        self.inner
            .precache
            .insert(input.to_string(), PrecacheEntry::pending(input));

        let groups = Mutex::new(IndexMap::new());
        let collect = |channel: &SearchChannel, rows| {
            groups.lock().insert(channel.hash(), RowGroup::fresh(input, rows));
        };

        match self.update(input, collect, true).await {
            Ok(outcome) if outcome.aborted.is_empty() => {
                debug!(input, channels = outcome.covered().count(), "precached");
                self.inner.precache.insert(
                    input.to_string(),
                    PrecacheEntry {
                        input: input.to_string(),
                        ready: true,
                        groups: groups.into_inner(),
                    },
                );
                true
            }
            Ok(_) => {
                debug!(input, "precache cancelled");
                self.inner.precache.remove(input);
                false
            }
            Err(err) => {
                warn!(input, error = %err, "precache failed");
                self.inner.precache.remove(input);
                false
            }
        }
    }

    /// Precache entry for `input`
    #[must_use]
    pub fn precache_entry(&self, input: &str) -> Option<PrecacheEntry> {
        self.inner.precache.get(input).map(|entry| entry.clone())
    }

    /// Number of precache entries, ready or pending
    #[must_use]
    pub fn precache_len(&self) -> usize {
        self.inner.precache.len()
    }
}
