//! Search channels

use crate::connection::Connection;
use crate::hash::ChannelHash;
use crate::query::QueryMask;
use std::fmt;

/// One independently queryable (connection, mask, limit) line
#[derive(Clone)]
pub struct SearchChannel {
    connection: Connection,
    mask: QueryMask,
    limit: usize,
    hash: ChannelHash,
}

impl SearchChannel {
    #[must_use]
    pub fn new(connection: Connection, mask: QueryMask, limit: usize) -> Self {
        let hash = ChannelHash::compute(connection.identity(), mask, limit);
        Self {
            connection,
            mask,
            limit,
            hash,
        }
    }

    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    #[inline]
    #[must_use]
    pub fn mask(&self) -> QueryMask {
        self.mask
    }

    #[inline]
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Cache and row-group key
    #[inline]
    #[must_use]
    pub fn hash(&self) -> ChannelHash {
        self.hash
    }

    /// Executable query for `input`, or `None` if there is nothing to query
    #[must_use]
    pub fn query(&self, input: &str) -> Option<String> {
        self.connection.search(input, self.mask).paginate(self.limit)
    }
}

impl fmt::Debug for SearchChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchChannel")
            .field("connection", &self.connection.id())
            .field("mask", &self.mask)
            .field("limit", &self.limit)
            .field("hash", &self.hash.short())
            .finish()
    }
}
