//! Error types for search

use crate::hash::ChannelHash;
use odm_object::ObjectError;
use std::fmt;

/// Errors raised by connections and sessions
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Cooperative cancellation; not a real failure
    #[error("search aborted")]
    Aborted,

    /// Unclassified failure from the search endpoint
    #[error("endpoint error: {0}")]
    Endpoint(String),

    /// Connection object failed to resolve or initialise
    #[error(transparent)]
    Object(#[from] ObjectError),

    /// One or more channels failed during an update
    #[error("{} channel(s) failed: {}", .0.len(), summarize(.0))]
    Channels(Vec<ChannelFailure>),

    /// Invalid configuration
    #[error("invalid search configuration: {0}")]
    Config(String),

    /// No tokio runtime to schedule work on
    #[error("no async runtime available for search")]
    NoRuntime,
}

impl SearchError {
    /// Cancellation-class failure that sessions swallow
    #[inline]
    #[must_use]
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Endpoint failure with a message
    #[must_use]
    pub fn endpoint(message: impl Into<String>) -> Self {
        Self::Endpoint(message.into())
    }
}

impl From<toml::de::Error> for SearchError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Failure of a single channel within an update
#[derive(Debug)]
pub struct ChannelFailure {
    /// Channel that failed
    pub channel: ChannelHash,
    /// Connection id of the channel
    pub connection: String,
    /// Underlying error
    pub error: SearchError,
}

impl fmt::Display for ChannelFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.connection, self.channel.short(), self.error)
    }
}

fn summarize(failures: &[ChannelFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result alias for search operations
pub type SearchResult<T> = Result<T, SearchError>;
