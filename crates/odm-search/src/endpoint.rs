//! Search endpoint boundary

use crate::error::SearchResult;
use crate::query::Row;
use async_trait::async_trait;
use std::fmt::Debug;
use tokio_util::sync::CancellationToken;

/// Wire client that executes rendered queries
///
/// Implementations should stop work and return `SearchError::Aborted` once
/// `cancel` fires; connections also race the call against the token.
#[async_trait]
pub trait Endpoint: Send + Sync + Debug {
    async fn execute(&self, query: &str, cancel: &CancellationToken) -> SearchResult<Vec<Row>>;
}
