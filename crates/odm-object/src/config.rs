//! Object context configuration

use serde::{Deserialize, Serialize};

/// How unobserved async-init failures surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureVisibility {
    /// Log every failure at error level
    #[default]
    Log,
    /// Log at debug level only
    Silent,
}

/// Configuration for an [`ObjectContext`](crate::ObjectContext)
///
/// Failures are always broadcast to [`failures`](crate::ObjectContext::failures)
/// subscribers regardless of visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectConfig {
    /// Logging of async-init failures
    pub failure_visibility: FailureVisibility,
    /// Buffered failures per subscriber before lagging
    pub failure_buffer: usize,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            failure_visibility: FailureVisibility::Log,
            failure_buffer: 64,
        }
    }
}

impl ObjectConfig {
    /// Create default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set failure visibility
    #[must_use]
    pub fn with_failure_visibility(mut self, visibility: FailureVisibility) -> Self {
        self.failure_visibility = visibility;
        self
    }

    /// Set failure buffer size (at least one)
    #[must_use]
    pub fn with_failure_buffer(mut self, size: usize) -> Self {
        self.failure_buffer = size.max(1);
        self
    }
}
