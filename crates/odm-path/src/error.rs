//! Error types for path parsing and traversal

/// Errors related to path addresses
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Malformed path string
    #[error("path syntax error in '{path}': {reason}")]
    Syntax { path: String, reason: String },

    /// Location discriminator is not a known store
    #[error("unknown location: {0}")]
    UnknownLocation(String),

    /// Empty fragment between separators
    #[error("path '{0}' contains an empty fragment")]
    EmptyFragment(String),

    /// More fragments than the terminal depth allows
    #[error("path '{path}' has {depth} fragments (maximum {max})")]
    TooDeep { path: String, depth: usize, max: usize },

    /// Wildcard followed by further fragments
    #[error("wildcard must be the last fragment: {0}")]
    WildcardNotLast(String),

    /// Non-terminal fragment has no value
    #[error("undefined path: {0}")]
    UndefinedPath(String),

    /// Non-terminal fragment holds null
    #[error("cannot traverse null at {0}")]
    NullTraversal(String),

    /// Non-terminal fragment holds a primitive
    #[error("cannot traverse primitive at {0}")]
    PrimitiveTraversal(String),
}

/// Result alias for path operations
pub type PathResult<T> = Result<T, PathError>;
