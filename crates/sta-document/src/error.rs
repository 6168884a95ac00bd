//! Error types for document snapshots

/// Errors raised while building or editing a [`DocumentSnapshot`](crate::DocumentSnapshot)
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Snapshot root must be a key/value map
    #[error("document root must be an object, got {0}")]
    NotADocument(&'static str),

    /// Pointer is not valid JSON pointer syntax
    #[error("invalid pointer: '{0}'")]
    InvalidPointer(String),

    /// Pointer walks through a value that cannot hold children
    #[error("cannot descend into non-container value at '{path}'")]
    NotAContainer {
        /// Pointer prefix that resolved to a scalar
        path: String,
    },

    /// Source text is not valid JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl DocumentError {
    /// Create container error for pointer prefix
    pub(crate) fn not_a_container(path: impl Into<String>) -> Self {
        Self::NotAContainer { path: path.into() }
    }
}
