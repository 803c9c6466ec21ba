//! Error taxonomy for the behavior graph engine.

/// Engine result type.
pub type Result<T> = std::result::Result<T, FloopError>;

/// Errors the core may surface to a collaborator (CLI, MCP server, hooks).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum FloopError {
    /// The scope directory (`.floop/`) has not been initialized.
    #[error("scope not initialized: {0}")]
    NotInitialized(String),

    /// Input failed shape/length/sanitization validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A node, edge, pack, or behavior ID was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation requires human review, is missing a dependency, or
    /// otherwise cannot proceed without a decision the caller must make.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Checksum mismatch, schema too new, oversized restore, or a
    /// truncated/corrupt JSONL record that isn't the tolerated trailing line.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// Underlying file or database error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation was aborted via a cancellation token.
    #[error("cancelled")]
    Cancelled,
}

impl From<rusqlite::Error> for FloopError {
    fn from(e: rusqlite::Error) -> Self {
        FloopError::Io(std::io::Error::other(e))
    }
}

impl From<serde_json::Error> for FloopError {
    fn from(e: serde_json::Error) -> Self {
        FloopError::Validation(format!("malformed JSON: {e}"))
    }
}
