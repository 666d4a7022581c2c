//! Closed error taxonomy for the documentation query service (spec §7).
//!
//! Library code returns `Result<T, CangjieError>`. The binary entry point
//! converts to `anyhow::Result` at the outermost layer; the tool surface
//! maps each variant to a JSON-RPC error and an HTTP status code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CangjieError {
    /// Invalid language, embedding type, or version string.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Missing topic or category; LSP file not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Git repo clone/checkout failed, remote peer unreachable, prebuilt URL unreachable.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// Archive missing required members, metadata mismatch, corrupt index.
    #[error("integrity error: {0}")]
    IntegrityError(String),

    /// Embedding provider failure, vector-DB failure, reranker failure.
    #[error("backend error: {0}")]
    BackendError(#[source] anyhow::Error),

    /// LSP server disconnected, response mismatches schema, initialization timeout.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// User interrupt.
    #[error("cancelled")]
    Cancelled,
}

impl CangjieError {
    pub fn backend(err: impl Into<anyhow::Error>) -> Self {
        CangjieError::BackendError(err.into())
    }

    /// Exit code per spec §6: 0 success, 1 config/init error, 2 user interrupt.
    pub fn exit_code(&self) -> i32 {
        match self {
            CangjieError::Cancelled => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, CangjieError>;
