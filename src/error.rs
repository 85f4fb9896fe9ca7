//! Error types for the sync core.
//!
//! A run ends early only when a Zotero page request fails, whether through
//! [`SyncError::Transport`], [`SyncError::Status`] or [`SyncError::Decode`].
//! Errors on parent lookups and Readwise batches are downgraded to a
//! [`FailureRecord`](crate::models::FailureRecord) by the stage that sees
//! them. A failure log that cannot be written is logged and skipped.

use thiserror::Error;

/// Errors raised by the Zotero/Readwise clients and the pipeline stages.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network, DNS, TLS, or timeout failure talking to a remote service.
    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    /// The remote service answered with a non-success status.
    #[error("{context} (HTTP {status}): {body}")]
    Status {
        context: String,
        status: u16,
        body: String,
    },

    /// A response body could not be decoded into the expected shape.
    #[error("Failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    /// An annotation's parent document could not be resolved.
    #[error("Parent item '{0}' could not be resolved")]
    Resolution(String),

    /// IO error while persisting state or failure records.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error while persisting state or failure records.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Wrap a reqwest error with a short description of the request.
    pub fn transport(context: impl Into<String>, source: reqwest::Error) -> Self {
        SyncError::Transport {
            context: context.into(),
            source,
        }
    }

    /// True when the remote service reported the requested item as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Status { status: 404, .. })
    }

    /// Truncate an error body so log lines and failure records stay readable.
    pub(crate) fn clip_body(body: &str) -> String {
        body.chars().take(500).collect()
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
