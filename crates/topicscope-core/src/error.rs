//! Error types for Topicscope
//!
//! Every failure the data view can observe is one of these variants. Nothing
//! in the workspace retries on its own; callers decide how to surface them.

use thiserror::Error;

/// Result type alias for Topicscope operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Topicscope
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Decoding Errors
    // ==========================================================================
    #[error("Malformed cursor: {0}")]
    MalformedCursor(String),

    #[error("Malformed filter query: {0}")]
    MalformedFilterQuery(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ==========================================================================
    // Backend Errors
    // ==========================================================================
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Stream transport error: {0}")]
    StreamTransportError(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Connection error: {0}")]
    Connection(String),

    // ==========================================================================
    // Configuration
    // ==========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ==========================================================================
    // Timeout/Cancellation
    // ==========================================================================
    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Returns the error type string (for JSON output and notices)
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::MalformedCursor(_) => "MALFORMED_CURSOR",
            Self::MalformedFilterQuery(_) => "MALFORMED_FILTER_QUERY",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::FetchFailed(_) => "FETCH_FAILED",
            Self::DeleteFailed(_) => "DELETE_FAILED",
            Self::StreamTransportError(_) => "STREAM_TRANSPORT_ERROR",
            Self::Http { .. } => "HTTP_ERROR",
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "OS_ERROR",
            Self::Serialization(_) => "TYPE_ERROR",
            Self::Timeout(_) | Self::Cancelled => "TIMEOUT",
        }
    }

    /// Returns whether the user can reasonably try the same action again.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            // User-correctable input issues
            Self::MalformedCursor(_)
                | Self::MalformedFilterQuery(_)
                | Self::InvalidArgument(_)
                // Transient infrastructure
                | Self::FetchFailed(_)
                | Self::DeleteFailed(_)
                | Self::StreamTransportError(_)
                | Self::Connection(_)
                | Self::Timeout(_)
                | Self::Cancelled
        ) || matches!(self, Self::Http { status, .. } if *status >= 500 || *status == 429)
    }

    /// Wrap this error as a page-fetch failure, keeping the cause's message.
    #[must_use]
    pub fn into_fetch_failed(self) -> Self {
        match self {
            Self::FetchFailed(_) => self,
            other => Self::FetchFailed(other.to_string()),
        }
    }

    /// Wrap this error as a delete failure, keeping the cause's message.
    #[must_use]
    pub fn into_delete_failed(self) -> Self {
        match self {
            Self::DeleteFailed(_) => self,
            other => Self::DeleteFailed(other.to_string()),
        }
    }
}
