//! Error types for the httwrap client.
//!
//! # Design
//! Every failure a caller can see is an [`Error`]. Transport problems are
//! reported as [`TransportError`] and always wrapped in
//! [`Error::RequestFailed`] together with the method and path of the call,
//! so the underlying HTTP library's error type never leaks out. A response
//! that arrives but is rejected by the error handler is [`Error::Http`].

use thiserror::Error;

use crate::http::HttpMethod;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by configuration, client construction and every call.
#[derive(Debug, Error)]
pub enum Error {
    /// A constructor was given unusable input (empty base path, empty token...).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Credentials could not produce an authenticated transport client.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The exchange did not complete: connect, DNS, timeout, cancellation or
    /// a broken body stream.
    #[error("an error occurred while executing request. path: {path}, method: {method}")]
    RequestFailed {
        method: HttpMethod,
        path: String,
        #[source]
        source: TransportError,
    },

    /// The response was received but rejected by the error handler.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// A request body or query payload could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A response body could not be decoded into the requested type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// A blocking operation was called on a thread that is driving an async
    /// runtime. Use the async operation there instead.
    #[error("blocking operation called from within an async runtime")]
    BlockingInAsyncContext,
}

impl Error {
    /// Status code carried by a classified HTTP failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failures reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("request was cancelled")]
    Cancelled,

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("transport has been closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}
