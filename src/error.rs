//! Error types
//!
//! Three failure families, kept separate because the retry policy treats
//! them differently:
//! - [`InvalidRequestError`]: bad input, raised before any remote call, never retried
//! - [`RemoteExecError`]: SSH/transport failure, retried per policy
//! - [`ResponseParseError`]: curl output could not be interpreted; retried only
//!   when it came from an exit-code-only failure

use thiserror::Error;

/// Request validation errors. Raised by the command builder before any
/// SSH session is opened.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidRequestError {
    #[error("unsupported HTTP method: {0:?}")]
    UnsupportedMethod(String),

    #[error("URL is empty")]
    EmptyUrl,

    #[error("URL is not an absolute http(s) URL: {0:?}")]
    InvalidUrl(String),

    #[error("header {0:?} contains control characters")]
    HeaderNotTokenSafe(String),

    #[error("timeout must be positive")]
    ZeroTimeout,

    #[error("backoff_factor must be non-negative")]
    NegativeBackoff,

    #[error("max_backoff must be positive")]
    NonPositiveMaxBackoff,

    #[error("request body is not serializable as JSON: {0}")]
    BodySerialize(String),
}

/// SSH session and transport errors.
#[derive(Debug, Error)]
pub enum RemoteExecError {
    #[error("SSH connection failed: {0}")]
    Connect(String),

    #[error("authentication rejected for user {0:?}")]
    AuthRejected(String),

    #[error("failed to load private key {path}: {reason}")]
    KeyLoad { path: String, reason: String },

    #[error("failed to open session channel: {0}")]
    ChannelOpen(String),

    #[error("remote command execution failed: {0}")]
    Exec(String),

    #[error("connection timed out after {0}s")]
    Timeout(u64),

    #[error("SSH channel closed before the command completed")]
    ChannelClosed,
}

/// Errors interpreting curl's stdout/stderr/exit-code triple.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResponseParseError {
    /// curl exited non-zero without producing any response output.
    /// Carries the raw stderr excerpt for diagnosis.
    #[error("curl exited with status {exit_code} and produced no response: {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    /// The write-out status marker never appeared in stdout even though
    /// curl exited cleanly.
    #[error("status marker not found in curl output")]
    MissingMarker,

    #[error("malformed status line: {0:?}")]
    BadStatusLine(String),
}

/// Top-level error returned by [`crate::RemoteCurlClient::request`].
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    InvalidRequest(#[from] InvalidRequestError),

    #[error(transparent)]
    Exec(#[from] RemoteExecError),

    #[error(transparent)]
    Parse(#[from] ResponseParseError),
}
