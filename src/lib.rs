//! remote-curl
//!
//! Run HTTP(S) requests *from a remote host*: open an SSH session, invoke
//! `curl` there, and parse its output back into a structured
//! [`RemoteResponse`] locally. Useful when the target is only reachable
//! from that host, or when the request must originate from its network
//! position.
//!
//! Capabilities:
//! - the usual HTTP verbs, headers, query params, raw or JSON bodies
//! - redirect following, TLS verification opt-out, per-attempt timeout
//! - pass-through of arbitrary extra curl arguments
//! - retry with exponential backoff, cap, and jitter
//!
//! The SSH transport is `russh`; `curl` must be installed on the remote
//! host. See [`RemoteCurlClient`] for a usage example.

pub mod client;
pub mod command;
pub mod error;
pub mod request;
pub mod response;
pub mod retry;
pub mod ssh;

pub use client::RemoteCurlClient;
pub use error::{Error, InvalidRequestError, RemoteExecError, ResponseParseError};
pub use request::{Body, Method, ParamValue, RequestSpec};
pub use response::RemoteResponse;
pub use retry::{AttemptOutcome, RetryDecision, RetryPolicy, RetryState};
pub use ssh::{Connector, Credentials, ExecOutput, RemoteSession, SshConfig, SshConnector};
