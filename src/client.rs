//! Remote executor
//!
//! [`RemoteCurlClient`] ties the pieces together: compile the request into
//! argv (fail fast on bad input), then per attempt open a session, run
//! curl, parse its output, and let the retry policy classify the outcome.
//! Sessions are opened and closed per attempt, on every exit path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, warn};

use crate::command;
use crate::error::{Error, RemoteExecError};
use crate::response::{self, RemoteResponse};
use crate::retry::{AttemptOutcome, RetryDecision, RetryPolicy};
use crate::ssh::{Connector, Credentials, SshConfig, SshConnector};
use crate::RequestSpec;

/// Client that runs HTTP requests from a remote host by invoking curl
/// over SSH.
///
/// ```no_run
/// use remote_curl::{Credentials, Method, RemoteCurlClient, RequestSpec};
///
/// # async fn run() -> Result<(), remote_curl::Error> {
/// let client = RemoteCurlClient::new(
///     "10.37.65.78",
///     "user",
///     Credentials::Key { path: "~/.ssh/id_rsa".into(), passphrase: None },
/// );
/// let resp = client
///     .request(RequestSpec::new(Method::Get, "https://httpbin.org/get")
///         .param("q", "x")
///         .retries(3))
///     .await?;
/// println!("{} {}", resp.status_code, resp.body);
/// # Ok(())
/// # }
/// ```
/// Local bound on one remote exec when the spec carries no timeout.
const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Headroom on top of the spec timeout so curl's own `--max-time` fires
/// first and its exit code reaches us.
const EXEC_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

pub struct RemoteCurlClient {
    connector: Arc<dyn Connector>,
}

impl RemoteCurlClient {
    /// Connect as `username@host:22` with a 10s connect timeout. Use
    /// [`Self::with_config`] to change port or timeout.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self::with_config(SshConfig::new(host, username, credentials))
    }

    pub fn with_config(config: SshConfig) -> Self {
        Self {
            connector: Arc::new(SshConnector::new(config)),
        }
    }

    /// Build a client over a custom session source. This is the seam the
    /// tests use; it also allows callers to pool or share sessions.
    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Perform a remote HTTP request with retry + exponential backoff.
    ///
    /// Total attempts = 1 + `spec.retries`. Waits between retries are
    /// `min(max_backoff, backoff_factor * 2^(n-1))` plus up to 10% jitter.
    /// After exhaustion the last attempt's outcome is surfaced unmodified:
    /// a 5xx response is returned as a response, a transport error as an
    /// error.
    pub async fn request(&self, spec: RequestSpec) -> Result<RemoteResponse, Error> {
        // Validate and compile before touching the network.
        let argv = command::build(&spec)?;
        let url = command::effective_url(&spec)?;
        let exec_timeout = spec
            .timeout
            .map(|t| t + EXEC_TIMEOUT_MARGIN)
            .unwrap_or(DEFAULT_EXEC_TIMEOUT);

        let mut policy = RetryPolicy::new(&spec);
        loop {
            let attempt = policy.begin_attempt();
            let started = Instant::now();
            let outcome = self.attempt_once(&argv, exec_timeout).await;

            match policy.decide(&outcome) {
                RetryDecision::Retry { after } => {
                    warn!(
                        "attempt {} failed ({}), retrying in {:.2}s",
                        attempt + 1,
                        describe(&outcome),
                        after.as_secs_f64()
                    );
                    if !after.is_zero() {
                        tokio::time::sleep(after).await;
                    }
                }
                RetryDecision::Done => {
                    return finish(outcome, url, started.elapsed());
                }
                RetryDecision::Exhausted => {
                    error!(
                        "request failed after {} attempt(s): {}",
                        attempt + 1,
                        describe(&outcome)
                    );
                    return finish(outcome, url, started.elapsed());
                }
            }
        }
    }

    /// One attempt: session open → exec → parse. The session is closed on
    /// every exit path before the outcome is returned.
    ///
    /// The exec await is bounded locally: a wedged remote (channel open,
    /// curl never completing, no close) surfaces as a retryable
    /// [`RemoteExecError::Timeout`] instead of hanging the request.
    async fn attempt_once(&self, argv: &[String], exec_timeout: Duration) -> AttemptOutcome {
        let mut session = match self.connector.connect().await {
            Ok(session) => session,
            Err(e) => return AttemptOutcome::ExecFailed(e),
        };

        let result = match tokio::time::timeout(exec_timeout, session.exec(argv)).await {
            Ok(result) => result,
            Err(_) => {
                session.close().await;
                return AttemptOutcome::ExecFailed(RemoteExecError::Timeout(
                    exec_timeout.as_secs(),
                ));
            }
        };
        session.close().await;

        let output = match result {
            Ok(output) => output,
            Err(e) => return AttemptOutcome::ExecFailed(e),
        };

        // Absent exit status is common for short-lived commands; treat as 0.
        let exit_code = output.exit_code.unwrap_or(0);
        match response::parse(exit_code, &output.stdout, &output.stderr) {
            Ok(resp) => AttemptOutcome::Response(resp),
            Err(error) => AttemptOutcome::ParseFailed { error, exit_code },
        }
    }
}

/// Convert the final outcome into the caller-facing result.
fn finish(
    outcome: AttemptOutcome,
    url: String,
    elapsed: Duration,
) -> Result<RemoteResponse, Error> {
    match outcome {
        AttemptOutcome::Response(mut resp) => {
            resp.url = url;
            resp.elapsed = Some(elapsed);
            Ok(resp)
        }
        AttemptOutcome::ExecFailed(e) => Err(e.into()),
        AttemptOutcome::ParseFailed { error, .. } => Err(error.into()),
    }
}

fn describe(outcome: &AttemptOutcome) -> String {
    match outcome {
        AttemptOutcome::Response(resp) => format!("status {}", resp.status_code),
        AttemptOutcome::ExecFailed(e) => e.to_string(),
        AttemptOutcome::ParseFailed { error, .. } => error.to_string(),
    }
}
