//! Retry state machine
//!
//! Decides, after each attempt, whether to retry, how long to wait, and
//! when to give up. Valid transitions:
//!
//! ```text
//! ┌───────┐  begin_attempt()  ┌────────────┐
//! │ Ready │ ────────────────► │ Attempting │
//! └───────┘                   └─────┬──────┘
//!     ▲                             │ decide(outcome)
//!     │ begin_attempt()     ┌───────┴────────────────┐
//!     │                     ▼            ▼           ▼
//! ┌───┴───────┐       ┌──────────┐  ┌────────┐  ┌───────────┐
//! │ RetryWait │ ◄──── │ (retry)  │  │  Done  │  │ Exhausted │
//! └───────────┘       └──────────┘  └────────┘  └───────────┘
//! ```
//!
//! The backoff math is pure; jitter and sleeping live outside it so the
//! schedule can be unit-tested without randomness or real waits.

use std::time::Duration;

use rand::Rng;

use crate::error::{RemoteExecError, ResponseParseError};
use crate::request::RequestSpec;
use crate::response::RemoteResponse;

/// Result of one attempt: a parsed response, or a typed failure.
#[derive(Debug)]
pub enum AttemptOutcome {
    Response(RemoteResponse),
    /// The session could not be opened or the command could not be run.
    ExecFailed(RemoteExecError),
    /// The command ran but its output could not be interpreted.
    ParseFailed {
        error: ResponseParseError,
        exit_code: i32,
    },
}

impl AttemptOutcome {
    /// Whether this outcome warrants another attempt.
    ///
    /// Retryable: transport failure, exit-code-only failure (no status),
    /// status 0, or a 5xx status. Statuses in [100,499] are terminal —
    /// a 4xx is a valid application answer, not a transient fault.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Response(resp) => {
                resp.status_code == 0 || (500..=599).contains(&resp.status_code)
            }
            Self::ExecFailed(_) => true,
            Self::ParseFailed { error, .. } => {
                matches!(error, ResponseParseError::CommandFailed { .. })
            }
        }
    }
}

/// Retry states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryState {
    #[default]
    Ready,
    Attempting,
    /// A terminal outcome was reached (success or non-retryable failure).
    Done,
    RetryWait,
    Exhausted,
}

/// What the caller should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Terminal outcome: surface it to the caller.
    Done,
    /// Wait, then attempt again.
    Retry { after: Duration },
    /// Retryable outcome but the budget is spent; surface the last
    /// outcome unmodified.
    Exhausted,
}

/// Stateful retry controller for one logical request.
#[derive(Debug)]
pub struct RetryPolicy {
    retries: u32,
    backoff_factor: f64,
    max_backoff: Option<f64>,
    attempt: u32,
    state: RetryState,
}

impl RetryPolicy {
    pub fn new(spec: &RequestSpec) -> Self {
        Self {
            retries: spec.retries,
            backoff_factor: spec.backoff_factor,
            max_backoff: spec.max_backoff,
            attempt: 0,
            state: RetryState::Ready,
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Zero-based index of the attempt about to run.
    pub fn attempt_index(&self) -> u32 {
        self.attempt
    }

    /// Mark the start of an attempt; returns its zero-based index.
    pub fn begin_attempt(&mut self) -> u32 {
        debug_assert!(matches!(
            self.state,
            RetryState::Ready | RetryState::RetryWait
        ));
        self.state = RetryState::Attempting;
        self.attempt
    }

    /// Classify an attempt outcome and advance the state machine.
    pub fn decide(&mut self, outcome: &AttemptOutcome) -> RetryDecision {
        debug_assert_eq!(self.state, RetryState::Attempting);

        if !outcome.is_retryable() {
            self.state = RetryState::Done;
            return RetryDecision::Done;
        }
        if self.attempt >= self.retries {
            self.state = RetryState::Exhausted;
            return RetryDecision::Exhausted;
        }

        self.attempt += 1;
        self.state = RetryState::RetryWait;
        let base = backoff_delay(self.attempt, self.backoff_factor, self.max_backoff);
        RetryDecision::Retry {
            after: with_jitter(base),
        }
    }
}

/// Base wait before the n-th retry (n >= 1, 1-based):
/// `min(max_backoff, backoff_factor * 2^(n-1))`. A zero factor means
/// immediate retries.
pub fn backoff_delay(retry_n: u32, backoff_factor: f64, max_backoff: Option<f64>) -> Duration {
    if backoff_factor <= 0.0 {
        return Duration::ZERO;
    }
    let mut secs = backoff_factor * f64::powi(2.0, retry_n.saturating_sub(1) as i32);
    if let Some(cap) = max_backoff {
        secs = secs.min(cap);
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Add uniform jitter in `[0, base/10]` to desynchronize retry storms.
fn with_jitter(base: Duration) -> Duration {
    if base.is_zero() {
        return base;
    }
    let jitter = rand::thread_rng().gen_range(0.0..=base.as_secs_f64() * 0.1);
    base + Duration::from_secs_f64(jitter)
}
