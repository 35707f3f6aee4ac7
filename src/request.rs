//! Request description
//!
//! [`RequestSpec`] is an immutable value object describing one HTTP request
//! to be performed on the remote host, including its retry budget. It is
//! compiled into a curl argv by [`crate::command::build`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::InvalidRequestError;

/// HTTP methods supported by the remote invocation. Closed set: anything
/// else is rejected before a session is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
}

impl Method {
    /// Method name as sent to curl's `-X` flag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = InvalidRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            "OPTIONS" => Ok(Self::Options),
            other => Err(InvalidRequestError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// Request body, resolved once at build time.
///
/// A `Json` body is serialized with stable key ordering and implies
/// `Content-Type: application/json` unless the caller set one.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Body {
    #[default]
    Empty,
    Raw(String),
    Json(serde_json::Value),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// A query parameter value: a single string or a repeated key.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    One(String),
    Many(Vec<String>),
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::One(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::One(v.to_string())
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(v: Vec<String>) -> Self {
        Self::Many(v)
    }
}

/// Description of one remote HTTP request.
///
/// Built with chained setters:
///
/// ```
/// use remote_curl::{Method, RequestSpec};
///
/// let spec = RequestSpec::new(Method::Get, "https://httpbin.org/get")
///     .param("q", "x")
///     .header("Accept", "application/json")
///     .retries(3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    /// Request headers. Sorted map so the compiled argv is deterministic.
    pub headers: BTreeMap<String, String>,
    /// Query parameters, merged into the URL's query string. On key
    /// collision with a pre-existing query pair, these win.
    pub params: BTreeMap<String, ParamValue>,
    pub body: Body,
    pub follow_redirects: bool,
    pub verify_tls: bool,
    /// Per-attempt timeout, enforced remotely via curl `--max-time`.
    pub timeout: Option<Duration>,
    /// Extra curl arguments, passed through verbatim after all builder
    /// flags so they can override them.
    pub extra_flags: Vec<String>,
    /// Additional attempts after the first. Total attempts = 1 + retries.
    pub retries: u32,
    /// Base delay in seconds; the n-th retry waits `backoff_factor * 2^(n-1)`.
    pub backoff_factor: f64,
    /// Cap on any single wait, in seconds. `None` = uncapped.
    pub max_backoff: Option<f64>,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            params: BTreeMap::new(),
            body: Body::Empty,
            follow_redirects: true,
            verify_tls: true,
            timeout: None,
            extra_flags: Vec::new(),
            retries: 0,
            backoff_factor: 0.5,
            max_backoff: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn body_raw(mut self, body: impl Into<String>) -> Self {
        self.body = Body::Raw(body.into());
        self
    }

    pub fn body_json(mut self, body: serde_json::Value) -> Self {
        self.body = Body::Json(body);
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn extra_flag(mut self, flag: impl Into<String>) -> Self {
        self.extra_flags.push(flag.into());
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn max_backoff(mut self, cap: f64) -> Self {
        self.max_backoff = Some(cap);
        self
    }

    /// Case-insensitive check whether a header is already set.
    pub(crate) fn has_header(&self, name: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    }
}
