//! Request-to-command compiler
//!
//! Translates a [`RequestSpec`] into the argv for a remote curl invocation.
//! Pure and deterministic: the same spec always compiles to the same tokens.
//!
//! Output shape (flags in fixed order, extra flags last so they can
//! override):
//!
//! ```text
//! curl -sS -D - [-L] -X METHOD [-H "Content-Type: application/json"]
//!      [-H "Name: value"]... [--data-binary BODY] [-k] [--max-time N]
//!      [extra_flags...] URL -w "\nCURLSTATUS:%{http_code}\n"
//! ```
//!
//! `-D -` dumps one header block per hop to stdout ahead of the body; the
//! `-w` write-out appends the status marker after everything else. Together
//! they let the parser locate block boundaries and the end of the body.

use url::Url;

use crate::error::InvalidRequestError;
use crate::request::{Body, ParamValue, RequestSpec};

/// Marker string curl is told to emit after the body, followed by the
/// numeric `%{http_code}` (curl prints `000` when no response arrived).
pub const STATUS_MARKER: &str = "CURLSTATUS:";

/// The curl `-w` template producing the marker line.
const WRITE_OUT: &str = "\nCURLSTATUS:%{http_code}\n";

/// Compile a request spec into curl argv tokens.
///
/// Tokens are unquoted; shell quoting happens where the argv is joined into
/// a single remote command line at the session boundary.
pub fn build(spec: &RequestSpec) -> Result<Vec<String>, InvalidRequestError> {
    validate_retry_settings(spec)?;

    let url = effective_url(spec)?;

    let mut argv: Vec<String> = ["curl", "-sS", "-D", "-"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    if spec.follow_redirects {
        argv.push("-L".to_string());
    }
    argv.push("-X".to_string());
    argv.push(spec.method.as_str().to_string());

    let body = match &spec.body {
        Body::Empty => None,
        Body::Raw(s) => Some(s.clone()),
        Body::Json(value) => {
            // serde_json's default map is BTreeMap-backed, so key order is
            // stable across builds.
            let serialized = serde_json::to_string(value)
                .map_err(|e| InvalidRequestError::BodySerialize(e.to_string()))?;
            if !spec.has_header("content-type") {
                argv.push("-H".to_string());
                argv.push("Content-Type: application/json".to_string());
            }
            Some(serialized)
        }
    };

    for (name, value) in &spec.headers {
        validate_header(name, value)?;
        argv.push("-H".to_string());
        argv.push(format!("{}: {}", name, value));
    }

    if let Some(body) = body {
        argv.push("--data-binary".to_string());
        argv.push(body);
    }

    if !spec.verify_tls {
        argv.push("-k".to_string());
    }

    if let Some(timeout) = spec.timeout {
        if timeout.is_zero() {
            return Err(InvalidRequestError::ZeroTimeout);
        }
        argv.push("--max-time".to_string());
        argv.push(format!("{}", timeout.as_secs_f64()));
    }

    argv.extend(spec.extra_flags.iter().cloned());

    argv.push(url);
    argv.push("-w".to_string());
    argv.push(WRITE_OUT.to_string());

    Ok(argv)
}

/// The request URL with query parameters merged in.
///
/// Pre-existing query pairs survive unless the spec supplies the same key;
/// spec-supplied values win on collision.
pub(crate) fn effective_url(spec: &RequestSpec) -> Result<String, InvalidRequestError> {
    if spec.url.is_empty() {
        return Err(InvalidRequestError::EmptyUrl);
    }
    let mut url =
        Url::parse(&spec.url).map_err(|_| InvalidRequestError::InvalidUrl(spec.url.clone()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(InvalidRequestError::InvalidUrl(spec.url.clone()));
    }

    if !spec.params.is_empty() {
        let existing: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in existing.iter().filter(|(k, _)| !spec.params.contains_key(k)) {
            pairs.append_pair(k, v);
        }
        for (k, v) in &spec.params {
            match v {
                ParamValue::One(value) => {
                    pairs.append_pair(k, value);
                }
                ParamValue::Many(values) => {
                    for value in values {
                        pairs.append_pair(k, value);
                    }
                }
            }
        }
        drop(pairs);
    }

    Ok(url.to_string())
}

fn validate_retry_settings(spec: &RequestSpec) -> Result<(), InvalidRequestError> {
    if spec.backoff_factor < 0.0 || !spec.backoff_factor.is_finite() {
        return Err(InvalidRequestError::NegativeBackoff);
    }
    if let Some(cap) = spec.max_backoff {
        if cap <= 0.0 || !cap.is_finite() {
            return Err(InvalidRequestError::NonPositiveMaxBackoff);
        }
    }
    Ok(())
}

fn validate_header(name: &str, value: &str) -> Result<(), InvalidRequestError> {
    let tainted = |s: &str| s.chars().any(|c| c.is_ascii_control());
    if name.is_empty() || tainted(name) || tainted(value) {
        return Err(InvalidRequestError::HeaderNotTokenSafe(name.to_string()));
    }
    Ok(())
}
