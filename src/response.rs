//! Response parsing
//!
//! Turns the raw `(exit_code, stdout, stderr)` triple of a remote curl run
//! into a [`RemoteResponse`]. Pure functions, no hidden state: parsing the
//! same triple twice yields identical values.
//!
//! Expected stdout layout (produced by the flags in [`crate::command`]):
//!
//! ```text
//! HTTP/1.1 301 Moved Permanently\r\n      ─┐ one header block
//! Location: https://example.com/\r\n       │ per redirect hop
//! \r\n                                    ─┘
//! HTTP/1.1 200 OK\r\n                     ─┐ last block is
//! Content-Type: text/plain\r\n             │ authoritative
//! \r\n                                    ─┘
//! <body bytes>
//! \nCURLSTATUS:200\n                        write-out marker
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::command::STATUS_MARKER;
use crate::error::ResponseParseError;

/// Structured result of a remote HTTP request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteResponse {
    /// HTTP status code; 0 when curl received no response at all.
    pub status_code: u16,
    /// Headers of the final hop, names lowercased, last-value-wins.
    pub headers: BTreeMap<String, String>,
    /// Every raw header line across all hops, in emitted order, with
    /// original casing and duplicates preserved.
    pub raw_headers: Vec<String>,
    /// Response body, lossily decoded as UTF-8.
    pub body: String,
    /// Effective URL, with merged query parameters.
    pub url: String,
    /// Wall-clock time of the final attempt only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<Duration>,
}

impl RemoteResponse {
    /// Whether the status code is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Parse curl output into a [`RemoteResponse`].
///
/// A non-zero exit code with a parsable response is not an error here:
/// curl's strict modes exit non-zero on HTTP error statuses, but the
/// HTTP-level answer is still the caller's business.
pub fn parse(
    exit_code: i32,
    stdout: &[u8],
    stderr: &[u8],
) -> Result<RemoteResponse, ResponseParseError> {
    let text = String::from_utf8_lossy(stdout);

    let Some(marker_pos) = text.rfind(STATUS_MARKER) else {
        if exit_code != 0 {
            return Err(ResponseParseError::CommandFailed {
                exit_code,
                stderr: String::from_utf8_lossy(stderr).trim().to_string(),
            });
        }
        return Err(ResponseParseError::MissingMarker);
    };

    let after = &text[marker_pos + STATUS_MARKER.len()..];
    let marker_code = after.lines().next().unwrap_or("").trim();
    let marker_code: u16 = marker_code
        .parse()
        .map_err(|_| ResponseParseError::BadStatusLine(marker_code.to_string()))?;

    // The write-out template starts with a newline of its own; strip it so
    // it does not end up in the body.
    let before = &text[..marker_pos];
    let before = before.strip_suffix('\n').unwrap_or(before);

    let (blocks, body) = split_header_blocks(before);

    let raw_headers: Vec<String> = blocks
        .iter()
        .flat_map(|block| block.lines())
        .map(str::to_string)
        .collect();

    let (status_code, headers) = match blocks.last() {
        Some(block) => parse_block(block)?,
        // No header block at all: curl prints 000 when no response was
        // received, which maps to status 0 ("no status", retryable).
        None => (marker_code, BTreeMap::new()),
    };

    Ok(RemoteResponse {
        status_code,
        headers,
        raw_headers,
        body: body.to_string(),
        url: String::new(),
        elapsed: None,
    })
}

/// Peel consecutive `HTTP/`-prefixed header blocks off the front of the
/// output. Each block ends at a blank line (CRLF or LF); whatever follows
/// the last block is the body.
fn split_header_blocks(text: &str) -> (Vec<&str>, &str) {
    let mut blocks = Vec::new();
    let mut remaining = text;

    while remaining.starts_with("HTTP/") {
        let crlf = remaining.find("\r\n\r\n").map(|i| (i, 4));
        let lf = remaining.find("\n\n").map(|i| (i, 2));
        let sep = match (crlf, lf) {
            (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
            (a, b) => a.or(b),
        };
        let Some((pos, len)) = sep else {
            // No separator: the rest is a truncated header block.
            blocks.push(remaining);
            remaining = "";
            break;
        };
        blocks.push(&remaining[..pos]);
        remaining = &remaining[pos + len..];
    }

    (blocks, remaining)
}

/// Parse one header block: status line first, then `Name: Value` lines.
/// Lines without a colon are skipped, not fatal.
fn parse_block(block: &str) -> Result<(u16, BTreeMap<String, String>), ResponseParseError> {
    let mut lines = block.lines();
    let status_line = lines.next().unwrap_or("");
    let status_code = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .filter(|c| (100..=599).contains(c))
        .ok_or_else(|| ResponseParseError::BadStatusLine(status_line.to_string()))?;

    let mut headers = BTreeMap::new();
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    Ok((status_code, headers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_200() {
        let stdout =
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nhello\nCURLSTATUS:200\n";
        let resp = parse(0, stdout, b"").unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.header("Content-Type"), Some("text/plain"));
        assert_eq!(resp.body, "hello");
        assert!(resp.is_success());
    }

    #[test]
    fn test_parse_is_idempotent() {
        let stdout = b"HTTP/1.1 200 OK\r\nX-A: 1\r\n\r\nbody\nCURLSTATUS:200\n";
        assert_eq!(parse(0, stdout, b"").unwrap(), parse(0, stdout, b"").unwrap());
    }

    #[test]
    fn test_404_parses_normally() {
        let stdout = b"HTTP/1.1 404 Not Found\r\nContent-Type: text/html\r\nX-Test: value\r\n\r\nNot Found!\nCURLSTATUS:404\n";
        let resp = parse(0, stdout, b"").unwrap();
        assert_eq!(resp.status_code, 404);
        assert_eq!(resp.header("X-Test"), Some("value"));
        assert_eq!(resp.body, "Not Found!");
    }

    #[test]
    fn test_redirect_chain_last_block_authoritative() {
        let stdout = b"HTTP/1.1 301 Moved Permanently\r\nLocation: https://example.com/\r\n\r\nHTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nfinal\nCURLSTATUS:200\n";
        let resp = parse(0, stdout, b"").unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.header("content-type"), Some("text/plain"));
        // location belongs to the first hop, not the final headers
        assert_eq!(resp.header("location"), None);
        assert_eq!(resp.body, "final");
        // but every raw line of every hop is preserved, in order
        assert_eq!(
            resp.raw_headers,
            vec![
                "HTTP/1.1 301 Moved Permanently",
                "Location: https://example.com/",
                "HTTP/1.1 200 OK",
                "Content-Type: text/plain",
            ]
        );
    }

    #[test]
    fn test_duplicate_headers_last_wins() {
        let stdout =
            b"HTTP/1.1 200 OK\r\nX-Dup: first\r\nX-Dup: second\r\n\r\n\nCURLSTATUS:200\n";
        let resp = parse(0, stdout, b"").unwrap();
        assert_eq!(resp.header("x-dup"), Some("second"));
        assert_eq!(resp.raw_headers.len(), 3);
    }

    #[test]
    fn test_malformed_header_line_skipped() {
        let stdout =
            b"HTTP/1.1 200 OK\r\nGood: yes\r\nthis line has no colon\r\n\r\nok\nCURLSTATUS:200\n";
        let resp = parse(0, stdout, b"").unwrap();
        assert_eq!(resp.header("good"), Some("yes"));
        assert_eq!(resp.headers.len(), 1);
        assert_eq!(resp.body, "ok");
    }

    #[test]
    fn test_nonzero_exit_without_marker_is_command_failure() {
        let err = parse(7, b"", b"curl: (7) Failed to connect\n").unwrap_err();
        assert_eq!(
            err,
            ResponseParseError::CommandFailed {
                exit_code: 7,
                stderr: "curl: (7) Failed to connect".to_string(),
            }
        );
    }

    #[test]
    fn test_zero_exit_without_marker() {
        assert_eq!(
            parse(0, b"garbage", b"").unwrap_err(),
            ResponseParseError::MissingMarker
        );
    }

    #[test]
    fn test_nonzero_exit_with_status_line_is_not_an_error() {
        // curl --fail exits 22 on HTTP errors but still dumps headers
        let stdout = b"HTTP/1.1 500 Internal Server Error\r\n\r\n\nCURLSTATUS:500\n";
        let resp = parse(22, stdout, b"curl: (22) The requested URL returned error\n").unwrap();
        assert_eq!(resp.status_code, 500);
    }

    #[test]
    fn test_no_response_at_all_yields_status_zero() {
        let resp = parse(0, b"\nCURLSTATUS:000\n", b"").unwrap();
        assert_eq!(resp.status_code, 0);
        assert!(resp.headers.is_empty());
        assert!(resp.raw_headers.is_empty());
        assert_eq!(resp.body, "");
    }

    #[test]
    fn test_bad_status_line() {
        let stdout = b"HTTP/1.1 nonsense\r\n\r\n\nCURLSTATUS:200\n";
        assert!(matches!(
            parse(0, stdout, b"").unwrap_err(),
            ResponseParseError::BadStatusLine(_)
        ));
    }

    #[test]
    fn test_status_out_of_range_rejected() {
        let stdout = b"HTTP/1.1 999 Weird\r\n\r\n\nCURLSTATUS:999\n";
        assert!(matches!(
            parse(0, stdout, b"").unwrap_err(),
            ResponseParseError::BadStatusLine(_)
        ));
    }

    #[test]
    fn test_invalid_utf8_body_is_replaced_not_fatal() {
        let mut stdout = b"HTTP/1.1 200 OK\r\n\r\n".to_vec();
        stdout.extend_from_slice(&[0xff, 0xfe]);
        stdout.extend_from_slice(b"\nCURLSTATUS:200\n");
        let resp = parse(0, &stdout, b"").unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.body, "\u{fffd}\u{fffd}");
    }

    #[test]
    fn test_lf_only_separator() {
        let stdout = b"HTTP/1.1 200 OK\nContent-Length: 2\n\nhi\nCURLSTATUS:200\n";
        let resp = parse(0, stdout, b"").unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.body, "hi");
    }
}
