//! Minimal HTTP/1.1 request-line/header parsing.
//!
//! This is deliberately narrow: enough RFC 7230 surface to parse a
//! request line, headers, and a `Content-Length`-delimited body into a
//! [`Request`](crate::event::Request). Chunked transfer-encoding and
//! request-body streaming are non-goals.

use crate::error::{RelayError, Result};
use crate::event::{HttpVersion, Request};
use crate::route::Method;

/// Outcome of scanning a connection's read buffer for a complete request.
pub enum ParseOutcome {
    /// Not enough bytes buffered yet; keep reading.
    Incomplete,
    /// A complete request was parsed, consuming `consumed` bytes from the
    /// front of the buffer.
    Complete { request: Request, consumed: usize },
}

/// Try to parse one HTTP/1.1 request out of `buf`. Returns
/// [`ParseOutcome::Incomplete`] if the header block (or the body, once
/// `Content-Length` is known) hasn't fully arrived yet.
///
/// `max_body_bytes` enforces the configured request body cap; exceeding it is a
/// `ProtocolError`-shaped failure the caller maps to 413, not 400, since
/// the request is otherwise well-formed.
pub fn try_parse_request(buf: &[u8], max_body_bytes: usize) -> Result<ParseOutcome> {
    let header_end = match find_header_end(buf) {
        Some(idx) => idx,
        None => return Ok(ParseOutcome::Incomplete),
    };

    let header_block = std::str::from_utf8(&buf[..header_end])
        .map_err(|_| RelayError::Protocol("request headers are not valid UTF-8".to_string()))?;
    let mut lines = header_block.split("\r\n");
    let request_line = lines.next().unwrap_or("");
    let (method, raw_url, version) = parse_request_line(request_line)?;

    let mut request = Request::new(method, raw_url);
    request.version = version;

    let mut content_length: usize = 0;
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| RelayError::Protocol(format!("malformed header line: {line:?}")))?;
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value
                .parse()
                .map_err(|_| RelayError::Protocol(format!("invalid Content-Length: {value:?}")))?;
        }
        if name.eq_ignore_ascii_case("transfer-encoding") {
            return Err(RelayError::Protocol(
                "chunked/streamed request bodies are not supported".to_string(),
            ));
        }
        request.headers.set(name, value);
    }

    if content_length > max_body_bytes {
        return Err(RelayError::Protocol(format!(
            "request body of {content_length} bytes exceeds the configured cap of {max_body_bytes}"
        )));
    }

    let body_start = header_end + 4; // skip the blank-line CRLFCRLF
    let available = buf.len().saturating_sub(body_start);
    if available < content_length {
        return Ok(ParseOutcome::Incomplete);
    }

    if content_length > 0 {
        request.body = Some(bytes::Bytes::copy_from_slice(
            &buf[body_start..body_start + content_length],
        ));
    }

    Ok(ParseOutcome::Complete { request, consumed: body_start + content_length })
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_request_line(line: &str) -> Result<(Method, String, HttpVersion)> {
    let mut parts = line.split(' ');
    let method_str = parts.next().unwrap_or("");
    let raw_url = parts.next().unwrap_or("");
    let version_str = parts.next().unwrap_or("");

    let method: Method = method_str
        .parse()
        .map_err(|_| RelayError::Protocol(format!("unsupported or malformed method: {method_str:?}")))?;

    if raw_url.is_empty() {
        return Err(RelayError::Protocol("missing request target".to_string()));
    }

    let version = match version_str {
        "HTTP/1.1" => HttpVersion::Http11,
        "HTTP/1.0" => HttpVersion::Http10,
        other => {
            return Err(RelayError::Protocol(format!(
                "unsupported HTTP version: {other:?}"
            )))
        }
    };

    Ok((method, raw_url.to_string(), version))
}

/// `true` if `err` came from the request-line HTTP-version check.
pub fn is_version_error(err: &RelayError) -> bool {
    matches!(err, RelayError::Protocol(msg) if msg.contains("unsupported HTTP version"))
}

/// `true` if `err` came from the `max_body_bytes` cap.
pub fn is_body_too_large(err: &RelayError) -> bool {
    matches!(err, RelayError::Protocol(msg) if msg.contains("exceeds the configured cap"))
}

/// Serialize a response's status line + headers (not the body) for the
/// buffered-response write path.
pub fn encode_status_and_headers(
    status: http::StatusCode,
    headers: impl Iterator<Item = (String, String)>,
    keep_alive: bool,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(b"HTTP/1.1 ");
    out.extend_from_slice(status.as_str().as_bytes());
    out.extend_from_slice(b" ");
    out.extend_from_slice(status.canonical_reason().unwrap_or("").as_bytes());
    out.extend_from_slice(b"\r\n");
    for (name, value) in headers {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"Connection: ");
    out.extend_from_slice(if keep_alive { b"keep-alive" } else { b"close" });
    out.extend_from_slice(b"\r\n\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_line_headers_and_body() {
        let raw = b"POST /api/users HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: 13\r\n\r\n{\"name\":\"x\"}\n";
        let outcome = try_parse_request(raw, 1024).unwrap();
        match outcome {
            ParseOutcome::Complete { request, consumed } => {
                assert_eq!(request.method, Method::Post);
                assert_eq!(request.path, "/api/users");
                assert_eq!(request.header("content-type"), Some("application/json"));
                assert_eq!(request.body.as_deref(), Some(&b"{\"name\":\"x\"}\n"[..]));
                assert_eq!(consumed, raw.len());
            }
            ParseOutcome::Incomplete => panic!("expected complete parse"),
        }
    }

    #[test]
    fn incomplete_headers_ask_for_more_bytes() {
        let raw = b"GET / HTTP/1.1\r\nHost: x";
        assert!(matches!(try_parse_request(raw, 1024).unwrap(), ParseOutcome::Incomplete));
    }

    #[test]
    fn incomplete_body_asks_for_more_bytes() {
        let raw = b"POST /x HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc";
        assert!(matches!(try_parse_request(raw, 1024).unwrap(), ParseOutcome::Incomplete));
    }

    #[test]
    fn body_over_cap_is_rejected() {
        let raw = b"POST /x HTTP/1.1\r\nContent-Length: 2000\r\n\r\n";
        assert!(try_parse_request(raw, 1024).is_err());
    }

    #[test]
    fn unsupported_method_is_a_protocol_error() {
        let raw = b"TRACE / HTTP/1.1\r\n\r\n";
        assert!(try_parse_request(raw, 1024).is_err());
    }
}
