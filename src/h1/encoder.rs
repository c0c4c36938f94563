//! Response head writer (§4.F).
//!
//! The async teacher's `MessageEncoder` writes into a shared `BytesMut`
//! that the codec later flushes; a blocking connection has a plain
//! `Write` to the socket (or TLS stream) instead, so this writes the
//! status line and headers straight to it with `itoa`/`httpdate` doing
//! the same formatting work the teacher's `helpers` module does.

use std::io::{self, Write};

use http::{StatusCode, Version};

use crate::date;
use crate::gateway::{HeaderField, ResponseStatus};

/// How the response body is framed on the wire, decided once per
/// response from the application's status/headers and the negotiated
/// version (§4.F step 2, §8 P1/P2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// `Content-Length` was supplied by the application; write exactly
    /// that many bytes and stop.
    Sized(u64),
    /// No `Content-Length`, and the status is one of `{200, 203, 206}` on
    /// `HTTP/1.1`: fall back to `Transfer-Encoding: chunked`.
    Chunked,
    /// No `Content-Length` and the status forbids a body (`204`, `205`,
    /// `304`, or any `1xx`): write nothing regardless of what the
    /// application's body iterator yields.
    Suppressed,
    /// No `Content-Length`, and the body cannot be framed any other way
    /// (HTTP/1.0, a `413` response, or any other status with no
    /// `Content-Length`): write the body unframed and close the socket
    /// to signal the end.
    CloseDelimited,
}

impl BodyFraming {
    /// Whether this framing requires the connection to close after the
    /// response regardless of what the request/response otherwise asked
    /// for (§4.F step 2/3).
    pub fn forces_close(&self) -> bool {
        matches!(self, BodyFraming::CloseDelimited)
    }
}

/// Decides [`BodyFraming`] from the application-supplied headers, the
/// response status, and the negotiated version (§4.F step 2). Transfer
/// framing selection by status code only applies to `HTTP/1.1`; `HTTP/1.0`
/// always either carries `Content-Length` or closes.
pub fn decide_framing(headers: &[HeaderField], version: Version, status: StatusCode) -> BodyFraming {
    let content_length = find(headers, "content-length").and_then(|v| v.parse::<u64>().ok());

    if version < Version::HTTP_11 {
        return match content_length {
            Some(len) => BodyFraming::Sized(len),
            None => BodyFraming::CloseDelimited,
        };
    }

    if status.as_u16() == 413 {
        return BodyFraming::CloseDelimited;
    }

    if let Some(len) = content_length {
        return BodyFraming::Sized(len);
    }

    match status.as_u16() {
        200 | 203 | 206 => BodyFraming::Chunked,
        204 | 205 | 304 => BodyFraming::Suppressed,
        code if (100..200).contains(&code) => BodyFraming::Suppressed,
        _ => BodyFraming::CloseDelimited,
    }
}

fn find<'a>(headers: &'a [HeaderField], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Writes the status line and header block (terminating blank line
/// included) to `out`. `extra_headers` carries the ambient headers the
/// driver adds on top of what the application supplied: `Date`, `Server`,
/// `Connection`, and `Transfer-Encoding` when [`BodyFraming::Chunked`] was
/// chosen.
pub fn write_head(
    out: &mut dyn Write,
    version: Version,
    status: &ResponseStatus,
    headers: &[HeaderField],
    extra_headers: &[HeaderField],
) -> io::Result<()> {
    let version_str = match version {
        Version::HTTP_10 => "HTTP/1.0",
        _ => "HTTP/1.1",
    };
    let mut code_buf = itoa::Buffer::new();
    out.write_all(version_str.as_bytes())?;
    out.write_all(b" ")?;
    out.write_all(code_buf.format(status.code.as_u16()).as_bytes())?;
    out.write_all(b" ")?;
    out.write_all(status.reason.as_bytes())?;
    out.write_all(b"\r\n")?;

    for (name, value) in extra_headers.iter().chain(headers.iter()) {
        write_header_line(out, name, value)?;
    }
    out.write_all(b"\r\n")?;
    Ok(())
}

fn write_header_line(out: &mut dyn Write, name: &str, value: &str) -> io::Result<()> {
    out.write_all(name.as_bytes())?;
    out.write_all(b": ")?;
    out.write_all(value.as_bytes())?;
    out.write_all(b"\r\n")
}

/// Builds the ambient headers the driver adds on top of whatever the
/// application already supplied (§4.F steps 3-5): `Connection` if closing
/// and not already set, `Date` and `Server` unless the application set
/// its own, and, for chunked framing, `Transfer-Encoding: chunked`.
pub fn ambient_headers(headers: &[HeaderField], server_token: &str, keep_alive: bool, framing: BodyFraming) -> Vec<HeaderField> {
    let mut extra = Vec::new();
    if !keep_alive && find(headers, "connection").is_none() {
        extra.push(("Connection".to_string(), "close".to_string()));
    } else if keep_alive && find(headers, "connection").is_none() {
        extra.push(("Connection".to_string(), "keep-alive".to_string()));
    }
    if find(headers, "date").is_none() {
        extra.push(("Date".to_string(), date::now()));
    }
    if find(headers, "server").is_none() {
        extra.push(("Server".to_string(), server_token.to_string()));
    }
    if framing == BodyFraming::Chunked {
        extra.push(("Transfer-Encoding".to_string(), "chunked".to_string()));
    }
    extra
}

/// Writes one chunk in `Transfer-Encoding: chunked` framing. An empty
/// `data` writes the terminating `0\r\n\r\n` sequence.
pub fn write_chunk(out: &mut dyn Write, data: &[u8]) -> io::Result<()> {
    write!(out, "{:x}\r\n", data.len())?;
    out.write_all(data)?;
    out.write_all(b"\r\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ResponseStatus;
    use http::StatusCode;

    #[test]
    fn framing_prefers_content_length() {
        let headers = vec![("Content-Length".to_string(), "5".to_string())];
        let framing = decide_framing(&headers, Version::HTTP_11, StatusCode::OK);
        assert_eq!(framing, BodyFraming::Sized(5));
    }

    #[test]
    fn framing_falls_back_to_chunked_for_200_on_11() {
        let framing = decide_framing(&[], Version::HTTP_11, StatusCode::OK);
        assert_eq!(framing, BodyFraming::Chunked);
    }

    #[test]
    fn framing_closes_on_http_10() {
        let framing = decide_framing(&[], Version::HTTP_10, StatusCode::OK);
        assert_eq!(framing, BodyFraming::CloseDelimited);
    }

    #[test]
    fn framing_suppresses_body_for_304() {
        let framing = decide_framing(&[], Version::HTTP_11, StatusCode::NOT_MODIFIED);
        assert_eq!(framing, BodyFraming::Suppressed);
    }

    #[test]
    fn framing_413_forces_close_even_with_content_length() {
        let headers = vec![("Content-Length".to_string(), "5".to_string())];
        let framing = decide_framing(&headers, Version::HTTP_11, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(framing, BodyFraming::CloseDelimited);
    }

    #[test]
    fn framing_other_status_without_content_length_closes() {
        let framing = decide_framing(&[], Version::HTTP_11, StatusCode::CREATED);
        assert_eq!(framing, BodyFraming::CloseDelimited);
    }

    #[test]
    fn ambient_headers_does_not_duplicate_caller_supplied_ones() {
        let headers = vec![("Date".to_string(), "already-set".to_string())];
        let extra = ambient_headers(&headers, "srv/1", true, BodyFraming::Sized(0));
        assert!(!extra.iter().any(|(k, _)| k.eq_ignore_ascii_case("date")));
        assert!(extra.iter().any(|(k, _)| k.eq_ignore_ascii_case("server")));
    }

    #[test]
    fn writes_status_line_and_headers() {
        let mut buf = Vec::new();
        let status = ResponseStatus::new(StatusCode::OK, "OK");
        write_head(
            &mut buf,
            Version::HTTP_11,
            &status,
            &[("X-App".to_string(), "1".to_string())],
            &[("Date".to_string(), "x".to_string())],
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Date: x\r\n"));
        assert!(text.contains("X-App: 1\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn chunk_framing_round_trip() {
        let mut buf = Vec::new();
        write_chunk(&mut buf, b"hello").unwrap();
        write_chunk(&mut buf, b"").unwrap();
        assert_eq!(buf, b"5\r\nhello\r\n0\r\n\r\n");
    }
}
