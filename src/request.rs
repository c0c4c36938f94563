//! Assembles one request: parses the head, builds its [`Environ`],
//! dispatches to the matched mount, and frames its response (§4.E, §4.G).

use std::collections::HashMap;
use std::io::{Read, Write};

use http::Version;

use crate::environ::{EnvironOverlay, EnvironTemplate};
use crate::error::{Error, Result};
use crate::gateway::{Body, ResponseStatus, StartResponse};
use crate::h1::{self, BodyFraming, ChunkedReader, RequestHead};
use crate::mount::MountTable;

/// Outcome of serving one request on a connection (§4.E step 8, §8 P3).
pub struct Outcome {
    /// Whether the connection should be kept open for another request.
    pub keep_alive: bool,
}

/// Serves one already-parsed request head: builds its environ, dispatches
/// it to `mounts`, writes the `100 Continue` interim response if asked
/// for, drains the application's body, and writes the final response.
///
/// `stream` is generic (not `&mut dyn`) so the body reader and the
/// response writer can each independently unsize-coerce the same
/// underlying connection to the narrower trait they need, rather than
/// both needing to borrow one trait object simultaneously.
pub fn serve_one<S: Read + Write>(
    mut head: RequestHead,
    stream: &mut S,
    template: &EnvironTemplate,
    mounts: &MountTable,
    server_token: &str,
    actual_protocol: &'static str,
) -> Result<Outcome> {
    let version = head.version;
    let mut keep_alive = head.keep_alive && version == Version::HTTP_11;

    let matched = mounts.match_path(&head.path);
    let Some((script_name, app)) = matched else {
        write_error_response(&mut *stream, version, keep_alive, server_token, Error::NoMount)?;
        return Ok(Outcome { keep_alive: false });
    };
    let path_info = head.path[script_name.len()..].to_string();

    if head.expect_continue {
        h1::write_head(
            &mut *stream,
            version,
            &ResponseStatus::new(http::StatusCode::CONTINUE, "Continue"),
            &[],
            &[],
        )?;
        stream.flush()?;
    }

    // Chunked bodies are decoded into memory up front (matching the
    // reference server's in-memory chunked buffer) so CONTENT_LENGTH in
    // the environ reflects the decoded length before the application is
    // ever invoked, rather than staying unknown until the body is drained.
    // Any trailer headers are folded into the head's own header list the
    // same way the reference server's decode_chunked folds them into the
    // environment, before HTTP_* variables are derived from it below.
    let chunked_body = if head.chunked {
        let mut chunked = ChunkedReader::new(&mut *stream);
        let mut buf = Vec::new();
        chunked.read_to_end(&mut buf).map_err(Error::Io)?;
        for (name, value) in chunked.take_trailers() {
            h1::merge_header(&mut head.headers, name, value);
        }
        Some(buf)
    } else {
        None
    };
    let content_length = match &chunked_body {
        Some(buf) => Some(buf.len().to_string()),
        None => head.content_length.map(|n| n.to_string()),
    };

    let mut http_headers = HashMap::new();
    for (name, value) in &head.headers {
        if name == "content-length" || name == "transfer-encoding" {
            continue;
        }
        let key = format!("HTTP_{}", name.to_ascii_uppercase().replace('-', "_"));
        http_headers.insert(key, value.clone());
    }

    let remote_user = head.header("authorization").and_then(parse_basic_auth);
    // Set to the scheme token whenever Authorization is present, regardless
    // of whether the credential itself decodes (reference server sets
    // AUTH_TYPE unconditionally to creds[0]).
    let auth_type = head.header("authorization").map(|v| {
        v.split_once(' ')
            .map(|(scheme, _)| scheme)
            .unwrap_or(v)
            .to_string()
    });

    let overlay = EnvironOverlay {
        request_method: head.method.to_string(),
        script_name: script_name.to_string(),
        path_info,
        query_string: head.query.clone(),
        server_protocol: format!("{:?}", version),
        actual_server_protocol: actual_protocol,
        server_software: format!("{} WSGI Server", server_token),
        content_type: head.header("content-type").map(str::to_string),
        content_length,
        http_headers,
        auth_type,
        remote_user,
        absolute_scheme: head.absolute_scheme,
        absolute_authority: head.absolute_authority.clone(),
    };
    let environ = template.overlay(overlay);

    let mut start_response = StartResponse::new();
    let body_iter: Box<dyn Body> = if let Some(buf) = &chunked_body {
        let mut cursor: &[u8] = buf.as_slice();
        app.call(&environ, &mut cursor, &mut start_response)
    } else if let Some(len) = head.content_length {
        let mut limited = (&mut *stream).take(len);
        app.call(&environ, &mut limited, &mut start_response)
    } else {
        let mut empty: &[u8] = &[];
        app.call(&environ, &mut empty, &mut start_response)
    };

    let Some((status, headers)) = start_response.take() else {
        write_error_response(&mut *stream, version, keep_alive, server_token, Error::Application(
            "application returned without calling start_response".into(),
        ))?;
        return Ok(Outcome { keep_alive: false });
    };

    if status.code == http::StatusCode::INTERNAL_SERVER_ERROR {
        keep_alive = false;
    }

    let framing = h1::decide_framing(&headers, version, status.code);
    if framing.forces_close() {
        keep_alive = false;
    }
    let ambient = h1::ambient_headers(&headers, server_token, keep_alive, framing);
    h1::write_head(&mut *stream, version, &status, &headers, &ambient)?;

    write_body(&mut *stream, body_iter, framing)?;
    stream.flush()?;

    Ok(Outcome { keep_alive })
}

fn write_body(out: &mut dyn Write, mut body: Box<dyn Body>, framing: BodyFraming) -> Result<()> {
    match framing {
        BodyFraming::Chunked => {
            for chunk in &mut body {
                let chunk = chunk.map_err(Error::Io)?;
                if !chunk.is_empty() {
                    h1::write_chunk(out, &chunk)?;
                }
            }
            h1::write_chunk(out, &[])?;
        }
        BodyFraming::Sized(_) | BodyFraming::CloseDelimited => {
            for chunk in &mut body {
                let chunk = chunk.map_err(Error::Io)?;
                out.write_all(&chunk).map_err(Error::Io)?;
            }
        }
        BodyFraming::Suppressed => {
            // The status forbids a response body; the application's body
            // iterator, if it yielded anything, is discarded unread.
        }
    }
    Ok(())
}

/// Synthesizes a minimal error response body for failures that occur
/// before (or instead of) dispatching to an application (§4.E step 9,
/// reference server's `simple_response`).
pub fn write_error_response(
    out: &mut dyn Write,
    version: Version,
    keep_alive: bool,
    server_token: &str,
    err: Error,
) -> Result<()> {
    let status: ResponseStatus = err.status_code().into();
    let body = format!("{}\n", status.reason).into_bytes();
    let headers = vec![("Content-Length".to_string(), body.len().to_string())];
    let framing = h1::decide_framing(&headers, version, status.code);
    let keep_alive = keep_alive && !framing.forces_close();
    let ambient = h1::ambient_headers(&headers, server_token, keep_alive, framing);
    h1::write_head(out, version, &status, &headers, &ambient)?;
    out.write_all(&body).map_err(Error::Io)?;
    out.flush().map_err(Error::Io)?;
    Ok(())
}

/// Decodes an HTTP `Basic` credential, returning the user-part before the
/// first `:` (§4.E step 8). Any malformed or non-`Basic` value is silently
/// ignored rather than rejecting the request.
fn parse_basic_auth(value: &str) -> Option<String> {
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = base64::decode(token.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, _password) = decoded.split_once(':')?;
    Some(user.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_extracts_user_before_colon() {
        // "alice:secret" base64-encoded.
        let value = "Basic YWxpY2U6c2VjcmV0";
        assert_eq!(parse_basic_auth(value), Some("alice".to_string()));
    }

    #[test]
    fn non_basic_scheme_is_ignored() {
        assert_eq!(parse_basic_auth("Bearer abc123"), None);
    }

    #[test]
    fn malformed_basic_auth_is_ignored() {
        assert_eq!(parse_basic_auth("Basic not-base64!!"), None);
    }
}
