//! Request-line and header parsing (§4.E steps 1-3).
//!
//! Wraps `httparse` the way the async teacher's `MessageType::decode`
//! wraps its own hand-rolled scanner: parse once into borrowed slices,
//! then walk the header list exactly once to build the few derived
//! fields the driver needs (`Content-Length`, `Transfer-Encoding`,
//! `Connection`, `Expect`), rather than re-scanning per field. Header
//! joining for repeated fields follows the reference server's
//! `comma_separated_headers` allow-list (`set_headers`/`environ` update):
//! everything in that list is comma-joined in arrival order, anything
//! else is last-value-wins.

use http::{Method, Version};

use crate::error::{Error, Result};

pub const MAX_HEADERS: usize = 96;
pub const MAX_HEAD_SIZE: usize = 131_072;

/// Headers for which repeated occurrences are combined with `", "` rather
/// than the last one winning (RFC 7230 §3.2.2 list-valued fields, as
/// enumerated by the reference server).
const COMMA_SEPARATED_HEADERS: &[&str] = &[
    "accept",
    "accept-charset",
    "accept-encoding",
    "accept-language",
    "accept-ranges",
    "allow",
    "cache-control",
    "connection",
    "content-encoding",
    "content-language",
    "expect",
    "if-match",
    "if-none-match",
    "pragma",
    "proxy-authenticate",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "vary",
    "via",
    "warning",
    "www-authenticate",
];

fn is_comma_joinable(name: &str) -> bool {
    COMMA_SEPARATED_HEADERS.contains(&name)
}

/// Folds one header field into `headers`, applying the same rule used for
/// the initial head parse: comma-joinable names accumulate, anything else
/// is last-value-wins. Shared with trailer-header folding (§4.E step 12),
/// since the reference server folds trailers into the environment through
/// the very same `parse_headers` routine it uses for the head.
pub(crate) fn merge_header(headers: &mut Vec<(String, String)>, name: String, value: String) {
    if is_comma_joinable(&name) {
        if let Some(existing) = headers.iter_mut().find(|(k, _)| *k == name) {
            existing.1.push_str(", ");
            existing.1.push_str(&value);
            return;
        }
        headers.push((name, value));
        return;
    }
    if let Some(existing) = headers.iter_mut().find(|(k, _)| *k == name) {
        existing.1 = value;
    } else {
        headers.push((name, value));
    }
}

/// A parsed request head: request line plus header fields, with the
/// framing-relevant fields the driver needs already extracted.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub raw_target: String,
    pub path: String,
    pub query: String,
    pub version: Version,
    /// Header fields in arrival order, names lower-cased; comma-joinable
    /// repeats already merged per [`COMMA_SEPARATED_HEADERS`].
    pub headers: Vec<(String, String)>,
    pub content_length: Option<u64>,
    pub chunked: bool,
    pub keep_alive: bool,
    pub expect_continue: bool,
    /// Scheme/authority carried by an absolute-form request-target
    /// (`GET http://host/path HTTP/1.1`, as a forward proxy would send),
    /// to be propagated into the environment in place of the connection's
    /// own scheme/`SERVER_NAME` (§4.E step 3).
    pub absolute_scheme: Option<&'static str>,
    pub absolute_authority: Option<String>,
}

impl RequestHead {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Attempts to parse a complete request head out of `buf`.
///
/// Returns `Ok(None)` if `buf` does not yet contain a full head (the
/// caller should read more and retry), `Ok(Some((head, consumed)))` on
/// success, or `Err` for a malformed head. `buf` growing past
/// [`MAX_HEAD_SIZE`] without completing a head is the caller's
/// responsibility to reject (§7 `TooLarge`).
pub fn parse_request_head(buf: &[u8]) -> Result<Option<(RequestHead, usize)>> {
    // httparse itself only recognises HTTP/1.x (it hard-codes the major
    // digit), so a differing major version never reaches it as a version
    // number: check the request line's own version token first, before
    // httparse gets a chance to report it as a generic parse error, so a
    // `HTTP/2.0` request-line is answered `505` rather than `400` (§4.E
    // step 6, §7).
    if let Some(line_end) = request_line_end(buf) {
        if let Some(major) = major_version_of_request_line(&buf[..line_end]) {
            if major != 1 {
                return Err(Error::VersionMismatch);
            }
        }
    }

    let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut header_storage);

    let status = req.parse(buf).map_err(Error::from)?;
    let consumed = match status {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => {
            if buf.len() > MAX_HEAD_SIZE {
                return Err(Error::TooLarge);
            }
            return Ok(None);
        }
    };

    let method = req
        .method
        .ok_or(Error::Method)?
        .parse::<Method>()
        .map_err(|_| Error::Method)?;

    let raw_target = req.path.ok_or(Error::Header)?.to_string();
    if raw_target.contains('#') {
        return Err(Error::UriFragment);
    }
    let (absolute_scheme, absolute_authority, target) = split_absolute_form(&raw_target)?;
    let (raw_path, query) = split_target(&target);
    let path = decode_path_preserving_slash(&raw_path);

    let version = match req.version.ok_or(Error::Version)? {
        0 => Version::HTTP_10,
        1 => Version::HTTP_11,
        _ => return Err(Error::Version),
    };

    let mut headers: Vec<(String, String)> = Vec::with_capacity(req.headers.len());
    for h in req.headers.iter() {
        let name = h.name.to_ascii_lowercase();
        let value = std::str::from_utf8(h.value)
            .map_err(Error::from)?
            .trim()
            .to_string();
        merge_header(&mut headers, name, value);
    }

    let content_length = match find_header(&headers, "content-length") {
        Some(v) => Some(v.parse::<u64>().map_err(|_| Error::Header)?),
        None => None,
    };

    let chunked = match find_header(&headers, "transfer-encoding") {
        Some(v) => {
            if v.eq_ignore_ascii_case("chunked") {
                true
            } else {
                return Err(Error::UnsupportedTransferEncoding);
            }
        }
        None => false,
    };

    if chunked && content_length.is_some() {
        // RFC 7230 §3.3.3 step 3: a request carrying both must be rejected.
        return Err(Error::Header);
    }

    if !chunked
        && content_length.is_none()
        && matches!(method, Method::POST | Method::PUT)
    {
        return Err(Error::LengthRequired);
    }

    let keep_alive = match find_header(&headers, "connection") {
        Some(v) => !v.to_ascii_lowercase().split(',').any(|tok| tok.trim() == "close"),
        None => version == Version::HTTP_11,
    };

    let expect_continue = match find_header(&headers, "expect") {
        Some(v) => v.eq_ignore_ascii_case("100-continue"),
        None => false,
    };

    Ok(Some((
        RequestHead {
            method,
            raw_target,
            path,
            query,
            version,
            headers,
            content_length,
            chunked,
            keep_alive,
            expect_continue,
            absolute_scheme,
            absolute_authority,
        },
        consumed,
    )))
}

/// Recognises an absolute-form request-target (`http://host/path`) and
/// splits it into its scheme, authority, and `path?query` remainder;
/// anything else (origin-form, `*`, or `CONNECT`'s authority-form) passes
/// through unchanged (§4.E step 3).
fn split_absolute_form(raw: &str) -> Result<(Option<&'static str>, Option<String>, String)> {
    let lower = raw.to_ascii_lowercase();
    let scheme = if lower.starts_with("http://") {
        "http"
    } else if lower.starts_with("https://") {
        "https"
    } else {
        return Ok((None, None, raw.to_string()));
    };

    let uri: http::Uri = raw.parse().map_err(Error::Uri)?;
    let authority = uri.authority().map(|a| a.to_string());
    let rest = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    Ok((Some(scheme), authority, rest))
}

/// Finds the byte offset where the request line's terminator starts
/// (`\r\n`, or a bare `\n` if a peer omits the CR), or `None` if the
/// buffer does not yet contain a complete line.
fn request_line_end(buf: &[u8]) -> Option<usize> {
    buf.windows(2)
        .position(|w| w == b"\r\n")
        .or_else(|| buf.iter().position(|&b| b == b'\n'))
}

/// Reads the major version digit out of a request line's trailing
/// `HTTP/major.minor` token, without assuming (as `httparse` does) that
/// the major version is always `1`.
fn major_version_of_request_line(line: &[u8]) -> Option<u8> {
    let text = std::str::from_utf8(line).ok()?;
    let token = text.rsplit(' ').next()?;
    let rest = token.strip_prefix("HTTP/").or_else(|| token.strip_prefix("http/"))?;
    let (major, _minor) = rest.split_once('.')?;
    major.parse::<u8>().ok()
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn split_target(raw: &str) -> (String, String) {
    match raw.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (raw.to_string(), String::new()),
    }
}

/// Percent-decodes a request path, except for the literal sequence `%2F`,
/// which must survive routing as a real slash inside a path segment would
/// otherwise terminate a mount prefix early.
fn decode_path_preserving_slash(raw: &str) -> String {
    raw.split("%2F")
        .map(|atom| percent_encoding::percent_decode_str(atom).decode_utf8_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("%2F")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_get() {
        let buf = b"GET /foo?bar=1 HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (head, consumed) = parse_request_head(buf).unwrap().unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(head.method, Method::GET);
        assert_eq!(head.path, "/foo");
        assert_eq!(head.query, "bar=1");
        assert_eq!(head.version, Version::HTTP_11);
        assert!(head.keep_alive);
    }

    #[test]
    fn partial_head_returns_none() {
        let buf = b"GET /foo HTTP/1.1\r\nHost: exa";
        assert!(parse_request_head(buf).unwrap().is_none());
    }

    #[test]
    fn http_10_defaults_to_close() {
        let buf = b"GET / HTTP/1.0\r\n\r\n";
        let (head, _) = parse_request_head(buf).unwrap().unwrap();
        assert!(!head.keep_alive);
    }

    #[test]
    fn connection_keep_alive_on_http_10() {
        let buf = b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n";
        let (head, _) = parse_request_head(buf).unwrap().unwrap();
        assert!(head.keep_alive);
    }

    #[test]
    fn repeated_accept_headers_are_comma_joined() {
        let buf = b"GET / HTTP/1.1\r\nAccept: text/html\r\nAccept: application/json\r\n\r\n";
        let (head, _) = parse_request_head(buf).unwrap().unwrap();
        assert_eq!(head.header("accept"), Some("text/html, application/json"));
    }

    #[test]
    fn repeated_host_header_last_wins() {
        let buf = b"GET / HTTP/1.1\r\nHost: a.example\r\nHost: b.example\r\n\r\n";
        let (head, _) = parse_request_head(buf).unwrap().unwrap();
        assert_eq!(head.header("host"), Some("b.example"));
    }

    #[test]
    fn fragment_in_request_target_is_rejected() {
        let buf = b"GET /foo#bar HTTP/1.1\r\n\r\n";
        assert!(matches!(
            parse_request_head(buf).unwrap_err(),
            Error::UriFragment
        ));
    }

    #[test]
    fn chunked_and_content_length_together_is_rejected() {
        let buf = b"POST / HTTP/1.1\r\nContent-Length: 5\r\nTransfer-Encoding: chunked\r\n\r\n";
        assert!(parse_request_head(buf).is_err());
    }

    #[test]
    fn expect_100_continue_detected() {
        let buf = b"POST / HTTP/1.1\r\nContent-Length: 5\r\nExpect: 100-continue\r\n\r\n";
        let (head, _) = parse_request_head(buf).unwrap().unwrap();
        assert!(head.expect_continue);
    }

    #[test]
    fn post_without_length_or_chunking_is_length_required() {
        let buf = b"POST / HTTP/1.1\r\n\r\n";
        assert!(matches!(
            parse_request_head(buf).unwrap_err(),
            Error::LengthRequired
        ));
    }

    #[test]
    fn path_is_percent_decoded_except_encoded_slash() {
        let buf = b"GET /a%2Fb/c%20d HTTP/1.1\r\n\r\n";
        let (head, _) = parse_request_head(buf).unwrap().unwrap();
        assert_eq!(head.path, "/a%2Fb/c d");
    }

    #[test]
    fn absolute_form_target_extracts_scheme_and_authority() {
        let buf = b"GET http://example.com:8080/a?b=1 HTTP/1.1\r\n\r\n";
        let (head, _) = parse_request_head(buf).unwrap().unwrap();
        assert_eq!(head.absolute_scheme, Some("http"));
        assert_eq!(head.absolute_authority.as_deref(), Some("example.com:8080"));
        assert_eq!(head.path, "/a");
        assert_eq!(head.query, "b=1");
    }

    #[test]
    fn origin_form_target_has_no_absolute_parts() {
        let buf = b"GET /a HTTP/1.1\r\n\r\n";
        let (head, _) = parse_request_head(buf).unwrap().unwrap();
        assert!(head.absolute_scheme.is_none());
        assert!(head.absolute_authority.is_none());
    }

    #[test]
    fn differing_major_version_is_version_mismatch() {
        let buf = b"GET / HTTP/2.0\r\n\r\n";
        assert!(matches!(
            parse_request_head(buf).unwrap_err(),
            Error::VersionMismatch
        ));
    }

    #[test]
    fn same_major_different_minor_is_not_a_mismatch() {
        let buf = b"GET / HTTP/1.0\r\n\r\n";
        assert!(parse_request_head(buf).unwrap().is_some());
    }

    #[test]
    fn malformed_request_line_without_a_version_token_is_not_a_mismatch() {
        let buf = b"NOT A REQUEST\r\n\r\n";
        assert!(!matches!(
            parse_request_head(buf).unwrap_err(),
            Error::VersionMismatch
        ));
    }

    #[test]
    fn merge_header_overwrites_non_comma_joinable_duplicates() {
        let mut headers = Vec::new();
        merge_header(&mut headers, "host".to_string(), "a.example".to_string());
        merge_header(&mut headers, "host".to_string(), "b.example".to_string());
        assert_eq!(headers, vec![("host".to_string(), "b.example".to_string())]);
    }

    #[test]
    fn merge_header_joins_comma_separated_duplicates() {
        let mut headers = Vec::new();
        merge_header(&mut headers, "accept".to_string(), "text/html".to_string());
        merge_header(&mut headers, "accept".to_string(), "application/json".to_string());
        assert_eq!(
            headers,
            vec![("accept".to_string(), "text/html, application/json".to_string())]
        );
    }
}
