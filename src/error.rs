//! Error and Result module.

use std::{error::Error as StdError, io};

use derive_more::{Display, Error, From};
use http::StatusCode;

/// Errors that can occur while parsing a request, writing a response, or
/// operating the listener/worker machinery.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// An invalid request `Method`, such as `GE.T`.
    #[display(fmt = "invalid method")]
    Method,

    /// An invalid request-URI.
    #[display(fmt = "uri error: {}", _0)]
    Uri(http::uri::InvalidUri),

    /// A fragment was present in the Request-URI.
    #[display(fmt = "illegal #fragment in Request-URI")]
    UriFragment,

    /// An invalid HTTP version token, such as `HTP/1.1`.
    #[display(fmt = "invalid http version specified")]
    Version,

    /// The request's major HTTP version differs from the server's.
    #[display(fmt = "http version not supported")]
    VersionMismatch,

    /// An invalid header line.
    #[display(fmt = "invalid header provided")]
    Header,

    /// A message head is too large to be reasonable.
    #[display(fmt = "message head is too large")]
    TooLarge,

    /// A chunked-encoding framing error (bad chunk size line, missing CRLF).
    #[display(fmt = "bad chunked transfer coding: {}", _0)]
    Chunked(String),

    /// `Transfer-Encoding` named a coding other than `chunked`.
    #[display(fmt = "unsupported transfer-encoding")]
    UnsupportedTransferEncoding,

    /// `POST`/`PUT` without `Content-Length` and not chunked.
    #[display(fmt = "length required")]
    LengthRequired,

    /// No mount point matched the request path.
    #[display(fmt = "not found")]
    NoMount,

    /// A `start_response` contract violation: called twice without `exc_info`.
    #[display(fmt = "start_response called a second time without exc_info")]
    ResponseAlreadyStarted,

    /// The gateway application itself raised/returned an error.
    #[display(fmt = "application error: {}", _0)]
    Application(String),

    /// The client disappeared mid-handshake or mid-request; soft-fail.
    #[display(fmt = "client gone")]
    ClientGone,

    /// A TLS-layer failure that is not in the "client gone" allow-list.
    #[display(fmt = "tls error: {}", _0)]
    Tls(String),

    /// A timeout occurred waiting for an I/O event (TLS handshake retry, etc).
    #[display(fmt = "timed out")]
    Timeout,

    /// An `io::Error` that occurred while trying to read or write to a
    /// network stream.
    #[display(fmt = "io error: {}", _0)]
    Io(io::Error),

    /// Parsing a field as UTF-8 failed.
    #[display(fmt = "utf8 error: {}", _0)]
    Utf8(std::str::Utf8Error),
}

impl From<httparse::Error> for Error {
    fn from(err: httparse::Error) -> Error {
        match err {
            httparse::Error::HeaderName
            | httparse::Error::HeaderValue
            | httparse::Error::NewLine
            | httparse::Error::Token => Error::Header,
            httparse::Error::Status => Error::Version,
            httparse::Error::TooManyHeaders => Error::TooLarge,
            _ => Error::Header,
        }
    }
}

impl Error {
    /// The HTTP status this error should be reported to the client as, for
    /// the errors that are ever surfaced to a client (parse-time errors).
    /// Transport-level and application-level errors have no single status
    /// and are handled by the connection driver instead.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::UriFragment
            | Error::Method
            | Error::Uri(_)
            | Error::Version
            | Error::Header
            | Error::TooLarge
            | Error::Chunked(_)
            | Error::Utf8(_) => StatusCode::BAD_REQUEST,
            Error::VersionMismatch => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            Error::UnsupportedTransferEncoding => StatusCode::NOT_IMPLEMENTED,
            Error::LengthRequired => StatusCode::LENGTH_REQUIRED,
            Error::NoMount => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for the portable "client gone" allow-list (§7): these never
    /// propagate past the connection driver, they just close the connection.
    pub fn is_client_gone(&self) -> bool {
        match self {
            Error::ClientGone | Error::Timeout => true,
            Error::Io(e) => is_client_gone_io_error(e),
            _ => false,
        }
    }
}

/// Classifies a raw `io::Error` against the platform "client gone" allow-list:
/// broken pipe, reset, unreachable, timed out. Falls back to string matching
/// on `"timed out"` only when no portable `ErrorKind` applies, mirroring the
/// reference implementation's `socket_errors_to_ignore` list without relying
/// on raw OS errno comparisons everywhere.
pub fn is_client_gone_io_error(err: &io::Error) -> bool {
    use io::ErrorKind::*;
    match err.kind() {
        BrokenPipe | ConnectionReset | ConnectionRefused | ConnectionAborted
        | TimedOut | HostUnreachable | NetworkUnreachable | UnexpectedEof
        | WouldBlock => true,
        _ => err.to_string().contains("timed out"),
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

fn _assert_send_sync() {
    fn assert<T: StdError + Send + Sync>() {}
    assert::<Error>();
}
