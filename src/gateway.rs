//! The gateway application contract (§3 "Application", §4.G) and the
//! connection driver's dispatch step built on top of it.
//!
//! This is the Rust re-expression of the reference server's WSGI
//! `application(environ, start_response)` callable: a boxed trait object
//! instead of a Python callable, an iterator of byte chunks instead of an
//! iterable of `bytes`, and a `StartResponse` value instead of a closure
//! threaded through by convention.

use std::io;
use std::io::Read;

use bytes::Bytes;
use http::StatusCode;

use crate::environ::Environ;
use crate::error::{Error, Result};

/// A streamed response body: an iterator yielding chunks as they become
/// available. Chunks are [`Bytes`] rather than `Vec<u8>` so an application
/// that holds a buffer behind an `Arc` (a cached asset, a shared template
/// render) can hand out chunks without copying it per response. Blanket-
/// implemented for any matching iterator so application authors can return
/// `vec![...].into_iter()`, a generator-like custom iterator, or
/// `std::iter::empty()` for a bodiless response.
pub trait Body: Iterator<Item = io::Result<Bytes>> + Send {}

impl<T> Body for T where T: Iterator<Item = io::Result<Bytes>> + Send {}

/// One response header field, in emission order (§4.F, §6).
pub type HeaderField = (String, String);

/// The value an application passes to [`StartResponse::call`]: a status
/// line's numeric code plus its reason phrase, kept distinct from
/// `http::StatusCode` so nonstandard reason phrases survive unchanged.
#[derive(Debug, Clone)]
pub struct ResponseStatus {
    pub code: StatusCode,
    pub reason: String,
}

impl ResponseStatus {
    pub fn new(code: StatusCode, reason: impl Into<String>) -> Self {
        ResponseStatus {
            code,
            reason: reason.into(),
        }
    }
}

impl From<StatusCode> for ResponseStatus {
    fn from(code: StatusCode) -> Self {
        let reason = code.canonical_reason().unwrap_or("").to_string();
        ResponseStatus { code, reason }
    }
}

/// The `start_response(status, response_headers, exc_info=None)` contract
/// (§3, §4.G). An application must call [`StartResponse::call`] exactly
/// once before yielding its first nonempty body chunk; a second call
/// without `exc_info` set is a protocol error (§7 `ResponseAlreadyStarted`).
#[derive(Default)]
pub struct StartResponse {
    started: Option<(ResponseStatus, Vec<HeaderField>)>,
}

impl StartResponse {
    pub fn new() -> Self {
        StartResponse { started: None }
    }

    /// Records the status and headers an application chose. `exc_info`
    /// mirrors the WSGI convention: pass `true` to permit overwriting an
    /// already-started response (e.g. the application caught an error
    /// after having begun one response and wants to replace it, as long
    /// as the driver has not yet written any bytes to the wire).
    pub fn call(
        &mut self,
        status: impl Into<ResponseStatus>,
        headers: Vec<HeaderField>,
        exc_info: bool,
    ) -> Result<()> {
        if self.started.is_some() && !exc_info {
            return Err(Error::ResponseAlreadyStarted);
        }
        self.started = Some((status.into(), headers));
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.is_some()
    }

    /// Consumes the recorded `(status, headers)`, if any.
    pub fn take(&mut self) -> Option<(ResponseStatus, Vec<HeaderField>)> {
        self.started.take()
    }
}

/// A gateway application: the unit of routing in a [`crate::mount::MountTable`].
///
/// `input` streams the request body (already de-chunked by the driver);
/// reading past `Content-Length`/the final chunk yields EOF. The returned
/// [`Body`] is drained by the driver after `start_response` has been
/// called at least once; an application that returns a nonempty body
/// without having called `start_response` is a driver-reported protocol
/// error, matching the reference server's handling of a WSGI app that
/// skips `start_response`.
pub trait GatewayApp: Send + Sync {
    fn call(
        &self,
        environ: &Environ,
        input: &mut dyn Read,
        start_response: &mut StartResponse,
    ) -> Box<dyn Body>;
}

/// Wraps a plain closure as a [`GatewayApp`], for small applications and
/// tests that do not need a named type.
pub struct FnApp<F>(pub F)
where
    F: Fn(&Environ, &mut dyn Read, &mut StartResponse) -> Box<dyn Body> + Send + Sync;

impl<F> GatewayApp for FnApp<F>
where
    F: Fn(&Environ, &mut dyn Read, &mut StartResponse) -> Box<dyn Body> + Send + Sync,
{
    fn call(
        &self,
        environ: &Environ,
        input: &mut dyn Read,
        start_response: &mut StartResponse,
    ) -> Box<dyn Body> {
        (self.0)(environ, input, start_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn environ() -> Environ {
        Environ {
            request_method: "GET".into(),
            script_name: String::new(),
            path_info: "/".into(),
            query_string: String::new(),
            server_protocol: "HTTP/1.1".into(),
            actual_server_protocol: "HTTP/1.1",
            server_software: "gateway-http/0.1.0".into(),
            server_name: "localhost".into(),
            server_port: "8080".into(),
            remote_addr: None,
            remote_port: None,
            content_type: None,
            content_length: None,
            http_headers: HashMap::new(),
            auth_type: None,
            remote_user: None,
            wsgi_version: (1, 0),
            wsgi_url_scheme: "http",
            wsgi_multithread: true,
            wsgi_multiprocess: false,
            wsgi_run_once: false,
            tls: None,
        }
    }

    #[test]
    fn second_start_response_without_exc_info_errors() {
        let mut sr = StartResponse::new();
        sr.call(StatusCode::OK, vec![], false).unwrap();
        let err = sr.call(StatusCode::NOT_FOUND, vec![], false).unwrap_err();
        assert!(matches!(err, Error::ResponseAlreadyStarted));
    }

    #[test]
    fn exc_info_permits_overwrite() {
        let mut sr = StartResponse::new();
        sr.call(StatusCode::OK, vec![], false).unwrap();
        sr.call(StatusCode::INTERNAL_SERVER_ERROR, vec![], true)
            .unwrap();
        let (status, _) = sr.take().unwrap();
        assert_eq!(status.code, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn fn_app_invokes_closure() {
        let app = FnApp(|_env, _input, start_response: &mut StartResponse| {
            start_response.call(StatusCode::OK, vec![], false).unwrap();
            Box::new(std::iter::once(Ok(Bytes::from_static(b"hi")))) as Box<dyn Body>
        });
        let mut sr = StartResponse::new();
        let env = environ();
        let mut empty: &[u8] = b"";
        let mut body = app.call(&env, &mut empty, &mut sr);
        assert_eq!(body.next().unwrap().unwrap(), Bytes::from_static(b"hi"));
        assert!(sr.is_started());
    }
}
