//! The per-request "environ" dictionary handed to gateway applications
//! (§3 Request, §6 environ table).
//!
//! The reference implementation builds this as a mutable `dict` copied
//! wholesale from a connection-level template for every request (§9
//! "Dynamic environment template"). Here the template/overlay split is
//! expressed as two distinct types so a request's [`Environ`] can never
//! leak connection-template state into another connection by accident:
//! [`EnvironTemplate`] is built once per accepted connection and is
//! `Clone`, and each [`Environ`] is produced by [`EnvironTemplate::overlay`]
//! for exactly one request.

use std::collections::HashMap;

/// Fixed entries derived once per [`crate::connection::Connection`] and
/// copied into every [`Environ`] built on that connection (§3 Connection).
#[derive(Debug, Clone)]
pub struct EnvironTemplate {
    pub url_scheme: &'static str,
    pub server_name: String,
    pub server_port: String,
    pub remote_addr: Option<String>,
    pub remote_port: Option<String>,
    pub tls: Option<TlsEnviron>,
}

/// Certificate-derived entries set when the connection is TLS (§4.A).
#[derive(Debug, Clone, Default)]
pub struct TlsEnviron {
    pub entries: HashMap<String, String>,
}

impl EnvironTemplate {
    pub fn plain(server_name: String, server_port: String) -> Self {
        EnvironTemplate {
            url_scheme: "http",
            server_name,
            server_port,
            remote_addr: None,
            remote_port: None,
            tls: None,
        }
    }

    pub fn with_peer(mut self, addr: String, port: String) -> Self {
        self.remote_addr = Some(addr);
        self.remote_port = Some(port);
        self
    }

    pub fn with_tls(mut self, tls: TlsEnviron) -> Self {
        self.url_scheme = "https";
        self.tls = Some(tls);
        self
    }

    /// Builds the per-request [`Environ`] by overlaying request-derived
    /// fields onto this template (§4.G). An absolute-form request-target's
    /// scheme/authority, when present, overrides the template's own
    /// scheme/`SERVER_NAME` (§4.E step 3).
    pub fn overlay(&self, req: EnvironOverlay) -> Environ {
        let (server_name, server_port) = match &req.absolute_authority {
            Some(authority) => match authority.split_once(':') {
                Some((host, port)) => (host.to_string(), port.to_string()),
                None => (authority.clone(), self.server_port.clone()),
            },
            None => (self.server_name.clone(), self.server_port.clone()),
        };
        Environ {
            request_method: req.request_method,
            script_name: req.script_name,
            path_info: req.path_info,
            query_string: req.query_string,
            server_protocol: req.server_protocol,
            actual_server_protocol: req.actual_server_protocol,
            server_software: req.server_software,
            server_name,
            server_port,
            remote_addr: self.remote_addr.clone(),
            remote_port: self.remote_port.clone(),
            content_type: req.content_type,
            content_length: req.content_length,
            http_headers: req.http_headers,
            auth_type: req.auth_type,
            remote_user: req.remote_user,
            wsgi_version: (1, 0),
            wsgi_url_scheme: req.absolute_scheme.unwrap_or(self.url_scheme),
            wsgi_multithread: true,
            wsgi_multiprocess: false,
            wsgi_run_once: false,
            tls: self.tls.clone(),
        }
    }
}

/// Request-derived fields fed into [`EnvironTemplate::overlay`] by the
/// parser (§4.E/§4.G).
pub struct EnvironOverlay {
    pub request_method: String,
    pub script_name: String,
    pub path_info: String,
    pub query_string: String,
    pub server_protocol: String,
    pub actual_server_protocol: &'static str,
    pub server_software: String,
    pub content_type: Option<String>,
    pub content_length: Option<String>,
    pub http_headers: HashMap<String, String>,
    pub auth_type: Option<String>,
    pub remote_user: Option<String>,
    pub absolute_scheme: Option<&'static str>,
    pub absolute_authority: Option<String>,
}

/// The gateway "environ" for one request/response pair.
#[derive(Debug, Clone)]
pub struct Environ {
    pub request_method: String,
    pub script_name: String,
    pub path_info: String,
    pub query_string: String,
    pub server_protocol: String,
    pub actual_server_protocol: &'static str,
    pub server_software: String,
    pub server_name: String,
    pub server_port: String,
    pub remote_addr: Option<String>,
    pub remote_port: Option<String>,
    pub content_type: Option<String>,
    pub content_length: Option<String>,
    /// `HTTP_*` entries, already canonicalised (`HTTP_ACCEPT_ENCODING`, ...).
    pub http_headers: HashMap<String, String>,
    pub auth_type: Option<String>,
    pub remote_user: Option<String>,
    pub wsgi_version: (u8, u8),
    pub wsgi_url_scheme: &'static str,
    pub wsgi_multithread: bool,
    pub wsgi_multiprocess: bool,
    pub wsgi_run_once: bool,
    pub tls: Option<TlsEnviron>,
}

impl Environ {
    /// Look up an `HTTP_*` header entry by its canonical environ key
    /// (e.g. `"HTTP_ACCEPT_ENCODING"`).
    pub fn header(&self, key: &str) -> Option<&str> {
        self.http_headers.get(key).map(String::as_str)
    }
}
