//! Runtime configuration surface for [`crate::server::ServerBuilder`].
//!
//! Loading configuration from a file or CLI flags is explicitly out of
//! scope for this crate (that belongs to the surrounding framework); the
//! `from_env` constructor is the minimal ambient escape hatch for running
//! the example binary without hard-coding a bind address.

use std::env;
use std::time::Duration;

/// Where to bind the listening socket.
#[derive(Debug, Clone)]
pub enum BindAddr {
    /// A TCP `(host, port)` pair. An empty host means "bind all interfaces".
    Tcp { host: String, port: u16 },
    /// A filesystem path for a UNIX domain socket.
    Unix(String),
}

impl Default for BindAddr {
    fn default() -> Self {
        BindAddr::Tcp {
            host: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

/// Optional TLS material. When both paths are set the listener wraps
/// accepted sockets in TLS (§4.A).
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub certificate_path: Option<String>,
    pub private_key_path: Option<String>,
}

impl TlsConfig {
    pub fn is_enabled(&self) -> bool {
        self.certificate_path.is_some() && self.private_key_path.is_some()
    }
}

/// Server construction parameters (§6 "Construction parameters").
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: BindAddr,
    pub worker_count: usize,
    pub server_name: Option<String>,
    pub max_queued_requests: Option<usize>,
    pub listen_backlog: i32,
    pub accept_timeout: Duration,
    pub connection_timeout: Duration,
    pub protocol: &'static str,
    pub server_token: String,
    pub tls: TlsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: BindAddr::default(),
            worker_count: 10,
            server_name: None,
            max_queued_requests: None,
            listen_backlog: 5,
            accept_timeout: Duration::from_secs(1),
            connection_timeout: Duration::from_secs(10),
            protocol: "HTTP/1.1",
            server_token: "gateway-http/0.1.0".into(),
            tls: TlsConfig::default(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, host: impl Into<String>, port: u16) -> Self {
        self.bind_addr = BindAddr::Tcp {
            host: host.into(),
            port,
        };
        self
    }

    pub fn bind_unix(mut self, path: impl Into<String>) -> Self {
        self.bind_addr = BindAddr::Unix(path.into());
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.worker_count = n.max(1);
        self
    }

    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub fn max_queued_requests(mut self, max: Option<usize>) -> Self {
        self.max_queued_requests = max;
        self
    }

    pub fn listen_backlog(mut self, backlog: i32) -> Self {
        self.listen_backlog = backlog;
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn server_token(mut self, token: impl Into<String>) -> Self {
        self.server_token = token.into();
        self
    }

    pub fn tls(mut self, certificate_path: impl Into<String>, private_key_path: impl Into<String>) -> Self {
        self.tls = TlsConfig {
            certificate_path: Some(certificate_path.into()),
            private_key_path: Some(private_key_path.into()),
        };
        self
    }

    /// Reads `GATEWAY_HTTP_HOST`, `GATEWAY_HTTP_PORT` and
    /// `GATEWAY_HTTP_WORKERS` from the environment, falling back to
    /// [`Config::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();
        if let Ok(host) = env::var("GATEWAY_HTTP_HOST") {
            if let BindAddr::Tcp { port, .. } = cfg.bind_addr {
                cfg.bind_addr = BindAddr::Tcp { host, port };
            }
        }
        if let Ok(port) = env::var("GATEWAY_HTTP_PORT") {
            if let Ok(port) = port.parse() {
                if let BindAddr::Tcp { host, .. } = cfg.bind_addr {
                    cfg.bind_addr = BindAddr::Tcp { host, port };
                }
            }
        }
        if let Ok(workers) = env::var("GATEWAY_HTTP_WORKERS") {
            if let Ok(workers) = workers.parse() {
                cfg.worker_count = workers;
            }
        }
        cfg
    }
}
