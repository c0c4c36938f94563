//! Server construction and lifecycle control (§3 Server, §4.H).
//!
//! `ServerBuilder` mirrors the async teacher's builder/`Server` handle
//! split: construction-time state (mounts, config) lives on the builder,
//! and `start()` hands back a cheap, cloneable [`Server`] handle the
//! caller uses to request a stop while the acceptor and worker threads
//! run in the background. Stopping mirrors the reference server's
//! `stop()`: flip a flag, then touch the listening socket so a blocked
//! `accept()` wakes up immediately instead of waiting out its next
//! client.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use http::StatusCode;
use log::{debug, info, warn};

use crate::config::{BindAddr, Config};
use crate::connection::{Connection, Transport};
use crate::environ::{Environ, EnvironTemplate};
use crate::error::Error;
use crate::gateway::{Body, GatewayApp, StartResponse};
use crate::listener::{Accepted, Listener};
use crate::mount::MountTable;
use crate::queue::{self, QueueSender};
use crate::worker::WorkerPool;

#[cfg(feature = "openssl-tls")]
use crate::tls::{self, TlsStream};

/// Builds a [`Server`] from a [`Config`] and a routing table.
pub struct ServerBuilder {
    config: Config,
    mounts: MountTable,
}

impl ServerBuilder {
    pub fn new(config: Config) -> Self {
        ServerBuilder {
            config,
            mounts: MountTable::single(Arc::new(NotFoundApp) as Arc<dyn GatewayApp>),
        }
    }

    /// Mounts a single application at the root (the common case).
    pub fn app(mut self, app: Arc<dyn GatewayApp>) -> Self {
        self.mounts = MountTable::single(app);
        self
    }

    /// Mounts several applications by path prefix (§4.E step 5).
    pub fn mounts(mut self, mounts: Vec<(String, Arc<dyn GatewayApp>)>) -> Self {
        self.mounts = MountTable::new(mounts);
        self
    }

    /// Binds the listening socket, spawns the worker pool and the
    /// acceptor thread, and returns a handle to control them.
    pub fn start(self) -> Result<Server, Error> {
        let listener = Arc::new(Listener::bind(&self.config)?);
        let tls_acceptor = build_tls_acceptor(&self.config)?;

        let server_name = self
            .config
            .server_name
            .clone()
            .unwrap_or_else(|| "localhost".to_string());
        let server_port = match &self.config.bind_addr {
            BindAddr::Tcp { port, .. } => port.to_string(),
            BindAddr::Unix(_) => String::new(),
        };
        let mut template = EnvironTemplate::plain(server_name, server_port);
        #[cfg(feature = "openssl-tls")]
        if let (Some(cert), true) = (&self.config.tls.certificate_path, self.config.tls.is_enabled()) {
            let tls_environ = TlsStream::server_environ(cert)?;
            template = template.with_tls(tls_environ);
        }

        let (sender, receiver) = queue::bounded(self.config.max_queued_requests);
        let mounts = Arc::new(self.mounts);
        let config = Arc::new(self.config);
        let workers = WorkerPool::spawn(config.worker_count, receiver, mounts, Arc::clone(&config));

        let running = Arc::new(AtomicBool::new(true));
        let acceptor_handle = {
            let listener = Arc::clone(&listener);
            let sender = sender.clone();
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("gateway-acceptor".into())
                .spawn(move || accept_loop(&listener, &sender, &running, template, tls_acceptor))
                .expect("failed to spawn acceptor thread")
        };

        Ok(Server {
            inner: Arc::new(ServerInner {
                listener,
                sender,
                running,
                worker_count: config.worker_count,
                acceptor_handle: Mutex::new(Some(acceptor_handle)),
                workers: Mutex::new(Some(workers)),
            }),
        })
    }
}

#[cfg(feature = "openssl-tls")]
fn build_tls_acceptor(config: &Config) -> Result<Option<openssl::ssl::SslAcceptor>, Error> {
    if !config.tls.is_enabled() {
        return Ok(None);
    }
    let cert = config.tls.certificate_path.as_deref().unwrap();
    let key = config.tls.private_key_path.as_deref().unwrap();
    Ok(Some(tls::build_acceptor(cert, key)?))
}

#[cfg(not(feature = "openssl-tls"))]
fn build_tls_acceptor(_config: &Config) -> Result<Option<()>, Error> {
    Ok(None)
}

#[cfg(feature = "openssl-tls")]
type TlsAcceptorHandle = Option<openssl::ssl::SslAcceptor>;
#[cfg(not(feature = "openssl-tls"))]
type TlsAcceptorHandle = Option<()>;

fn accept_loop(
    listener: &Listener,
    sender: &QueueSender,
    running: &AtomicBool,
    template: EnvironTemplate,
    tls_acceptor: TlsAcceptorHandle,
) {
    info!("accepting connections");
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok(accepted) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                match build_connection(accepted, &template, &tls_acceptor) {
                    Ok(conn) => {
                        if sender.send(conn).is_err() {
                            warn!("request queue closed; dropping connection");
                        }
                    }
                    Err(e) => warn!("failed to prepare accepted connection: {}", e),
                }
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    debug!("accept error: {}", e);
                }
            }
        }
    }
    debug!("acceptor loop exiting");
}

fn build_connection(
    accepted: Accepted,
    template: &EnvironTemplate,
    tls_acceptor: &TlsAcceptorHandle,
) -> Result<Connection, Error> {
    match accepted {
        Accepted::Tcp(sock, addr) => {
            let peer = addr.to_string();
            let template = template
                .clone()
                .with_peer(addr.ip().to_string(), addr.port().to_string());
            let transport = wrap_tls(sock, tls_acceptor)?;
            Ok(Connection::new(transport, template, peer))
        }
        #[cfg(unix)]
        Accepted::Unix(sock) => Ok(Connection::new(Transport::Unix(sock), template.clone(), "unix".to_string())),
    }
}

#[cfg(feature = "openssl-tls")]
fn wrap_tls(sock: std::net::TcpStream, tls_acceptor: &TlsAcceptorHandle) -> Result<Transport, Error> {
    match tls_acceptor {
        Some(acceptor) => Ok(Transport::Tls(TlsStream::accept(acceptor, sock)?)),
        None => Ok(Transport::Tcp(sock)),
    }
}

#[cfg(not(feature = "openssl-tls"))]
fn wrap_tls(sock: std::net::TcpStream, _tls_acceptor: &TlsAcceptorHandle) -> Result<Transport, Error> {
    Ok(Transport::Tcp(sock))
}

struct ServerInner {
    listener: Arc<Listener>,
    sender: QueueSender,
    running: Arc<AtomicBool>,
    worker_count: usize,
    acceptor_handle: Mutex<Option<JoinHandle<()>>>,
    workers: Mutex<Option<WorkerPool>>,
}

/// A cheap, cloneable handle to a running server (§4.H).
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    /// Stops accepting new connections and waits for in-flight requests
    /// to finish (the worker pool drains its queue before its threads
    /// exit); already-open keep-alive connections are allowed to finish
    /// their current request before their worker notices the shutdown
    /// sentinel on its next queue poll.
    pub fn stop(&self) {
        if self.inner.running.swap(false, Ordering::SeqCst) {
            self.inner.listener.wake_acceptor();
            if let Some(handle) = self.inner.acceptor_handle.lock().unwrap().take() {
                let _ = handle.join();
            }
            self.inner.sender.shutdown_all(self.inner.worker_count);
            if let Some(workers) = self.inner.workers.lock().unwrap().take() {
                workers.join();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// The bound TCP address, or `None` for a UNIX-domain listener.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.inner.listener.local_addr().ok().flatten()
    }
}

/// The default application mounted when a caller builds a [`Server`]
/// without ever calling [`ServerBuilder::app`]/[`ServerBuilder::mounts`].
struct NotFoundApp;

impl GatewayApp for NotFoundApp {
    fn call(
        &self,
        _environ: &Environ,
        _input: &mut dyn Read,
        start_response: &mut StartResponse,
    ) -> Box<dyn Body> {
        let _ = start_response.call(StatusCode::NOT_FOUND, vec![], false);
        Box::new(std::iter::empty())
    }
}
