//! Binding and accepting (§3 Listener, §4.A).
//!
//! `socket2` gives us the `SO_REUSEADDR` + explicit `listen` backlog the
//! reference server sets by hand on the raw socket before handing it off
//! to the stdlib-shaped `TcpListener`/`UnixListener` wrappers used
//! everywhere else. Stopping the accept loop mirrors the reference
//! server's `stop()`: touch our own listening address so a blocked
//! `accept()` returns immediately instead of waiting for the next real
//! client.
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};

use socket2::{Domain, Socket, Type};

use crate::config::{BindAddr, Config};
use crate::error::Error;

pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

pub enum Accepted {
    Tcp(TcpStream, SocketAddr),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Listener {
    pub fn bind(config: &Config) -> Result<Self, Error> {
        match &config.bind_addr {
            BindAddr::Tcp { host, port } => {
                let addr: SocketAddr = format!("{}:{}", if host.is_empty() { "0.0.0.0" } else { host }, port)
                    .parse()
                    .map_err(|_| Error::Io(io::Error::new(io::ErrorKind::InvalidInput, "bad bind address")))?;
                let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
                let socket = Socket::new(domain, Type::STREAM, None).map_err(Error::Io)?;
                socket.set_reuse_address(true).map_err(Error::Io)?;
                socket.bind(&addr.into()).map_err(Error::Io)?;
                socket.listen(config.listen_backlog).map_err(Error::Io)?;
                socket.set_nonblocking(false).map_err(Error::Io)?;
                Ok(Listener::Tcp(socket.into()))
            }
            #[cfg(unix)]
            BindAddr::Unix(path) => {
                let _ = std::fs::remove_file(path);
                Ok(Listener::Unix(UnixListener::bind(path).map_err(Error::Io)?))
            }
            #[cfg(not(unix))]
            BindAddr::Unix(_) => Err(Error::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix domain sockets are not supported on this platform",
            ))),
        }
    }

    pub fn local_addr(&self) -> io::Result<Option<SocketAddr>> {
        match self {
            Listener::Tcp(l) => l.local_addr().map(Some),
            #[cfg(unix)]
            Listener::Unix(_) => Ok(None),
        }
    }

    /// Blocks until a connection arrives, or an error (including a
    /// deliberate self-connect used to unblock this call from
    /// [`crate::server::Server::stop`]).
    pub fn accept(&self) -> io::Result<Accepted> {
        match self {
            Listener::Tcp(l) => {
                let (sock, addr) = l.accept()?;
                Ok(Accepted::Tcp(sock, addr))
            }
            #[cfg(unix)]
            Listener::Unix(l) => {
                let (sock, _addr) = l.accept()?;
                Ok(Accepted::Unix(sock))
            }
        }
    }

    /// Connects to this listener's own bound address, to make a blocked
    /// `accept()` call in another thread return immediately (reference
    /// server's `stop()` touching its own socket).
    pub fn wake_acceptor(&self) {
        match self {
            Listener::Tcp(l) => {
                if let Ok(addr) = l.local_addr() {
                    let _ = TcpStream::connect(addr);
                }
            }
            #[cfg(unix)]
            Listener::Unix(_) => {
                // UNIX listeners close cleanly on drop; no wakeup connect needed.
            }
        }
    }
}
