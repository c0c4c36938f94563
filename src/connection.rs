//! An accepted connection: the transport stream plus the environ template
//! derived from it (§3 Connection, §4.E step 0).

use std::io::{self, Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::environ::EnvironTemplate;

#[cfg(feature = "openssl-tls")]
use crate::tls::TlsStream;

/// The transport underlying a [`Connection`]: plain TCP, a UNIX domain
/// socket, or (with the `openssl-tls` feature) a handshaken TLS stream
/// over TCP.
pub enum Transport {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
    #[cfg(feature = "openssl-tls")]
    Tls(TlsStream),
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Transport::Unix(s) => s.read(buf),
            #[cfg(feature = "openssl-tls")]
            Transport::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Transport::Unix(s) => s.write(buf),
            #[cfg(feature = "openssl-tls")]
            Transport::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Transport::Unix(s) => s.flush(),
            #[cfg(feature = "openssl-tls")]
            Transport::Tls(s) => s.flush(),
        }
    }
}

/// One accepted client connection, owned by exactly one worker thread for
/// its entire lifetime (possibly serving several pipelined requests).
pub struct Connection {
    pub transport: Transport,
    pub template: EnvironTemplate,
    pub peer: String,
}

impl Connection {
    pub fn new(transport: Transport, template: EnvironTemplate, peer: String) -> Self {
        Connection {
            transport,
            template,
            peer,
        }
    }

    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> io::Result<()> {
        match &self.transport {
            Transport::Tcp(s) => s.set_read_timeout(timeout),
            #[cfg(unix)]
            Transport::Unix(s) => s.set_read_timeout(timeout),
            #[cfg(feature = "openssl-tls")]
            Transport::Tls(_) => Ok(()),
        }
    }
}
