//! TLS-aware connection stream (§4.A, optional `openssl-tls` feature).
//!
//! Grounded on the reference server's `SSL_fileobject`/`_ssl_wrap_method`:
//! every blocking operation on the TLS stream is retried on a "would
//! block" condition until a hard deadline, because OpenSSL reports a
//! renegotiation-in-progress handshake as `WantRead`/`WantWrite` rather
//! than blocking internally. `openssl::ssl::SslStream` is not safe to
//! drive from two threads concurrently (its error queue is per-thread
//! but a half-finished `SSL_read`/`SSL_write` on a shared object is
//! not), so access is serialized behind a `Mutex`, mirroring the
//! reference server's `SSLConnection` wrapper built on a `threading.RLock`.

#![cfg(feature = "openssl-tls")]

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use openssl::ssl::{HandshakeError, SslAcceptor, SslFiletype, SslMethod, SslStream};
use openssl::x509::X509NameEntryRef;

use crate::environ::TlsEnviron;
use crate::error::Error;

/// How long a single retried operation (handshake or I/O call) may spend
/// looping on `WantRead`/`WantWrite` before giving up (reference server's
/// `ssl_timeout = 3`).
const RETRY_TIMEOUT: Duration = Duration::from_secs(3);
/// Sleep between retries (reference server's `ssl_retry = .01`).
const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Builds an [`SslAcceptor`] from a PEM certificate/key pair.
pub fn build_acceptor(certificate_path: &str, private_key_path: &str) -> Result<SslAcceptor, Error> {
    let mut builder = SslAcceptor::mozilla_intermediate(SslMethod::tls())
        .map_err(|e| Error::Tls(e.to_string()))?;
    builder
        .set_private_key_file(private_key_path, SslFiletype::PEM)
        .map_err(|e| Error::Tls(e.to_string()))?;
    builder
        .set_certificate_file(certificate_path, SslFiletype::PEM)
        .map_err(|e| Error::Tls(e.to_string()))?;
    Ok(builder.build())
}

/// A handshaken TLS stream, serialized behind a mutex.
pub struct TlsStream {
    inner: Mutex<SslStream<TcpStream>>,
}

impl TlsStream {
    /// Performs the server-side handshake on `sock`, retrying on
    /// `WantRead`/`WantWrite` until [`RETRY_TIMEOUT`] elapses.
    pub fn accept(acceptor: &SslAcceptor, sock: TcpStream) -> Result<Self, Error> {
        sock.set_nonblocking(true).map_err(Error::Io)?;
        let deadline = Instant::now() + RETRY_TIMEOUT;
        let mut attempt = acceptor.accept(sock);
        let stream = loop {
            match attempt {
                Ok(stream) => break stream,
                Err(HandshakeError::WouldBlock(mid)) => {
                    if Instant::now() > deadline {
                        return Err(Error::Timeout);
                    }
                    std::thread::sleep(RETRY_INTERVAL);
                    attempt = mid.handshake();
                }
                Err(HandshakeError::Failure(_)) => {
                    return Err(Error::ClientGone);
                }
                Err(HandshakeError::SetupFailure(e)) => {
                    return Err(Error::Tls(e.to_string()));
                }
            }
        };
        stream
            .get_ref()
            .set_nonblocking(false)
            .map_err(Error::Io)?;
        Ok(TlsStream {
            inner: Mutex::new(stream),
        })
    }

    /// Builds the `SSL_SERVER_*` environ entries from the server
    /// certificate's issuer/subject DNs (§4.A, §6).
    pub fn server_environ(certificate_path: &str) -> Result<TlsEnviron, Error> {
        let pem = fs::read(certificate_path).map_err(Error::Io)?;
        let cert = openssl::x509::X509::from_pem(&pem).map_err(|e| Error::Tls(e.to_string()))?;
        let mut entries = HashMap::new();

        for (prefix, name) in [("I", cert.issuer_name()), ("S", cert.subject_name())] {
            let dn = format_dn(name);
            entries.insert(format!("SSL_SERVER_{}_DN", prefix), dn.clone());
            for (key, value) in parse_dn_right_to_left(&dn) {
                entries.insert(format!("SSL_SERVER_{}_DN_{}", prefix, key), value);
            }
        }
        Ok(TlsEnviron { entries })
    }
}

fn format_dn(name: &openssl::x509::X509NameRef) -> String {
    let mut out = String::new();
    for entry in name.entries() {
        out.push('/');
        out.push_str(short_name(entry));
        out.push('=');
        out.push_str(&entry.data().as_utf8().map(|s| s.to_string()).unwrap_or_default());
    }
    out
}

fn short_name(entry: &X509NameEntryRef) -> &str {
    entry
        .object()
        .nid()
        .short_name()
        .unwrap_or("")
}

/// Parses `/k1=v1/k2=v2` right-to-left, matching the reference server's
/// `rfind('=')`/`rfind('/')` loop (values may themselves contain `/`).
fn parse_dn_right_to_left(dn: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = dn;
    while let Some(eq) = rest.rfind('=') {
        let value = rest[eq + 1..].to_string();
        rest = &rest[..eq];
        let Some(slash) = rest.rfind('/') else {
            break;
        };
        let key = rest[slash + 1..].to_string();
        rest = &rest[..slash];
        if !key.is_empty() && !value.is_empty() {
            pairs.push((key, value));
        }
    }
    pairs
}

impl Read for TlsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        retry_io(&self.inner, RETRY_TIMEOUT, |s| s.read(buf))
    }
}

impl Write for TlsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        retry_io(&self.inner, RETRY_TIMEOUT, |s| s.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        retry_io(&self.inner, RETRY_TIMEOUT, |s| s.flush())
    }
}

fn retry_io<T>(
    stream: &Mutex<SslStream<TcpStream>>,
    timeout: Duration,
    mut op: impl FnMut(&mut SslStream<TcpStream>) -> io::Result<T>,
) -> io::Result<T> {
    let deadline = Instant::now() + timeout;
    let mut guard = stream.lock().unwrap_or_else(|e| e.into_inner());
    loop {
        match op(&mut guard) {
            Ok(v) => return Ok(v),
            Err(e) => {
                if e.kind() == io::ErrorKind::WouldBlock {
                    if Instant::now() > deadline {
                        return Err(io::Error::new(io::ErrorKind::TimedOut, "ssl operation timed out"));
                    }
                    std::thread::sleep(RETRY_INTERVAL);
                    continue;
                }
                return Err(e);
            }
        }
    }
}
