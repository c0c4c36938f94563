//! Per-connection driver loop (§3 Connection, §4.D).
//!
//! Grounded on the reference server's `HTTPConnection.communicate`: parse
//! a request, respond, and loop for another pipelined request on the same
//! socket until the request (or an error) says to close. `close_connection`
//! there becomes this loop's `!outcome.keep_alive`.

use std::io::{self, Read, Write};

use log::{debug, trace, warn};

use crate::config::Config;
use crate::connection::{Connection, Transport};
use crate::error::{is_client_gone_io_error, Error};
use crate::h1::{self, MAX_HEAD_SIZE};
use crate::mount::MountTable;
use crate::request;

const READ_CHUNK: usize = 8192;

/// Reads and serves requests off `conn` until the connection closes, a
/// request asks to close it, or an unrecoverable error occurs.
pub fn communicate(conn: &mut Connection, mounts: &MountTable, config: &Config) {
    if let Err(e) = conn.set_read_timeout(Some(config.connection_timeout)) {
        debug!("failed to set read timeout for {}: {}", conn.peer, e);
    }

    let mut pending: Vec<u8> = Vec::new();
    loop {
        let head = match read_head(&mut conn.transport, &mut pending) {
            Ok(Some(head)) => head,
            Ok(None) => {
                trace!("connection {} closed by peer", conn.peer);
                return;
            }
            Err(e) => {
                if !e.is_client_gone() {
                    warn!("error reading request head from {}: {}", conn.peer, e);
                    if let Error::TooLarge | Error::Header | Error::Method | Error::Version | Error::VersionMismatch = &e {
                        let mut stream = PendingStream {
                            pending: &mut pending,
                            transport: &mut conn.transport,
                        };
                        let _ = request::write_error_response(
                            &mut stream,
                            http::Version::HTTP_11,
                            false,
                            &config.server_token,
                            e,
                        );
                    }
                }
                return;
            }
        };

        let mut stream = PendingStream {
            pending: &mut pending,
            transport: &mut conn.transport,
        };

        let outcome = request::serve_one(
            head,
            &mut stream,
            &conn.template,
            mounts,
            &config.server_token,
            config.protocol,
        );

        match outcome {
            Ok(outcome) if outcome.keep_alive => continue,
            Ok(_) => return,
            Err(e) => {
                if !e.is_client_gone() {
                    warn!("error serving request on {}: {}", conn.peer, e);
                }
                return;
            }
        }
    }
}

/// Reads from `transport` into `pending` until a full request head can be
/// parsed, returning `Ok(None)` on a clean EOF before any bytes arrive for
/// a new request.
fn read_head(transport: &mut Transport, pending: &mut Vec<u8>) -> Result<Option<h1::RequestHead>, Error> {
    loop {
        if let Some((head, consumed)) = h1::parse_request_head(pending)? {
            pending.drain(..consumed);
            return Ok(Some(head));
        }
        if pending.len() > MAX_HEAD_SIZE {
            return Err(Error::TooLarge);
        }
        let mut buf = [0u8; READ_CHUNK];
        let n = transport.read(&mut buf).map_err(classify_read_error)?;
        if n == 0 {
            if pending.is_empty() {
                return Ok(None);
            }
            return Err(Error::ClientGone);
        }
        pending.extend_from_slice(&buf[..n]);
    }
}

fn classify_read_error(e: io::Error) -> Error {
    if is_client_gone_io_error(&e) {
        Error::ClientGone
    } else {
        Error::Io(e)
    }
}

/// Joins a connection's already-buffered lookahead bytes (read while
/// scanning for the end of the previous request's head) with its live
/// transport, so [`request::serve_one`] sees one continuous byte stream
/// for the request body without the driver needing to special-case the
/// "body bytes we already have vs. body bytes still on the wire" split.
struct PendingStream<'a> {
    pending: &'a mut Vec<u8>,
    transport: &'a mut Transport,
}

impl<'a> Read for PendingStream<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.pending.is_empty() {
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            return Ok(n);
        }
        self.transport.read(buf)
    }
}

impl<'a> Write for PendingStream<'a> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.transport.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.transport.flush()
    }
}
