//! Chunked transfer-coding decoder (§4.E steps 4 and 12, RFC 7230 §4.1).
//!
//! The async teacher drives an identical state machine one `Poll::step`
//! at a time off a shared read buffer (`h1::chunked::ChunkedState::step`).
//! A blocking server has no buffer to poll against between wakeups, so
//! here the same states drive a [`std::io::Read`] adapter directly: each
//! call to [`ChunkedReader::read`] pulls bytes from the underlying stream
//! one at a time until it has either filled the caller's buffer with body
//! bytes or reached the terminating `0\r\n\r\n`. Bytes making up any
//! trailer header block between the terminating chunk and the final blank
//! line are accumulated and parsed once the blank line is seen, surfaced
//! through [`ChunkedReader::take_trailers`] (the reference server's
//! `decode_chunked` does the same: `mimetools.Message(self.rfile)` over
//! exactly this span, folded into the environment by its caller).

use std::io::{self, Read};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    Size,
    SizeLws,
    Extension,
    SizeLf,
    Body,
    BodyCr,
    BodyLf,
    Trailer,
    TrailerLf,
    EndLf,
    End,
}

const MAX_TRAILER_SIZE: usize = 65_536;
const MAX_TRAILER_HEADERS: usize = 32;

/// Wraps an inner reader, presenting de-chunked body bytes and stopping
/// at the terminating chunk. Trailer headers, if any, are available via
/// [`take_trailers`](ChunkedReader::take_trailers) once the stream has
/// been read to completion.
pub struct ChunkedReader<'a> {
    inner: &'a mut dyn Read,
    state: ChunkedState,
    size: u64,
    max_chunk_size: u64,
    trailer_buf: Vec<u8>,
    trailers: Vec<(String, String)>,
}

const DEFAULT_MAX_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

impl<'a> ChunkedReader<'a> {
    pub fn new(inner: &'a mut dyn Read) -> Self {
        ChunkedReader {
            inner,
            state: ChunkedState::Size,
            size: 0,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            trailer_buf: Vec::new(),
            trailers: Vec::new(),
        }
    }

    /// Takes the trailer headers parsed after the terminating chunk, if
    /// any were present. Empty until the reader has been read to EOF.
    pub fn take_trailers(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.trailers)
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        let mut b = [0u8; 1];
        self.inner.read_exact(&mut b)?;
        Ok(b[0])
    }

    fn invalid(msg: &'static str) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, Error::Chunked(msg.to_string()))
    }

    fn push_trailer_byte(&mut self, b: u8) -> io::Result<()> {
        self.trailer_buf.push(b);
        if self.trailer_buf.len() > MAX_TRAILER_SIZE {
            return Err(Self::invalid("trailer section too large"));
        }
        Ok(())
    }

    /// Advances the state machine until either some body bytes have been
    /// produced into `buf` or the terminating chunk has been consumed.
    /// Returns the number of bytes written into `buf`.
    fn advance(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.state {
                ChunkedState::End => return Ok(0),
                ChunkedState::Size => {
                    let b = self.read_byte()?;
                    let digit = match b {
                        b'0'..=b'9' => b - b'0',
                        b'a'..=b'f' => b - b'a' + 10,
                        b'A'..=b'F' => b - b'A' + 10,
                        b'\t' | b' ' => {
                            self.state = ChunkedState::SizeLws;
                            continue;
                        }
                        b';' => {
                            self.state = ChunkedState::Extension;
                            continue;
                        }
                        b'\r' => {
                            self.state = ChunkedState::SizeLf;
                            continue;
                        }
                        _ => return Err(Self::invalid("invalid chunk size")),
                    };
                    self.size = self
                        .size
                        .checked_mul(16)
                        .and_then(|n| n.checked_add(digit as u64))
                        .ok_or_else(|| Self::invalid("chunk size overflow"))?;
                    if self.size > self.max_chunk_size {
                        return Err(Self::invalid("chunk size too large"));
                    }
                }
                ChunkedState::SizeLws => match self.read_byte()? {
                    b'\t' | b' ' => {}
                    b';' => self.state = ChunkedState::Extension,
                    b'\r' => self.state = ChunkedState::SizeLf,
                    _ => return Err(Self::invalid("invalid chunk size whitespace")),
                },
                ChunkedState::Extension => match self.read_byte()? {
                    b'\r' => self.state = ChunkedState::SizeLf,
                    _ => {}
                },
                ChunkedState::SizeLf => {
                    if self.read_byte()? != b'\n' {
                        return Err(Self::invalid("missing LF after chunk size"));
                    }
                    self.state = if self.size == 0 {
                        ChunkedState::Trailer
                    } else {
                        ChunkedState::Body
                    };
                }
                ChunkedState::Body => {
                    if buf.is_empty() {
                        return Ok(0);
                    }
                    let want = (buf.len() as u64).min(self.size) as usize;
                    self.inner.read_exact(&mut buf[..want])?;
                    self.size -= want as u64;
                    if self.size == 0 {
                        self.state = ChunkedState::BodyCr;
                    }
                    return Ok(want);
                }
                ChunkedState::BodyCr => {
                    if self.read_byte()? != b'\r' {
                        return Err(Self::invalid("missing CR after chunk body"));
                    }
                    self.state = ChunkedState::BodyLf;
                }
                ChunkedState::BodyLf => {
                    if self.read_byte()? != b'\n' {
                        return Err(Self::invalid("missing LF after chunk body"));
                    }
                    self.state = ChunkedState::Size;
                }
                ChunkedState::Trailer => {
                    let b = self.read_byte()?;
                    self.push_trailer_byte(b)?;
                    self.state = match b {
                        b'\r' => ChunkedState::EndLf,
                        _ => ChunkedState::TrailerLf,
                    };
                }
                ChunkedState::TrailerLf => {
                    let b = self.read_byte()?;
                    self.push_trailer_byte(b)?;
                    if b == b'\n' {
                        self.state = ChunkedState::Trailer;
                    }
                }
                ChunkedState::EndLf => {
                    let b = self.read_byte()?;
                    self.push_trailer_byte(b)?;
                    if b != b'\n' {
                        return Err(Self::invalid("invalid end-of-chunks line"));
                    }
                    self.trailers = parse_trailer_headers(&self.trailer_buf)?;
                    self.state = ChunkedState::End;
                    return Ok(0);
                }
            }
        }
    }
}

/// Parses a trailer header block (`Name: value\r\n...\r\n`, terminated by
/// the blank line already folded into `buf`) the same way `httparse`
/// parses the head's own headers.
fn parse_trailer_headers(buf: &[u8]) -> io::Result<Vec<(String, String)>> {
    let mut storage = [httparse::EMPTY_HEADER; MAX_TRAILER_HEADERS];
    match httparse::parse_headers(buf, &mut storage) {
        Ok(httparse::Status::Complete((_, headers))) => {
            let mut out = Vec::with_capacity(headers.len());
            for h in headers {
                let name = h.name.to_ascii_lowercase();
                let value = std::str::from_utf8(h.value)
                    .map_err(|_| ChunkedReader::invalid("invalid trailer header value"))?
                    .trim()
                    .to_string();
                out.push((name, value));
            }
            Ok(out)
        }
        Ok(httparse::Status::Partial) => Err(ChunkedReader::invalid("incomplete trailer headers")),
        Err(_) => Err(ChunkedReader::invalid("invalid trailer headers")),
    }
}

impl<'a> Read for ChunkedReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.state == ChunkedState::End {
            return Ok(0);
        }
        self.advance(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(mut src: &[u8]) -> Vec<u8> {
        let mut reader = ChunkedReader::new(&mut src);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn single_chunk() {
        let out = decode_all(b"5\r\nhello\r\n0\r\n\r\n");
        assert_eq!(out, b"hello");
    }

    #[test]
    fn multiple_chunks() {
        let out = decode_all(b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n");
        assert_eq!(out, b"Wikipedia");
    }

    #[test]
    fn chunk_extension_is_ignored() {
        let out = decode_all(b"5;foo=bar\r\nhello\r\n0\r\n\r\n");
        assert_eq!(out, b"hello");
    }

    #[test]
    fn trailers_are_parsed_and_exposed() {
        let mut src: &[u8] = b"5\r\nhello\r\n0\r\nX-Checksum: abc123\r\n\r\n";
        let mut reader = ChunkedReader::new(&mut src);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello");
        assert_eq!(
            reader.take_trailers(),
            vec![("x-checksum".to_string(), "abc123".to_string())]
        );
    }

    #[test]
    fn no_trailers_yields_empty_trailer_list() {
        let mut src: &[u8] = b"5\r\nhello\r\n0\r\n\r\n";
        let mut reader = ChunkedReader::new(&mut src);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello");
        assert!(reader.take_trailers().is_empty());
    }

    #[test]
    fn multiple_trailer_headers_are_all_parsed() {
        let mut src: &[u8] = b"0\r\nX-A: 1\r\nX-B: 2\r\n\r\n";
        let mut reader = ChunkedReader::new(&mut src);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
        assert_eq!(
            reader.take_trailers(),
            vec![
                ("x-a".to_string(), "1".to_string()),
                ("x-b".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn bad_size_line_errors() {
        let mut src: &[u8] = b"zz\r\nhello\r\n0\r\n\r\n";
        let mut reader = ChunkedReader::new(&mut src);
        let mut out = Vec::new();
        assert!(reader.read_to_end(&mut out).is_err());
    }
}
