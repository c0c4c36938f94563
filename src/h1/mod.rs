//! HTTP/1.x wire protocol: request parsing, chunked transfer-coding, and
//! response encoding (§4.E, §4.F).

pub mod chunked;
pub mod decoder;
pub mod encoder;

pub use chunked::ChunkedReader;
pub(crate) use decoder::merge_header;
pub use decoder::{parse_request_head, RequestHead, MAX_HEADERS, MAX_HEAD_SIZE};
pub use encoder::{ambient_headers, decide_framing, write_chunk, write_head, BodyFraming};
