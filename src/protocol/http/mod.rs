//! Minimal HTTP/1.x framing for single request-response exchanges.
//!
//! This module contains:
//! - `headers` - bounded line-based header block parsing
//! - `request` - request line parsing and chunked body reading
//! - `response` - response framing, Accept-Encoding, gzip helpers
//!
//! Deliberately not a general HTTP server: no keep-alive, no chunked
//! transfer coding, no pipelining.

pub mod headers;
pub mod request;
pub mod response;

pub use headers::{parse_headers, HeaderBlock};
pub use request::{read_body, read_request_line, RequestLine};
pub use response::{encoding_preference, gzip_decode, gzip_encode, write_response};
