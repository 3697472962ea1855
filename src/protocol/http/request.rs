//! Request line parsing and bounded body reading.

use std::io;

use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt};

use crate::common::error::{ConnError, FramingError};

use super::headers::read_line_bounded;

/// Parsed HTTP request line.
#[derive(Debug)]
pub struct RequestLine {
    pub method: String,
    pub path: String,
    pub version: String,
}

/// Read and parse the request line, bounded by `max_line` bytes.
///
/// Returns `None` when the peer closed the connection before sending
/// anything, which is a clean end rather than an error.
pub async fn read_request_line<R: AsyncBufRead + Unpin>(
    r: &mut R,
    max_line: usize,
) -> Result<Option<RequestLine>, ConnError> {
    let raw = read_line_bounded(r, max_line).await?;
    if raw.is_empty() {
        return Ok(None);
    }
    let line: String = raw.iter().map(|&b| b as char).collect();
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(path), Some(version), None) => Ok(Some(RequestLine {
            method: method.to_string(),
            path: path.to_string(),
            version: version.to_string(),
        })),
        _ => Err(FramingError::InvalidRequestLine.into()),
    }
}

/// Read exactly `declared` body bytes in chunks of at most `chunk_cap`.
///
/// The chunking keeps single reads below platform ceilings even for
/// large declared lengths. A zero-byte read before the declared length
/// is satisfied is a premature end-of-stream and fails the read; it is
/// never silently ignored.
pub async fn read_body<R: AsyncRead + Unpin>(
    r: &mut R,
    declared: usize,
    chunk_cap: usize,
) -> io::Result<Vec<u8>> {
    let mut data = Vec::with_capacity(declared.min(chunk_cap));
    let mut chunk = vec![0u8; declared.min(chunk_cap)];
    let mut remaining = declared;
    while remaining > 0 {
        let want = remaining.min(chunk_cap);
        let n = r.read(&mut chunk[..want]).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before request body was complete",
            ));
        }
        data.extend_from_slice(&chunk[..n]);
        remaining -= n;
    }
    Ok(data)
}
