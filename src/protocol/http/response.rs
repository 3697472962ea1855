//! Response framing and content-coding support.

use std::io::{self, Read, Write};

use bytes::BytesMut;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::headers::HeaderBlock;

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        _ => "Unknown",
    }
}

/// Write a complete response: status line, standard headers, `extra`
/// headers, Content-Length, then the body. Flushes before returning.
pub async fn write_response<W: AsyncWrite + Unpin>(
    w: &mut W,
    status: u16,
    extra: &[(&str, String)],
    body: &[u8],
) -> io::Result<()> {
    let mut head = BytesMut::with_capacity(256);
    head.extend_from_slice(format!("HTTP/1.1 {} {}\r\n", status, reason(status)).as_bytes());
    head.extend_from_slice(
        format!("Server: veles/{}\r\n", env!("CARGO_PKG_VERSION")).as_bytes(),
    );
    head.extend_from_slice(
        format!(
            "Date: {}\r\n",
            chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT")
        )
        .as_bytes(),
    );
    head.extend_from_slice(b"Connection: close\r\n");
    for (name, value) in extra {
        head.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }
    head.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());

    w.write_all(&head).await?;
    w.write_all(body).await?;
    w.flush().await
}

/// Parse an Accept-Encoding header into (coding, q-value) pairs.
///
/// Entries without a q attribute default to 1.0; entries with other
/// attributes are ignored.
pub fn accept_encodings(headers: &HeaderBlock) -> Vec<(String, f64)> {
    let mut out = Vec::new();
    let ae = headers.get("accept-encoding").unwrap_or("");
    for entry in ae.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match entry.split_once(';') {
            None => {
                if !entry.contains('=') {
                    out.push((entry.to_string(), 1.0));
                }
            }
            Some((coding, attr)) => {
                if let Some(q) = attr.trim().strip_prefix("q=") {
                    if let Ok(q) = q.trim().parse::<f64>() {
                        out.push((coding.trim().to_string(), q));
                    }
                }
            }
        }
    }
    out
}

/// The client's q-value for a coding, 0.0 if unlisted.
pub fn encoding_preference(headers: &HeaderBlock, coding: &str) -> f64 {
    accept_encodings(headers)
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(coding))
        .map(|(_, q)| *q)
        .unwrap_or(0.0)
}

/// Gzip-compress `data`.
pub fn gzip_encode(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut enc = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    enc.write_all(data)?;
    enc.finish()
}

/// Gzip-decompress `data`, refusing output beyond `max_decode` bytes.
pub fn gzip_decode(data: &[u8], max_decode: usize) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut dec = GzDecoder::new(data).take(max_decode as u64 + 1);
    dec.read_to_end(&mut out)?;
    if out.len() > max_decode {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "max gzip-decoded payload length exceeded",
        ));
    }
    Ok(out)
}
