//! Bounded HTTP header block parsing.
//!
//! Reads lines until a blank line (CRLF, LF, or end-of-stream) ends the
//! block, enforcing a per-line byte limit and a header-count limit.
//! Raw bytes are decoded as Latin-1, matching the single-byte charset
//! the wire format promises.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::common::error::{ConnError, FramingError};

/// Ordered header collection preserving duplicates.
#[derive(Debug, Default)]
pub struct HeaderBlock {
    entries: Vec<(String, String)>,
}

impl HeaderBlock {
    /// First value for `name`, case-insensitive.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `name`, in arrival order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, name: String, value: String) {
        self.entries.push((name, value));
    }

    /// Fold an RFC2822 continuation line into the last header value.
    fn continue_last(&mut self, more: &str) {
        if let Some((_, v)) = self.entries.last_mut() {
            v.push(' ');
            v.push_str(more);
        }
    }
}

/// Read one line (through `\n` or EOF), bounded by `max` bytes.
///
/// Returns the line including its terminator, or an empty vec at EOF.
/// Exceeding `max` is a framing error: the connection is aborted with
/// no response, so there is no point consuming the rest of the line.
pub async fn read_line_bounded<R: AsyncBufRead + Unpin>(
    r: &mut R,
    max: usize,
) -> Result<Vec<u8>, ConnError> {
    let mut line = Vec::new();
    loop {
        let (consumed, done) = {
            let buf = r.fill_buf().await?;
            if buf.is_empty() {
                (0, true)
            } else if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                line.extend_from_slice(&buf[..=pos]);
                (pos + 1, true)
            } else {
                line.extend_from_slice(buf);
                (buf.len(), false)
            }
        };
        r.consume(consumed);
        if line.len() > max {
            return Err(FramingError::LineTooLong.into());
        }
        if done {
            return Ok(line);
        }
    }
}

/// Decode Latin-1 bytes and strip the trailing line terminator.
fn decode_line(line: &[u8]) -> String {
    let mut s: String = line.iter().map(|&b| b as char).collect();
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
    s
}

/// Parse a header block from `r`.
///
/// `max_line` bounds each raw line (terminator included); `max_count`
/// bounds the number of header lines before the blank terminator.
pub async fn parse_headers<R: AsyncBufRead + Unpin>(
    r: &mut R,
    max_line: usize,
    max_count: usize,
) -> Result<HeaderBlock, ConnError> {
    let mut headers = HeaderBlock::default();
    let mut lines = 0usize;
    loop {
        let raw = read_line_bounded(r, max_line).await?;
        if raw.is_empty() || raw == b"\r\n" || raw == b"\n" {
            return Ok(headers);
        }
        lines += 1;
        if lines > max_count {
            return Err(FramingError::TooManyHeaders.into());
        }

        let line = decode_line(&raw);
        if line.starts_with(' ') || line.starts_with('\t') {
            headers.continue_last(line.trim());
            continue;
        }
        // Lines without a colon carry nothing we can use; skip them the
        // way a permissive RFC2822 parser does.
        if let Some((name, value)) = line.split_once(':') {
            headers.push(name.trim().to_string(), value.trim().to_string());
        }
    }
}
