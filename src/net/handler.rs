//! HTTP exchange handler.
//!
//! Reads one request from the connection, routes the body through the
//! dispatcher, and writes the framed response. Exactly one exchange per
//! connection; the lifecycle closes the transport afterwards.

use std::net::SocketAddr;

use log::*;
use tokio::io::{AsyncRead, AsyncWrite, BufStream};

use crate::common::error::ConnError;
use crate::config::Config;
use crate::protocol::http::{
    encoding_preference, gzip_decode, gzip_encode, parse_headers, read_body, read_request_line,
    write_response, HeaderBlock,
};
use crate::rpc::Dispatch;

/// Failure modes of a single exchange, each with its own wire behavior.
enum RequestError {
    /// Transport/framing problem: abort with no response.
    Conn(ConnError),
    /// Request body uses a content-coding we do not implement: 501.
    UnsupportedEncoding(String),
    /// Request body claimed gzip but did not decode: 400.
    BadEncodedBody,
    /// Everything else that is not a fault: 500.
    Internal {
        kind: &'static str,
        message: String,
    },
}

impl RequestError {
    fn internal(kind: &'static str, message: impl Into<String>) -> Self {
        RequestError::Internal {
            kind,
            message: message.into(),
        }
    }
}

/// Handle one request-response exchange on `stream`.
pub async fn handle_request<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufStream<S>,
    peer: SocketAddr,
    cfg: &Config,
    dispatcher: &dyn Dispatch,
) -> Result<(), ConnError> {
    let line = match read_request_line(stream, cfg.limits.max_header_line_bytes).await? {
        Some(line) => line,
        // Peer connected and left without sending anything.
        None => return Ok(()),
    };
    let headers = parse_headers(
        stream,
        cfg.limits.max_header_line_bytes,
        cfg.limits.max_header_count,
    )
    .await?;

    let status = if line.method != "POST" {
        drain_body(stream, &headers, cfg).await;
        write_plain(
            stream,
            501,
            &format!("Unsupported method ({})", line.method),
        )
        .await?;
        501
    } else if !cfg.server.rpc_paths.iter().any(|p| p == &line.path) {
        drain_body(stream, &headers, cfg).await;
        write_plain(stream, 404, "No such page").await?;
        404
    } else {
        match read_and_dispatch(stream, &headers, cfg, dispatcher).await {
            Ok(response) => {
                write_rpc_response(stream, &headers, cfg, response).await?;
                200
            }
            Err(RequestError::Conn(e)) => return Err(e),
            Err(RequestError::UnsupportedEncoding(coding)) => {
                write_plain(stream, 501, &format!("encoding {:?} not supported", coding)).await?;
                501
            }
            Err(RequestError::BadEncodedBody) => {
                write_plain(stream, 400, "error decoding gzip content").await?;
                400
            }
            Err(RequestError::Internal { kind, message }) => {
                debug!("{}: exchange failed: {}:{}", peer, kind, message);
                write_internal_error(stream, cfg, kind, &message).await?;
                500
            }
        }
    };

    if cfg.server.log_requests {
        info!(
            "{} - \"{} {} {}\" {}",
            peer, line.method, line.path, line.version, status
        );
    }
    Ok(())
}

/// Read the declared body, undo any content-coding, and dispatch it.
async fn read_and_dispatch<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufStream<S>,
    headers: &HeaderBlock,
    cfg: &Config,
    dispatcher: &dyn Dispatch,
) -> Result<Vec<u8>, RequestError> {
    let declared = headers
        .get("content-length")
        .ok_or_else(|| RequestError::internal("MissingHeader", "content-length required"))?
        .parse::<usize>()
        .map_err(|e| RequestError::internal("InvalidHeader", format!("bad content-length: {}", e)))?;
    if declared > cfg.limits.max_body_bytes {
        return Err(RequestError::internal(
            "BodyTooLarge",
            format!(
                "declared body of {} bytes exceeds limit of {}",
                declared, cfg.limits.max_body_bytes
            ),
        ));
    }

    let data = read_body(stream, declared, cfg.limits.read_chunk_bytes)
        .await
        .map_err(|e| RequestError::Conn(ConnError::Transport(e)))?;
    let data = decode_request_content(headers, data, cfg)?;

    Ok(dispatcher.dispatch(&data).await)
}

/// Consume a declared request body we are not going to use, so the
/// error response is not lost to a reset from unread bytes. Failures
/// are ignored; the response write surfaces any real transport problem.
async fn drain_body<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufStream<S>,
    headers: &HeaderBlock,
    cfg: &Config,
) {
    if let Some(declared) = headers.get("content-length").and_then(|v| v.parse().ok()) {
        if declared <= cfg.limits.max_body_bytes {
            let _ = read_body(stream, declared, cfg.limits.read_chunk_bytes).await;
        }
    }
}

/// Undo the request's Content-Encoding, if any.
fn decode_request_content(
    headers: &HeaderBlock,
    data: Vec<u8>,
    cfg: &Config,
) -> Result<Vec<u8>, RequestError> {
    match headers.get("content-encoding") {
        None => Ok(data),
        Some(coding) if coding.eq_ignore_ascii_case("identity") => Ok(data),
        Some(coding) if coding.eq_ignore_ascii_case("gzip") => {
            gzip_decode(&data, cfg.limits.max_body_bytes)
                .map_err(|_| RequestError::BadEncodedBody)
        }
        Some(coding) => Err(RequestError::UnsupportedEncoding(coding.to_string())),
    }
}

/// Write the 200 response, compressing when the payload is over the
/// threshold and the client said it can take gzip.
async fn write_rpc_response<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufStream<S>,
    headers: &HeaderBlock,
    cfg: &Config,
    mut body: Vec<u8>,
) -> Result<(), ConnError> {
    let mut extra: Vec<(&str, String)> = vec![("Content-Type", "text/xml".to_string())];

    let threshold = cfg.rpc.compress_threshold;
    if threshold > 0 && body.len() > threshold && encoding_preference(headers, "gzip") > 0.0 {
        match gzip_encode(&body) {
            Ok(packed) => {
                body = packed;
                extra.push(("Content-Encoding", "gzip".to_string()));
            }
            // Fall back to the identity form; the response is still valid.
            Err(e) => debug!("gzip encode failed, sending identity: {}", e),
        }
    }

    write_response(stream, 200, &extra, &body).await?;
    Ok(())
}

/// Plain-text error response (404/501/400 paths).
async fn write_plain<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufStream<S>,
    status: u16,
    text: &str,
) -> Result<(), ConnError> {
    let extra = [("Content-Type", "text/plain".to_string())];
    write_response(stream, status, &extra, text.as_bytes()).await?;
    Ok(())
}

/// Empty 500 response; diagnostic headers only in debug mode.
async fn write_internal_error<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufStream<S>,
    cfg: &Config,
    kind: &str,
    message: &str,
) -> Result<(), ConnError> {
    let mut extra: Vec<(&str, String)> = Vec::new();
    if cfg.debug.send_traceback {
        extra.push(("X-exception", escape_header_value(message)));
        extra.push((
            "X-traceback",
            escape_header_value(&format!("{}: {}", kind, message)),
        ));
    }
    write_response(stream, 500, &extra, b"").await?;
    Ok(())
}

/// Backslash-escape a string so it is safe inside a header value.
fn escape_header_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            c if (c as u32) < 0x20 || !c.is_ascii() => out.extend(c.escape_default()),
            c => out.push(c),
        }
    }
    out
}
