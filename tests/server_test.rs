//! End-to-end exchange tests against an in-process server.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;

use veles::common::error::HandlerError;
use veles::config::Config;
use veles::net::{AcceptPolicy, XmlRpcServer};
use veles::protocol::http::{gzip_decode, gzip_encode};
use veles::protocol::xmlrpc::{decode_response, encode_call, Charset, Fault, Value};
use veles::rpc::{MethodRegistry, RegistryBuilder};

fn test_cfg() -> Config {
    let mut cfg = Config::default();
    cfg.server.bind_addr = "127.0.0.1:0".into();
    cfg.server.log_requests = false;
    cfg
}

fn demo_registry() -> MethodRegistry {
    let mut b = RegistryBuilder::new();
    b.register_sync("add", |params: Vec<Value>| {
        let a = params[0].as_i32().ok_or(Fault::new(2, "bad arg"))?;
        let b = params[1].as_i32().ok_or(Fault::new(2, "bad arg"))?;
        Ok(Value::Int(a + b))
    })
    .unwrap();
    b.register_async("echo", |params| async move { Ok(Value::Array(params)) })
        .unwrap();
    b.register_sync("fail_fault", |_| Err(Fault::new(7, "bad").into()))
        .unwrap();
    b.register_sync("fail_plain", |_| {
        let e = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        Err(HandlerError::unexpected(e))
    })
    .unwrap();
    b.build()
}

/// Spawn a bound server; the watch sender keeps it alive until dropped.
async fn start(server: XmlRpcServer) -> (SocketAddr, watch::Sender<bool>) {
    let bound = server.bind().await.unwrap();
    let addr = bound.local_addr().unwrap();
    let (tx, rx) = watch::channel(false);
    tokio::spawn(bound.serve(rx));
    (addr, tx)
}

async fn start_default(cfg: Config) -> (SocketAddr, watch::Sender<bool>) {
    start(XmlRpcServer::new(Arc::new(cfg), demo_registry())).await
}

fn post(path: &str, body: &[u8], extra_headers: &[(&str, &str)]) -> Vec<u8> {
    let mut req = format!("POST {} HTTP/1.1\r\nContent-Length: {}\r\n", path, body.len());
    for (name, value) in extra_headers {
        req.push_str(&format!("{}: {}\r\n", name, value));
    }
    req.push_str("\r\n");
    let mut bytes = req.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

/// Write a raw request and collect the whole response (the server
/// closes after one exchange).
async fn roundtrip(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    stream.flush().await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    out
}

/// Like `roundtrip`, for requests the server may abort mid-stream: a
/// reset instead of a clean EOF still counts as "no response bytes".
async fn roundtrip_lossy(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let _ = stream.write_all(request).await;
    let _ = stream.flush().await;
    let mut out = Vec::new();
    let _ = stream.read_to_end(&mut out).await;
    out
}

struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn parse_response(raw: &[u8]) -> Response {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("complete header block");
    let head = String::from_utf8_lossy(&raw[..split]).to_string();
    let body = raw[split + 4..].to_vec();

    let mut lines = head.lines();
    let status_line = lines.next().expect("status line");
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("status code");

    let headers = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
        .collect();

    Response {
        status,
        headers,
        body,
    }
}

async fn call(addr: SocketAddr, method: &str, params: &[Value]) -> Result<Value, Fault> {
    let body = encode_call(method, params, Charset::Utf8, true).unwrap();
    let raw = roundtrip(addr, &post("/RPC2", &body, &[])).await;
    let resp = parse_response(&raw);
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("content-type"), Some("text/xml"));
    decode_response(&resp.body).unwrap()
}

#[tokio::test]
async fn add_runs_inline_without_a_pool() {
    let (addr, _srv) = start_default(test_cfg()).await;
    let out = call(addr, "add", &[Value::Int(2), Value::Int(3)]).await;
    assert_eq!(out.unwrap(), Value::Int(5));
}

#[tokio::test]
async fn add_runs_pooled_with_identical_result() {
    let mut cfg = test_cfg();
    cfg.pool.max_workers = 2;
    let (addr, _srv) = start_default(cfg).await;
    let out = call(addr, "add", &[Value::Int(2), Value::Int(3)]).await;
    assert_eq!(out.unwrap(), Value::Int(5));
}

#[tokio::test]
async fn explicit_fault_is_verbatim() {
    let (addr, _srv) = start_default(test_cfg()).await;
    let fault = call(addr, "fail_fault", &[]).await.unwrap_err();
    assert_eq!(fault, Fault::new(7, "bad"));
}

#[tokio::test]
async fn plain_handler_error_is_generic_fault() {
    let (addr, _srv) = start_default(test_cfg()).await;
    let fault = call(addr, "fail_plain", &[]).await.unwrap_err();
    assert_eq!(fault.code, 1);
    assert!(fault.message.contains("Error"), "{}", fault.message);
    assert!(fault.message.contains("disk on fire"), "{}", fault.message);
}

#[tokio::test]
async fn unknown_method_is_a_fault() {
    let (addr, _srv) = start_default(test_cfg()).await;
    let fault = call(addr, "no_such_method", &[]).await.unwrap_err();
    assert_eq!(fault.code, 1);
    assert!(fault.message.contains("is not supported"), "{}", fault.message);
}

#[tokio::test]
async fn large_response_is_gzipped_when_client_accepts() {
    let (addr, _srv) = start_default(test_cfg()).await;
    let long = "x".repeat(5000);
    let body = encode_call("echo", &[Value::Str(long.clone())], Charset::Utf8, false).unwrap();

    let raw = roundtrip(
        addr,
        &post("/RPC2", &body, &[("Accept-Encoding", "gzip;q=0.8")]),
    )
    .await;
    let resp = parse_response(&raw);
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("content-encoding"), Some("gzip"));
    assert_eq!(
        resp.header("content-length").unwrap().parse::<usize>().unwrap(),
        resp.body.len(),
        "content-length reflects the compressed size"
    );

    let plain = gzip_decode(&resp.body, 1 << 20).unwrap();
    let value = decode_response(&plain).unwrap().unwrap();
    assert_eq!(value, Value::Array(vec![Value::Str(long)]));
}

#[tokio::test]
async fn no_client_preference_means_identity() {
    let (addr, _srv) = start_default(test_cfg()).await;
    let long = "x".repeat(5000);
    let body = encode_call("echo", &[Value::Str(long.clone())], Charset::Utf8, false).unwrap();

    let raw = roundtrip(addr, &post("/RPC2", &body, &[])).await;
    let resp = parse_response(&raw);
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("content-encoding"), None);
    assert_eq!(
        resp.header("content-length").unwrap().parse::<usize>().unwrap(),
        resp.body.len()
    );
    let value = decode_response(&resp.body).unwrap().unwrap();
    assert_eq!(value, Value::Array(vec![Value::Str(long)]));
}

#[tokio::test]
async fn zero_q_value_means_identity() {
    let (addr, _srv) = start_default(test_cfg()).await;
    let long = "x".repeat(5000);
    let body = encode_call("echo", &[Value::Str(long)], Charset::Utf8, false).unwrap();

    let raw = roundtrip(
        addr,
        &post("/RPC2", &body, &[("Accept-Encoding", "gzip;q=0")]),
    )
    .await;
    let resp = parse_response(&raw);
    assert_eq!(resp.header("content-encoding"), None);
}

#[tokio::test]
async fn small_response_stays_identity() {
    let (addr, _srv) = start_default(test_cfg()).await;
    let body = encode_call("add", &[Value::Int(1), Value::Int(1)], Charset::Utf8, false).unwrap();

    let raw = roundtrip(addr, &post("/RPC2", &body, &[("Accept-Encoding", "gzip")])).await;
    let resp = parse_response(&raw);
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("content-encoding"), None);
}

#[tokio::test]
async fn gzip_request_bodies_are_decoded() {
    let (addr, _srv) = start_default(test_cfg()).await;
    let body = encode_call("add", &[Value::Int(20), Value::Int(22)], Charset::Utf8, false).unwrap();
    let packed = gzip_encode(&body).unwrap();

    let raw = roundtrip(
        addr,
        &post("/RPC2", &packed, &[("Content-Encoding", "gzip")]),
    )
    .await;
    let resp = parse_response(&raw);
    assert_eq!(resp.status, 200);
    let value = decode_response(&resp.body).unwrap().unwrap();
    assert_eq!(value, Value::Int(42));
}

#[tokio::test]
async fn unknown_content_coding_is_501() {
    let (addr, _srv) = start_default(test_cfg()).await;
    let body = encode_call("add", &[Value::Int(1), Value::Int(2)], Charset::Utf8, false).unwrap();
    let raw = roundtrip(addr, &post("/RPC2", &body, &[("Content-Encoding", "br")])).await;
    assert_eq!(parse_response(&raw).status, 501);
}

#[tokio::test]
async fn corrupt_gzip_body_is_400() {
    let (addr, _srv) = start_default(test_cfg()).await;
    let raw = roundtrip(
        addr,
        &post("/RPC2", b"definitely not gzip", &[("Content-Encoding", "gzip")]),
    )
    .await;
    assert_eq!(parse_response(&raw).status, 400);
}

#[tokio::test]
async fn non_post_method_is_501() {
    let (addr, _srv) = start_default(test_cfg()).await;
    let raw = roundtrip(addr, b"GET /RPC2 HTTP/1.1\r\n\r\n").await;
    assert_eq!(parse_response(&raw).status, 501);
}

#[tokio::test]
async fn unknown_path_is_404() {
    let (addr, _srv) = start_default(test_cfg()).await;
    let body = encode_call("add", &[Value::Int(1), Value::Int(2)], Charset::Utf8, false).unwrap();
    let raw = roundtrip(addr, &post("/wrong", &body, &[])).await;
    assert_eq!(parse_response(&raw).status, 404);
}

#[tokio::test]
async fn missing_content_length_is_500_without_diagnostics() {
    let (addr, _srv) = start_default(test_cfg()).await;
    let raw = roundtrip(addr, b"POST /RPC2 HTTP/1.1\r\n\r\n").await;
    let resp = parse_response(&raw);
    assert_eq!(resp.status, 500);
    assert_eq!(resp.header("content-length"), Some("0"));
    assert!(resp.header("x-exception").is_none());
    assert!(resp.header("x-traceback").is_none());
}

#[tokio::test]
async fn debug_mode_attaches_diagnostic_headers() {
    let mut cfg = test_cfg();
    cfg.debug.send_traceback = true;
    let (addr, _srv) = start_default(cfg).await;

    let raw = roundtrip(addr, b"POST /RPC2 HTTP/1.1\r\n\r\n").await;
    let resp = parse_response(&raw);
    assert_eq!(resp.status, 500);
    assert!(resp.header("x-exception").is_some());
    assert!(resp
        .header("x-traceback")
        .unwrap()
        .contains("content-length"));
}

#[tokio::test]
async fn rejected_connections_get_no_bytes() {
    struct DenyAll;
    impl AcceptPolicy for DenyAll {
        fn verify(&self, _peer: SocketAddr) -> bool {
            false
        }
    }

    let server = XmlRpcServer::new(Arc::new(test_cfg()), demo_registry())
        .with_accept_policy(Arc::new(DenyAll));
    let (addr, _srv) = start(server).await;

    let body = encode_call("add", &[Value::Int(1), Value::Int(2)], Charset::Utf8, false).unwrap();
    let raw = roundtrip_lossy(addr, &post("/RPC2", &body, &[])).await;
    assert!(raw.is_empty());
}

#[tokio::test]
async fn one_bad_connection_does_not_poison_the_acceptor() {
    let (addr, _srv) = start_default(test_cfg()).await;

    // Framing garbage aborts its own connection...
    let raw = roundtrip_lossy(addr, b"\r\n\r\n").await;
    assert!(raw.is_empty());

    // ...and the next exchange works untouched.
    let out = call(addr, "add", &[Value::Int(2), Value::Int(3)]).await;
    assert_eq!(out.unwrap(), Value::Int(5));
}

#[tokio::test]
async fn latin1_encoding_end_to_end() {
    let mut cfg = test_cfg();
    cfg.rpc.encoding = "iso-8859-1".into();
    let (addr, _srv) = start_default(cfg).await;

    let out = call(addr, "echo", &[Value::Str("caf\u{e9}".into())]).await;
    assert_eq!(out.unwrap(), Value::Array(vec![Value::Str("caf\u{e9}".into())]));
}
