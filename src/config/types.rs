//! Configuration type definitions.

use std::io;

/// Listener and request-logging settings.
#[derive(Clone, Debug)]
pub struct Server {
    pub bind_addr: String,
    pub log_requests: bool,
    pub rpc_paths: Vec<String>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".into(),
            log_requests: true,
            rpc_paths: vec!["/".into(), "/RPC2".into()],
        }
    }
}

/// Marshaling and content-negotiation settings.
#[derive(Clone, Debug)]
pub struct Rpc {
    pub allow_none: bool,
    pub encoding: String,
    /// Responses larger than this many bytes are gzip candidates;
    /// 0 disables compression entirely.
    pub compress_threshold: usize,
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            allow_none: false,
            encoding: "utf-8".into(),
            compress_threshold: 1400,
        }
    }
}

/// Worker pool settings. `max_workers = 0` means no pool: sync handlers
/// run inline on the scheduler thread.
#[derive(Clone, Debug, Default)]
pub struct Pool {
    pub max_workers: usize,
}

/// Framing and resource limits.
#[derive(Clone, Debug)]
pub struct Limits {
    pub max_header_line_bytes: usize,
    pub max_header_count: usize,
    pub max_body_bytes: usize,
    /// Single-read ceiling while draining the request body.
    pub read_chunk_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_header_line_bytes: 65536,
            max_header_count: 100,
            max_body_bytes: 64 * 1024 * 1024,
            read_chunk_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Debug configuration.
#[derive(Clone, Debug, Default)]
pub struct Debug {
    /// Attach X-exception/X-traceback headers to 500 responses.
    pub send_traceback: bool,
}

/// Root configuration container.
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub server: Server,
    pub rpc: Rpc,
    pub pool: Pool,
    pub limits: Limits,
    pub debug: Debug,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &str) -> io::Result<Config> {
        super::parser::load_config(path)
    }
}
