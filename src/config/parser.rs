//! Configuration file parser.
//!
//! Parses TOML-style configuration files with a custom lightweight
//! parser. Both `[section]` headers and dotted `section.key` forms are
//! accepted.

use super::types::*;
use std::{fs, io};

/// Load configuration from a file path.
pub fn load_config(path: &str) -> io::Result<Config> {
    let s = fs::read_to_string(path)?;
    parse_config(&s)
}

/// Parse configuration from a string.
pub fn parse_config(s: &str) -> io::Result<Config> {
    let mut cfg = Config::default();
    let mut section = String::new();

    for (lineno, line) in s.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name.trim().to_string();
            continue;
        }
        let Some((lhs, rhs)) = line.split_once('=') else {
            continue;
        };
        let lhs = lhs.trim();
        let mut val = rhs.trim();
        if let Some((data, _comment)) = val.split_once('#') {
            val = data.trim();
        }

        let (sec, key) = if let Some((a, b)) = lhs.split_once('.') {
            (a.trim(), b.trim())
        } else {
            (section.as_str(), lhs)
        };

        if sec.is_empty() {
            continue;
        }

        set_config_value(sec, key, val, &mut cfg).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line {}: {}", lineno + 1, e),
            )
        })?;
    }

    Ok(cfg)
}

/// Set a configuration value based on section, key, and value strings.
fn set_config_value(section: &str, key: &str, val: &str, cfg: &mut Config) -> Result<(), String> {
    macro_rules! parse {
        (s) => {
            val.trim_matches('"').to_string()
        };
        (b) => {
            match val {
                "true" => true,
                "false" => false,
                _ => return Err(format!("bad bool {val}")),
            }
        };
        (usize_) => {
            val.parse::<usize>().map_err(|e| e.to_string())?
        };
    }

    match (section, key) {
        // Server section
        ("server", "bind_addr") => cfg.server.bind_addr = parse!(s),
        ("server", "log_requests") => cfg.server.log_requests = parse!(b),
        ("server", "rpc_paths") => {
            cfg.server.rpc_paths = val
                .split(',')
                .map(|p| p.trim().trim_matches('"').to_string())
                .filter(|p| !p.is_empty())
                .collect();
        }

        // Rpc section
        ("rpc", "allow_none") => cfg.rpc.allow_none = parse!(b),
        ("rpc", "encoding") => cfg.rpc.encoding = parse!(s),
        ("rpc", "compress_threshold") => cfg.rpc.compress_threshold = parse!(usize_),

        // Pool section
        ("pool", "max_workers") => cfg.pool.max_workers = parse!(usize_),

        // Limits section
        ("limits", "max_header_line_bytes") => cfg.limits.max_header_line_bytes = parse!(usize_),
        ("limits", "max_header_count") => cfg.limits.max_header_count = parse!(usize_),
        ("limits", "max_body_bytes") => cfg.limits.max_body_bytes = parse!(usize_),
        ("limits", "read_chunk_bytes") => cfg.limits.read_chunk_bytes = parse!(usize_),

        // Debug section
        ("debug", "send_traceback") => cfg.debug.send_traceback = parse!(b),

        _ => return Err(format!("unknown key {section}.{key}")),
    }

    Ok(())
}
