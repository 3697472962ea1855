//! Configuration module for veles.
//!
//! This module provides all configuration types and parsing logic:
//! - `Config` - Root configuration container
//! - `Server` - Listener and request-logging settings
//! - `Rpc` - Marshaling and content-negotiation settings
//! - `Pool` - Worker pool size
//! - `Limits` - Framing and resource limits
//! - `Debug` - Diagnostic toggles

mod parser;
mod types;

pub use parser::{load_config, parse_config};
pub use types::*;
