//! Common utilities shared across the codebase.
//!
//! This module provides the unified error taxonomy used by the framing,
//! dispatch, and lifecycle layers.

pub mod error;

// Re-export commonly used items for convenience
pub use error::{CodecError, ConnError, DispatchError, FramingError, HandlerError};
