//! Unified error types for the veles codebase.

use std::fmt;
use std::io;

/// Error type for XML-RPC marshaling operations.
#[derive(Debug)]
pub enum CodecError {
    /// Not enough data available
    Short,
    /// Data format is invalid
    Malformed(&'static str),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Short => write!(f, "unexpected end of data"),
            CodecError::Malformed(msg) => write!(f, "malformed data: {}", msg),
        }
    }
}

impl std::error::Error for CodecError {}

/// Error type for HTTP framing violations.
///
/// Framing errors abort the connection before any response is sent;
/// the client sees only a closed socket.
#[derive(Debug, PartialEq, Eq)]
pub enum FramingError {
    /// A single header or request line exceeded the line limit
    LineTooLong,
    /// More header lines than allowed before the blank-line terminator
    TooManyHeaders,
    /// Request line is not `METHOD PATH VERSION`
    InvalidRequestLine,
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingError::LineTooLong => write!(f, "header line too long"),
            FramingError::TooManyHeaders => write!(f, "too many header lines"),
            FramingError::InvalidRequestLine => write!(f, "invalid request line"),
        }
    }
}

impl std::error::Error for FramingError {}

/// Connection-level error as seen by the lifecycle state machine.
///
/// `Transport` and `Framing` are recoverable from the server's point of
/// view: the lifecycle reports them and closes the one connection.
/// `Framework` covers failures of the cleanup path itself and is
/// surfaced to the operator after the close attempt.
#[derive(Debug)]
pub enum ConnError {
    /// I/O failure on the transport
    Transport(io::Error),
    /// Protocol framing violation
    Framing(FramingError),
    /// Failure inside lifecycle cleanup/shutdown
    Framework(io::Error),
}

impl fmt::Display for ConnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnError::Transport(e) => write!(f, "transport error: {}", e),
            ConnError::Framing(e) => write!(f, "framing error: {}", e),
            ConnError::Framework(e) => write!(f, "shutdown error: {}", e),
        }
    }
}

impl std::error::Error for ConnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnError::Transport(e) | ConnError::Framework(e) => Some(e),
            ConnError::Framing(e) => Some(e),
        }
    }
}

impl From<io::Error> for ConnError {
    fn from(e: io::Error) -> Self {
        ConnError::Transport(e)
    }
}

impl From<FramingError> for ConnError {
    fn from(e: FramingError) -> Self {
        ConnError::Framing(e)
    }
}

/// Error raised when no registration covers a requested method name.
#[derive(Debug)]
pub struct DispatchError {
    pub method: String,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method \"{}\" is not supported", self.method)
    }
}

impl std::error::Error for DispatchError {}

/// Outcome of a handler invocation that did not produce a value.
///
/// `Fault` passes through to the client unchanged. Everything else is
/// collapsed into a generic fault (code 1) whose message carries the
/// error type and text, so a buggy handler can never take the
/// connection task down.
#[derive(Debug)]
pub enum HandlerError {
    /// Explicit application-level fault, forwarded verbatim
    Fault(crate::protocol::xmlrpc::Fault),
    /// Any other failure, tagged with the originating type name
    Other { kind: String, message: String },
}

impl HandlerError {
    /// Build the `Other` form from a bare kind/message pair.
    pub fn other(kind: &str, message: impl Into<String>) -> Self {
        HandlerError::Other {
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    /// Capture an arbitrary error, tagging it with its type name so the
    /// resulting fault message reads `<error-type>:<error-message>`.
    pub fn unexpected<E: std::error::Error>(e: E) -> Self {
        HandlerError::Other {
            kind: std::any::type_name::<E>().to_string(),
            message: e.to_string(),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Fault(fault) => {
                write!(f, "fault {}: {}", fault.code, fault.message)
            }
            HandlerError::Other { kind, message } => write!(f, "{}:{}", kind, message),
        }
    }
}

impl From<crate::protocol::xmlrpc::Fault> for HandlerError {
    fn from(f: crate::protocol::xmlrpc::Fault) -> Self {
        HandlerError::Fault(f)
    }
}
