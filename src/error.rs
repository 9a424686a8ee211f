//! Error types for the NexusTalk client
//!
//! Nothing in this crate is fatal to the process: transport and protocol
//! faults are either recovered internally (reconnect, re-auth, delayed
//! playback restart) or surfaced on the streamer's event channel. These
//! types cover the fallible codec and connection-setup paths.

use std::io;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O error from the underlying transport
    Io(io::Error),
    /// TLS setup failure (bad host name, handshake error)
    Tls(String),
    /// Wire-format error while decoding a payload
    Protocol(ProtocolError),
    /// The streamer task has shut down and can no longer accept requests
    Closed,
}

/// Errors from the protobuf-compatible wire codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload ended in the middle of a field
    Truncated,
    /// Varint longer than 10 bytes
    InvalidVarint,
    /// String field was not valid UTF-8
    InvalidUtf8,
    /// Field key carried a wire type we cannot skip
    UnexpectedWireType(u8),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Tls(msg) => write!(f, "TLS error: {}", msg),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Closed => write!(f, "Streamer is closed"),
        }
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::Truncated => write!(f, "Payload truncated"),
            ProtocolError::InvalidVarint => write!(f, "Varint too long"),
            ProtocolError::InvalidUtf8 => write!(f, "String field is not valid UTF-8"),
            ProtocolError::UnexpectedWireType(t) => write!(f, "Unexpected wire type: {}", t),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}
