//! Error types for the honeypot.
//!
//! Every protocol error is local to one session: it ends that session and
//! nothing else.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for session and codec operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while framing or exchanging packets.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Peer closed the stream on a packet boundary.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Peer closed the stream in the middle of a packet.
    #[error("truncated read: expected {expected} bytes, got {available}")]
    TruncatedRead { expected: usize, available: usize },

    /// Payload length does not fit the 3-byte length field.
    #[error("payload of {len} bytes exceeds the maximum of {max}")]
    OversizedPayload { len: usize, max: usize },

    /// Declared length is larger than this server will ever read.
    #[error("declared packet length {declared} exceeds limit {limit}")]
    ProtocolGarbage { declared: usize, limit: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// True for the errors that simply mean the client went away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ProtocolError::ConnectionClosed => true,
            ProtocolError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {1}", .0.display())]
    FileRead(PathBuf, std::io::Error),

    #[error("Failed to parse config file '{}': {1}", .0.display())]
    TomlParse(PathBuf, toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
