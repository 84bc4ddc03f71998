//! Error types for the session engine.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by [`crate::VncSession`] operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// An argument was rejected before any I/O happened.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not legal in the session's current state.
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// TCP connection establishment failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Version negotiation failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Security negotiation or SecurityResult failed.
    #[error("security negotiation failed: {0}")]
    Security(String),

    /// The server sent something the protocol does not allow.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Transport-level I/O error.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// An operation exceeded its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The connection is gone; the session is single-shot, so the caller
    /// must build a new one.
    #[error("connection lost")]
    ConnectionLost,
}
