//! Error taxonomy for sessions and calls.
//!
//! DESIGN
//! ======
//! Every failure a caller can observe is categorised by [`Code`]. Transport
//! and protocol failures are fatal to the session; remote errors are the
//! error terminal sent by the peer; cancellation is always caller-initiated
//! or peer-initiated and never retried here.

use std::fmt;

use frames::{FRAME_CODE, FRAME_MESSAGE, Frame, Status};

// =============================================================================
// CODES
// =============================================================================

/// Category attached to every error that leaves a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    NotFound,
    Invalid,
    Unavailable,
    Cancelled,
    Internal,
}

impl Code {
    /// Grepable wire form used in error frames.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "E_NOT_FOUND",
            Self::Invalid => "E_INVALID",
            Self::Unavailable => "E_UNAVAILABLE",
            Self::Cancelled => "E_CANCELLED",
            Self::Internal => "E_INTERNAL",
        }
    }

    /// Parse the wire form. Unknown codes collapse to `Internal`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "E_NOT_FOUND" => Self::NotFound,
            "E_INVALID" => Self::Invalid,
            "E_UNAVAILABLE" => Self::Unavailable,
            "E_CANCELLED" => Self::Cancelled,
            _ => Self::Internal,
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed errors that can be turned into an error terminal.
pub trait ErrorCode: fmt::Display {
    fn code(&self) -> Code;
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error terminal received from (or sent to) the peer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RemoteError {
    pub code: Code,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// Capture a typed error for transmission.
    pub fn from_error(err: &(impl ErrorCode + ?Sized)) -> Self {
        Self::new(err.code(), err.to_string())
    }

    pub(crate) fn from_frame(frame: &Frame) -> Self {
        Self {
            code: frame.data_str(FRAME_CODE).map_or(Code::Internal, Code::parse),
            message: frame
                .data_str(FRAME_MESSAGE)
                .unwrap_or("unknown remote error")
                .to_owned(),
        }
    }
}

/// Misuse of a session or a peer that breaks framing rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("send after close")]
    SendAfterClose,
    #[error("receive after close")]
    ReceiveAfterClose,
    #[error("out of order frame: expected seq {expected}, got {got}")]
    OutOfOrder { expected: u64, got: u64 },
    #[error("unexpected {0:?} frame")]
    UnexpectedFrame(Status),
    #[error("payload decode failed: {0}")]
    Decode(String),
    #[error("payload encode failed: {0}")]
    Encode(String),
    #[error("stream ended without a reply")]
    MissingReply,
    #[error("more than one reply on a single-reply call")]
    ExtraReply,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("call cancelled")]
    Cancelled,
}

impl SessionError {
    pub(crate) fn connection_closed() -> Self {
        Self::Transport("connection closed".into())
    }
}

impl ErrorCode for SessionError {
    fn code(&self) -> Code {
        match self {
            Self::Transport(_) => Code::Unavailable,
            Self::Protocol(_) => Code::Internal,
            Self::Remote(e) => e.code,
            Self::Cancelled => Code::Cancelled,
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
