//! Error taxonomy shared by the transport, resource client, log decoder,
//! reconciliation loop and dispatcher.

use thiserror::Error;

/// The engine could not be reached at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid engine endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("engine unreachable at {endpoint}: {reason}")]
    Unreachable { endpoint: String, reason: String },
}

/// A multiplexed log frame header that cannot be interpreted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unrecognized log stream tag {tag:#04x} at byte offset {offset}")]
    UnknownStream { tag: u8, offset: u64 },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Non-2xx answer; `message` is the engine's own text, verbatim.
    #[error("engine returned {status}: {message}")]
    Engine { status: u16, message: String },

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Refused locally, before any request was sent.
    #[error("{0}")]
    Rejected(String),
}

impl EngineError {
    /// True when the failure means the engine itself is unreachable, as opposed
    /// to a one-off failure of a single request.
    pub fn is_offline(&self) -> bool {
        matches!(self, EngineError::Transport(TransportError::Unreachable { .. }))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            EngineError::Engine { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Decode(e.to_string())
    }
}
