//! Error types for greenhouse-protocol.

use thiserror::Error;

/// Why a line could not be turned into a [`Message`](crate::Message).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The line was empty.
    #[error("empty line")]
    Empty,

    /// The line does not start with any known token.
    #[error("unknown message prefix: {0:?}")]
    UnknownPrefix(String),

    /// The token was recognized but its body does not follow the format.
    #[error("malformed {token} message: {reason}")]
    Malformed {
        token: &'static str,
        reason: String,
    },
}

impl DecodeError {
    pub(crate) fn malformed(token: &'static str, reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            token,
            reason: reason.into(),
        }
    }

    /// Whether the line was simply not meant for this protocol, as opposed to
    /// a known message with a broken body.
    pub fn is_unknown(&self) -> bool {
        matches!(self, DecodeError::Empty | DecodeError::UnknownPrefix(_))
    }
}
