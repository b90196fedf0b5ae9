use thiserror::Error;

use crate::error::ErrorCode;

use super::storage::StorageError;

/// Failure of a session-layer call.
///
/// `Clone` so one refresh outcome can be handed to every waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No response was obtained. Never clears the session.
    #[error("network error: {0}")]
    Network(String),

    #[error("unauthorized")]
    Unauthorized,

    /// Non-2xx with a structured `{code, message}` body.
    #[error("{code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("unexpected response ({status}): {body}")]
    Unknown { status: u16, body: String },

    /// The session changed (logout or a new login) while the call was in flight.
    #[error("session was replaced while the request was in flight")]
    Invalidated,

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::Network(_) => ErrorCode::Network,
            SessionError::Unauthorized | SessionError::Invalidated => ErrorCode::Unauthorized,
            SessionError::Api { code, .. } => ErrorCode::Backend(code.clone()),
            SessionError::Unknown { .. } | SessionError::Decode(_) | SessionError::Storage(_) => {
                ErrorCode::Unknown
            }
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, SessionError::Network(_))
    }
}

impl From<StorageError> for SessionError {
    fn from(e: StorageError) -> Self {
        SessionError::Storage(e.to_string())
    }
}
