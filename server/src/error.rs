//! Error types shared by the event handlers and collaborators.

use thiserror::Error;

/// Message sent to clients for failures they cannot act on.
pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error has occurred";

/// Coarse classification of a handler failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AuthorizationFailure,
    NotFound,
    ValidationFailure,
    Unavailable,
    Internal,
}

/// Failure of a post-handshake operation.
///
/// Every variant is converted to an `error` event for the originating
/// connection only; none of them closes the socket.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Chat room not found")]
    RoomNotFound,

    #[error("Message not found")]
    MessageNotFound,

    #[error("Message is deleted")]
    MessageDeleted,

    #[error("Join the chat room first")]
    NotInRoom,

    #[error("out of range")]
    OutOfRange,

    #[error("Action not authorized")]
    NotAuthorized,

    #[error("Cannot vote on your own content")]
    SelfVote,

    #[error("User location not found")]
    LocationUnavailable,

    #[error("{0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::OutOfRange
            | ChatError::NotAuthorized
            | ChatError::SelfVote
            | ChatError::NotInRoom => ErrorKind::AuthorizationFailure,
            ChatError::RoomNotFound | ChatError::MessageNotFound | ChatError::MessageDeleted => {
                ErrorKind::NotFound
            }
            ChatError::Invalid(_) => ErrorKind::ValidationFailure,
            ChatError::LocationUnavailable => ErrorKind::Unavailable,
            ChatError::Storage(_) | ChatError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Text safe to show the client. Internal details stay in the logs.
    pub fn client_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => GENERIC_ERROR_MESSAGE.to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for ChatError {
    fn from(err: tokio::task::JoinError) -> Self {
        ChatError::Internal(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ChatError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        ChatError::Internal("DB lock poisoned".to_string())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
