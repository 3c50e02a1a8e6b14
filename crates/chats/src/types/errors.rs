//! Error types for the chat store.

use thiserror::Error;

/// Result type alias for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Main error type for the chat store
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Chat not found: {id}")]
    ChatNotFound { id: String },

    #[error("Message not found: {id}")]
    MessageNotFound { id: String },

    #[error("User {user_id} is not a participant of chat {chat_id}")]
    NotParticipant { chat_id: String, user_id: String },

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("Messages can only be edited within 15 minutes of sending")]
    EditWindowExpired,

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Corrupt record: {detail}")]
    CorruptRecord { detail: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChatError {
    pub fn chat_not_found(id: impl Into<String>) -> Self {
        Self::ChatNotFound { id: id.into() }
    }

    pub fn message_not_found(id: impl Into<String>) -> Self {
        Self::MessageNotFound { id: id.into() }
    }

    pub fn not_participant(chat_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::NotParticipant {
            chat_id: chat_id.into(),
            user_id: user_id.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn corrupt_record(detail: impl Into<String>) -> Self {
        Self::CorruptRecord {
            detail: detail.into(),
        }
    }

    /// Rejections caused by the request itself. These are reported back to the
    /// client that made the request; everything else is only logged.
    pub fn is_client_visible(&self) -> bool {
        matches!(
            self,
            Self::NotParticipant { .. }
                | Self::Forbidden { .. }
                | Self::EditWindowExpired
                | Self::Validation { .. }
        )
    }

    /// Stable machine-readable code used in error frames and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ChatNotFound { .. } => "CHAT_NOT_FOUND",
            Self::MessageNotFound { .. } => "MESSAGE_NOT_FOUND",
            Self::NotParticipant { .. } => "NOT_PARTICIPANT",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::EditWindowExpired => "EDIT_WINDOW_EXPIRED",
            Self::Validation { .. } => "VALIDATION",
            Self::CorruptRecord { .. } => "CORRUPT_RECORD",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::Serialization(_) => "SERIALIZATION",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_client_visible() {
        assert!(ChatError::forbidden("nope").is_client_visible());
        assert!(ChatError::not_participant("c", "u").is_client_visible());
        assert!(ChatError::EditWindowExpired.is_client_visible());
        assert!(ChatError::validation("blank").is_client_visible());
    }

    #[test]
    fn lookups_and_infrastructure_failures_are_not() {
        assert!(!ChatError::chat_not_found("c").is_client_visible());
        assert!(!ChatError::message_not_found("m").is_client_visible());
        assert!(!ChatError::StoreUnavailable(sqlx::Error::PoolTimedOut).is_client_visible());
        assert!(!ChatError::corrupt_record("unread count").is_client_visible());
    }

    #[test]
    fn codes_are_screaming_snake_case() {
        assert_eq!(ChatError::EditWindowExpired.code(), "EDIT_WINDOW_EXPIRED");
        assert_eq!(ChatError::not_participant("c", "u").code(), "NOT_PARTICIPANT");
    }
}
