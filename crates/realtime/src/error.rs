use parlor_chats::ChatError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Store(#[from] ChatError),
}

impl DeliveryError {
    /// Whether the originating session should be told about the failure.
    pub fn is_client_visible(&self) -> bool {
        match self {
            DeliveryError::Store(err) => err.is_client_visible(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            DeliveryError::Store(err) => err.code(),
        }
    }
}
