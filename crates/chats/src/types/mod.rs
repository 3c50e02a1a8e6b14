//! Shared types for the chat store.

pub mod errors;

pub use errors::{ChatError, ChatResult};

pub type ChatId = String;
pub type MessageId = String;
pub type UserId = String;
