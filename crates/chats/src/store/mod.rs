//! Persistence boundary for chats, messages, receipts and unread counters.

mod sqlite;

use async_trait::async_trait;

use crate::entities::{Chat, Message};
use crate::types::ChatResult;

pub use sqlite::SqliteChatStore;

/// Outcome of a delivery or read acknowledgement.
#[derive(Debug, Clone)]
pub struct Receipt {
    /// The message after the acknowledgement was applied.
    pub message: Message,
    /// True only for the call that actually added the recipient to the set.
    pub newly_recorded: bool,
}

/// A removed message together with its chat after pointer repair.
#[derive(Debug, Clone)]
pub struct DeletedMessage {
    pub message: Message,
    pub chat: Chat,
}

/// Chat store operations used by the realtime engine and the REST surface.
///
/// Every method is safe to call concurrently. Implementations never hold
/// in-process locks across their awaits.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Returns the existing chat for the unordered pair or creates it with zero
    /// unread counters.
    async fn create_chat(&self, user_a: &str, user_b: &str) -> ChatResult<Chat>;

    async fn get_chat(&self, chat_id: &str) -> ChatResult<Chat>;

    /// Chats containing `user_id`, most recently updated first.
    async fn list_chats(&self, user_id: &str) -> ChatResult<Vec<Chat>>;

    /// History of a chat, oldest first. Does not touch receipts.
    async fn list_messages(&self, chat_id: &str, requester: &str) -> ChatResult<Vec<Message>>;

    /// Persists a message, moves the chat's last-message pointer and bumps the
    /// unread counter of every other participant.
    async fn append_message(
        &self,
        chat_id: &str,
        sender: &str,
        text: &str,
        attachments: Vec<String>,
    ) -> ChatResult<(Message, Chat)>;

    async fn mark_delivered(&self, message_id: &str, recipient: &str) -> ChatResult<Receipt>;

    /// Records a read. A read also counts as a delivery.
    async fn mark_read(&self, message_id: &str, recipient: &str) -> ChatResult<Receipt>;

    /// Resets the caller's unread counter for the chat.
    async fn mark_chat_read(&self, chat_id: &str, user_id: &str) -> ChatResult<Chat>;

    /// Messages addressed to `user_id` that were never acknowledged as delivered.
    async fn undelivered_for(&self, user_id: &str) -> ChatResult<Vec<Message>>;

    async fn edit_message(&self, message_id: &str, editor: &str, text: &str) -> ChatResult<Message>;

    async fn delete_message(&self, message_id: &str, requester: &str) -> ChatResult<DeletedMessage>;

    /// Removes the chat with all of its messages. Returns the chat as it was.
    async fn delete_chat(&self, chat_id: &str, requester: &str) -> ChatResult<Chat>;

    /// Removes every message but keeps the chat.
    async fn clear_chat(&self, chat_id: &str, requester: &str) -> ChatResult<Chat>;
}
