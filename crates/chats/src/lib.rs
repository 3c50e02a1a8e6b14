//! # Parlor Chats Crate
//!
//! Persistent state of the messaging subsystem: chats between participants,
//! their messages, per-recipient delivery and read receipts, and per-participant
//! unread counters.
//!
//! ## Architecture
//!
//! - **Entities**: `Chat` and `Message`, serialized in the shape clients expect
//! - **Store**: the `ChatStore` trait and its SQLite implementation
//! - **Types**: errors and id aliases
//! - **Clock** / **Attachments**: time source and on-disk attachment cleanup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use parlor_chats::{AttachmentStorage, ChatStore, SqliteChatStore};
//!
//! let store = SqliteChatStore::new(pool, AttachmentStorage::new("./"));
//! let chat = store.create_chat("alice", "bob").await?;
//! let (message, chat) = store.append_message(&chat.id, "alice", "hi", Vec::new()).await?;
//! ```

pub mod attachments;
pub mod clock;
pub mod entities;
pub mod store;
pub mod types;

pub use attachments::{AttachmentStorage, UPLOAD_PREFIX};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entities::{Chat, Message, MessageStatus, edit_window, EDIT_WINDOW_SECS};
pub use store::{ChatStore, DeletedMessage, Receipt, SqliteChatStore};
pub use types::{ChatError, ChatId, ChatResult, MessageId, UserId};
