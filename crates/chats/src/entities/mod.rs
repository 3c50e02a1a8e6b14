//! Domain entities, serialized in the JSON shape clients consume.

pub mod chat;
pub mod message;

pub use chat::Chat;
pub use message::{Message, MessageStatus, edit_window, EDIT_WINDOW_SECS};
