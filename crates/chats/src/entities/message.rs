use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{ChatId, MessageId, UserId};

/// Seconds after creation during which the sender may still edit a message.
pub const EDIT_WINDOW_SECS: i64 = 15 * 60;

pub fn edit_window() -> Duration {
    Duration::seconds(EDIT_WINDOW_SECS)
}

/// A message within a chat, with its receipt sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub chat: ChatId,
    pub sender: UserId,
    pub text: String,
    pub attachments: Vec<String>,
    pub read_by: Vec<UserId>,
    pub delivered_to: Vec<UserId>,
    pub status: MessageStatus,
    pub edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Summary of the receipt sets. Ordered, so it only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
        }
    }
}

impl From<&str> for MessageStatus {
    fn from(s: &str) -> Self {
        match s {
            "read" => MessageStatus::Read,
            "delivered" => MessageStatus::Delivered,
            _ => MessageStatus::Sent,
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Message {
    /// Whether an edit at `now` still falls inside the edit window.
    /// An age of exactly fifteen minutes is allowed.
    pub fn editable_at(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at) <= edit_window()
    }

    pub fn is_delivered_to(&self, user_id: &str) -> bool {
        self.delivered_to.iter().any(|u| u == user_id)
    }

    pub fn is_read_by(&self, user_id: &str) -> bool {
        self.read_by.iter().any(|u| u == user_id)
    }
}
