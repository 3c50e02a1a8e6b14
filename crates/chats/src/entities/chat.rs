use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{ChatId, MessageId, UserId};

/// A conversation among a fixed, ordered set of participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[serde(rename = "_id")]
    pub id: ChatId,
    pub participants: Vec<UserId>,
    pub last_message: Option<MessageId>,
    /// Unread messages per participant. A missing entry reads as zero.
    pub unread_count: BTreeMap<UserId, u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    /// Participants other than `user_id`, in chat order.
    pub fn others<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a UserId> + 'a {
        self.participants.iter().filter(move |p| p.as_str() != user_id)
    }

    pub fn unread_for(&self, user_id: &str) -> u32 {
        self.unread_count.get(user_id).copied().unwrap_or(0)
    }

    /// Key identifying the unordered pair of a two-party chat.
    pub fn pair_key(a: &str, b: &str) -> String {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        format!("{}:{}{}", low.len(), low, high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Chat {
        let now = Utc::now();
        Chat {
            id: "c1".into(),
            participants: vec!["alice".into(), "bob".into()],
            last_message: None,
            unread_count: BTreeMap::from([("bob".to_string(), 3)]),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn participant_helpers() {
        let chat = sample();
        assert!(chat.is_participant("alice"));
        assert!(!chat.is_participant("carol"));
        assert_eq!(chat.others("alice").collect::<Vec<_>>(), vec!["bob"]);
        assert_eq!(chat.unread_for("bob"), 3);
        assert_eq!(chat.unread_for("alice"), 0);
    }

    #[test]
    fn pair_key_is_order_independent_and_unambiguous() {
        assert_eq!(Chat::pair_key("a", "b"), Chat::pair_key("b", "a"));
        assert_ne!(Chat::pair_key("a:b", "c"), Chat::pair_key("a", "b:c"));
    }

    #[test]
    fn serializes_with_client_field_names() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["_id"], "c1");
        assert!(value["lastMessage"].is_null());
        assert_eq!(value["unreadCount"]["bob"], 3);
        assert!(value.get("createdAt").is_some());
        assert!(value.get("updatedAt").is_some());
    }
}
