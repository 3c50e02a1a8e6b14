//! Wire events exchanged over the realtime connection.
//!
//! Every frame is a JSON envelope `{"type": "...", "data": {...}}`.

use parlor_chats::{Chat, ChatId, Message, MessageId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Events pushed from the server to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerEvent {
    NewMessage {
        message: Message,
        chat: Chat,
    },

    #[serde(rename_all = "camelCase")]
    MessageSent { message_id: MessageId },

    #[serde(rename_all = "camelCase")]
    MessageDelivered {
        message_id: MessageId,
        recipient_id: UserId,
        chat_id: ChatId,
    },

    #[serde(rename_all = "camelCase")]
    MessageRead {
        message_id: MessageId,
        reader_id: UserId,
        chat_id: ChatId,
    },

    MessageEdited(Message),

    #[serde(rename_all = "camelCase")]
    MessageDeleted {
        message_id: MessageId,
        chat_id: ChatId,
    },

    #[serde(rename_all = "camelCase")]
    TypingIndicator {
        chat_id: ChatId,
        user_id: UserId,
        is_typing: bool,
    },

    #[serde(rename_all = "camelCase")]
    ChatMarkedAsRead { chat_id: ChatId, user_id: UserId },

    /// A rejected request, sent only to the session that made it.
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::NewMessage { .. } => "NEW_MESSAGE",
            ServerEvent::MessageSent { .. } => "MESSAGE_SENT",
            ServerEvent::MessageDelivered { .. } => "MESSAGE_DELIVERED",
            ServerEvent::MessageRead { .. } => "MESSAGE_READ",
            ServerEvent::MessageEdited(_) => "MESSAGE_EDITED",
            ServerEvent::MessageDeleted { .. } => "MESSAGE_DELETED",
            ServerEvent::TypingIndicator { .. } => "TYPING_INDICATOR",
            ServerEvent::ChatMarkedAsRead { .. } => "CHAT_MARKED_AS_READ",
            ServerEvent::Error { .. } => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub chat_id: ChatId,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditMessage {
    pub message_id: MessageId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typing {
    pub chat_id: ChatId,
    #[serde(default)]
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub message_id: MessageId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRef {
    pub chat_id: ChatId,
}

/// Events a client may send. Anything unrecognised decodes to `Unknown`.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    SendMessage(SendMessage),
    DeleteMessage(MessageRef),
    EditMessage(EditMessage),
    Typing(Typing),
    ReadMessage(MessageRef),
    MarkChatAsRead(ChatRef),
    MessageDelivered(MessageRef),
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not a valid envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl ClientEvent {
    /// Decode one text frame.
    pub fn decode(frame: &str) -> Result<Self, FrameError> {
        let raw: RawFrame = serde_json::from_str(frame).map_err(FrameError::Envelope)?;

        fn payload<T: serde::de::DeserializeOwned>(kind: &str, data: Value) -> Result<T, FrameError> {
            serde_json::from_value(data).map_err(|source| FrameError::Payload {
                kind: kind.to_string(),
                source,
            })
        }

        let kind = raw.kind.as_str();
        let event = match kind {
            "SEND_MESSAGE" => ClientEvent::SendMessage(payload(kind, raw.data)?),
            "DELETE_MESSAGE" => ClientEvent::DeleteMessage(payload(kind, raw.data)?),
            "EDIT_MESSAGE" => ClientEvent::EditMessage(payload(kind, raw.data)?),
            "TYPING" => ClientEvent::Typing(payload(kind, raw.data)?),
            "READ_MESSAGE" => ClientEvent::ReadMessage(payload(kind, raw.data)?),
            "MARK_CHAT_AS_READ" => ClientEvent::MarkChatAsRead(payload(kind, raw.data)?),
            "MESSAGE_DELIVERED" => ClientEvent::MessageDelivered(payload(kind, raw.data)?),
            _ => ClientEvent::Unknown(raw.kind),
        };
        Ok(event)
    }

    pub fn kind(&self) -> &str {
        match self {
            ClientEvent::SendMessage(_) => "SEND_MESSAGE",
            ClientEvent::DeleteMessage(_) => "DELETE_MESSAGE",
            ClientEvent::EditMessage(_) => "EDIT_MESSAGE",
            ClientEvent::Typing(_) => "TYPING",
            ClientEvent::ReadMessage(_) => "READ_MESSAGE",
            ClientEvent::MarkChatAsRead(_) => "MARK_CHAT_AS_READ",
            ClientEvent::MessageDelivered(_) => "MESSAGE_DELIVERED",
            ClientEvent::Unknown(kind) => kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_send_message_with_optional_fields() {
        let event = ClientEvent::decode(
            r#"{"type":"SEND_MESSAGE","data":{"chatId":"c1","text":"hi","attachments":["/uploads/messages/a.png"]}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::SendMessage(SendMessage {
                chat_id: "c1".into(),
                text: Some("hi".into()),
                attachments: Some(vec!["/uploads/messages/a.png".into()]),
            })
        );

        let bare = ClientEvent::decode(r#"{"type":"SEND_MESSAGE","data":{"chatId":"c1","text":null}}"#)
            .unwrap();
        assert!(matches!(bare, ClientEvent::SendMessage(SendMessage { text: None, attachments: None, .. })));
    }

    #[test]
    fn decodes_every_recognised_kind() {
        let frames = [
            (json!({"type":"DELETE_MESSAGE","data":{"messageId":"m"}}), "DELETE_MESSAGE"),
            (json!({"type":"EDIT_MESSAGE","data":{"messageId":"m","text":"t"}}), "EDIT_MESSAGE"),
            (json!({"type":"TYPING","data":{"chatId":"c","isTyping":true}}), "TYPING"),
            (json!({"type":"READ_MESSAGE","data":{"messageId":"m"}}), "READ_MESSAGE"),
            (json!({"type":"MARK_CHAT_AS_READ","data":{"chatId":"c"}}), "MARK_CHAT_AS_READ"),
            (json!({"type":"MESSAGE_DELIVERED","data":{"messageId":"m"}}), "MESSAGE_DELIVERED"),
        ];
        for (frame, kind) in frames {
            let event = ClientEvent::decode(&frame.to_string()).unwrap();
            assert_eq!(event.kind(), kind);
            assert!(!matches!(event, ClientEvent::Unknown(_)));
        }
    }

    #[test]
    fn unknown_kind_is_not_an_error() {
        let event = ClientEvent::decode(r#"{"type":"SUBSCRIBE","data":{}}"#).unwrap();
        assert_eq!(event, ClientEvent::Unknown("SUBSCRIBE".into()));
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!(matches!(ClientEvent::decode("not json"), Err(FrameError::Envelope(_))));
        assert!(matches!(ClientEvent::decode(r#"{"data":{}}"#), Err(FrameError::Envelope(_))));
        assert!(matches!(
            ClientEvent::decode(r#"{"type":"READ_MESSAGE","data":{}}"#),
            Err(FrameError::Payload { .. })
        ));
        assert!(matches!(
            ClientEvent::decode(r#"{"type":"EDIT_MESSAGE"}"#),
            Err(FrameError::Payload { .. })
        ));
    }

    #[test]
    fn server_events_use_envelope_shape() {
        let value = serde_json::to_value(ServerEvent::MessageDelivered {
            message_id: "m1".into(),
            recipient_id: "bob".into(),
            chat_id: "c1".into(),
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"type":"MESSAGE_DELIVERED","data":{"messageId":"m1","recipientId":"bob","chatId":"c1"}})
        );

        let typing = serde_json::to_value(ServerEvent::TypingIndicator {
            chat_id: "c1".into(),
            user_id: "alice".into(),
            is_typing: true,
        })
        .unwrap();
        assert_eq!(typing["type"], "TYPING_INDICATOR");
        assert_eq!(typing["data"]["isTyping"], true);

        let marked = serde_json::to_value(ServerEvent::ChatMarkedAsRead {
            chat_id: "c1".into(),
            user_id: "bob".into(),
        })
        .unwrap();
        assert_eq!(marked["type"], "CHAT_MARKED_AS_READ");
        assert_eq!(marked["data"]["userId"], "bob");
    }

    #[test]
    fn kind_matches_serialized_type() {
        let event = ServerEvent::MessageSent {
            message_id: "m1".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], event.kind());
        assert_eq!(value["data"]["messageId"], "m1");
    }
}
