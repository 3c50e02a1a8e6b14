//! Notification queue publishing for new chat messages.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use parlor_chats::{ChatId, MessageId, UserId};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to encode notification: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("notification queue unavailable: {0}")]
    Queue(#[from] redis::RedisError),
}

/// Payload consumed by the notification pipeline, one per recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageNotification {
    pub action: String,
    pub action_by_user: UserId,
    pub action_on_user: UserId,
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl MessageNotification {
    pub fn new_message(
        sender: impl Into<UserId>,
        recipient: impl Into<UserId>,
        chat_id: impl Into<ChatId>,
        message_id: impl Into<MessageId>,
    ) -> Self {
        Self {
            action: "message".to_string(),
            action_by_user: sender.into(),
            action_on_user: recipient.into(),
            chat_id: chat_id.into(),
            message_id: message_id.into(),
        }
    }
}

#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, notification: &MessageNotification) -> Result<(), NotifyError>;
}

/// Used when no queue is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotificationPublisher;

#[async_trait]
impl NotificationPublisher for NoopNotificationPublisher {
    async fn publish(&self, notification: &MessageNotification) -> Result<(), NotifyError> {
        debug!(
            message_id = %notification.message_id,
            "notification queue disabled, skipping publish"
        );
        Ok(())
    }
}

/// Pushes JSON payloads onto a Redis list.
#[derive(Clone)]
pub struct RedisNotificationPublisher {
    connection: ConnectionManager,
    queue: String,
}

impl RedisNotificationPublisher {
    pub fn new(connection: ConnectionManager, queue: impl Into<String>) -> Self {
        Self {
            connection,
            queue: queue.into(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

#[async_trait]
impl NotificationPublisher for RedisNotificationPublisher {
    async fn publish(&self, notification: &MessageNotification) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(notification)?;
        let mut connection = self.connection.clone();
        connection.lpush::<_, _, ()>(&self.queue, payload).await?;
        debug!(
            queue = %self.queue,
            message_id = %notification.message_id,
            recipient = %notification.action_on_user,
            "queued message notification"
        );
        Ok(())
    }
}
