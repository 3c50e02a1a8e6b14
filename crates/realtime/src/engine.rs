//! Turns inbound client events into store mutations and fans the results out.

use std::sync::Arc;

use parlor_chats::{Chat, ChatStore, DeletedMessage, Message, Receipt, UserId};
use tracing::{debug, error, info, warn};

use crate::error::DeliveryError;
use crate::events::{ClientEvent, ServerEvent};
use crate::notify::{MessageNotification, NotificationPublisher};
use crate::registry::{SessionHandle, SessionRegistry};
use crate::typing::TypingBroadcaster;

/// Drives per-message delivery state (`sent -> delivered -> read`) and keeps
/// every connected participant informed.
///
/// Operations run on the calling connection's task and may run concurrently
/// for different connections.
#[derive(Clone)]
pub struct DeliveryEngine {
    store: Arc<dyn ChatStore>,
    registry: Arc<SessionRegistry>,
    typing: TypingBroadcaster,
    notifier: Arc<dyn NotificationPublisher>,
}

impl DeliveryEngine {
    pub fn new(
        store: Arc<dyn ChatStore>,
        registry: Arc<SessionRegistry>,
        notifier: Arc<dyn NotificationPublisher>,
    ) -> Self {
        let typing = TypingBroadcaster::new(store.clone(), registry.clone());
        Self {
            store,
            registry,
            typing,
            notifier,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.store
    }

    /// Register a freshly authenticated session and settle the user's delivery backlog.
    pub async fn open_session(&self, handle: SessionHandle) {
        let user_id = handle.user_id().to_string();
        self.registry.register(handle).await;

        if let Err(err) = self.replay_backlog(&user_id).await {
            error!(user_id = %user_id, error = %err, "failed to replay delivery backlog");
        }
    }

    pub async fn close_session(&self, handle: &SessionHandle) {
        self.registry.unregister(handle.user_id(), handle.id()).await;
    }

    /// Handle one decoded event from `origin`. Failures never propagate; the
    /// ones caused by the request are reported back to `origin` only.
    pub async fn dispatch(&self, origin: &SessionHandle, event: ClientEvent) {
        let user_id = origin.user_id();
        let kind = event.kind().to_string();

        let result = match event {
            ClientEvent::SendMessage(payload) => self
                .send_message(
                    user_id,
                    &payload.chat_id,
                    payload.text.as_deref().unwrap_or_default(),
                    payload.attachments.unwrap_or_default(),
                )
                .await
                .map(drop),
            ClientEvent::DeleteMessage(payload) => {
                self.delete_message(user_id, &payload.message_id).await.map(drop)
            }
            ClientEvent::EditMessage(payload) => self
                .edit_message(user_id, &payload.message_id, &payload.text)
                .await
                .map(drop),
            ClientEvent::Typing(payload) => self
                .broadcast_typing(user_id, &payload.chat_id, payload.is_typing)
                .await
                .map(drop),
            ClientEvent::ReadMessage(payload) => {
                self.read_message(user_id, &payload.message_id).await.map(drop)
            }
            ClientEvent::MarkChatAsRead(payload) => {
                self.mark_chat_read(origin, &payload.chat_id).await.map(drop)
            }
            ClientEvent::MessageDelivered(payload) => self
                .acknowledge_delivery(user_id, &payload.message_id)
                .await
                .map(drop),
            ClientEvent::Unknown(kind) => {
                info!(user_id, kind = %kind, "ignoring unknown event type");
                Ok(())
            }
        };

        if let Err(err) = result {
            self.report_failure(origin, &kind, err);
        }
    }

    fn report_failure(&self, origin: &SessionHandle, kind: &str, err: DeliveryError) {
        if err.is_client_visible() {
            warn!(
                user_id = origin.user_id(),
                session_id = %origin.id(),
                event = kind,
                error = %err,
                "rejected client event"
            );
            origin.send(ServerEvent::Error {
                code: err.code().to_string(),
                message: err.to_string(),
            });
            return;
        }

        match &err {
            DeliveryError::Store(parlor_chats::ChatError::ChatNotFound { .. })
            | DeliveryError::Store(parlor_chats::ChatError::MessageNotFound { .. }) => {
                warn!(user_id = origin.user_id(), event = kind, error = %err, "dropping event for missing record");
            }
            _ => {
                error!(user_id = origin.user_id(), event = kind, error = %err, "failed to handle client event");
            }
        }
    }

    /// Persist a message and deliver it to every connected participant.
    ///
    /// Recipients with at least one accepting session are marked delivered and
    /// the sender hears about each new delivery, then gets `MESSAGE_SENT`.
    pub async fn send_message(
        &self,
        sender: &str,
        chat_id: &str,
        text: &str,
        attachments: Vec<String>,
    ) -> Result<Message, DeliveryError> {
        let (message, chat) = self
            .store
            .append_message(chat_id, sender, text, attachments)
            .await?;

        self.publish_notifications(&message, &chat);

        let event = ServerEvent::NewMessage {
            message: message.clone(),
            chat: chat.clone(),
        };

        for participant in &chat.participants {
            let reached = self.registry.send_to_user(participant, &event).await;
            if participant.as_str() == sender || reached == 0 {
                continue;
            }

            match self.store.mark_delivered(&message.id, participant).await {
                Ok(receipt) if receipt.newly_recorded => {
                    self.notify_delivered(&receipt.message, participant).await;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        message_id = %message.id,
                        recipient = %participant,
                        error = %err,
                        "failed to record delivery"
                    );
                }
            }
        }

        self.registry
            .send_to_user(
                sender,
                &ServerEvent::MessageSent {
                    message_id: message.id.clone(),
                },
            )
            .await;

        info!(
            message_id = %message.id,
            chat_id = %chat.id,
            sender,
            "delivered new message"
        );
        Ok(message)
    }

    /// Mark everything owed to `user_id` as delivered and tell the senders.
    ///
    /// Only the call that actually records a delivery notifies, so repeated or
    /// concurrent replays never announce the same delivery twice.
    pub async fn replay_backlog(&self, user_id: &str) -> Result<usize, DeliveryError> {
        let backlog = self.store.undelivered_for(user_id).await?;
        let pending = backlog.len();
        let mut settled = 0;

        for message in backlog {
            match self.store.mark_delivered(&message.id, user_id).await {
                Ok(receipt) if receipt.newly_recorded => {
                    settled += 1;
                    self.notify_delivered(&receipt.message, user_id).await;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        message_id = %message.id,
                        user_id,
                        error = %err,
                        "skipping backlog message"
                    );
                }
            }
        }

        if pending > 0 {
            info!(user_id, pending, settled, "replayed delivery backlog");
        }
        Ok(settled)
    }

    /// Client confirmation that `message_id` reached `recipient`.
    pub async fn acknowledge_delivery(
        &self,
        recipient: &str,
        message_id: &str,
    ) -> Result<Receipt, DeliveryError> {
        let receipt = self.store.mark_delivered(message_id, recipient).await?;
        if receipt.newly_recorded {
            self.notify_delivered(&receipt.message, recipient).await;
        }
        Ok(receipt)
    }

    pub async fn read_message(&self, reader: &str, message_id: &str) -> Result<Receipt, DeliveryError> {
        let receipt = self.store.mark_read(message_id, reader).await?;

        if receipt.newly_recorded && receipt.message.sender != reader {
            let event = ServerEvent::MessageRead {
                message_id: receipt.message.id.clone(),
                reader_id: reader.to_string(),
                chat_id: receipt.message.chat.clone(),
            };
            self.registry
                .send_to_user(&receipt.message.sender, &event)
                .await;
        }

        debug!(message_id, reader, newly_recorded = receipt.newly_recorded, "processed read receipt");
        Ok(receipt)
    }

    pub async fn edit_message(
        &self,
        editor: &str,
        message_id: &str,
        text: &str,
    ) -> Result<Message, DeliveryError> {
        let message = self.store.edit_message(message_id, editor, text).await?;
        let chat = self.store.get_chat(&message.chat).await?;

        self.fan_out(&chat.participants, &ServerEvent::MessageEdited(message.clone()))
            .await;
        Ok(message)
    }

    pub async fn delete_message(
        &self,
        requester: &str,
        message_id: &str,
    ) -> Result<DeletedMessage, DeliveryError> {
        let deleted = self.store.delete_message(message_id, requester).await?;

        let event = ServerEvent::MessageDeleted {
            message_id: deleted.message.id.clone(),
            chat_id: deleted.chat.id.clone(),
        };
        self.fan_out(&deleted.chat.participants, &event).await;
        Ok(deleted)
    }

    /// Reset the caller's unread counter. Only the originating session is told.
    pub async fn mark_chat_read(
        &self,
        origin: &SessionHandle,
        chat_id: &str,
    ) -> Result<Chat, DeliveryError> {
        let chat = self.store.mark_chat_read(chat_id, origin.user_id()).await?;
        origin.send(ServerEvent::ChatMarkedAsRead {
            chat_id: chat.id.clone(),
            user_id: origin.user_id().to_string(),
        });
        Ok(chat)
    }

    pub async fn broadcast_typing(
        &self,
        typist: &str,
        chat_id: &str,
        is_typing: bool,
    ) -> Result<usize, DeliveryError> {
        self.typing.broadcast(typist, chat_id, is_typing).await
    }

    async fn notify_delivered(&self, message: &Message, recipient: &str) {
        let event = ServerEvent::MessageDelivered {
            message_id: message.id.clone(),
            recipient_id: recipient.to_string(),
            chat_id: message.chat.clone(),
        };
        self.registry.send_to_user(&message.sender, &event).await;
    }

    async fn fan_out(&self, participants: &[UserId], event: &ServerEvent) -> usize {
        let mut reached = 0;
        for participant in participants {
            reached += self.registry.send_to_user(participant, event).await;
        }
        reached
    }

    fn publish_notifications(&self, message: &Message, chat: &Chat) {
        for recipient in chat.others(&message.sender) {
            let notification = MessageNotification::new_message(
                message.sender.clone(),
                recipient.clone(),
                chat.id.clone(),
                message.id.clone(),
            );
            let notifier = self.notifier.clone();
            tokio::spawn(async move {
                if let Err(err) = notifier.publish(&notification).await {
                    warn!(
                        message_id = %notification.message_id,
                        recipient = %notification.action_on_user,
                        error = %err,
                        "failed to publish message notification"
                    );
                }
            });
        }
    }
}
