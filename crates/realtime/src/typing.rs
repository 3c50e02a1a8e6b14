use std::sync::Arc;

use parlor_chats::{ChatError, ChatStore};
use tracing::debug;

use crate::error::DeliveryError;
use crate::events::ServerEvent;
use crate::registry::SessionRegistry;

/// Relays typing state to the other participants of a chat. Nothing is stored.
#[derive(Clone)]
pub struct TypingBroadcaster {
    store: Arc<dyn ChatStore>,
    registry: Arc<SessionRegistry>,
}

impl TypingBroadcaster {
    pub fn new(store: Arc<dyn ChatStore>, registry: Arc<SessionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Returns the number of sessions that accepted the indicator.
    pub async fn broadcast(
        &self,
        typist: &str,
        chat_id: &str,
        is_typing: bool,
    ) -> Result<usize, DeliveryError> {
        let chat = self.store.get_chat(chat_id).await?;
        if !chat.is_participant(typist) {
            return Err(ChatError::not_participant(chat_id, typist).into());
        }

        let event = ServerEvent::TypingIndicator {
            chat_id: chat.id.clone(),
            user_id: typist.to_string(),
            is_typing,
        };

        let mut reached = 0;
        for participant in chat.others(typist) {
            reached += self.registry.send_to_user(participant, &event).await;
        }

        debug!(chat_id, typist, is_typing, reached, "relayed typing indicator");
        Ok(reached)
    }
}
