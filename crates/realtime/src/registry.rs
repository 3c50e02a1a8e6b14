//! Live sessions per user.

use std::collections::HashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parlor_chats::UserId;

use crate::events::ServerEvent;

pub type SessionId = Uuid;

/// One live connection: its id, owner, and the sending half of its outbound queue.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    user_id: UserId,
    tx: mpsc::Sender<ServerEvent>,
}

impl SessionHandle {
    /// Create a handle with a bounded outbound queue of `buffer` events.
    /// The receiver belongs to the connection's writer task.
    pub fn new(user_id: impl Into<UserId>, buffer: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handle = Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            tx,
        };
        (handle, rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Queue an event for this connection. Returns false when the connection is
    /// gone or its queue is full; the event is dropped in both cases.
    pub fn send(&self, event: ServerEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(
                    session_id = %self.id,
                    user_id = %self.user_id,
                    event = event.kind(),
                    "outbound queue full, dropping event"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Every live session, keyed by user. A user may hold any number of sessions.
///
/// The lock is only held to copy handles in or out; sends happen on snapshots.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<UserId, Vec<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, handle: SessionHandle) {
        let mut sessions = self.sessions.write().await;
        let user_sessions = sessions.entry(handle.user_id.clone()).or_default();
        info!(
            user_id = %handle.user_id,
            session_id = %handle.id,
            open_sessions = user_sessions.len() + 1,
            "registered session"
        );
        user_sessions.push(handle);
    }

    /// Remove one session. Returns false if it was not registered.
    pub async fn unregister(&self, user_id: &str, session_id: SessionId) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(user_sessions) = sessions.get_mut(user_id) else {
            return false;
        };

        let before = user_sessions.len();
        user_sessions.retain(|handle| handle.id != session_id);
        let removed = user_sessions.len() != before;

        if user_sessions.is_empty() {
            sessions.remove(user_id);
        }

        if removed {
            info!(user_id, session_id = %session_id, "unregistered session");
        }
        removed
    }

    /// Snapshot of a user's sessions; empty when the user is offline.
    pub async fn sessions_for(&self, user_id: &str) -> Vec<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.sessions.read().await.contains_key(user_id)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.values().map(Vec::len).sum()
    }

    /// Push `event` to every session of `user_id`. Returns how many accepted it.
    pub async fn send_to_user(&self, user_id: &str, event: &ServerEvent) -> usize {
        let handles = self.sessions_for(user_id).await;
        let accepted = handles
            .iter()
            .filter(|handle| handle.send(event.clone()))
            .count();

        debug!(
            user_id,
            event = event.kind(),
            sessions = handles.len(),
            accepted,
            "pushed event to user"
        );
        accepted
    }
}
