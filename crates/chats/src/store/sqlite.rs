use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::{ChatStore, DeletedMessage, Receipt};
use crate::attachments::AttachmentStorage;
use crate::clock::{Clock, SystemClock};
use crate::entities::{Chat, Message, MessageStatus};
use crate::types::{ChatError, ChatResult};

const MESSAGE_SELECT: &str = "SELECT m.id, m.chat_id, m.sender_id, m.text, m.attachments, m.status, \
     m.edited, m.edited_at, m.created_at, m.updated_at, \
     (SELECT json_group_array(d.user_id) FROM message_deliveries d WHERE d.message_id = m.id) AS delivered_to, \
     (SELECT json_group_array(r.user_id) FROM message_reads r WHERE r.message_id = m.id) AS read_by \
     FROM messages m";

/// SQLite-backed [`ChatStore`].
///
/// Write transactions open with a write statement so that concurrent writers
/// queue on the busy timeout instead of failing a lock upgrade.
#[derive(Clone)]
pub struct SqliteChatStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    attachments: AttachmentStorage,
}

impl SqliteChatStore {
    pub fn new(pool: SqlitePool, attachments: AttachmentStorage) -> Self {
        Self::with_clock(pool, attachments, Arc::new(SystemClock))
    }

    pub fn with_clock(
        pool: SqlitePool,
        attachments: AttachmentStorage,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            clock,
            attachments,
        }
    }

    // Stored timestamps carry microseconds; truncating keeps returned values
    // equal to what a later read decodes.
    fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(6)
    }

    async fn load_chat(&self, chat_id: &str) -> ChatResult<Chat> {
        let mut conn = self.pool.acquire().await?;
        fetch_chat(&mut conn, chat_id)
            .await?
            .ok_or_else(|| ChatError::chat_not_found(chat_id))
    }

    async fn load_message(&self, message_id: &str) -> ChatResult<Message> {
        let mut conn = self.pool.acquire().await?;
        fetch_message(&mut conn, message_id)
            .await?
            .ok_or_else(|| ChatError::message_not_found(message_id))
    }

    async fn participant_chat(&self, chat_id: &str, user_id: &str) -> ChatResult<Chat> {
        let chat = self.load_chat(chat_id).await?;
        if !chat.is_participant(user_id) {
            return Err(ChatError::not_participant(chat_id, user_id));
        }
        Ok(chat)
    }

    async fn ensure_participant(&self, chat_id: &str, user_id: &str) -> ChatResult<()> {
        let found = sqlx::query("SELECT 1 FROM chat_participants WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match found {
            Some(_) => Ok(()),
            None => Err(ChatError::not_participant(chat_id, user_id)),
        }
    }

    async fn chat_by_pair(&self, pair_key: &str) -> ChatResult<Option<Chat>> {
        let mut conn = self.pool.acquire().await?;
        let id: Option<String> = sqlx::query_scalar("SELECT id FROM chats WHERE pair_key = ?")
            .bind(pair_key)
            .fetch_optional(&mut *conn)
            .await?;

        match id {
            Some(id) => fetch_chat(&mut conn, &id).await,
            None => Ok(None),
        }
    }

    /// Deletes all messages of a chat inside `tx` and returns their attachment paths.
    async fn purge_messages(conn: &mut SqliteConnection, chat_id: &str) -> ChatResult<Vec<String>> {
        sqlx::query(
            "DELETE FROM message_deliveries WHERE message_id IN (SELECT id FROM messages WHERE chat_id = ?)",
        )
        .bind(chat_id)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            "DELETE FROM message_reads WHERE message_id IN (SELECT id FROM messages WHERE chat_id = ?)",
        )
        .bind(chat_id)
        .execute(&mut *conn)
        .await?;

        let rows = sqlx::query("DELETE FROM messages WHERE chat_id = ? RETURNING attachments")
            .bind(chat_id)
            .fetch_all(&mut *conn)
            .await?;

        let mut attachments = Vec::new();
        for row in rows {
            let raw: String = row.try_get("attachments")?;
            attachments.extend(serde_json::from_str::<Vec<String>>(&raw)?);
        }
        Ok(attachments)
    }
}

#[async_trait]
impl ChatStore for SqliteChatStore {
    async fn create_chat(&self, user_a: &str, user_b: &str) -> ChatResult<Chat> {
        let (user_a, user_b) = (user_a.trim(), user_b.trim());
        if user_a.is_empty() || user_b.is_empty() {
            return Err(ChatError::validation("participant ids must not be empty"));
        }
        if user_a == user_b {
            return Err(ChatError::validation(
                "a chat needs two distinct participants",
            ));
        }

        let pair_key = Chat::pair_key(user_a, user_b);
        if let Some(existing) = self.chat_by_pair(&pair_key).await? {
            debug!(chat_id = %existing.id, "chat already exists for pair");
            return Ok(existing);
        }

        let chat_id = cuid2::cuid();
        let now = format_timestamp(self.now());

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO chats (id, pair_key, last_message_id, created_at, updated_at)
             VALUES (?, ?, NULL, ?, ?)",
        )
        .bind(&chat_id)
        .bind(&pair_key)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            // Lost a race against a concurrent create for the same pair.
            tx.rollback().await?;
            return self
                .chat_by_pair(&pair_key)
                .await?
                .ok_or_else(|| ChatError::chat_not_found(pair_key));
        }

        for (position, user_id) in [user_a, user_b].into_iter().enumerate() {
            sqlx::query(
                "INSERT INTO chat_participants (chat_id, user_id, position, unread_count)
                 VALUES (?, ?, ?, 0)",
            )
            .bind(&chat_id)
            .bind(user_id)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        let chat = fetch_chat(&mut tx, &chat_id)
            .await?
            .ok_or_else(|| ChatError::chat_not_found(&chat_id))?;
        tx.commit().await?;

        info!(chat_id = %chat.id, user_a, user_b, "created new chat");
        Ok(chat)
    }

    async fn get_chat(&self, chat_id: &str) -> ChatResult<Chat> {
        self.load_chat(chat_id).await
    }

    async fn list_chats(&self, user_id: &str) -> ChatResult<Vec<Chat>> {
        let mut conn = self.pool.acquire().await?;
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT c.id FROM chats c
             JOIN chat_participants p ON p.chat_id = c.id
             WHERE p.user_id = ?
             ORDER BY c.updated_at DESC, c.rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut chats = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(chat) = fetch_chat(&mut conn, &id).await? {
                chats.push(chat);
            }
        }
        Ok(chats)
    }

    async fn list_messages(&self, chat_id: &str, requester: &str) -> ChatResult<Vec<Message>> {
        self.participant_chat(chat_id, requester).await?;

        let sql = format!("{MESSAGE_SELECT} WHERE m.chat_id = ? ORDER BY m.created_at ASC, m.rowid ASC");
        let rows = sqlx::query(&sql)
            .bind(chat_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(message_from_row).collect()
    }

    async fn append_message(
        &self,
        chat_id: &str,
        sender: &str,
        text: &str,
        attachments: Vec<String>,
    ) -> ChatResult<(Message, Chat)> {
        let attachments: Vec<String> = attachments
            .into_iter()
            .map(|path| path.trim().to_string())
            .filter(|path| !path.is_empty())
            .collect();

        if let Some(bad) = attachments
            .iter()
            .find(|path| !AttachmentStorage::is_valid_path(path))
        {
            return Err(ChatError::validation(format!(
                "attachment {bad} is not an uploaded message file"
            )));
        }

        if text.trim().is_empty() && attachments.is_empty() {
            return Err(ChatError::validation(
                "message needs text or at least one attachment",
            ));
        }

        self.participant_chat(chat_id, sender).await?;

        let message_id = cuid2::cuid();
        let created_at = self.now();
        let now = format_timestamp(created_at);
        let attachments_json = serde_json::to_string(&attachments)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO messages (id, chat_id, sender_id, text, attachments, status, edited, edited_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, NULL, ?, ?)",
        )
        .bind(&message_id)
        .bind(chat_id)
        .bind(sender)
        .bind(text)
        .bind(&attachments_json)
        .bind(MessageStatus::Sent.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE chat_participants SET unread_count = unread_count + 1
             WHERE chat_id = ? AND user_id <> ?",
        )
        .bind(chat_id)
        .bind(sender)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE chats SET last_message_id = ?, updated_at = ? WHERE id = ?")
            .bind(&message_id)
            .bind(&now)
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        let chat = fetch_chat(&mut tx, chat_id)
            .await?
            .ok_or_else(|| ChatError::chat_not_found(chat_id))?;

        tx.commit().await?;

        let message = Message {
            id: message_id,
            chat: chat_id.to_string(),
            sender: sender.to_string(),
            text: text.to_string(),
            attachments,
            read_by: Vec::new(),
            delivered_to: Vec::new(),
            status: MessageStatus::Sent,
            edited: false,
            edited_at: None,
            created_at,
            updated_at: created_at,
        };

        info!(
            message_id = %message.id,
            chat_id = %message.chat,
            sender_id = %message.sender,
            attachments = message.attachments.len(),
            "stored new message"
        );

        Ok((message, chat))
    }

    async fn mark_delivered(&self, message_id: &str, recipient: &str) -> ChatResult<Receipt> {
        let message = self.load_message(message_id).await?;
        if message.sender == recipient {
            return Ok(Receipt {
                message,
                newly_recorded: false,
            });
        }
        self.ensure_participant(&message.chat, recipient).await?;

        let now = format_timestamp(self.now());
        let mut tx = self.pool.begin().await?;
        let newly_recorded = insert_delivery(&mut tx, message_id, recipient, &now).await?;
        if newly_recorded {
            refresh_status(&mut tx, message_id, &now).await?;
        }
        tx.commit().await?;

        if !newly_recorded {
            return Ok(Receipt {
                message,
                newly_recorded,
            });
        }

        debug!(message_id, recipient, "recorded delivery");
        Ok(Receipt {
            message: self.load_message(message_id).await?,
            newly_recorded,
        })
    }

    async fn mark_read(&self, message_id: &str, recipient: &str) -> ChatResult<Receipt> {
        let message = self.load_message(message_id).await?;
        if message.sender == recipient {
            return Ok(Receipt {
                message,
                newly_recorded: false,
            });
        }
        self.ensure_participant(&message.chat, recipient).await?;

        let now = format_timestamp(self.now());
        let mut tx = self.pool.begin().await?;
        let newly_recorded = sqlx::query(
            "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at) VALUES (?, ?, ?)",
        )
        .bind(message_id)
        .bind(recipient)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;
        let newly_delivered = insert_delivery(&mut tx, message_id, recipient, &now).await?;
        if newly_recorded || newly_delivered {
            refresh_status(&mut tx, message_id, &now).await?;
        }
        tx.commit().await?;

        if !newly_recorded && !newly_delivered {
            return Ok(Receipt {
                message,
                newly_recorded,
            });
        }

        debug!(message_id, recipient, newly_recorded, "recorded read");
        Ok(Receipt {
            message: self.load_message(message_id).await?,
            newly_recorded,
        })
    }

    async fn mark_chat_read(&self, chat_id: &str, user_id: &str) -> ChatResult<Chat> {
        self.participant_chat(chat_id, user_id).await?;

        sqlx::query("UPDATE chat_participants SET unread_count = 0 WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        debug!(chat_id, user_id, "reset unread counter");
        self.load_chat(chat_id).await
    }

    async fn undelivered_for(&self, user_id: &str) -> ChatResult<Vec<Message>> {
        let sql = format!(
            "{MESSAGE_SELECT}
             JOIN chat_participants p ON p.chat_id = m.chat_id AND p.user_id = ?
             WHERE m.sender_id <> ?
               AND NOT EXISTS (
                   SELECT 1 FROM message_deliveries d WHERE d.message_id = m.id AND d.user_id = ?
               )
             ORDER BY m.created_at ASC, m.rowid ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(user_id)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(message_from_row).collect()
    }

    async fn edit_message(&self, message_id: &str, editor: &str, text: &str) -> ChatResult<Message> {
        let message = self.load_message(message_id).await?;
        if message.sender != editor {
            return Err(ChatError::forbidden("only the sender can edit a message"));
        }

        let edited_at = self.now();
        if !message.editable_at(edited_at) {
            return Err(ChatError::EditWindowExpired);
        }
        if text.trim().is_empty() {
            return Err(ChatError::validation("edited text must not be empty"));
        }

        let now = format_timestamp(edited_at);
        sqlx::query(
            "UPDATE messages SET text = ?, edited = 1, edited_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(text)
        .bind(&now)
        .bind(&now)
        .bind(message_id)
        .execute(&self.pool)
        .await?;

        info!(message_id, editor, "edited message");
        self.load_message(message_id).await
    }

    async fn delete_message(&self, message_id: &str, requester: &str) -> ChatResult<DeletedMessage> {
        let message = self.load_message(message_id).await?;
        let chat = self.load_chat(&message.chat).await?;
        if message.sender != requester && !chat.is_participant(requester) {
            return Err(ChatError::forbidden(
                "only the sender or a chat participant can delete a message",
            ));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM message_deliveries WHERE message_id = ?")
            .bind(message_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM message_reads WHERE message_id = ?")
            .bind(message_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(message_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Err(ChatError::message_not_found(message_id));
        }

        sqlx::query(
            "UPDATE chats SET last_message_id = (
                 SELECT id FROM messages WHERE chat_id = chats.id
                 ORDER BY created_at DESC, rowid DESC LIMIT 1
             )
             WHERE id = ? AND last_message_id = ?",
        )
        .bind(&message.chat)
        .bind(message_id)
        .execute(&mut *tx)
        .await?;

        let chat = fetch_chat(&mut tx, &message.chat)
            .await?
            .ok_or_else(|| ChatError::chat_not_found(&message.chat))?;

        tx.commit().await?;

        self.attachments.remove_all(&message.attachments).await;

        info!(message_id, chat_id = %chat.id, requester, "deleted message");
        Ok(DeletedMessage { message, chat })
    }

    async fn delete_chat(&self, chat_id: &str, requester: &str) -> ChatResult<Chat> {
        let chat = self.participant_chat(chat_id, requester).await?;

        let mut tx = self.pool.begin().await?;
        let attachments = Self::purge_messages(&mut tx, chat_id).await?;

        sqlx::query("DELETE FROM chat_participants WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let removed = self.attachments.remove_all(&attachments).await;
        info!(chat_id, requester, removed_files = removed, "deleted chat");
        Ok(chat)
    }

    async fn clear_chat(&self, chat_id: &str, requester: &str) -> ChatResult<Chat> {
        self.participant_chat(chat_id, requester).await?;

        let now = format_timestamp(self.now());
        let mut tx = self.pool.begin().await?;
        let attachments = Self::purge_messages(&mut tx, chat_id).await?;

        sqlx::query("UPDATE chats SET last_message_id = NULL, updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE chat_participants SET unread_count = 0 WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        let chat = fetch_chat(&mut tx, chat_id)
            .await?
            .ok_or_else(|| ChatError::chat_not_found(chat_id))?;
        tx.commit().await?;

        let removed = self.attachments.remove_all(&attachments).await;
        info!(chat_id, requester, removed_files = removed, "cleared chat");
        Ok(chat)
    }
}

/// Fixed-width UTC timestamps so that text ordering matches time ordering.
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

async fn insert_delivery(
    conn: &mut SqliteConnection,
    message_id: &str,
    user_id: &str,
    at: &str,
) -> ChatResult<bool> {
    let affected = sqlx::query(
        "INSERT OR IGNORE INTO message_deliveries (message_id, user_id, delivered_at) VALUES (?, ?, ?)",
    )
    .bind(message_id)
    .bind(user_id)
    .bind(at)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(affected == 1)
}

async fn refresh_status(conn: &mut SqliteConnection, message_id: &str, at: &str) -> ChatResult<()> {
    sqlx::query(
        "UPDATE messages SET status = CASE
             WHEN EXISTS (SELECT 1 FROM message_reads r WHERE r.message_id = messages.id) THEN 'read'
             WHEN EXISTS (SELECT 1 FROM message_deliveries d WHERE d.message_id = messages.id) THEN 'delivered'
             ELSE 'sent'
         END,
         updated_at = ?
         WHERE id = ?",
    )
    .bind(at)
    .bind(message_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn fetch_chat(conn: &mut SqliteConnection, chat_id: &str) -> ChatResult<Option<Chat>> {
    let Some(row) = sqlx::query(
        "SELECT id, last_message_id, created_at, updated_at FROM chats WHERE id = ?",
    )
    .bind(chat_id)
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };

    let members = sqlx::query(
        "SELECT user_id, unread_count FROM chat_participants WHERE chat_id = ? ORDER BY position ASC",
    )
    .bind(chat_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut participants = Vec::with_capacity(members.len());
    let mut unread_count = BTreeMap::new();
    for member in members {
        let user_id: String = member.try_get("user_id")?;
        let count: i64 = member.try_get("unread_count")?;
        let unread = u32::try_from(count).map_err(|_| {
            ChatError::corrupt_record(format!(
                "unread count {count} for {user_id} in chat {chat_id} is out of range"
            ))
        })?;
        unread_count.insert(user_id.clone(), unread);
        participants.push(user_id);
    }

    Ok(Some(Chat {
        id: row.try_get("id")?,
        participants,
        last_message: row.try_get("last_message_id")?,
        unread_count,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

async fn fetch_message(conn: &mut SqliteConnection, message_id: &str) -> ChatResult<Option<Message>> {
    let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?");
    let row = sqlx::query(&sql)
        .bind(message_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(message_from_row).transpose()
}

fn message_from_row(row: &SqliteRow) -> ChatResult<Message> {
    let attachments: String = row.try_get("attachments")?;
    let delivered_to: String = row.try_get("delivered_to")?;
    let read_by: String = row.try_get("read_by")?;
    let status: String = row.try_get("status")?;

    Ok(Message {
        id: row.try_get("id")?,
        chat: row.try_get("chat_id")?,
        sender: row.try_get("sender_id")?,
        text: row.try_get("text")?,
        attachments: serde_json::from_str(&attachments)?,
        read_by: serde_json::from_str(&read_by)?,
        delivered_to: serde_json::from_str(&delivered_to)?,
        status: MessageStatus::from(status.as_str()),
        edited: row.try_get("edited")?,
        edited_at: row.try_get("edited_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_are_fixed_width_and_sortable() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let later = early + chrono::Duration::microseconds(1500);
        let (a, b) = (format_timestamp(early), format_timestamp(later));
        assert_eq!(a, "2024-01-01T09:00:00.000000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }
}
