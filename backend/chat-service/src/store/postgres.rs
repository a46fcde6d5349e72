use super::{AccountDirectory, ChatStore};
use crate::error::{AppError, AppResult, Resource};
use crate::models::{
    ordered_pair, ChatPartner, Conversation, DeletedMessage, InboxEntry, LastMessageSummary,
    Message, MessageView, NewMessage, Participant, ReadMark, Receipt, ReceiptStatus, SendOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crate::db::SERVICE_NAME;
use db_pool::{acquire_with_metrics, PooledClient};
use deadpool_postgres::{Pool, Transaction};
use std::collections::HashMap;
use tokio_postgres::{GenericClient, Row};
use uuid::Uuid;

const CONVERSATION_COLUMNS: &str = "id, is_group, last_message_id, last_message_at, created_at";

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_id, content, file_url, client_msg_id, sequence_number, created_at";

/// Postgres-backed [`ChatStore`]; each multi-step method runs in one transaction
#[derive(Clone)]
pub struct PgChatStore {
    pool: Pool,
}

impl PgChatStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn client(&self) -> AppResult<PooledClient> {
        Ok(acquire_with_metrics(&self.pool, SERVICE_NAME).await?)
    }
}

/// Row lock on the conversation. Every writer takes it before touching the
/// conversation's messages, receipts or participants, so those rows are
/// always locked in the same order.
async fn lock_conversation(tx: &Transaction<'_>, conversation_id: Uuid) -> AppResult<bool> {
    let locked = tx
        .query_opt(
            "SELECT 1 FROM chat_conversations WHERE id = $1 FOR UPDATE",
            &[&conversation_id],
        )
        .await?;
    Ok(locked.is_some())
}

fn conversation_from_row(row: &Row) -> Conversation {
    Conversation {
        id: row.get("id"),
        is_group: row.get("is_group"),
        last_message_id: row.get("last_message_id"),
        last_message_at: row.get("last_message_at"),
        created_at: row.get("created_at"),
    }
}

fn message_from_row(row: &Row) -> Message {
    Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        file_url: row.get("file_url"),
        client_msg_id: row.get("client_msg_id"),
        sequence_number: row.get("sequence_number"),
        created_at: row.get("created_at"),
    }
}

fn receipt_from_row(row: &Row) -> Option<Receipt> {
    let status: String = row.get("status");
    let Some(status) = ReceiptStatus::from_db(&status) else {
        tracing::warn!(status = %status, "skipping receipt with unknown status");
        return None;
    };
    Some(Receipt {
        message_id: row.get("message_id"),
        user_id: row.get("user_id"),
        status,
        updated_at: row.get("updated_at"),
    })
}

/// Summary columns come from a LEFT JOIN and are all NULL when there is no last message
fn last_message_from_row(row: &Row) -> Option<LastMessageSummary> {
    let id: Option<Uuid> = row.get("last_id");
    let sender_id: Option<Uuid> = row.get("last_sender_id");
    let created_at: Option<DateTime<Utc>> = row.get("last_created_at");

    match (id, sender_id, created_at) {
        (Some(id), Some(sender_id), Some(created_at)) => Some(LastMessageSummary {
            id,
            sender_id,
            content: row.get("last_content"),
            file_url: row.get("last_file_url"),
            created_at,
        }),
        _ => None,
    }
}

async fn select_message_by_client_id<C: GenericClient + Sync>(
    client: &C,
    conversation_id: Uuid,
    sender_id: Uuid,
    client_msg_id: &str,
) -> AppResult<Option<Message>> {
    let row = client
        .query_opt(
            &*format!(
                "SELECT {MESSAGE_COLUMNS} FROM chat_messages
                 WHERE conversation_id = $1 AND sender_id = $2 AND client_msg_id = $3"
            ),
            &[&conversation_id, &sender_id, &client_msg_id],
        )
        .await?;
    Ok(row.as_ref().map(message_from_row))
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn find_or_create_direct(&self, user_a: Uuid, user_b: Uuid) -> AppResult<Conversation> {
        let (low, high) = ordered_pair(user_a, user_b);
        let select_existing = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM chat_conversations
             WHERE user_low = $1 AND user_high = $2 AND NOT is_group"
        );

        let mut client = self.client().await?;

        if let Some(row) = client.query_opt(select_existing.as_str(), &[&low, &high]).await? {
            return Ok(conversation_from_row(&row));
        }

        let tx = client.transaction().await?;
        let id = Uuid::new_v4();

        let inserted = tx
            .query_opt(
                &*format!(
                    "INSERT INTO chat_conversations (id, is_group, user_low, user_high)
                     VALUES ($1, FALSE, $2, $3)
                     ON CONFLICT (user_low, user_high) WHERE NOT is_group DO NOTHING
                     RETURNING {CONVERSATION_COLUMNS}"
                ),
                &[&id, &low, &high],
            )
            .await?;

        let conversation = match inserted {
            Some(row) => {
                tx.execute(
                    "INSERT INTO chat_participants (conversation_id, user_id)
                     VALUES ($1, $2), ($1, $3)",
                    &[&id, &low, &high],
                )
                .await?;
                tracing::info!(conversation_id = %id, "created direct conversation");
                conversation_from_row(&row)
            }
            None => {
                // A concurrent creator won; its row is committed and visible to this statement
                let row = tx.query_one(select_existing.as_str(), &[&low, &high]).await?;
                conversation_from_row(&row)
            }
        };

        tx.commit().await?;
        Ok(conversation)
    }

    async fn get_conversation(&self, conversation_id: Uuid) -> AppResult<Option<Conversation>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &*format!("SELECT {CONVERSATION_COLUMNS} FROM chat_conversations WHERE id = $1"),
                &[&conversation_id],
            )
            .await?;
        Ok(row.as_ref().map(conversation_from_row))
    }

    async fn get_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<Participant>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT conversation_id, user_id, unread_count, last_read_at
                 FROM chat_participants
                 WHERE conversation_id = $1 AND user_id = $2",
                &[&conversation_id, &user_id],
            )
            .await?;

        Ok(row.map(|r| Participant {
            conversation_id: r.get("conversation_id"),
            user_id: r.get("user_id"),
            unread_count: r.get("unread_count"),
            last_read_at: r.get("last_read_at"),
        }))
    }

    async fn participant_ids(&self, conversation_id: Uuid) -> AppResult<Vec<Uuid>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT user_id FROM chat_participants WHERE conversation_id = $1 ORDER BY user_id",
                &[&conversation_id],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get("user_id")).collect())
    }

    async fn find_message_by_client_id(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        client_msg_id: &str,
    ) -> AppResult<Option<Message>> {
        let client = self.client().await?;
        select_message_by_client_id(&**client, conversation_id, sender_id, client_msg_id).await
    }

    async fn insert_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        recipient_id: Uuid,
        message: &NewMessage,
    ) -> AppResult<SendOutcome> {
        let mut client = self.client().await?;
        let tx = client.transaction().await?;

        // Row lock on the conversation serializes sends and allocates the sequence number
        let seq: i64 = tx
            .query_opt(
                "UPDATE chat_conversations SET last_seq = last_seq + 1
                 WHERE id = $1
                 RETURNING last_seq",
                &[&conversation_id],
            )
            .await?
            .ok_or(AppError::NotFound(Resource::Conversation))?
            .get(0);

        if let Some(token) = message.client_msg_id.as_deref() {
            if let Some(existing) =
                select_message_by_client_id(&*tx, conversation_id, sender_id, token).await?
            {
                tx.rollback().await?;
                return Ok(SendOutcome::Replayed(existing));
            }
        }

        let id = Uuid::new_v4();
        let inserted = tx
            .query_opt(
                &*format!(
                    "INSERT INTO chat_messages
                        (id, conversation_id, sender_id, content, file_url, client_msg_id, sequence_number)
                     VALUES ($1, $2, $3, $4, $5, $6, $7)
                     ON CONFLICT (conversation_id, sender_id, client_msg_id)
                        WHERE client_msg_id IS NOT NULL DO NOTHING
                     RETURNING {MESSAGE_COLUMNS}"
                ),
                &[
                    &id,
                    &conversation_id,
                    &sender_id,
                    &message.content,
                    &message.file_url,
                    &message.client_msg_id,
                    &seq,
                ],
            )
            .await?;

        let Some(row) = inserted else {
            tx.rollback().await?;
            let token = message.client_msg_id.as_deref().ok_or(AppError::Internal)?;
            let client = self.client().await?;
            let winner =
                select_message_by_client_id(&**client, conversation_id, sender_id, token)
                    .await?
                    .ok_or(AppError::Internal)?;
            return Ok(SendOutcome::Replayed(winner));
        };
        let created = message_from_row(&row);

        tx.execute(
            "INSERT INTO chat_message_receipts (message_id, user_id, status)
             VALUES ($1, $2, 'READ'), ($1, $3, 'SENT')",
            &[&id, &sender_id, &recipient_id],
        )
        .await?;

        tx.execute(
            "UPDATE chat_participants SET unread_count = unread_count + 1
             WHERE conversation_id = $1 AND user_id = $2",
            &[&conversation_id, &recipient_id],
        )
        .await?;

        tx.execute(
            "UPDATE chat_conversations SET last_message_id = $2, last_message_at = $3
             WHERE id = $1",
            &[&conversation_id, &id, &created.created_at],
        )
        .await?;

        tx.commit().await?;
        Ok(SendOutcome::Created(created))
    }

    async fn get_message(&self, message_id: Uuid) -> AppResult<Option<Message>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &*format!("SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE id = $1"),
                &[&message_id],
            )
            .await?;
        Ok(row.as_ref().map(message_from_row))
    }

    async fn message_receipts(&self, message_id: Uuid) -> AppResult<Vec<Receipt>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT message_id, user_id, status, updated_at
                 FROM chat_message_receipts
                 WHERE message_id = $1
                 ORDER BY user_id",
                &[&message_id],
            )
            .await?;
        Ok(rows.iter().filter_map(receipt_from_row).collect())
    }

    async fn delete_message(
        &self,
        message_id: Uuid,
        requester_id: Uuid,
    ) -> AppResult<DeletedMessage> {
        let mut client = self.client().await?;
        let tx = client.transaction().await?;

        let conversation_id: Uuid = tx
            .query_opt(
                "SELECT conversation_id FROM chat_messages WHERE id = $1",
                &[&message_id],
            )
            .await?
            .ok_or(AppError::NotFound(Resource::Message))?
            .get(0);

        lock_conversation(&tx, conversation_id).await?;

        // Re-read under the lock; a concurrent delete may have won
        let sender_id: Uuid = tx
            .query_opt(
                "SELECT sender_id FROM chat_messages WHERE id = $1 FOR UPDATE",
                &[&message_id],
            )
            .await?
            .ok_or(AppError::NotFound(Resource::Message))?
            .get(0);

        if sender_id != requester_id {
            return Err(AppError::Forbidden(
                "Only the sender can delete this message".into(),
            ));
        }

        tx.execute(
            "UPDATE chat_participants p
             SET unread_count = GREATEST(p.unread_count - 1, 0)
             FROM chat_message_receipts r
             WHERE r.message_id = $1
               AND r.user_id = p.user_id
               AND p.conversation_id = $2
               AND r.status <> 'READ'",
            &[&message_id, &conversation_id],
        )
        .await?;

        let was_last = tx
            .execute(
                "UPDATE chat_conversations SET last_message_id = NULL
                 WHERE id = $1 AND last_message_id = $2",
                &[&conversation_id, &message_id],
            )
            .await?
            > 0;

        // Receipts cascade
        tx.execute("DELETE FROM chat_messages WHERE id = $1", &[&message_id])
            .await?;

        tx.commit().await?;

        Ok(DeletedMessage {
            message_id,
            conversation_id,
            sender_id,
            was_last,
        })
    }

    async fn mark_delivered(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<u64> {
        let mut client = self.client().await?;
        let tx = client.transaction().await?;

        if !lock_conversation(&tx, conversation_id).await? {
            return Ok(0);
        }

        let advanced = tx
            .execute(
                "UPDATE chat_message_receipts r
                 SET status = 'DELIVERED', updated_at = NOW()
                 FROM chat_messages m
                 WHERE r.message_id = m.id
                   AND m.conversation_id = $1
                   AND r.user_id = $2
                   AND r.status = 'SENT'",
                &[&conversation_id, &user_id],
            )
            .await?;

        tx.commit().await?;
        Ok(advanced)
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        up_to_sequence: i64,
    ) -> AppResult<ReadMark> {
        let mut client = self.client().await?;
        let tx = client.transaction().await?;

        if !lock_conversation(&tx, conversation_id).await? {
            return Err(AppError::NotFound(Resource::Conversation));
        }

        let advanced = tx
            .execute(
                "UPDATE chat_message_receipts r
                 SET status = 'READ', updated_at = NOW()
                 FROM chat_messages m
                 WHERE r.message_id = m.id
                   AND m.conversation_id = $1
                   AND r.user_id = $2
                   AND m.sequence_number <= $3
                   AND r.status IN ('SENT', 'DELIVERED')",
                &[&conversation_id, &user_id, &up_to_sequence],
            )
            .await?;

        let row = tx
            .query_opt(
                "UPDATE chat_participants p
                 SET unread_count = (
                        SELECT COUNT(*)
                        FROM chat_message_receipts r
                        JOIN chat_messages m ON m.id = r.message_id
                        WHERE m.conversation_id = $1
                          AND r.user_id = $2
                          AND m.sender_id <> $2
                          AND r.status <> 'READ'
                     )::INT,
                     last_read_at = NOW()
                 WHERE p.conversation_id = $1 AND p.user_id = $2
                 RETURNING unread_count, last_read_at",
                &[&conversation_id, &user_id],
            )
            .await?
            .ok_or(AppError::NotParticipant)?;

        tx.commit().await?;

        Ok(ReadMark {
            advanced,
            unread_count: row.get("unread_count"),
            read_at: row.get("last_read_at"),
        })
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        before_sequence: Option<i64>,
        limit: i64,
    ) -> AppResult<Vec<MessageView>> {
        let client = self.client().await?;

        let rows = client
            .query(
                &*format!(
                    "SELECT {MESSAGE_COLUMNS} FROM chat_messages
                     WHERE conversation_id = $1
                       AND ($2::BIGINT IS NULL OR sequence_number < $2)
                     ORDER BY sequence_number DESC
                     LIMIT $3"
                ),
                &[&conversation_id, &before_sequence, &limit],
            )
            .await?;

        let messages: Vec<Message> = rows.iter().map(message_from_row).collect();
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();
        let receipt_rows = client
            .query(
                "SELECT message_id, user_id, status, updated_at
                 FROM chat_message_receipts
                 WHERE message_id = ANY($1)
                 ORDER BY user_id",
                &[&ids],
            )
            .await?;

        let mut receipts: HashMap<Uuid, Vec<Receipt>> = HashMap::new();
        for receipt in receipt_rows.iter().filter_map(receipt_from_row) {
            receipts.entry(receipt.message_id).or_default().push(receipt);
        }

        Ok(messages
            .into_iter()
            .map(|message| MessageView {
                receipts: receipts.remove(&message.id).unwrap_or_default(),
                message,
            })
            .collect())
    }

    async fn list_conversations(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<InboxEntry>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT c.id, c.last_message_at, p.unread_count, p.last_read_at,
                        m.id AS last_id, m.sender_id AS last_sender_id, m.content AS last_content,
                        m.file_url AS last_file_url, m.created_at AS last_created_at,
                        ARRAY(
                            SELECT cp.user_id FROM chat_participants cp
                            WHERE cp.conversation_id = c.id
                            ORDER BY cp.user_id
                        ) AS participant_ids
                 FROM chat_participants p
                 JOIN chat_conversations c ON c.id = p.conversation_id
                 LEFT JOIN chat_messages m ON m.id = c.last_message_id
                 WHERE p.user_id = $1
                 ORDER BY c.last_message_at DESC NULLS LAST, c.created_at DESC
                 LIMIT $2 OFFSET $3",
                &[&user_id, &limit, &offset],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|r| InboxEntry {
                conversation_id: r.get("id"),
                participant_ids: r.get("participant_ids"),
                unread_count: r.get("unread_count"),
                last_read_at: r.get("last_read_at"),
                last_message_at: r.get("last_message_at"),
                last_message: last_message_from_row(r),
            })
            .collect())
    }

    async fn list_partners(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<ChatPartner>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT c.id, c.last_message_at, p.unread_count, o.user_id AS partner_id,
                        m.id AS last_id, m.sender_id AS last_sender_id, m.content AS last_content,
                        m.file_url AS last_file_url, m.created_at AS last_created_at
                 FROM chat_participants p
                 JOIN chat_conversations c ON c.id = p.conversation_id AND NOT c.is_group
                 JOIN chat_participants o ON o.conversation_id = c.id AND o.user_id <> p.user_id
                 LEFT JOIN chat_messages m ON m.id = c.last_message_id
                 WHERE p.user_id = $1
                 ORDER BY c.last_message_at DESC NULLS LAST, c.created_at DESC
                 LIMIT $2 OFFSET $3",
                &[&user_id, &limit, &offset],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|r| ChatPartner {
                user_id: r.get("partner_id"),
                conversation_id: r.get("id"),
                unread_count: r.get("unread_count"),
                last_message_at: r.get("last_message_at"),
                last_message: last_message_from_row(r),
            })
            .collect())
    }
}

/// Looks accounts up in the identity service's table
#[derive(Clone)]
pub struct PgAccountDirectory {
    pool: Pool,
    query: String,
}

impl PgAccountDirectory {
    /// `table` may be schema-qualified; it is interpolated, so only plain identifiers are accepted
    pub fn new(pool: Pool, table: &str) -> AppResult<Self> {
        let valid = !table.is_empty()
            && table
                .split('.')
                .all(|part| {
                    !part.is_empty()
                        && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                        && !part.starts_with(|c: char| c.is_ascii_digit())
                });
        if !valid {
            return Err(AppError::Config(format!("invalid accounts table name '{table}'")));
        }

        Ok(Self {
            pool,
            query: format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)"),
        })
    }
}

#[async_trait]
impl AccountDirectory for PgAccountDirectory {
    async fn account_exists(&self, user_id: Uuid) -> AppResult<bool> {
        let client = acquire_with_metrics(&self.pool, SERVICE_NAME).await?;
        let row = client.query_one(&self.query, &[&user_id]).await?;
        Ok(row.get(0))
    }
}
