//! In-process [`ChatStore`] for tests and local development.
//!
//! All tables sit behind one async mutex, so every trait method observes and
//! mutates a consistent snapshot just like a database transaction would.

use super::{AccountDirectory, ChatStore};
use crate::error::{AppError, AppResult, Resource};
use crate::models::{
    ordered_pair, ChatPartner, Conversation, DeletedMessage, InboxEntry, LastMessageSummary,
    Message, MessageView, NewMessage, Participant, ReadMark, Receipt, ReceiptStatus, SendOutcome,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashSet;
use std::cmp::Reverse;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

struct ConversationRow {
    conversation: Conversation,
    members: [Uuid; 2],
    last_seq: i64,
}

#[derive(Default)]
struct Tables {
    conversations: HashMap<Uuid, ConversationRow>,
    direct_pairs: HashMap<(Uuid, Uuid), Uuid>,
    participants: HashMap<(Uuid, Uuid), Participant>,
    messages: HashMap<Uuid, Message>,
    /// Message ids per conversation in sequence order
    timeline: HashMap<Uuid, Vec<Uuid>>,
    client_tokens: HashMap<(Uuid, Uuid, String), Uuid>,
    receipts: HashMap<(Uuid, Uuid), Receipt>,
}

impl Tables {
    fn last_message_summary(&self, conversation: &Conversation) -> Option<LastMessageSummary> {
        conversation
            .last_message_id
            .and_then(|id| self.messages.get(&id))
            .map(|m| LastMessageSummary {
                id: m.id,
                sender_id: m.sender_id,
                content: m.content.clone(),
                file_url: m.file_url.clone(),
                created_at: m.created_at,
            })
    }

    /// Conversations of `user_id`, most recent activity first, message-less ones last
    fn user_conversations(&self, user_id: Uuid) -> Vec<(&ConversationRow, &Participant)> {
        let mut rows: Vec<_> = self
            .conversations
            .values()
            .filter_map(|row| {
                self.participants
                    .get(&(row.conversation.id, user_id))
                    .map(|p| (row, p))
            })
            .collect();

        rows.sort_by_key(|(row, _)| {
            (
                row.conversation.last_message_at.is_none(),
                Reverse(row.conversation.last_message_at),
                Reverse(row.conversation.created_at),
            )
        });
        rows
    }

    fn unread_for(&self, conversation_id: Uuid, user_id: Uuid) -> i32 {
        self.timeline
            .get(&conversation_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.messages.get(id))
                    .filter(|m| m.sender_id != user_id)
                    .filter(|m| {
                        self.receipts
                            .get(&(m.id, user_id))
                            .is_some_and(|r| r.status != ReceiptStatus::Read)
                    })
                    .count() as i32
            })
            .unwrap_or(0)
    }
}

fn page<T>(items: impl Iterator<Item = T>, limit: i64, offset: i64) -> Vec<T> {
    items
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[derive(Default)]
pub struct InMemoryChatStore {
    inner: Mutex<Tables>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn find_or_create_direct(&self, user_a: Uuid, user_b: Uuid) -> AppResult<Conversation> {
        let pair = ordered_pair(user_a, user_b);
        let mut tables = self.inner.lock().await;

        if let Some(row) = tables
            .direct_pairs
            .get(&pair)
            .and_then(|id| tables.conversations.get(id))
        {
            return Ok(row.conversation.clone());
        }

        let conversation = Conversation {
            id: Uuid::new_v4(),
            is_group: false,
            last_message_id: None,
            last_message_at: None,
            created_at: Utc::now(),
        };
        let id = conversation.id;

        for user_id in [pair.0, pair.1] {
            tables.participants.insert(
                (id, user_id),
                Participant {
                    conversation_id: id,
                    user_id,
                    unread_count: 0,
                    last_read_at: None,
                },
            );
        }
        tables.direct_pairs.insert(pair, id);
        tables.conversations.insert(
            id,
            ConversationRow {
                conversation: conversation.clone(),
                members: [pair.0, pair.1],
                last_seq: 0,
            },
        );

        Ok(conversation)
    }

    async fn get_conversation(&self, conversation_id: Uuid) -> AppResult<Option<Conversation>> {
        let tables = self.inner.lock().await;
        Ok(tables
            .conversations
            .get(&conversation_id)
            .map(|row| row.conversation.clone()))
    }

    async fn get_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<Participant>> {
        let tables = self.inner.lock().await;
        Ok(tables
            .participants
            .get(&(conversation_id, user_id))
            .cloned())
    }

    async fn participant_ids(&self, conversation_id: Uuid) -> AppResult<Vec<Uuid>> {
        let tables = self.inner.lock().await;
        Ok(tables
            .conversations
            .get(&conversation_id)
            .map(|row| row.members.to_vec())
            .unwrap_or_default())
    }

    async fn find_message_by_client_id(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        client_msg_id: &str,
    ) -> AppResult<Option<Message>> {
        let tables = self.inner.lock().await;
        Ok(tables
            .client_tokens
            .get(&(conversation_id, sender_id, client_msg_id.to_string()))
            .and_then(|id| tables.messages.get(id))
            .cloned())
    }

    async fn insert_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        recipient_id: Uuid,
        message: &NewMessage,
    ) -> AppResult<SendOutcome> {
        let mut guard = self.inner.lock().await;
        let tables = &mut *guard;

        if let Some(token) = &message.client_msg_id {
            let existing = tables
                .client_tokens
                .get(&(conversation_id, sender_id, token.clone()))
                .and_then(|id| tables.messages.get(id));
            if let Some(existing) = existing {
                return Ok(SendOutcome::Replayed(existing.clone()));
            }
        }

        let row = tables
            .conversations
            .get_mut(&conversation_id)
            .ok_or(AppError::NotFound(Resource::Conversation))?;
        row.last_seq += 1;

        let now = Utc::now();
        let created = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content: message.content.clone(),
            file_url: message.file_url.clone(),
            client_msg_id: message.client_msg_id.clone(),
            sequence_number: row.last_seq,
            created_at: now,
        };
        row.conversation.last_message_id = Some(created.id);
        row.conversation.last_message_at = Some(now);

        for (user_id, status) in [
            (sender_id, ReceiptStatus::Read),
            (recipient_id, ReceiptStatus::Sent),
        ] {
            tables.receipts.insert(
                (created.id, user_id),
                Receipt {
                    message_id: created.id,
                    user_id,
                    status,
                    updated_at: now,
                },
            );
        }

        if let Some(p) = tables.participants.get_mut(&(conversation_id, recipient_id)) {
            p.unread_count += 1;
        }
        if let Some(token) = &created.client_msg_id {
            tables
                .client_tokens
                .insert((conversation_id, sender_id, token.clone()), created.id);
        }
        tables
            .timeline
            .entry(conversation_id)
            .or_default()
            .push(created.id);
        tables.messages.insert(created.id, created.clone());

        Ok(SendOutcome::Created(created))
    }

    async fn get_message(&self, message_id: Uuid) -> AppResult<Option<Message>> {
        let tables = self.inner.lock().await;
        Ok(tables.messages.get(&message_id).cloned())
    }

    async fn message_receipts(&self, message_id: Uuid) -> AppResult<Vec<Receipt>> {
        let tables = self.inner.lock().await;
        let Some(members) = tables
            .messages
            .get(&message_id)
            .and_then(|m| tables.conversations.get(&m.conversation_id))
            .map(|row| row.members)
        else {
            return Ok(Vec::new());
        };

        Ok(members
            .iter()
            .filter_map(|member| tables.receipts.get(&(message_id, *member)))
            .cloned()
            .collect())
    }

    async fn delete_message(
        &self,
        message_id: Uuid,
        requester_id: Uuid,
    ) -> AppResult<DeletedMessage> {
        let mut guard = self.inner.lock().await;
        let tables = &mut *guard;

        let message = tables
            .messages
            .get(&message_id)
            .ok_or(AppError::NotFound(Resource::Message))?;
        if message.sender_id != requester_id {
            return Err(AppError::Forbidden(
                "Only the sender can delete this message".into(),
            ));
        }
        let conversation_id = message.conversation_id;
        let sender_id = message.sender_id;
        let client_msg_id = message.client_msg_id.clone();

        let members = tables
            .conversations
            .get(&conversation_id)
            .map(|row| row.members)
            .unwrap_or_default();
        for user_id in members {
            let unread = tables
                .receipts
                .remove(&(message_id, user_id))
                .is_some_and(|r| r.status != ReceiptStatus::Read);
            if unread {
                if let Some(p) = tables.participants.get_mut(&(conversation_id, user_id)) {
                    p.unread_count = (p.unread_count - 1).max(0);
                }
            }
        }

        let mut was_last = false;
        if let Some(row) = tables.conversations.get_mut(&conversation_id) {
            if row.conversation.last_message_id == Some(message_id) {
                row.conversation.last_message_id = None;
                was_last = true;
            }
        }

        if let Some(token) = client_msg_id {
            tables
                .client_tokens
                .remove(&(conversation_id, sender_id, token));
        }
        if let Some(ids) = tables.timeline.get_mut(&conversation_id) {
            ids.retain(|id| *id != message_id);
        }
        tables.messages.remove(&message_id);

        Ok(DeletedMessage {
            message_id,
            conversation_id,
            sender_id,
            was_last,
        })
    }

    async fn mark_delivered(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<u64> {
        let mut guard = self.inner.lock().await;
        let tables = &mut *guard;
        let now = Utc::now();
        let mut advanced = 0;

        if let Some(ids) = tables.timeline.get(&conversation_id) {
            for id in ids {
                if let Some(receipt) = tables.receipts.get_mut(&(*id, user_id)) {
                    if let Some(next) = receipt.status.advance_to(ReceiptStatus::Delivered) {
                        receipt.status = next;
                        receipt.updated_at = now;
                        advanced += 1;
                    }
                }
            }
        }

        Ok(advanced)
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        up_to_sequence: i64,
    ) -> AppResult<ReadMark> {
        let mut guard = self.inner.lock().await;
        let tables = &mut *guard;

        if !tables.participants.contains_key(&(conversation_id, user_id)) {
            return Err(AppError::NotParticipant);
        }

        let now = Utc::now();
        let mut advanced = 0;
        if let Some(ids) = tables.timeline.get(&conversation_id) {
            for id in ids {
                let in_range = tables
                    .messages
                    .get(id)
                    .is_some_and(|m| m.sequence_number <= up_to_sequence);
                if !in_range {
                    continue;
                }
                if let Some(receipt) = tables.receipts.get_mut(&(*id, user_id)) {
                    if let Some(next) = receipt.status.advance_to(ReceiptStatus::Read) {
                        receipt.status = next;
                        receipt.updated_at = now;
                        advanced += 1;
                    }
                }
            }
        }

        let unread_count = tables.unread_for(conversation_id, user_id);
        let participant = tables
            .participants
            .get_mut(&(conversation_id, user_id))
            .ok_or(AppError::NotParticipant)?;
        participant.unread_count = unread_count;
        participant.last_read_at = Some(now);

        Ok(ReadMark {
            advanced,
            unread_count,
            read_at: now,
        })
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        before_sequence: Option<i64>,
        limit: i64,
    ) -> AppResult<Vec<MessageView>> {
        let tables = self.inner.lock().await;
        let (Some(ids), Some(row)) = (
            tables.timeline.get(&conversation_id),
            tables.conversations.get(&conversation_id),
        ) else {
            return Ok(Vec::new());
        };
        let members = row.members;

        let newest_first = ids
            .iter()
            .rev()
            .filter_map(|id| tables.messages.get(id))
            .filter(|m| before_sequence.map_or(true, |before| m.sequence_number < before))
            .map(|m| {
                let receipts: Vec<Receipt> = members
                    .iter()
                    .filter_map(|member| tables.receipts.get(&(m.id, *member)))
                    .cloned()
                    .collect();
                MessageView {
                    message: m.clone(),
                    receipts,
                }
            });

        Ok(page(newest_first, limit, 0))
    }

    async fn list_conversations(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<InboxEntry>> {
        let tables = self.inner.lock().await;
        let entries = tables
            .user_conversations(user_id)
            .into_iter()
            .map(|(row, participant)| InboxEntry {
                conversation_id: row.conversation.id,
                participant_ids: row.members.to_vec(),
                unread_count: participant.unread_count,
                last_read_at: participant.last_read_at,
                last_message_at: row.conversation.last_message_at,
                last_message: tables.last_message_summary(&row.conversation),
            });

        Ok(page(entries, limit, offset))
    }

    async fn list_partners(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<ChatPartner>> {
        let tables = self.inner.lock().await;
        let partners = tables
            .user_conversations(user_id)
            .into_iter()
            .filter(|(row, _)| !row.conversation.is_group)
            .filter_map(|(row, participant)| {
                let partner = row.members.iter().copied().find(|m| *m != user_id)?;
                Some(ChatPartner {
                    user_id: partner,
                    conversation_id: row.conversation.id,
                    unread_count: participant.unread_count,
                    last_message_at: row.conversation.last_message_at,
                    last_message: tables.last_message_summary(&row.conversation),
                })
            });

        Ok(page(partners, limit, offset))
    }
}

/// Account lookup backed by a set of known ids.
///
/// An open directory accepts every id; that is what `CHAT_STORE=memory`
/// runs with, since there is no identity table to consult.
#[derive(Default)]
pub struct InMemoryAccountDirectory {
    accounts: DashSet<Uuid>,
    open: bool,
}

impl InMemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open() -> Self {
        Self {
            accounts: DashSet::new(),
            open: true,
        }
    }

    pub fn register(&self, user_id: Uuid) {
        self.accounts.insert(user_id);
    }

    pub fn remove(&self, user_id: Uuid) {
        self.accounts.remove(&user_id);
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn account_exists(&self, user_id: Uuid) -> AppResult<bool> {
        Ok(self.open || self.accounts.contains(&user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(body: &str) -> NewMessage {
        NewMessage {
            content: Some(body.to_string()),
            ..NewMessage::default()
        }
    }

    #[tokio::test]
    async fn test_direct_conversation_is_unique_per_pair() {
        let store = InMemoryChatStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let first = store.find_or_create_direct(a, b).await.unwrap();
        let second = store.find_or_create_direct(b, a).await.unwrap();
        assert_eq!(first.id, second.id);

        let mut ids = store.participant_ids(first.id).await.unwrap();
        ids.sort();
        let (low, high) = ordered_pair(a, b);
        assert_eq!(ids, vec![low, high]);
    }

    #[tokio::test]
    async fn test_insert_creates_receipts_and_bumps_unread() {
        let store = InMemoryChatStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = store.find_or_create_direct(a, b).await.unwrap();

        let outcome = store.insert_message(conv.id, a, b, &text("hi")).await.unwrap();
        let message = outcome.message().clone();
        assert!(!outcome.is_replay());
        assert_eq!(message.sequence_number, 1);

        let page = store.list_messages(conv.id, None, 10).await.unwrap();
        let statuses: HashMap<Uuid, ReceiptStatus> = page[0]
            .receipts
            .iter()
            .map(|r| (r.user_id, r.status))
            .collect();
        assert_eq!(statuses[&a], ReceiptStatus::Read);
        assert_eq!(statuses[&b], ReceiptStatus::Sent);

        let participant = store.get_participant(conv.id, b).await.unwrap().unwrap();
        assert_eq!(participant.unread_count, 1);

        let conv = store.get_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(conv.last_message_id, Some(message.id));
    }

    #[tokio::test]
    async fn test_duplicate_token_replays() {
        let store = InMemoryChatStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = store.find_or_create_direct(a, b).await.unwrap();
        let input = NewMessage {
            content: Some("hi".into()),
            client_msg_id: Some("x1".into()),
            ..NewMessage::default()
        };

        let first = store.insert_message(conv.id, a, b, &input).await.unwrap();
        let second = store.insert_message(conv.id, a, b, &input).await.unwrap();
        assert!(second.is_replay());
        assert_eq!(first.message().id, second.message().id);

        let participant = store.get_participant(conv.id, b).await.unwrap().unwrap();
        assert_eq!(participant.unread_count, 1);
    }

    #[tokio::test]
    async fn test_delete_unread_message_decrements_unread() {
        let store = InMemoryChatStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = store.find_or_create_direct(a, b).await.unwrap();
        let first = store.insert_message(conv.id, a, b, &text("one")).await.unwrap();
        let second = store.insert_message(conv.id, a, b, &text("two")).await.unwrap();

        let deleted = store
            .delete_message(second.message().id, a)
            .await
            .unwrap();
        assert!(deleted.was_last);

        let participant = store.get_participant(conv.id, b).await.unwrap().unwrap();
        assert_eq!(participant.unread_count, 1);

        // Pointer is cleared, not recomputed to the previous message
        let conv_after = store.get_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(conv_after.last_message_id, None);
        assert!(conv_after.last_message_at.is_some());

        let not_last = store.delete_message(first.message().id, a).await.unwrap();
        assert!(!not_last.was_last);
    }

    #[tokio::test]
    async fn test_delete_requires_sender() {
        let store = InMemoryChatStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = store.find_or_create_direct(a, b).await.unwrap();
        let sent = store.insert_message(conv.id, a, b, &text("hi")).await.unwrap();

        let err = store.delete_message(sent.message().id, b).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(store.get_message(sent.message().id).await.unwrap().is_some());

        let err = store.delete_message(Uuid::new_v4(), a).await.unwrap_err();
        assert_eq!(err, AppError::NotFound(Resource::Message));
    }

    #[tokio::test]
    async fn test_mark_read_is_bounded_by_sequence() {
        let store = InMemoryChatStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = store.find_or_create_direct(a, b).await.unwrap();
        for body in ["one", "two", "three"] {
            store.insert_message(conv.id, a, b, &text(body)).await.unwrap();
        }

        let mark = store.mark_read(conv.id, b, 2).await.unwrap();
        assert_eq!(mark.advanced, 2);
        assert_eq!(mark.unread_count, 1);

        let mark = store.mark_read(conv.id, b, 3).await.unwrap();
        assert_eq!(mark.advanced, 1);
        assert_eq!(mark.unread_count, 0);

        // Already read: no-op
        let mark = store.mark_read(conv.id, b, 3).await.unwrap();
        assert_eq!(mark.advanced, 0);
        assert_eq!(store.mark_delivered(conv.id, b).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_inbox_orders_by_recency_with_empty_conversations_last() {
        let store = InMemoryChatStore::new();
        let me = Uuid::new_v4();
        let (b, c, d) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let with_b = store.find_or_create_direct(me, b).await.unwrap();
        let with_c = store.find_or_create_direct(me, c).await.unwrap();
        let empty = store.find_or_create_direct(me, d).await.unwrap();

        store.insert_message(with_c.id, c, me, &text("first")).await.unwrap();
        store.insert_message(with_b.id, me, b, &text("second")).await.unwrap();

        let inbox = store.list_conversations(me, 10, 0).await.unwrap();
        let order: Vec<Uuid> = inbox.iter().map(|e| e.conversation_id).collect();
        assert_eq!(order, vec![with_b.id, with_c.id, empty.id]);
        assert_eq!(inbox[1].unread_count, 1);
        assert!(inbox[2].last_message.is_none());

        let partners = store.list_partners(me, 1, 1).await.unwrap();
        assert_eq!(partners.len(), 1);
        assert_eq!(partners[0].user_id, c);
    }

    #[tokio::test]
    async fn test_account_directory_modes() {
        let closed = InMemoryAccountDirectory::new();
        let id = Uuid::new_v4();
        assert!(!closed.account_exists(id).await.unwrap());
        closed.register(id);
        assert!(closed.account_exists(id).await.unwrap());
        closed.remove(id);
        assert!(!closed.account_exists(id).await.unwrap());

        assert!(InMemoryAccountDirectory::open()
            .account_exists(Uuid::new_v4())
            .await
            .unwrap());
    }
}
