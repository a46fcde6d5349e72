//! Durable chat storage
//!
//! [`ChatStore`] is the only path to persisted chat state. Every method is a
//! single atomic unit: multi-step writes (send, delete, read) either commit
//! completely or leave no trace.

use crate::error::AppResult;
use crate::models::{
    ChatPartner, Conversation, DeletedMessage, InboxEntry, Message, MessageView, NewMessage,
    Participant, ReadMark, Receipt, SendOutcome,
};
use async_trait::async_trait;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryAccountDirectory, InMemoryChatStore};
pub use postgres::{PgAccountDirectory, PgChatStore};

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Find the one-to-one conversation for the pair, creating it and both
    /// participant rows if absent. Safe under concurrent first contact.
    async fn find_or_create_direct(&self, user_a: Uuid, user_b: Uuid) -> AppResult<Conversation>;

    async fn get_conversation(&self, conversation_id: Uuid) -> AppResult<Option<Conversation>>;

    async fn get_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<Participant>>;

    async fn participant_ids(&self, conversation_id: Uuid) -> AppResult<Vec<Uuid>>;

    async fn find_message_by_client_id(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        client_msg_id: &str,
    ) -> AppResult<Option<Message>>;

    /// Insert the message, its two receipts (READ for the sender, SENT for the
    /// recipient), bump the recipient's unread counter and move the
    /// conversation's last-message pointer. Losing a client token race yields
    /// [`SendOutcome::Replayed`] with the winning message.
    async fn insert_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        recipient_id: Uuid,
        message: &NewMessage,
    ) -> AppResult<SendOutcome>;

    async fn get_message(&self, message_id: Uuid) -> AppResult<Option<Message>>;

    /// Receipts of one message ordered by user id; empty if the message is gone
    async fn message_receipts(&self, message_id: Uuid) -> AppResult<Vec<Receipt>>;

    /// Delete a message owned by `requester_id` along with its receipts.
    /// Unread counters of recipients who had not read it are decremented.
    async fn delete_message(&self, message_id: Uuid, requester_id: Uuid)
        -> AppResult<DeletedMessage>;

    /// SENT -> DELIVERED for every receipt of `user_id` in the conversation.
    /// Returns the number of receipts that advanced.
    async fn mark_delivered(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<u64>;

    /// SENT/DELIVERED -> READ for receipts of `user_id` on messages with a
    /// sequence number at or below `up_to_sequence`, then recompute the
    /// user's unread counter and stamp `last_read_at`.
    async fn mark_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        up_to_sequence: i64,
    ) -> AppResult<ReadMark>;

    /// Newest first, strictly below `before_sequence` when given
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        before_sequence: Option<i64>,
        limit: i64,
    ) -> AppResult<Vec<MessageView>>;

    /// Most recent activity first, conversations without messages last
    async fn list_conversations(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<InboxEntry>>;

    async fn list_partners(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<ChatPartner>>;
}

/// Answers whether a token subject still maps to an existing account
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn account_exists(&self, user_id: Uuid) -> AppResult<bool>;
}
