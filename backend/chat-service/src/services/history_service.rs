use super::conversation_service::ConversationResolver;
use crate::error::{AppError, AppResult, Resource};
use crate::models::{ChatPartner, InboxEntry, MessageView};
use crate::store::ChatStore;
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_MESSAGE_LIMIT: i64 = 30;
pub const DEFAULT_INBOX_LIMIT: i64 = 20;
pub const DEFAULT_PARTNER_LIMIT: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

pub fn clamp_limit(limit: Option<i64>, default: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, MAX_PAGE_SIZE)
}

pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

pub struct HistoryReader {
    store: Arc<dyn ChatStore>,
    resolver: Arc<ConversationResolver>,
}

impl HistoryReader {
    pub fn new(store: Arc<dyn ChatStore>, resolver: Arc<ConversationResolver>) -> Self {
        Self { store, resolver }
    }

    /// Up to `limit` messages strictly older than `cursor`, in chronological order
    pub async fn list_messages(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        limit: Option<i64>,
        cursor: Option<Uuid>,
    ) -> AppResult<Vec<MessageView>> {
        self.resolver
            .require_participant(conversation_id, user_id)
            .await?;

        let before_sequence = match cursor {
            Some(cursor_id) => Some(
                self.store
                    .get_message(cursor_id)
                    .await?
                    .filter(|m| m.conversation_id == conversation_id)
                    .ok_or(AppError::NotFound(Resource::Message))?
                    .sequence_number,
            ),
            None => None,
        };

        let mut page = self
            .store
            .list_messages(
                conversation_id,
                before_sequence,
                clamp_limit(limit, DEFAULT_MESSAGE_LIMIT),
            )
            .await?;
        page.reverse();
        Ok(page)
    }

    pub async fn list_conversations(
        &self,
        user_id: Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> AppResult<Vec<InboxEntry>> {
        self.store
            .list_conversations(
                user_id,
                clamp_limit(limit, DEFAULT_INBOX_LIMIT),
                clamp_offset(offset),
            )
            .await
    }

    pub async fn list_partners(
        &self,
        user_id: Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> AppResult<Vec<ChatPartner>> {
        self.store
            .list_partners(
                user_id,
                clamp_limit(limit, DEFAULT_PARTNER_LIMIT),
                clamp_offset(offset),
            )
            .await
    }
}
