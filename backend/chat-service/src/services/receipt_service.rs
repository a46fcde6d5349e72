use super::conversation_service::ConversationResolver;
use crate::error::{AppError, AppResult, Resource};
use crate::metrics;
use crate::models::{DeliveredOutcome, ReadOutcome};
use crate::store::ChatStore;
use crate::websocket::message_types::ServerEvent;
use crate::websocket::PresenceRegistry;
use std::sync::Arc;
use uuid::Uuid;

/// Delivered/read transitions. Both are idempotent: receipts only move
/// forward, so a repeated call advances nothing.
pub struct ReceiptTracker {
    store: Arc<dyn ChatStore>,
    resolver: Arc<ConversationResolver>,
    presence: PresenceRegistry,
}

impl ReceiptTracker {
    pub fn new(
        store: Arc<dyn ChatStore>,
        resolver: Arc<ConversationResolver>,
        presence: PresenceRegistry,
    ) -> Self {
        Self {
            store,
            resolver,
            presence,
        }
    }

    pub async fn mark_delivered(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<DeliveredOutcome> {
        self.resolver
            .require_participant(conversation_id, user_id)
            .await?;

        let advanced = self.store.mark_delivered(conversation_id, user_id).await?;

        if advanced > 0 {
            metrics::RECEIPTS_ADVANCED
                .with_label_values(&["delivered"])
                .inc_by(advanced);
            let peer = self
                .resolver
                .other_participant(conversation_id, user_id)
                .await?;
            self.presence.send_to_user(
                peer,
                &ServerEvent::ReceiptDelivered {
                    conversation_id,
                    by_user_id: user_id,
                },
            );
        }

        tracing::debug!(
            conversation_id = %conversation_id,
            user_id = %user_id,
            advanced,
            "marked delivered"
        );
        Ok(DeliveredOutcome {
            conversation_id,
            advanced,
        })
    }

    /// Read everything up to and including `message_id`
    pub async fn mark_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        message_id: Uuid,
    ) -> AppResult<ReadOutcome> {
        self.resolver
            .require_participant(conversation_id, user_id)
            .await?;

        let up_to = self
            .store
            .get_message(message_id)
            .await?
            .filter(|m| m.conversation_id == conversation_id)
            .ok_or(AppError::NotFound(Resource::Message))?;

        let mark = self
            .store
            .mark_read(conversation_id, user_id, up_to.sequence_number)
            .await?;

        if mark.advanced > 0 {
            metrics::RECEIPTS_ADVANCED
                .with_label_values(&["read"])
                .inc_by(mark.advanced);
        }

        let peer = self
            .resolver
            .other_participant(conversation_id, user_id)
            .await?;
        self.presence.send_to_user(
            peer,
            &ServerEvent::ReceiptRead {
                conversation_id,
                message_id,
                by_user_id: user_id,
            },
        );

        tracing::debug!(
            conversation_id = %conversation_id,
            user_id = %user_id,
            advanced = mark.advanced,
            unread_count = mark.unread_count,
            "marked read"
        );
        Ok(ReadOutcome {
            conversation_id,
            message_id,
            advanced: mark.advanced,
            unread_count: mark.unread_count,
            read_at: mark.read_at,
        })
    }
}
