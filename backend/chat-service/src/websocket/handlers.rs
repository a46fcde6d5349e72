//! Inbound event dispatch
//!
//! Each [`ClientEvent`] maps to exactly one handler. The returned events are
//! addressed to the calling connection; anything meant for other users goes
//! through the [`PresenceRegistry`] inside the services.

use super::message_types::{ClientEvent, ServerEvent};
use super::PresenceRegistry;
use crate::error::AppResult;
use crate::services::{ChatServices, SendMessageInput};
use uuid::Uuid;

pub async fn handle_client_event(
    services: &ChatServices,
    presence: &PresenceRegistry,
    user_id: Uuid,
    event: ClientEvent,
) -> Vec<ServerEvent> {
    match dispatch(services, presence, user_id, event).await {
        Ok(replies) => replies,
        Err(e) => {
            if e.is_server_error() {
                tracing::error!(user_id = %user_id, error = %e, "event failed");
            } else {
                tracing::debug!(user_id = %user_id, error = %e, "event rejected");
            }
            vec![ServerEvent::error(e.client_message())]
        }
    }
}

async fn dispatch(
    services: &ChatServices,
    presence: &PresenceRegistry,
    user_id: Uuid,
    event: ClientEvent,
) -> AppResult<Vec<ServerEvent>> {
    match event {
        ClientEvent::SendMessage {
            receiver_id,
            content,
            file_url,
            client_msg_id,
        } => {
            let outcome = services
                .messages
                .send(
                    user_id,
                    SendMessageInput {
                        receiver_id,
                        content,
                        file_url,
                        client_msg_id,
                    },
                )
                .await?;
            let message = outcome.into_message();
            Ok(vec![ServerEvent::MessageSent {
                success: true,
                message_id: message.id,
                client_msg_id: message.client_msg_id,
            }])
        }

        ClientEvent::GetUserHistory { limit, offset } => {
            let conversations = services
                .history
                .list_conversations(user_id, limit, offset)
                .await?;
            Ok(vec![ServerEvent::UserHistory { conversations }])
        }

        ClientEvent::GetConversation {
            user_b,
            limit,
            cursor_id,
        } => {
            let conversation = services.conversations.resolve(user_id, user_b).await?;
            let messages = services
                .history
                .list_messages(user_id, conversation.id, limit, cursor_id)
                .await?;

            // Opening the conversation delivers whatever was pending
            if let Err(e) = services
                .receipts
                .mark_delivered(conversation.id, user_id)
                .await
            {
                tracing::warn!(
                    conversation_id = %conversation.id,
                    error = %e,
                    "mark delivered on open failed"
                );
            }

            Ok(vec![ServerEvent::Conversation {
                conversation_id: conversation.id,
                user_a: user_id,
                user_b,
                messages,
            }])
        }

        ClientEvent::GetPartners { limit, offset } => {
            let partners = services
                .history
                .list_partners(user_id, limit, offset)
                .await?;
            Ok(vec![ServerEvent::PartnersList { partners }])
        }

        ClientEvent::DeleteMessage { message_id } => {
            // Both participants, caller included, get message_deleted via presence
            services.messages.remove(message_id, user_id).await?;
            Ok(Vec::new())
        }

        ClientEvent::MarkRead {
            conversation_id,
            message_id,
        } => {
            services
                .receipts
                .mark_read(conversation_id, user_id, message_id)
                .await?;
            Ok(vec![ServerEvent::ReadOk { ok: true }])
        }

        ClientEvent::MarkDelivered { conversation_id } => {
            services
                .receipts
                .mark_delivered(conversation_id, user_id)
                .await?;
            Ok(Vec::new())
        }

        ClientEvent::Typing {
            receiver_id,
            is_typing,
        } => {
            if receiver_id != user_id {
                presence.send_to_user(
                    receiver_id,
                    &ServerEvent::Typing {
                        from_user_id: user_id,
                        is_typing,
                    },
                );
            }
            Ok(Vec::new())
        }
    }
}
