//! # Message Pipeline
//!
//! Send: validate -> resolve conversation -> idempotency lookup -> one store
//! transaction (message, receipts, unread counter, last-message pointer) ->
//! fan-out to both participants. Replayed sends are answered from the store
//! and are not fanned out a second time.
//!
//! Delete: sender-only, cascades to receipts, clears the conversation's
//! last-message pointer when it pointed at the deleted message.

use super::conversation_service::ConversationResolver;
use super::notification::OfflineNotifier;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{DeletedMessage, Message, MessageView, NewMessage, SendOutcome};
use crate::store::ChatStore;
use crate::websocket::message_types::ServerEvent;
use crate::websocket::PresenceRegistry;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;
use validator::Validate;

/// Raw send request as it arrives over either transport
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageInput {
    pub receiver_id: Uuid,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub client_msg_id: Option<String>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Normalize and validate a send request
pub fn validate(input: &SendMessageInput) -> AppResult<NewMessage> {
    let message = NewMessage {
        content: trimmed(input.content.clone()),
        file_url: trimmed(input.file_url.clone()),
        client_msg_id: trimmed(input.client_msg_id.clone()),
    };

    if message.content.is_none() && message.file_url.is_none() {
        return Err(AppError::InvalidInput(
            "Message must have content or fileUrl".into(),
        ));
    }

    message.validate()?;

    if let Some(file_url) = &message.file_url {
        let secure = Url::parse(file_url)
            .map(|u| u.scheme() == "https" && u.host().is_some())
            .unwrap_or(false);
        if !secure {
            return Err(AppError::InvalidInput(
                "fileUrl must be a valid https URL".into(),
            ));
        }
    }

    Ok(message)
}

pub struct MessagePipeline {
    store: Arc<dyn ChatStore>,
    resolver: Arc<ConversationResolver>,
    presence: PresenceRegistry,
    notifier: Arc<dyn OfflineNotifier>,
}

impl MessagePipeline {
    pub fn new(
        store: Arc<dyn ChatStore>,
        resolver: Arc<ConversationResolver>,
        presence: PresenceRegistry,
        notifier: Arc<dyn OfflineNotifier>,
    ) -> Self {
        Self {
            store,
            resolver,
            presence,
            notifier,
        }
    }

    pub async fn send(&self, sender_id: Uuid, input: SendMessageInput) -> AppResult<SendOutcome> {
        let new_message = validate(&input)?;
        let receiver_id = input.receiver_id;
        let conversation = self.resolver.resolve(sender_id, receiver_id).await?;

        if let Some(token) = &new_message.client_msg_id {
            if let Some(existing) = self
                .store
                .find_message_by_client_id(conversation.id, sender_id, token)
                .await?
            {
                return Ok(self.replayed(existing));
            }
        }

        let outcome = self
            .store
            .insert_message(conversation.id, sender_id, receiver_id, &new_message)
            .await?;

        let message = match outcome {
            SendOutcome::Created(message) => message,
            SendOutcome::Replayed(message) => return Ok(self.replayed(message)),
        };

        metrics::MESSAGES_SENT.inc();
        tracing::info!(
            message_id = %message.id,
            conversation_id = %message.conversation_id,
            sender_id = %sender_id,
            sequence_number = message.sequence_number,
            "message sent"
        );

        let event = ServerEvent::ReceiveMessage(message.clone());
        self.presence.send_to_user(sender_id, &event);
        let delivered = self.presence.send_to_user(receiver_id, &event);
        if delivered == 0 {
            self.notifier.notify(receiver_id, &message).await;
        }

        Ok(SendOutcome::Created(message))
    }

    fn replayed(&self, message: Message) -> SendOutcome {
        metrics::MESSAGE_REPLAYS.inc();
        tracing::debug!(
            message_id = %message.id,
            client_msg_id = ?message.client_msg_id,
            "idempotent replay"
        );
        SendOutcome::Replayed(message)
    }

    /// Attach the current receipt states to a sent or replayed message
    pub async fn view(&self, message: Message) -> AppResult<MessageView> {
        let receipts = self.store.message_receipts(message.id).await?;
        Ok(MessageView { message, receipts })
    }

    pub async fn remove(&self, message_id: Uuid, requester_id: Uuid) -> AppResult<DeletedMessage> {
        let deleted = self.store.delete_message(message_id, requester_id).await?;
        metrics::MESSAGES_DELETED.inc();

        let event = ServerEvent::MessageDeleted {
            message_id: deleted.message_id,
            conversation_id: deleted.conversation_id,
            success: true,
        };
        for user_id in self.store.participant_ids(deleted.conversation_id).await? {
            self.presence.send_to_user(user_id, &event);
        }

        tracing::info!(
            message_id = %message_id,
            conversation_id = %deleted.conversation_id,
            was_last = deleted.was_last,
            "message deleted"
        );
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Resource;
    use crate::services::notification::LoggingNotifier;
    use crate::store::InMemoryChatStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn input(receiver_id: Uuid) -> SendMessageInput {
        SendMessageInput {
            receiver_id,
            ..SendMessageInput::default()
        }
    }

    #[test]
    fn test_validate_requires_a_body() {
        let receiver = Uuid::new_v4();
        let err = validate(&input(receiver)).unwrap_err();
        assert_eq!(
            err,
            AppError::InvalidInput("Message must have content or fileUrl".into())
        );

        let blank = SendMessageInput {
            content: Some("   ".into()),
            ..input(receiver)
        };
        assert!(validate(&blank).is_err());
    }

    #[test]
    fn test_validate_trims_and_checks_url() {
        let receiver = Uuid::new_v4();
        let ok = validate(&SendMessageInput {
            content: Some("  hello ".into()),
            file_url: Some(" https://cdn.example.com/a.png ".into()),
            client_msg_id: Some(" ".into()),
            ..input(receiver)
        })
        .unwrap();
        assert_eq!(ok.content.as_deref(), Some("hello"));
        assert_eq!(ok.file_url.as_deref(), Some("https://cdn.example.com/a.png"));
        assert_eq!(ok.client_msg_id, None);

        for bad in ["http://cdn.example.com/a.png", "not a url", "ftp://x/y"] {
            let err = validate(&SendMessageInput {
                file_url: Some(bad.into()),
                ..input(receiver)
            })
            .unwrap_err();
            assert_eq!(
                err,
                AppError::InvalidInput("fileUrl must be a valid https URL".into())
            );
        }
    }

    #[test]
    fn test_validate_enforces_lengths() {
        let receiver = Uuid::new_v4();
        let long = SendMessageInput {
            content: Some("x".repeat(4001)),
            ..input(receiver)
        };
        assert!(matches!(validate(&long), Err(AppError::InvalidInput(_))));

        let long_token = SendMessageInput {
            content: Some("hi".into()),
            client_msg_id: Some("t".repeat(101)),
            ..input(receiver)
        };
        assert!(matches!(validate(&long_token), Err(AppError::InvalidInput(_))));
    }

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<(Uuid, Uuid)>>,
    }

    #[async_trait]
    impl OfflineNotifier for RecordingNotifier {
        async fn notify(&self, recipient_id: Uuid, message: &Message) {
            self.seen.lock().unwrap().push((recipient_id, message.id));
        }
    }

    fn pipeline(
        presence: PresenceRegistry,
        notifier: Arc<dyn OfflineNotifier>,
    ) -> (MessagePipeline, Arc<InMemoryChatStore>) {
        let store = Arc::new(InMemoryChatStore::new());
        let resolver = Arc::new(ConversationResolver::new(store.clone()));
        (
            MessagePipeline::new(store.clone(), resolver, presence, notifier),
            store,
        )
    }

    #[tokio::test]
    async fn test_send_fans_out_to_both_participants() {
        let presence = PresenceRegistry::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (_, mut a_rx) = presence.register(a);
        let (_, mut b_rx) = presence.register(b);
        // drain presence.online
        let _ = a_rx.try_recv();

        let notifier = Arc::new(RecordingNotifier::default());
        let (pipeline, _) = pipeline(presence, notifier.clone());

        let outcome = pipeline
            .send(
                a,
                SendMessageInput {
                    content: Some("hi".into()),
                    ..input(b)
                },
            )
            .await
            .unwrap();
        assert!(!outcome.is_replay());

        for rx in [&mut a_rx, &mut b_rx] {
            let frame: serde_json::Value =
                serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
            assert_eq!(frame["event"], "receive_message");
            assert_eq!(frame["data"]["content"], "hi");
        }
        assert!(notifier.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_recipient_triggers_notifier() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (pipeline, _) = pipeline(PresenceRegistry::new(), notifier.clone());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let sent = pipeline
            .send(
                a,
                SendMessageInput {
                    content: Some("are you there".into()),
                    ..input(b)
                },
            )
            .await
            .unwrap();

        assert_eq!(
            *notifier.seen.lock().unwrap(),
            vec![(b, sent.message().id)]
        );
    }

    #[tokio::test]
    async fn test_replay_returns_original_without_fanout() {
        let presence = PresenceRegistry::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (_, mut b_rx) = presence.register(b);
        let (pipeline, store) = pipeline(presence, Arc::new(LoggingNotifier));

        let request = SendMessageInput {
            content: Some("hi".into()),
            client_msg_id: Some("x1".into()),
            ..input(b)
        };
        let first = pipeline.send(a, request.clone()).await.unwrap();
        let second = pipeline.send(a, request).await.unwrap();

        assert!(second.is_replay());
        assert_eq!(first.message().id, second.message().id);

        let history = store
            .list_messages(first.message().conversation_id, None, 10)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);

        // Only the first send reached b
        assert!(b_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_is_sender_only_and_notifies_both() {
        let presence = PresenceRegistry::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (pipeline, store) = pipeline(presence.clone(), Arc::new(LoggingNotifier));

        let sent = pipeline
            .send(
                a,
                SendMessageInput {
                    content: Some("oops".into()),
                    ..input(b)
                },
            )
            .await
            .unwrap()
            .into_message();

        let err = pipeline.remove(sent.id, b).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let (_, mut a_rx) = presence.register(a);
        let (_, mut b_rx) = presence.register(b);
        let _ = a_rx.try_recv();

        let deleted = pipeline.remove(sent.id, a).await.unwrap();
        assert!(deleted.was_last);

        for rx in [&mut a_rx, &mut b_rx] {
            let frame: serde_json::Value =
                serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
            assert_eq!(frame["event"], "message_deleted");
            assert_eq!(frame["data"]["success"], true);
        }

        let conv = store
            .get_conversation(sent.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conv.last_message_id, None);

        assert_eq!(
            pipeline.remove(sent.id, a).await.unwrap_err(),
            AppError::NotFound(Resource::Message)
        );
    }
}
