use crate::error::{AppError, AppResult, Resource};
use crate::models::{Conversation, Participant};
use crate::store::ChatStore;
use std::sync::Arc;
use uuid::Uuid;

/// Finds or creates the one-to-one conversation of a pair and answers
/// membership questions about it.
pub struct ConversationResolver {
    store: Arc<dyn ChatStore>,
}

impl ConversationResolver {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, user_a: Uuid, user_b: Uuid) -> AppResult<Conversation> {
        if user_a == user_b {
            return Err(AppError::InvalidInput("Cannot chat with self".into()));
        }

        let conversation = self.store.find_or_create_direct(user_a, user_b).await?;
        tracing::debug!(
            conversation_id = %conversation.id,
            user_a = %user_a,
            user_b = %user_b,
            "conversation resolved"
        );
        Ok(conversation)
    }

    /// Participant record of `user_id`, or [`AppError::NotParticipant`]
    pub async fn require_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Participant> {
        self.store
            .get_participant(conversation_id, user_id)
            .await?
            .ok_or(AppError::NotParticipant)
    }

    /// The peer of `user_id` in a one-to-one conversation
    pub async fn other_participant(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<Uuid> {
        self.store
            .participant_ids(conversation_id)
            .await?
            .into_iter()
            .find(|id| *id != user_id)
            .ok_or(AppError::NotFound(Resource::Conversation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryChatStore;

    fn resolver() -> ConversationResolver {
        ConversationResolver::new(Arc::new(InMemoryChatStore::new()))
    }

    #[tokio::test]
    async fn test_self_chat_is_rejected() {
        let me = Uuid::new_v4();
        let err = resolver().resolve(me, me).await.unwrap_err();
        assert_eq!(err, AppError::InvalidInput("Cannot chat with self".into()));
    }

    #[tokio::test]
    async fn test_concurrent_first_contact_yields_one_conversation() {
        let resolver = Arc::new(resolver());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let forward = {
            let r = resolver.clone();
            tokio::spawn(async move { r.resolve(a, b).await })
        };
        let backward = {
            let r = resolver.clone();
            tokio::spawn(async move { r.resolve(b, a).await })
        };

        let first = forward.await.unwrap().unwrap();
        let second = backward.await.unwrap().unwrap();
        assert_eq!(first.id, second.id);
        assert!(!first.is_group);
    }

    #[tokio::test]
    async fn test_membership_helpers() {
        let resolver = resolver();
        let (a, b, outsider) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let conv = resolver.resolve(a, b).await.unwrap();

        let participant = resolver.require_participant(conv.id, a).await.unwrap();
        assert_eq!(participant.unread_count, 0);
        assert_eq!(
            resolver.require_participant(conv.id, outsider).await.unwrap_err(),
            AppError::NotParticipant
        );

        assert_eq!(resolver.other_participant(conv.id, a).await.unwrap(), b);
        assert_eq!(resolver.other_participant(conv.id, b).await.unwrap(), a);
        assert_eq!(
            resolver.other_participant(Uuid::new_v4(), a).await.unwrap_err(),
            AppError::NotFound(Resource::Conversation)
        );
    }
}
