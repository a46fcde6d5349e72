use crate::models::Message;
use async_trait::async_trait;
use uuid::Uuid;

/// Hook for reaching a recipient with no live connection
#[async_trait]
pub trait OfflineNotifier: Send + Sync {
    async fn notify(&self, recipient_id: Uuid, message: &Message);
}

/// Records the missed delivery; push delivery is handled elsewhere
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl OfflineNotifier for LoggingNotifier {
    async fn notify(&self, recipient_id: Uuid, message: &Message) {
        tracing::info!(
            recipient_id = %recipient_id,
            message_id = %message.id,
            conversation_id = %message.conversation_id,
            "recipient offline, queued for push"
        );
    }
}
