pub mod conversation_service;
pub mod history_service;
pub mod identity;
pub mod message_service;
pub mod notification;
pub mod receipt_service;

pub use conversation_service::ConversationResolver;
pub use history_service::HistoryReader;
pub use identity::{credential_from_request, IdentityGate};
pub use message_service::{MessagePipeline, SendMessageInput};
pub use notification::{LoggingNotifier, OfflineNotifier};
pub use receipt_service::ReceiptTracker;

use crate::store::{AccountDirectory, ChatStore};
use crate::websocket::PresenceRegistry;
use crypto_core::TokenVerifier;
use std::sync::Arc;

/// The chat components wired over one store and one presence registry.
/// Shared by the WebSocket sessions and the HTTP handlers.
pub struct ChatServices {
    pub identity: IdentityGate,
    pub conversations: Arc<ConversationResolver>,
    pub messages: MessagePipeline,
    pub receipts: ReceiptTracker,
    pub history: HistoryReader,
}

impl ChatServices {
    pub fn new(
        store: Arc<dyn ChatStore>,
        accounts: Arc<dyn AccountDirectory>,
        verifier: Arc<TokenVerifier>,
        presence: PresenceRegistry,
        notifier: Arc<dyn OfflineNotifier>,
    ) -> Self {
        let conversations = Arc::new(ConversationResolver::new(store.clone()));

        Self {
            identity: IdentityGate::new(verifier, accounts),
            messages: MessagePipeline::new(
                store.clone(),
                conversations.clone(),
                presence.clone(),
                notifier,
            ),
            receipts: ReceiptTracker::new(store.clone(), conversations.clone(), presence),
            history: HistoryReader::new(store, conversations.clone()),
            conversations,
        }
    }
}
