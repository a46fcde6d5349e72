use crate::{config::Config, services::ChatServices, websocket::PresenceRegistry};
use crypto_core::TokenVerifier;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<ChatServices>,
    pub presence: PresenceRegistry,
    /// Also backs the HTTP bearer middleware
    pub verifier: Arc<TokenVerifier>,
    pub config: Arc<Config>,
}
