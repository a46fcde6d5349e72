pub mod conversations;
pub mod messages;
pub mod wsroute;

use crate::error::AppError;
use crate::metrics::metrics_handler;
use actix_middleware::JwtAuthMiddleware;
use actix_web::{get, web, HttpResponse};
use crypto_core::TokenVerifier;
use serde_json::json;
use std::sync::Arc;

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// Register every route. The WebSocket endpoint authenticates its own
/// handshake and is registered ahead of the bearer-protected `/chat` scope.
pub fn configure(cfg: &mut web::ServiceConfig, verifier: Arc<TokenVerifier>) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::InvalidInput(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::InvalidInput(err.to_string()).into()),
    )
    .service(health)
    .route("/metrics", web::get().to(metrics_handler))
    .service(wsroute::ws_handler)
    .service(
        web::scope("/chat")
            .wrap(JwtAuthMiddleware::new(verifier))
            .service(conversations::list_conversations)
            .service(conversations::list_partners)
            .service(conversations::mark_delivered)
            .service(messages::get_messages)
            .service(messages::send_message)
            .service(messages::mark_read)
            .service(messages::delete_message),
    );
}
