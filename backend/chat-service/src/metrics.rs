//! Prometheus metrics for the chat service

use actix_web::{HttpResponse, Responder};
use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

pub static MESSAGES_SENT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("chat_messages_sent_total", "Messages persisted")
        .expect("Prometheus metrics registration should succeed at startup")
});

/// Sends answered with an existing message because the client token was known
pub static MESSAGE_REPLAYS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "chat_message_replays_total",
        "Idempotent send replays"
    )
    .expect("Prometheus metrics registration should succeed at startup")
});

pub static MESSAGES_DELETED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("chat_messages_deleted_total", "Messages deleted by their sender")
        .expect("Prometheus metrics registration should succeed at startup")
});

/// Receipts advanced, labeled by target state (delivered/read)
pub static RECEIPTS_ADVANCED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chat_receipts_advanced_total",
        "Receipt state transitions",
        &["state"]
    )
    .expect("Prometheus metrics registration should succeed at startup")
});

pub static WS_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("chat_ws_connections", "Open WebSocket connections")
        .expect("Prometheus metrics registration should succeed at startup")
});

pub static ONLINE_USERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "chat_online_users",
        "Users with at least one open connection"
    )
    .expect("Prometheus metrics registration should succeed at startup")
});

pub static AUTH_REJECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "chat_ws_auth_rejections_total",
        "WebSocket handshakes rejected by the identity gate"
    )
    .expect("Prometheus metrics registration should succeed at startup")
});

/// Handler that serialises Prometheus metrics in text format.
pub async fn metrics_handler() -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => HttpResponse::Ok()
            .content_type(encoder.format_type())
            .body(buffer),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}
