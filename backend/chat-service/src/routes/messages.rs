use crate::{
    error::AppError, middleware::guards::User, services::SendMessageInput, state::AppState,
};
use actix_web::{delete, get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    pub conversation_id: Uuid,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub cursor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
}

/// GET /chat/messages?conversationId=..&limit=..&cursorId=..
/// Chronological page strictly older than the cursor
#[get("/messages")]
pub async fn get_messages(
    state: web::Data<AppState>,
    user: User,
    query: web::Query<MessagesQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let messages = state
        .services
        .history
        .list_messages(user.id, query.conversation_id, query.limit, query.cursor_id)
        .await?;
    Ok(HttpResponse::Ok().json(messages))
}

/// POST /chat/send
/// 201 with the new message and its receipts, 200 with the original on an idempotent replay
#[post("/send")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<SendMessageInput>,
) -> Result<HttpResponse, AppError> {
    let outcome = state.services.messages.send(user.id, body.into_inner()).await?;
    let replay = outcome.is_replay();
    let view = state
        .services
        .messages
        .view(outcome.message().clone())
        .await?;

    let response = if replay {
        HttpResponse::Ok().json(view)
    } else {
        HttpResponse::Created().json(view)
    };
    Ok(response)
}

/// POST /chat/read
#[post("/read")]
pub async fn mark_read(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<MarkReadRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    state
        .services
        .receipts
        .mark_read(body.conversation_id, user.id, body.message_id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

/// DELETE /chat/messages/{id}
/// Sender only
#[delete("/messages/{id}")]
pub async fn delete_message(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let deleted = state
        .services
        .messages
        .remove(path.into_inner(), user.id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "messageId": deleted.message_id,
        "conversationId": deleted.conversation_id,
        "success": true,
    })))
}
