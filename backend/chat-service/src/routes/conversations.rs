use crate::{error::AppError, middleware::guards::User, state::AppState};
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// GET /chat/conversations
/// Inbox, most recent activity first
#[get("/conversations")]
pub async fn list_conversations(
    state: web::Data<AppState>,
    user: User,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let entries = state
        .services
        .history
        .list_conversations(user.id, query.limit, query.offset)
        .await?;
    Ok(HttpResponse::Ok().json(entries))
}

/// GET /chat/partners
#[get("/partners")]
pub async fn list_partners(
    state: web::Data<AppState>,
    user: User,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let partners = state
        .services
        .history
        .list_partners(user.id, query.limit, query.offset)
        .await?;
    Ok(HttpResponse::Ok().json(partners))
}

/// POST /chat/conversations/{id}/delivered
#[post("/conversations/{id}/delivered")]
pub async fn mark_delivered(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let outcome = state
        .services
        .receipts
        .mark_delivered(path.into_inner(), user.id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true, "advanced": outcome.advanced })))
}
