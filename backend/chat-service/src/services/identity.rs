//! WebSocket handshake authentication

use crate::error::{AppError, AppResult, Resource};
use crate::store::AccountDirectory;
use actix_middleware::{bearer_token, AuthError};
use actix_web::{http::header, web, HttpRequest};
use crypto_core::TokenVerifier;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Pull the credential from the handshake.
///
/// Precedence: `X-Auth-Token` header, `token` query parameter, then
/// `Authorization: Bearer`.
pub fn credential_from_request(req: &HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get(AUTH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    from_header
        .or_else(|| {
            web::Query::<TokenQuery>::from_query(req.query_string())
                .ok()
                .and_then(|q| q.into_inner().token)
                .filter(|t| !t.trim().is_empty())
        })
        .or_else(|| {
            req.headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(bearer_token)
                .map(str::to_string)
        })
}

pub struct IdentityGate {
    verifier: Arc<TokenVerifier>,
    accounts: Arc<dyn AccountDirectory>,
}

impl IdentityGate {
    pub fn new(verifier: Arc<TokenVerifier>, accounts: Arc<dyn AccountDirectory>) -> Self {
        Self { verifier, accounts }
    }

    /// Resolve a credential to the id of an existing account
    pub async fn authenticate(&self, token: Option<&str>) -> AppResult<Uuid> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized(AuthError::MissingToken.to_string()))?;

        let user_id = self.verifier.user_id(token).map_err(|e| {
            tracing::warn!(error = %e, "handshake token rejected");
            AppError::Unauthorized(AuthError::from(e).to_string())
        })?;

        if !self.accounts.account_exists(user_id).await? {
            tracing::warn!(user_id = %user_id, "token subject has no account");
            return Err(AppError::NotFound(Resource::User));
        }

        Ok(user_id)
    }
}
