use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::{header, StatusCode},
    Error, HttpMessage, HttpResponse, ResponseError,
};
use crypto_core::{JwtError, TokenVerifier};
use error_types::{error_codes, error_types as categories, ErrorResponse};
use futures::future::{ready, Ready};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// User ID extracted from JWT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub Uuid);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token payload")]
    InvalidPayload,
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::TokenExpired,
            JwtError::MalformedSubject => AuthError::InvalidPayload,
            _ => AuthError::InvalidToken,
        }
    }
}

impl AuthError {
    fn code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => error_codes::TOKEN_MISSING,
            AuthError::TokenExpired => error_codes::TOKEN_EXPIRED,
            AuthError::InvalidToken | AuthError::InvalidPayload => error_codes::TOKEN_INVALID,
        }
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::Unauthorized().json(ErrorResponse::new(
            "Unauthorized",
            &self.to_string(),
            401,
            categories::AUTHENTICATION_ERROR,
            self.code(),
        ))
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(value: &str) -> Option<&str> {
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// JWT Authentication Middleware
///
/// Verifies the bearer token and stores the caller's [`UserId`] in the
/// request extensions. Failures short-circuit with a 401 JSON body.
#[derive(Clone)]
pub struct JwtAuthMiddleware {
    verifier: Arc<TokenVerifier>,
}

impl JwtAuthMiddleware {
    pub fn new(verifier: Arc<TokenVerifier>) -> Self {
        Self { verifier }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = JwtAuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddlewareService {
            service: Rc::new(service),
            verifier: self.verifier.clone(),
        }))
    }
}

pub struct JwtAuthMiddlewareService<S> {
    service: Rc<S>,
    verifier: Arc<TokenVerifier>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let verifier = self.verifier.clone();

        Box::pin(async move {
            let token = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(bearer_token)
                .ok_or(AuthError::MissingToken)?;

            let user_id = verifier.user_id(token).map_err(|e| {
                tracing::warn!(path = %req.path(), "JWT validation failed: {}", e);
                AuthError::from(e)
            })?;

            req.extensions_mut().insert(UserId(user_id));

            service.call(req).await
        })
    }
}

/// FromRequest implementation for UserId
impl actix_web::FromRequest for UserId {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        match req.extensions().get::<UserId>() {
            Some(user_id) => ready(Ok(*user_id)),
            None => ready(Err(AuthError::MissingToken.into())),
        }
    }
}
