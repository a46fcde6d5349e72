//! Request guards for the authenticated HTTP surface

use crate::error::AppError;
use actix_middleware::UserId;
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};
use uuid::Uuid;

/// Authenticated caller, populated by `JwtAuthMiddleware`
#[derive(Debug, Clone, Copy)]
pub struct User {
    pub id: Uuid,
}

impl FromRequest for User {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let user_id = req.extensions().get::<UserId>().map(|u| u.0);

        ready(match user_id {
            Some(id) => Ok(User { id }),
            None => Err(AppError::Unauthorized("Missing token".into()).into()),
        })
    }
}
