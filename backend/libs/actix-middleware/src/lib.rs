//! # Actix Middleware Library
//!
//! Middleware components shared by the chat HTTP surface
//!
//! ## Modules
//! - `jwt_auth`: bearer token authentication backed by `crypto-core`
//! - `request_id`: `x-request-id` propagation
//! - `logging`: request/response logging through `tracing`

pub mod jwt_auth;
pub mod logging;
pub mod request_id;

pub use jwt_auth::{bearer_token, AuthError, JwtAuthMiddleware, UserId};
pub use logging::Logging;
pub use request_id::{RequestId, RequestIdValue};
