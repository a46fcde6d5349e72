use crate::middleware::error_handling;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use std::fmt;
use thiserror::Error;

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        error_handling::map_error(self).0
    }

    fn error_response(&self) -> HttpResponse {
        error_handling::into_response(self)
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Entity named by a Not Found rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Conversation,
    Message,
    User,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::Conversation => "Conversation",
            Resource::Message => "Message",
            Resource::User => "User",
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Not a participant")]
    NotParticipant,

    /// Caller is a participant but may not perform the action
    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(Resource),

    #[error("database error: {0}")]
    Database(String),

    #[error("internal server error")]
    Internal,
}

impl From<tokio_postgres::Error> for AppError {
    fn from(e: tokio_postgres::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::InvalidInput(e.to_string())
    }
}

impl AppError {
    /// Message safe to show the caller; store and startup failures are masked
    pub fn client_message(&self) -> String {
        match self {
            AppError::Database(_)
            | AppError::Internal
            | AppError::Config(_)
            | AppError::StartServer(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Internal
                | AppError::Config(_)
                | AppError::StartServer(_)
        )
    }
}
