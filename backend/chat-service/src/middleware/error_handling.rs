use crate::error::{AppError, Resource};
use actix_web::{http::StatusCode, HttpResponse};
use error_types::{error_codes, error_types as categories, ErrorResponse};

/// Map an [`AppError`] to its status, category and stable code
pub fn map_error(err: &AppError) -> (StatusCode, &'static str, &'static str) {
    match err {
        AppError::InvalidInput(_) => (
            StatusCode::BAD_REQUEST,
            categories::VALIDATION_ERROR,
            error_codes::INVALID_REQUEST,
        ),
        AppError::Unauthorized(_) => (
            StatusCode::UNAUTHORIZED,
            categories::AUTHENTICATION_ERROR,
            error_codes::TOKEN_INVALID,
        ),
        AppError::NotParticipant => (
            StatusCode::FORBIDDEN,
            categories::AUTHORIZATION_ERROR,
            error_codes::NOT_CONVERSATION_MEMBER,
        ),
        AppError::Forbidden(_) => (
            StatusCode::FORBIDDEN,
            categories::AUTHORIZATION_ERROR,
            error_codes::NOT_MESSAGE_SENDER,
        ),
        AppError::NotFound(resource) => (
            StatusCode::NOT_FOUND,
            categories::NOT_FOUND_ERROR,
            match resource {
                Resource::Conversation => error_codes::CONVERSATION_NOT_FOUND,
                Resource::Message => error_codes::MESSAGE_NOT_FOUND,
                Resource::User => error_codes::USER_NOT_FOUND,
            },
        ),
        AppError::Database(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            categories::SERVER_ERROR,
            error_codes::DATABASE_ERROR,
        ),
        AppError::Config(_) | AppError::StartServer(_) | AppError::Internal => (
            StatusCode::INTERNAL_SERVER_ERROR,
            categories::SERVER_ERROR,
            error_codes::INTERNAL_SERVER_ERROR,
        ),
    }
}

pub fn into_response(err: &AppError) -> HttpResponse {
    let (status, error_type, code) = map_error(err);

    if err.is_server_error() {
        tracing::error!(error = %err, code, "request failed");
    }

    let body = ErrorResponse::new(
        status.canonical_reason().unwrap_or("Error"),
        &err.client_message(),
        status.as_u16(),
        error_type,
        code,
    );

    HttpResponse::build(status).json(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_mapping() {
        let cases = [
            (AppError::InvalidInput("bad".into()), 400, error_codes::INVALID_REQUEST),
            (AppError::NotParticipant, 403, error_codes::NOT_CONVERSATION_MEMBER),
            (
                AppError::Forbidden("Only the sender can delete this message".into()),
                403,
                error_codes::NOT_MESSAGE_SENDER,
            ),
            (
                AppError::NotFound(Resource::Message),
                404,
                error_codes::MESSAGE_NOT_FOUND,
            ),
            (AppError::Database("boom".into()), 500, error_codes::DATABASE_ERROR),
        ];

        for (err, status, code) in cases {
            let (s, _, c) = map_error(&err);
            assert_eq!(s.as_u16(), status, "{err:?}");
            assert_eq!(c, code, "{err:?}");
        }
    }

    #[test]
    fn test_database_detail_is_not_exposed() {
        let resp = into_response(&AppError::Database("password authentication failed".into()));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
