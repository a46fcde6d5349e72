use serde::{Deserialize, Serialize};

/// Unified API error body returned by every HTTP surface.
///
/// ```ignore
/// let body = ErrorResponse::new(
///     "Forbidden",
///     "Not a participant",
///     403,
///     error_types::AUTHORIZATION_ERROR,
///     error_codes::NOT_CONVERSATION_MEMBER,
/// );
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short HTTP reason phrase ("Bad Request", "Not Found", ...)
    pub error: String,

    /// Human-readable message, safe to show to end users
    pub message: String,

    /// HTTP status code
    pub status: u16,

    /// Coarse error category used by clients for routing:
    /// - "validation_error" - input validation failed
    /// - "authentication_error" - missing or invalid credential
    /// - "authorization_error" - caller may not perform the action
    /// - "not_found_error" - referenced resource does not exist
    /// - "conflict_error" - state conflict
    /// - "server_error" - internal failure
    pub error_type: String,

    /// Stable machine-readable code, e.g. "MESSAGE_NOT_FOUND"
    pub code: String,

    /// Optional extra detail (development only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// Request trace identifier for log correlation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            details: None,
            trace_id: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_trace_id(mut self, trace_id: String) -> Self {
        self.trace_id = Some(trace_id);
        self
    }
}

/// Standard error codes
pub mod error_codes {
    // Authentication
    pub const TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";
    pub const TOKEN_INVALID: &str = "TOKEN_INVALID";
    pub const TOKEN_MISSING: &str = "TOKEN_MISSING";
    pub const USER_NOT_FOUND: &str = "USER_NOT_FOUND";

    // Validation
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

    // Messaging
    pub const CONVERSATION_NOT_FOUND: &str = "CONVERSATION_NOT_FOUND";
    pub const MESSAGE_NOT_FOUND: &str = "MESSAGE_NOT_FOUND";
    pub const NOT_CONVERSATION_MEMBER: &str = "NOT_CONVERSATION_MEMBER";
    pub const NOT_MESSAGE_SENDER: &str = "NOT_MESSAGE_SENDER";

    // Database/System
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
    pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
}

/// Standard error categories
pub mod error_types {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const AUTHENTICATION_ERROR: &str = "authentication_error";
    pub const AUTHORIZATION_ERROR: &str = "authorization_error";
    pub const NOT_FOUND_ERROR: &str = "not_found_error";
    pub const CONFLICT_ERROR: &str = "conflict_error";
    pub const SERVER_ERROR: &str = "server_error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_creation() {
        let error = ErrorResponse::new(
            "Not Found",
            "Message not found",
            404,
            error_types::NOT_FOUND_ERROR,
            error_codes::MESSAGE_NOT_FOUND,
        );

        assert_eq!(error.status, 404);
        assert_eq!(error.error_type, error_types::NOT_FOUND_ERROR);
        assert_eq!(error.code, error_codes::MESSAGE_NOT_FOUND);
        assert!(error.details.is_none());
    }

    #[test]
    fn test_optional_fields_are_skipped() {
        let error = ErrorResponse::new(
            "Forbidden",
            "Not a participant",
            403,
            error_types::AUTHORIZATION_ERROR,
            error_codes::NOT_CONVERSATION_MEMBER,
        );

        let json = serde_json::to_value(&error).unwrap();
        assert!(json.get("details").is_none());
        assert!(json.get("trace_id").is_none());

        let traced = error.with_trace_id("req-1".into());
        let json = serde_json::to_value(&traced).unwrap();
        assert_eq!(json["trace_id"], "req-1");
    }
}
