//! Error types for the gateway layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use parlor_auth::AuthError;
use parlor_chats::ChatError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("access denied: {0}")]
    AuthorizationFailed(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            GatewayError::AuthorizationFailed(_) => StatusCode::FORBIDDEN,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        }

        let body = json!({
            "error": status.as_str(),
            "message": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<ChatError> for GatewayError {
    fn from(error: ChatError) -> Self {
        match error {
            ChatError::ChatNotFound { .. } | ChatError::MessageNotFound { .. } => {
                GatewayError::NotFound(error.to_string())
            }
            ChatError::NotParticipant { .. }
            | ChatError::Forbidden { .. }
            | ChatError::EditWindowExpired => GatewayError::AuthorizationFailed(error.to_string()),
            ChatError::Validation { message } => GatewayError::InvalidRequest(message),
            ChatError::StoreUnavailable(err) => GatewayError::ServiceUnavailable(err.to_string()),
            ChatError::Serialization(err) => GatewayError::InternalError(err.to_string()),
            ChatError::CorruptRecord { detail } => GatewayError::InternalError(detail),
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(error: AuthError) -> Self {
        GatewayError::AuthenticationFailed(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_errors_map_to_http_statuses() {
        let cases = [
            (ChatError::chat_not_found("c1"), StatusCode::NOT_FOUND),
            (ChatError::not_participant("c1", "u1"), StatusCode::FORBIDDEN),
            (ChatError::EditWindowExpired, StatusCode::FORBIDDEN),
            (ChatError::validation("blank"), StatusCode::BAD_REQUEST),
        ];

        for (error, status) in cases {
            assert_eq!(GatewayError::from(error).status_code(), status);
        }
    }

    #[test]
    fn auth_errors_are_unauthorized() {
        let error = GatewayError::from(AuthError::Expired);
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);
    }
}
