use crate::error::TicketingError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    pub error: ApiErrorBody,
}

pub fn success<T>(data: T, message: impl Into<String>) -> Response
where
    T: Serialize,
{
    with_status(StatusCode::OK, data, message)
}

pub fn with_status<T>(status: StatusCode, data: T, message: impl Into<String>) -> Response
where
    T: Serialize,
{
    let body = ApiResponse {
        success: true,
        data: Some(data),
        message: Some(message.into()),
    };
    (status, Json(body)).into_response()
}

pub fn error(code: &str, message: impl Into<String>, status: StatusCode) -> Response {
    let body = ApiErrorResponse {
        success: false,
        error: ApiErrorBody {
            code: code.to_string(),
            message: message.into(),
        },
    };
    (status, Json(body)).into_response()
}

impl TicketingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TicketingError::Validation(_) | TicketingError::Csv(_) => StatusCode::BAD_REQUEST,
            TicketingError::Auth(_) => StatusCode::UNAUTHORIZED,
            TicketingError::Forbidden(_) => StatusCode::FORBIDDEN,
            TicketingError::NotFound(_) => StatusCode::NOT_FOUND,
            TicketingError::Conflict(_) | TicketingError::InsufficientFunds => StatusCode::CONFLICT,
            TicketingError::Gateway(_) => StatusCode::BAD_GATEWAY,
            TicketingError::Persistence(_)
            | TicketingError::Io(_)
            | TicketingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TicketingError::Validation(_) | TicketingError::Csv(_) => "VALIDATION_ERROR",
            TicketingError::Auth(_) => "AUTH_ERROR",
            TicketingError::Forbidden(_) => "FORBIDDEN",
            TicketingError::NotFound(_) => "NOT_FOUND",
            TicketingError::Conflict(_) => "CONFLICT",
            TicketingError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            TicketingError::Gateway(_) => "GATEWAY_ERROR",
            TicketingError::Persistence(_) => "PERSISTENCE_ERROR",
            TicketingError::Io(_) | TicketingError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show a client. Server-side failures are logged in
    /// full and reported generically.
    pub fn public_message(&self) -> String {
        match self {
            TicketingError::Validation(msg)
            | TicketingError::Auth(msg)
            | TicketingError::Forbidden(msg)
            | TicketingError::NotFound(msg)
            | TicketingError::Conflict(msg) => msg.clone(),
            TicketingError::InsufficientFunds => self.to_string(),
            TicketingError::Csv(_) => "Malformed CSV input".to_string(),
            TicketingError::Gateway(_) => "Payment provider unavailable".to_string(),
            TicketingError::Persistence(_) | TicketingError::Io(_) | TicketingError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for TicketingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }
        error(self.code(), self.public_message(), status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let conflict = TicketingError::Conflict("already checked".into());
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(conflict.code(), "CONFLICT");
        assert_eq!(conflict.public_message(), "already checked");

        let persistence = TicketingError::Persistence("disk full at /var/lib".into());
        assert_eq!(persistence.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(persistence.public_message(), "Internal server error");

        assert_eq!(TicketingError::InsufficientFunds.code(), "INSUFFICIENT_FUNDS");
        assert_eq!(
            TicketingError::Auth("missing x-user-id".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }
}
