use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// The error taxonomy surfaced to clients (spec §7). Every variant maps to
/// exactly one HTTP status; `retry_after` is only attached for `RateLimited`
/// and `Overloaded`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad input: {0}")]
    BadInput(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Capacity Gate rejection (spec §4.C/§6: "403 full"). Carries
    /// `details: {"isFull": true}` per scenario S2's expected response shape.
    #[error("Room is at capacity")]
    RoomFull,

    #[error("Gone: {0}")]
    Gone(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Rate limited")]
    RateLimited { retry_after_secs: u64 },

    #[error("Overloaded")]
    Overloaded { retry_after_secs: u64 },

    #[error("Internal server error")]
    Internal,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message, retry_after) = match &self {
            ApiError::BadInput(msg) => (StatusCode::BAD_REQUEST, "bad_input", msg.clone(), None),
            ApiError::Unauthorized => (
                StatusCode::FORBIDDEN,
                "unauthorized",
                "Missing or invalid credentials".to_string(),
                None,
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            ApiError::RoomFull => {
                return build_response_with_details(
                    StatusCode::FORBIDDEN,
                    "unauthorized",
                    "Room is at capacity".to_string(),
                    None,
                    Some(serde_json::json!({ "isFull": true })),
                );
            }
            ApiError::Gone(msg) => (StatusCode::GONE, "gone", msg.clone(), None),
            ApiError::PayloadTooLarge(msg) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                msg.clone(),
                None,
            ),
            ApiError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Rate limit exceeded".to_string(),
                Some(*retry_after_secs),
            ),
            ApiError::Overloaded { retry_after_secs } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "overloaded",
                "Server is under heavy load".to_string(),
                Some(*retry_after_secs),
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "Internal server error".to_string(),
                None,
            ),
            ApiError::Database(e) => {
                // Full detail stays server-side; constraint names and row
                // contents never leak to the client.
                tracing::error!("database error: {:?}", e);

                if let sqlx::Error::Database(ref db_err) = e {
                    if db_err.code().as_deref() == Some("23505") {
                        return build_response(
                            StatusCode::CONFLICT,
                            "conflict",
                            "A conflicting record already exists.".to_string(),
                            None,
                        );
                    }
                }

                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "A database error occurred.".to_string(),
                    None,
                )
            }
        };

        build_response(status, error_type, message, retry_after)
    }
}

fn build_response(
    status: StatusCode,
    error_type: &'static str,
    message: String,
    retry_after: Option<u64>,
) -> Response {
    build_response_with_details(status, error_type, message, retry_after, None)
}

fn build_response_with_details(
    status: StatusCode,
    error_type: &'static str,
    message: String,
    retry_after: Option<u64>,
    details: Option<serde_json::Value>,
) -> Response {
    let body = Json(ErrorResponse {
        error: error_type,
        message,
        details,
    });

    let mut response = (status, body).into_response();
    if let Some(secs) = retry_after {
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert("retry-after", value);
        }
    }
    response
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("unexpected error: {:?}", err);
        ApiError::Internal
    }
}
