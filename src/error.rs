//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the gateway. Each variant
//! maps to a specific HTTP status code and structured JSON error response,
//! and to a client-safe message for WebSocket error envelopes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::UserId;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "user not found",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`GatewayError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category          | HTTP Status                    |
/// |-----------|-------------------|--------------------------------|
/// | 1000–1999 | Validation        | 400 Bad Request / 403          |
/// | 2000–2999 | State/Not Found   | 404 Not Found / 409 Conflict   |
/// | 3000–3999 | Server            | 500 Internal Server Error      |
/// | 5000–5999 | Availability      | 503 / 504                      |
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// No user with the given identifier exists in storage.
    #[error("user not found")]
    UserNotFound(UserId),

    /// A user with the same unique fields already exists.
    #[error("user already exists")]
    DuplicateUser,

    /// Request payload failed shape or domain validation.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Submission queue stayed full, or the reply did not arrive, in time.
    #[error("request timed out")]
    Timeout,

    /// The request actor has been cancelled and accepts no more work.
    #[error("service unavailable: request actor stopped")]
    ActorStopped,

    /// Inbound session message carried a type tag with no handler.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// A domain event from the message transport could not be decoded.
    #[error("event decode failed: {0}")]
    EventDecodeFailed(String),

    /// WebSocket upgrade refused because the origin is not allowed.
    #[error("origin not allowed: {0}")]
    OriginRejected(String),

    /// Message transport (publish/subscribe) failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::ValidationFailed(_) => 1001,
            Self::UnknownMessageType(_) => 1002,
            Self::OriginRejected(_) => 1003,
            Self::UserNotFound(_) => 2001,
            Self::DuplicateUser => 2002,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::Transport(_) => 3002,
            Self::EventDecodeFailed(_) => 3003,
            Self::ActorStopped => 5001,
            Self::Timeout => 5002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationFailed(_) | Self::UnknownMessageType(_) => StatusCode::BAD_REQUEST,
            Self::OriginRejected(_) => StatusCode::FORBIDDEN,
            Self::UserNotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateUser => StatusCode::CONFLICT,
            Self::Internal(_)
            | Self::Persistence(_)
            | Self::Transport(_)
            | Self::EventDecodeFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ActorStopped => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Returns `true` for failures whose details must not reach clients.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Internal(_) | Self::Persistence(_) | Self::Transport(_) | Self::EventDecodeFailed(_)
        )
    }

    /// Message safe to show to a remote client.
    ///
    /// Server-side failures collapse to a generic `"internal error"`.
    #[must_use]
    pub fn client_message(&self) -> String {
        if self.is_internal() {
            "internal error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_internal() {
            tracing::error!(error = %self, "request failed with internal error");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.client_message(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
