//! User endpoint acknowledgements.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of `DELETE /users/{id}`: `{"status": "success", "message": "user deleted"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    /// Always `"success"`.
    pub status: String,
    /// Human-readable outcome.
    pub message: String,
}

impl StatusResponse {
    /// Builds a success acknowledgement.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }
}
