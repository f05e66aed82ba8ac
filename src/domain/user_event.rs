//! Domain events reflecting user state mutations.
//!
//! Every successful create, update or delete is announced on the message
//! transport as a [`DomainEvent`]. The [`crate::bridge::EventBridge`] turns
//! those events back into session broadcasts.

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Kind of state change carried by a [`DomainEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserEventKind {
    /// A user was created.
    UserCreated,
    /// A user was updated.
    UserUpdated,
    /// A user was deleted.
    UserDeleted,
}

impl UserEventKind {
    /// Returns the wire name, also used as the transport record key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserCreated => "user_created",
            Self::UserUpdated => "user_updated",
            Self::UserDeleted => "user_deleted",
        }
    }

    /// Returns the message type broadcast to sessions for this kind.
    #[must_use]
    pub const fn broadcast_type(self) -> &'static str {
        match self {
            Self::UserCreated => "user_list_updated",
            Self::UserUpdated => "user_updated",
            Self::UserDeleted => "user_deleted",
        }
    }
}

/// Envelope exchanged over the message transport:
/// `{"type": <kind>, "payload": <any>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// What changed.
    #[serde(rename = "type")]
    pub kind: UserEventKind,
    /// Kind-specific data (the user record, or `{"user_id": …}` on delete).
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl DomainEvent {
    /// Creates an event.
    #[must_use]
    pub const fn new(kind: UserEventKind, payload: serde_json::Value) -> Self {
        Self { kind, payload }
    }

    /// Encodes the envelope as JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] if the payload cannot be serialized.
    pub fn encode(&self) -> Result<Vec<u8>, GatewayError> {
        serde_json::to_vec(self).map_err(|e| GatewayError::Transport(e.to_string()))
    }

    /// Decodes an envelope from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::EventDecodeFailed`] on malformed JSON or an
    /// unknown event kind.
    pub fn decode(bytes: &[u8]) -> Result<Self, GatewayError> {
        serde_json::from_slice(bytes).map_err(|e| GatewayError::EventDecodeFailed(e.to_string()))
    }
}
