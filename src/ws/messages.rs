//! WebSocket message types: inbound envelope, outbound envelope, commands.
//!
//! Clients send `{"type": <tag>, "payload": <object>}`. Every reply is
//! `{"type": "<tag>_response", "status": "success"|"error", ...}` and
//! broadcasts reuse the same outbound shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{NewUser, UserId, UserPatch};
use crate::error::GatewayError;

/// Message received from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Handler tag.
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Tag-specific payload; `null` when omitted.
    #[serde(default)]
    pub payload: Value,
}

impl InboundMessage {
    /// Creates an inbound message.
    #[must_use]
    pub fn new(msg_type: impl Into<String>, payload: Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload,
        }
    }

    /// Parses one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ValidationFailed`] if the frame is not a JSON
    /// object with a string `type`.
    pub fn decode(text: &str) -> Result<Self, GatewayError> {
        serde_json::from_str(text)
            .map_err(|e| GatewayError::ValidationFailed(format!("malformed message: {e}")))
    }
}

/// Returns the reply tag for an inbound tag.
#[must_use]
pub fn response_type(tag: &str) -> String {
    format!("{tag}_response")
}

/// Outcome marker on outbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The operation succeeded.
    Success,
    /// The operation failed; `error` carries the reason.
    Error,
}

/// Message written to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Reply or broadcast tag.
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Outcome.
    pub status: Status,
    /// Result data on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Client-safe error text on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutboundMessage {
    /// Builds a success envelope.
    #[must_use]
    pub fn success(msg_type: impl Into<String>, data: Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            status: Status::Success,
            data: Some(data),
            error: None,
        }
    }

    /// Builds an error envelope.
    #[must_use]
    pub fn error(msg_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            status: Status::Error,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Serializes the envelope for a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if serialization fails.
    pub fn to_json(&self) -> Result<String, GatewayError> {
        serde_json::to_string(self).map_err(|e| GatewayError::Internal(e.to_string()))
    }
}

/// A validated client request.
///
/// Produced from an [`InboundMessage`] by [`ClientCommand::decode`], which
/// checks the payload shape before anything reaches the request actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// `create_user`: payload is the creation fields.
    CreateUser(NewUser),
    /// `get_users`: payload ignored.
    GetUsers,
    /// `get_user`: payload `{"user_id": ..}`.
    GetUser {
        /// Target user.
        id: UserId,
    },
    /// `update_user`: payload `{"user_id": .., <fields>}`.
    UpdateUser {
        /// Target user.
        id: UserId,
        /// Fields to change.
        patch: UserPatch,
    },
    /// `delete_user`: payload `{"user_id": ..}`.
    DeleteUser {
        /// Target user.
        id: UserId,
    },
}

#[derive(Deserialize)]
struct UserRef {
    user_id: UserId,
}

#[derive(Deserialize)]
struct UpdatePayload {
    user_id: UserId,
    #[serde(flatten)]
    patch: UserPatch,
}

impl ClientCommand {
    /// Tags with a command decoder.
    pub const TAGS: [&'static str; 5] = [
        "create_user",
        "get_users",
        "get_user",
        "update_user",
        "delete_user",
    ];

    /// Decodes the payload of `message` according to its tag.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::UnknownMessageType`] for an unrecognized tag.
    /// - [`GatewayError::ValidationFailed`] if the payload has the wrong shape,
    ///   including a `user_id` that is not an integral number.
    pub fn decode(message: &InboundMessage) -> Result<Self, GatewayError> {
        let payload = match &message.payload {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other.clone(),
        };
        match message.msg_type.as_str() {
            "create_user" => Ok(Self::CreateUser(shape(payload)?)),
            "get_users" => Ok(Self::GetUsers),
            "get_user" => {
                let UserRef { user_id } = shape(payload)?;
                Ok(Self::GetUser { id: user_id })
            }
            "update_user" => {
                let UpdatePayload { user_id, patch } = shape(payload)?;
                Ok(Self::UpdateUser { id: user_id, patch })
            }
            "delete_user" => {
                let UserRef { user_id } = shape(payload)?;
                Ok(Self::DeleteUser { id: user_id })
            }
            other => Err(GatewayError::UnknownMessageType(other.to_string())),
        }
    }

    /// Returns the wire tag of this command.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::CreateUser(_) => "create_user",
            Self::GetUsers => "get_users",
            Self::GetUser { .. } => "get_user",
            Self::UpdateUser { .. } => "update_user",
            Self::DeleteUser { .. } => "delete_user",
        }
    }
}

fn shape<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T, GatewayError> {
    serde_json::from_value(payload)
        .map_err(|e| GatewayError::ValidationFailed(format!("invalid payload: {e}")))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn inbound_payload_defaults_to_null() {
        let Ok(msg) = InboundMessage::decode(r#"{"type":"get_users"}"#) else {
            panic!("decode failed");
        };
        assert_eq!(msg.msg_type, "get_users");
        assert!(msg.payload.is_null());
    }

    #[test]
    fn inbound_rejects_garbage() {
        assert!(matches!(
            InboundMessage::decode("not json"),
            Err(GatewayError::ValidationFailed(_))
        ));
        assert!(InboundMessage::decode(r#"{"payload":{}}"#).is_err());
    }

    #[test]
    fn success_envelope_omits_error() {
        let msg = OutboundMessage::success("get_users_response", json!([]));
        let Ok(text) = msg.to_json() else {
            panic!("encode failed");
        };
        assert_eq!(text, r#"{"type":"get_users_response","status":"success","data":[]}"#);
    }

    #[test]
    fn error_envelope_omits_data() {
        let msg = OutboundMessage::error("x_response", "unknown message type: x");
        let Ok(text) = msg.to_json() else {
            panic!("encode failed");
        };
        assert_eq!(
            text,
            r#"{"type":"x_response","status":"error","error":"unknown message type: x"}"#
        );
    }

    #[test]
    fn create_user_decodes_fields() {
        let msg = InboundMessage::new(
            "create_user",
            json!({"first_name":"Ann","last_name":"Lee","email":"ann@x.com","phone":"5550100","age":30,"status":"Active"}),
        );
        let Ok(ClientCommand::CreateUser(user)) = ClientCommand::decode(&msg) else {
            panic!("expected create command");
        };
        assert_eq!(user.email, "ann@x.com");
        assert_eq!(user.age, Some(30));
    }

    #[test]
    fn user_id_accepts_numeric_variants() {
        for raw in [json!(7), json!(7.0), json!("7")] {
            let msg = InboundMessage::new("delete_user", json!({ "user_id": raw }));
            let Ok(cmd) = ClientCommand::decode(&msg) else {
                panic!("decode failed for {raw}");
            };
            assert_eq!(cmd, ClientCommand::DeleteUser { id: UserId::new(7) });
        }
    }

    #[test]
    fn bad_user_id_is_validation_error() {
        for raw in [json!(7.5), json!("seven"), json!(null)] {
            let msg = InboundMessage::new("get_user", json!({ "user_id": raw }));
            assert!(matches!(
                ClientCommand::decode(&msg),
                Err(GatewayError::ValidationFailed(_))
            ));
        }
        let missing = InboundMessage::new("delete_user", Value::Null);
        assert!(matches!(
            ClientCommand::decode(&missing),
            Err(GatewayError::ValidationFailed(_))
        ));
    }

    #[test]
    fn update_user_splits_id_and_patch() {
        let msg = InboundMessage::new("update_user", json!({"user_id": 3, "status": "Inactive"}));
        let Ok(ClientCommand::UpdateUser { id, patch }) = ClientCommand::decode(&msg) else {
            panic!("expected update command");
        };
        assert_eq!(id, UserId::new(3));
        assert_eq!(patch.status.as_deref(), Some("Inactive"));
        assert_eq!(patch.first_name, None);
    }

    #[test]
    fn unknown_tag_is_reported() {
        let msg = InboundMessage::new("drop_tables", json!({}));
        assert!(matches!(
            ClientCommand::decode(&msg),
            Err(GatewayError::UnknownMessageType(tag)) if tag == "drop_tables"
        ));
    }

    #[test]
    fn tags_round_trip() {
        let msg = InboundMessage::new("get_users", Value::Null);
        let Ok(cmd) = ClientCommand::decode(&msg) else {
            panic!("decode failed");
        };
        assert_eq!(cmd.tag(), "get_users");
        assert!(ClientCommand::TAGS.contains(&cmd.tag()));
        assert_eq!(response_type(cmd.tag()), "get_users_response");
    }
}
