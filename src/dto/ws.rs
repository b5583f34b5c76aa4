use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dto::validation::validate_username;

/// Messages accepted from client WebSocket connections.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientInboundMessage {
    /// First frame on every socket: binds the connection to a user.
    Identify {
        /// Stable numeric user id from the identity provider.
        user_id: i64,
        /// Display name to ack back.
        username: String,
    },
    /// Subscribe the connection to a game session's broadcast audience.
    Subscribe {
        /// Session to follow.
        session_id: String,
    },
    /// Explicit signal that the client is tearing down for good.
    Leaving,
    /// Keep-alive; any inbound frame also resets the silence window.
    Heartbeat,
    /// Forward-compatible catch-all for unknown message types.
    #[serde(other)]
    Unknown,
}

impl ClientInboundMessage {
    /// Parse and validate a raw text frame.
    pub fn from_json_str(text: &str) -> Result<Self, String> {
        let message: Self = serde_json::from_str(text).map_err(|err| err.to_string())?;

        if let ClientInboundMessage::Identify { username, .. } = &message {
            validate_username(username).map_err(|err| err.to_string())?;
        }

        Ok(message)
    }
}

/// Positive acknowledgement sent back after successful identification.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClientAck {
    /// Identity the connection was bound to.
    pub user_id: i64,
    /// Always `"identified"`.
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_frame_parses() {
        let msg =
            ClientInboundMessage::from_json_str(r#"{"type":"identify","user_id":7,"username":"ada"}"#)
                .unwrap();
        assert!(matches!(
            msg,
            ClientInboundMessage::Identify { user_id: 7, .. }
        ));
    }

    #[test]
    fn blank_username_is_rejected() {
        let err = ClientInboundMessage::from_json_str(
            r#"{"type":"identify","user_id":7,"username":"  "}"#,
        )
        .unwrap_err();
        assert!(err.contains("blank") || !err.is_empty());
    }

    #[test]
    fn unknown_types_fall_through() {
        let msg = ClientInboundMessage::from_json_str(r#"{"type":"wave"}"#).unwrap();
        assert!(matches!(msg, ClientInboundMessage::Unknown));
    }
}
