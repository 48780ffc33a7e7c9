//! Server → Client events

use serde::{Deserialize, Serialize};

use crate::types::{AuthDebug, AuthRequiredReason, UserSnapshot};

/// Events emitted by the gateway over WebSocket.
///
/// Tag values keep the `namespace:event` names the browser client listens
/// for, so this enum is the single source of truth for the wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// The connection cannot be authorized; it is closed right after this
    /// event so the client gets a deterministic signal instead of a hang.
    #[serde(rename = "auth:required")]
    AuthRequired {
        reason: AuthRequiredReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        debug: Option<AuthDebug>,
    },

    /// The connection is authenticated and joined to its rooms.
    #[serde(rename = "user:connected")]
    #[serde(rename_all = "camelCase")]
    UserConnected {
        user: UserSnapshot,
        token: String,
        refresh_token: String,
        /// Absent on the direct emit from the OAuth callback, which is not
        /// tied to a single connection.
        #[serde(skip_serializing_if = "Option::is_none")]
        socket_id: Option<String>,
        timestamp: u64,
    },

    /// The session behind this connection was destroyed.
    #[serde(rename = "user:logout")]
    UserLogout,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserRole;

    fn sample_user() -> UserSnapshot {
        UserSnapshot {
            id: "u1".to_string(),
            email: "jo@example.com".to_string(),
            firstname: "Jo".to_string(),
            lastname: "Martin".to_string(),
            picture: None,
            role: UserRole::User,
        }
    }

    #[test]
    fn auth_required_uses_colon_tag() {
        let event = ServerEvent::AuthRequired {
            reason: AuthRequiredReason::NoSession,
            debug: None,
        };

        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "auth:required");
        assert_eq!(json["reason"], "no_session");
        assert!(json.get("debug").is_none());
    }

    #[test]
    fn user_connected_roundtrip() {
        let event = ServerEvent::UserConnected {
            user: sample_user(),
            token: "t1".to_string(),
            refresh_token: "r1".to_string(),
            socket_id: Some("7".to_string()),
            timestamp: 1_700_000_000_000,
        };

        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains("\"type\":\"user:connected\""));
        assert!(json.contains("\"refreshToken\":\"r1\""));
        assert!(json.contains("\"socketId\":\"7\""));

        let reparsed: ServerEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(reparsed, event);
    }

    #[test]
    fn user_logout_has_no_payload() {
        let json = serde_json::to_value(ServerEvent::UserLogout).expect("serialize");
        assert_eq!(json, serde_json::json!({"type": "user:logout"}));
    }

    #[test]
    fn rejection_debug_payload_roundtrip() {
        let event = ServerEvent::AuthRequired {
            reason: AuthRequiredReason::NoUserInSession,
            debug: Some(AuthDebug {
                session_id: "s1".to_string(),
                session_keys: vec!["token".to_string()],
            }),
        };

        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains("\"sessionKeys\":[\"token\"]"));

        let reparsed: ServerEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(reparsed, event);
    }
}
