//! Shared data types

use serde::{Deserialize, Serialize};

/// Snapshot of an authenticated user, as stored in the session and sent
/// to clients. Field names are camelCase on the wire because the browser
/// frontend consumes them directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    pub id: String,
    pub email: String,
    pub firstname: String,
    pub lastname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub role: UserRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}

impl Default for UserRole {
    fn default() -> Self {
        UserRole::User
    }
}

/// Reason a socket connection was rejected before authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthRequiredReason {
    /// No session record exists for this connection at all.
    NoSession,
    /// A session exists but carries neither a user nor an adoptable
    /// pending notification.
    NoUserInSession,
}

/// Diagnostic payload attached to a `no_user_in_session` rejection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthDebug {
    pub session_id: String,
    pub session_keys: Vec<String>,
}

/// One-shot envelope stashed in a session when a login completed before
/// any live socket could observe it. Consumed (deleted) on first adoption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingNotification {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: PendingNotificationData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingNotificationData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Milliseconds since the Unix epoch, set when the login completed.
    pub timestamp: u64,
}

impl PendingNotification {
    /// Envelope kind written by the OAuth callback.
    pub const AUTH_SUCCESS: &'static str = "auth:success";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_snapshot_wire_casing_is_camel_case() {
        let user = UserSnapshot {
            id: "u1".to_string(),
            email: "jo@example.com".to_string(),
            firstname: "Jo".to_string(),
            lastname: "Martin".to_string(),
            picture: None,
            role: UserRole::User,
        };

        let json = serde_json::to_value(&user).expect("serialize");
        assert_eq!(json["id"], "u1");
        assert_eq!(json["firstname"], "Jo");
        assert_eq!(json["role"], "user");
        assert!(json.get("picture").is_none());
    }

    #[test]
    fn pending_notification_roundtrip() {
        let envelope = PendingNotification {
            kind: PendingNotification::AUTH_SUCCESS.to_string(),
            data: PendingNotificationData {
                user: Some(UserSnapshot {
                    id: "u1".to_string(),
                    email: "jo@example.com".to_string(),
                    firstname: "Jo".to_string(),
                    lastname: "Martin".to_string(),
                    picture: Some("https://cdn.example/p.png".to_string()),
                    role: UserRole::Admin,
                }),
                token: Some("t1".to_string()),
                refresh_token: Some("r1".to_string()),
                timestamp: 1_700_000_000_000,
            },
        };

        let json = serde_json::to_string(&envelope).expect("serialize");
        assert!(json.contains("\"type\":\"auth:success\""));
        assert!(json.contains("\"refreshToken\":\"r1\""));

        let reparsed: PendingNotification = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(reparsed, envelope);
    }

    #[test]
    fn auth_reason_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(AuthRequiredReason::NoUserInSession).unwrap(),
            "no_user_in_session"
        );
        assert_eq!(
            serde_json::to_value(AuthRequiredReason::NoSession).unwrap(),
            "no_session"
        );
    }
}
