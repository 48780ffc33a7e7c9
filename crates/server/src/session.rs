//! Session record
//!
//! The schemaless JSON document persisted per session id. All durable
//! authentication state lives here; socket connections carry none of
//! their own.

use serde::{Deserialize, Serialize};
use vitrine_protocol::{PendingNotification, UserSnapshot};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSnapshot>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// One-shot envelope bridging a login that completed before any live
    /// socket could observe it. Deleted in the same write that consumes it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_socket_notification: Option<PendingNotification>,
}

impl SessionRecord {
    /// Names of the populated fields, for rejection diagnostics.
    pub fn field_names(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if self.user.is_some() {
            keys.push("user".to_string());
        }
        if self.token.is_some() {
            keys.push("token".to_string());
        }
        if self.refresh_token.is_some() {
            keys.push("refreshToken".to_string());
        }
        if self.pending_socket_notification.is_some() {
            keys.push("pendingSocketNotification".to_string());
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_protocol::{PendingNotificationData, UserRole};

    pub(crate) fn user(id: &str) -> UserSnapshot {
        UserSnapshot {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            firstname: "Jo".to_string(),
            lastname: "Martin".to_string(),
            picture: None,
            role: UserRole::User,
        }
    }

    #[test]
    fn empty_record_serializes_to_empty_object() {
        let record = SessionRecord::default();
        assert_eq!(serde_json::to_string(&record).unwrap(), "{}");
        assert!(record.field_names().is_empty());
    }

    #[test]
    fn field_names_reflect_populated_fields() {
        let record = SessionRecord {
            user: None,
            token: Some("t1".to_string()),
            refresh_token: Some("r1".to_string()),
            pending_socket_notification: None,
        };
        assert_eq!(record.field_names(), vec!["token", "refreshToken"]);
    }

    #[test]
    fn nested_envelope_roundtrips_through_json() {
        let record = SessionRecord {
            user: None,
            token: None,
            refresh_token: None,
            pending_socket_notification: Some(PendingNotification {
                kind: PendingNotification::AUTH_SUCCESS.to_string(),
                data: PendingNotificationData {
                    user: Some(user("u1")),
                    token: Some("t1".to_string()),
                    refresh_token: Some("r1".to_string()),
                    timestamp: 42,
                },
            }),
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"pendingSocketNotification\""));
        let reparsed: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(reparsed, record);
    }
}
