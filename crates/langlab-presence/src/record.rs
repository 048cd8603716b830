//! The durable presence record.

use chrono::{DateTime, Utc};
use langlab_core::UserId;
use serde::Serialize;

/// Online/offline status for one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    /// The user.
    pub user_id: UserId,
    /// Whether the user currently has a bound channel.
    pub is_online: bool,
    /// When the user's last channel went away; `None` if never offline.
    pub last_seen_at: Option<DateTime<Utc>>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let at = DateTime::parse_from_rfc3339("2026-01-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let record = PresenceRecord {
            user_id: "student1".into(),
            is_online: false,
            last_seen_at: Some(at),
            updated_at: at,
        };
        let v = serde_json::to_value(&record).unwrap();
        assert_eq!(v["userId"], "student1");
        assert_eq!(v["isOnline"], false);
        assert_eq!(v["lastSeenAt"], "2026-01-01T10:00:00Z");
        assert!(v.get("updatedAt").is_some());
    }
}
