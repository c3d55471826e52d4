//! Shared data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User row from the database.
#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub email_notifications: bool,
    pub push_notifications: bool,
    pub notification_frequency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User API response. Never carries credential material.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub email_notifications: bool,
    pub push_notifications: bool,
    pub notification_frequency: String,
    pub created_at: String,
}

impl From<UserRow> for UserResponse {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id.to_string(),
            username: row.username,
            email: row.email,
            email_notifications: row.email_notifications,
            push_notifications: row.push_notifications,
            notification_frequency: row.notification_frequency,
            created_at: row.created_at.to_rfc3339(),
        }
    }
}

/// Schedule row from the database.
#[derive(Debug, sqlx::FromRow)]
pub struct ScheduleRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_free_time: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Schedule API response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResponse {
    pub id: String,
    pub start_time: String,
    pub end_time: String,
    pub is_free_time: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ScheduleRow> for ScheduleResponse {
    fn from(row: ScheduleRow) -> Self {
        Self {
            id: row.id.to_string(),
            start_time: row.start_time.to_rfc3339(),
            end_time: row.end_time.to_rfc3339(),
            is_free_time: row.is_free_time,
            created_at: row.created_at.to_rfc3339(),
            updated_at: row.updated_at.to_rfc3339(),
        }
    }
}

/// Friend request status.
///
/// A request starts `pending` and is decided exactly once by its addressee;
/// `approved` and `rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendStatus {
    Pending,
    Approved,
    Rejected,
}

impl FriendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendStatus::Pending => "pending",
            FriendStatus::Approved => "approved",
            FriendStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FriendStatus::Pending),
            "approved" => Some(FriendStatus::Approved),
            "rejected" => Some(FriendStatus::Rejected),
            _ => None,
        }
    }

    /// Whether a request in this state may transition to `next`.
    pub fn may_transition_to(self, next: FriendStatus) -> bool {
        matches!(
            (self, next),
            (FriendStatus::Pending, FriendStatus::Approved)
                | (FriendStatus::Pending, FriendStatus::Rejected)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_friend_status_round_trip() {
        for status in [
            FriendStatus::Pending,
            FriendStatus::Approved,
            FriendStatus::Rejected,
        ] {
            assert_eq!(FriendStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(FriendStatus::parse("blocked"), None);
    }

    #[test]
    fn test_only_pending_requests_can_be_decided() {
        assert!(FriendStatus::Pending.may_transition_to(FriendStatus::Approved));
        assert!(FriendStatus::Pending.may_transition_to(FriendStatus::Rejected));

        assert!(!FriendStatus::Approved.may_transition_to(FriendStatus::Rejected));
        assert!(!FriendStatus::Rejected.may_transition_to(FriendStatus::Approved));
        assert!(!FriendStatus::Approved.may_transition_to(FriendStatus::Pending));
        assert!(!FriendStatus::Pending.may_transition_to(FriendStatus::Pending));
    }

    #[test]
    fn test_user_response_has_no_credentials() {
        let row = UserRow {
            id: Uuid::new_v4(),
            username: "taro".to_string(),
            email: "taro@example.com".to_string(),
            email_notifications: true,
            push_notifications: false,
            notification_frequency: "daily".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(UserResponse::from(row)).unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["username"], "taro");
    }
}
