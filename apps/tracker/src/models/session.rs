use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Complete,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Complete => "complete",
        }
    }
}

/// A bounded recording window for one (user, character) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub character_id: String,
    pub name: String,
    pub status: SessionStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub completed_at: Option<DateTime<Utc>>,
    pub started_by: String,
    #[serde(default)]
    pub aggregate_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_activity_id: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_seen_timestamp: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_pending(&self) -> bool {
        self.status == SessionStatus::Pending && self.completed_at.is_none()
    }
}

/// Optional filters for session listings.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub user_id: Option<String>,
    pub character_id: Option<String>,
    pub status: Option<SessionStatus>,
}
