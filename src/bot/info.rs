use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::BotStatus;

/// How a bot authenticates against the meeting server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Jwt,
    Password,
    None,
}

/// Read-only snapshot of a bot, as served by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotInfo {
    pub id: String,
    pub room: String,
    pub bot_name: String,
    pub server: String,
    pub auth_method: AuthMethod,
    pub status: BotStatus,
    pub snapshot_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}
