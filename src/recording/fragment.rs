use serde::{Deserialize, Serialize};

/// One chunk of audio as sent by the capture script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Stream tag: id of the audio element the chunk was recorded from.
    #[serde(rename = "u")]
    pub stream_tag: String,
    /// Base64 encoded audio bytes. Missing for an empty recorder chunk.
    #[serde(rename = "d", default)]
    pub data: String,
    /// Display name of the speaking participant.
    #[serde(rename = "user", default)]
    pub display_name: String,
    #[serde(rename = "userid", default)]
    pub user_id: String,
    #[serde(default)]
    pub room: String,
    /// Conference-local id of the bot itself.
    #[serde(rename = "myid", default)]
    pub my_id: String,
}

impl Fragment {
    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}
