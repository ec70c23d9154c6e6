//! Phoenix channel messages exchanged with the realtime service

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub(crate) const PHX_JOIN: &str = "phx_join";
pub(crate) const PHX_REPLY: &str = "phx_reply";
pub(crate) const PHX_ERROR: &str = "phx_error";
pub(crate) const PHX_CLOSE: &str = "phx_close";
pub(crate) const HEARTBEAT: &str = "heartbeat";
pub(crate) const POSTGRES_CHANGES: &str = "postgres_changes";

/// A full message received or sent over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeMessage {
    pub topic: String,
    pub event: String,
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub message_ref: Option<String>,
}

impl RealtimeMessage {
    pub(crate) fn heartbeat(message_ref: String) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: HEARTBEAT.to_string(),
            payload: json!({}),
            message_ref: Some(message_ref),
        }
    }

    pub(crate) fn join(
        topic: &str,
        changes: &[PostgresChanges],
        access_token: Option<&str>,
        message_ref: String,
    ) -> Self {
        let mut payload = json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": changes,
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = json!(token);
        }
        Self {
            topic: topic.to_string(),
            event: PHX_JOIN.to_string(),
            payload,
            message_ref: Some(message_ref),
        }
    }

    /// `status` of a `phx_reply`
    pub(crate) fn reply_status(&self) -> Option<&str> {
        self.payload.get("status").and_then(Value::as_str)
    }
}

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "*")]
    All,
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
}

/// One `postgres_changes` filter in a join request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostgresChanges {
    pub event: ChangeKind,
    pub schema: String,
    pub table: String,
}

impl PostgresChanges {
    /// Every insert, update and delete on `public.<table>`
    pub fn all(table: &str) -> Self {
        Self {
            event: ChangeKind::All,
            schema: "public".to_string(),
            table: table.to_string(),
        }
    }
}

/// A change notification. Drink-Off only uses it as a refresh trigger, so the
/// row data is not kept.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
}

impl ChangeEvent {
    pub(crate) fn from_payload(payload: &Value) -> Option<Self> {
        let data = payload.get("data")?;
        serde_json::from_value(data.clone()).ok()
    }
}
