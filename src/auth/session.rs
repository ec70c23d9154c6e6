//! Session data returned by the auth service

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::User;

/// Session data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// The access token
    pub access_token: String,

    /// The refresh token
    #[serde(default)]
    pub refresh_token: String,

    /// The token type
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// The lifetime in seconds
    #[serde(default)]
    pub expires_in: i64,

    /// The expiry timestamp (seconds since the epoch)
    pub expires_at: Option<i64>,

    /// The signed-in user
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// The user id this session belongs to
    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    /// Fill in `expires_at` from `expires_in` when the server left it out
    pub(crate) fn stamped(mut self) -> Self {
        if self.expires_at.is_none() && self.expires_in > 0 {
            self.expires_at = Some(Utc::now().timestamp() + self.expires_in);
        }
        self
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now().timestamp() >= expires_at,
            None => false,
        }
    }
}
