//! Types for authentication

use serde::{Deserialize, Serialize};

/// An auth user. Anonymous users carry no email or phone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// The user ID
    pub id: String,

    /// The Postgres role the user acts as (`authenticated` for signed-in users)
    pub role: Option<String>,

    /// Whether the user is anonymous
    #[serde(default)]
    pub is_anonymous: bool,

    /// The creation time
    pub created_at: Option<String>,
}
