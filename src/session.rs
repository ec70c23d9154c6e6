//! Username login and registration

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::{NewProfile, Profile, Role, USERNAME_MAX, USERNAME_MIN};
use crate::DrinkOff;

const PROFILE_COLUMNS: &str = "id, username, role, created_at";
const UNIQUE_VIOLATION: &str = "23505";

/// A resolved player
#[derive(Debug, Clone, PartialEq)]
pub struct LoginResult {
    pub profile: Profile,
    pub role: Role,
}

impl LoginResult {
    fn new(profile: Profile) -> Self {
        let role = profile.role;
        Self { profile, role }
    }

    /// Where the player goes next
    pub fn destination(&self) -> Destination {
        match self.role {
            Role::Admin => Destination::Admin,
            Role::User => Destination::Drink,
        }
    }
}

/// Screen to show after login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Leaderboard + slideshow
    Admin,
    /// Drink form + leaderboard
    Drink,
}

/// Outcome of the login form
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The name existed and the player is logged in
    LoggedIn(LoginResult),
    /// The name was free and the player chose to register it
    Registered(LoginResult),
    /// The name was free and the player declined to register it
    Declined,
}

impl Resolution {
    /// Profile and destination, unless the player declined
    pub fn login(&self) -> Option<&LoginResult> {
        match self {
            Resolution::LoggedIn(result) | Resolution::Registered(result) => Some(result),
            Resolution::Declined => None,
        }
    }
}

/// Trim a username and check its length, without touching the network.
pub fn validate_username(username: &str) -> Result<&str> {
    let trimmed = username.trim();
    let len = trimmed.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(Error::validation(format!(
            "Username must be {}–{} characters.",
            USERNAME_MIN, USERNAME_MAX
        )));
    }
    Ok(trimmed)
}

/// Login form controller
pub struct SessionController {
    client: Arc<DrinkOff>,
    loading: bool,
    error: Option<String>,
}

impl SessionController {
    /// Controller for the login screen
    pub fn new(client: Arc<DrinkOff>) -> Self {
        Self {
            client,
            loading: false,
            error: None,
        }
    }

    /// A request is in flight
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Message for the last failed action
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether a profile already uses this name.
    ///
    /// This is a plain read: it never creates an identity. Without a session
    /// it reads with the publishable key.
    pub async fn is_username_taken(&self, username: &str) -> Result<bool> {
        let trimmed = username.trim();
        if trimmed.is_empty() {
            return Ok(false);
        }

        let lookup = self
            .client
            .from_fresh("profiles")
            .await?
            .select("id")
            .eq("username", trimmed)
            .execute_single::<serde_json::Value>()
            .await;

        match lookup {
            Ok(_) => Ok(true),
            Err(e) if e.is_no_rows() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create a profile for a free username.
    ///
    /// The length check runs before any remote call. An anonymous identity is
    /// created if there is no session yet.
    pub async fn register(&self, username: &str) -> Result<LoginResult> {
        let trimmed = validate_username(username)?;

        let session = self.client.auth().ensure_session().await?;
        let user_id = session.user_id();
        if user_id.is_empty() {
            return Err(Error::auth("No authenticated user"));
        }

        let profile = self
            .client
            .from("profiles")
            .insert(NewProfile {
                id: user_id,
                username: trimmed,
            })
            .select(PROFILE_COLUMNS)
            .execute_single::<Profile>()
            .await
            .map_err(|e| match e.code() {
                Some(UNIQUE_VIOLATION) => Error::validation("That username is already taken."),
                _ => e,
            })?;

        log::info!("registered {} as {}", profile.username, profile.id);
        Ok(LoginResult::new(profile))
    }

    /// Log in as an existing username
    pub async fn login(&self, username: &str) -> Result<LoginResult> {
        let trimmed = username.trim();
        if trimmed.is_empty() {
            return Err(Error::validation("Username is required."));
        }

        self.client.auth().ensure_session().await?;

        let profile = self
            .client
            .from("profiles")
            .select(PROFILE_COLUMNS)
            .eq("username", trimmed)
            .execute_one::<Profile>()
            .await?
            .ok_or_else(|| Error::general("User not found."))?;

        log::info!("{} logged in with role {:?}", profile.username, profile.role);
        Ok(LoginResult::new(profile))
    }

    /// Sign out and forget the session
    pub async fn logout(&mut self) -> Result<()> {
        self.error = None;
        let result = self.client.auth().sign_out().await;
        if let Err(e) = &result {
            self.error = Some(e.user_message());
        }
        result
    }

    /// Run the login form: log in a known name, or offer to register a free one.
    ///
    /// `confirm` is asked only when the name is free; returning `false` leaves
    /// everything untouched.
    pub async fn resolve<F>(&mut self, username: &str, confirm: F) -> Result<Resolution>
    where
        F: FnOnce(&str) -> bool,
    {
        self.loading = true;
        self.error = None;

        let result = self.resolve_inner(username, confirm).await;

        self.loading = false;
        if let Err(e) = &result {
            log::error!("login failed: {}", e);
            self.error = Some(e.user_message());
        }
        result
    }

    async fn resolve_inner<F>(&self, username: &str, confirm: F) -> Result<Resolution>
    where
        F: FnOnce(&str) -> bool,
    {
        let trimmed = username.trim();
        if self.is_username_taken(trimmed).await? {
            return Ok(Resolution::LoggedIn(self.login(trimmed).await?));
        }

        // Check the length before asking, so nobody confirms a name that can't be registered.
        validate_username(trimmed)?;
        if !confirm(trimmed) {
            return Ok(Resolution::Declined);
        }
        Ok(Resolution::Registered(self.register(trimmed).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_length_is_counted_in_characters() {
        assert!(validate_username("a").is_err());
        assert!(validate_username("  a  ").is_err());
        assert_eq!(validate_username(" ab ").unwrap(), "ab");
        assert!(validate_username(&"x".repeat(24)).is_ok());
        assert!(validate_username(&"x".repeat(25)).is_err());
        // Multi-byte letters count once each.
        assert!(validate_username("Øl").is_ok());
        assert!(validate_username(&"ø".repeat(24)).is_ok());
    }

    #[test]
    fn role_picks_destination() {
        let profile = Profile {
            id: "u-1".to_string(),
            username: "host".to_string(),
            role: Role::Admin,
            created_at: chrono::Utc::now(),
        };
        assert_eq!(LoginResult::new(profile.clone()).destination(), Destination::Admin);
        let player = Profile {
            role: Role::User,
            ..profile
        };
        assert_eq!(LoginResult::new(player).destination(), Destination::Drink);
    }
}
