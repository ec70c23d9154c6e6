//! Authentication against the Supabase auth service
//!
//! Drink-Off only uses anonymous identities: a player is an anonymous auth
//! user whose id is linked to a username in the `profiles` table.

mod session;
mod types;

use reqwest::Client;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::fetch::Fetch;

pub use session::*;
pub use types::*;

/// Client for Supabase Authentication
#[derive(Clone)]
pub struct Auth {
    /// The base URL for the Supabase project
    url: String,

    /// The publishable API key
    key: String,

    /// HTTP client used for requests
    client: Client,

    /// The current session
    session: Arc<RwLock<Option<Session>>>,
}

impl Auth {
    /// Create a new Auth client
    pub(crate) fn new(url: &str, key: &str, client: Client) -> Self {
        Self {
            url: url.to_string(),
            key: key.to_string(),
            client,
            session: Arc::new(RwLock::new(None)),
        }
    }

    fn get_auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.url, path)
    }

    /// Create a fresh anonymous identity and make it the current session.
    pub async fn sign_in_anonymously(&self) -> Result<Session> {
        let url = self.get_auth_url("/signup");

        let session = Fetch::post(&self.client, &url)
            .header("apikey", &self.key)
            .json(&serde_json::json!({ "data": {} }))?
            .execute::<Session>()
            .await
            .map_err(auth_error)?
            .stamped();

        log::info!("signed in anonymously as {}", session.user.id);
        self.set_session(session.clone());
        Ok(session)
    }

    /// Exchange the refresh token for a new session.
    pub async fn refresh_session(&self) -> Result<Session> {
        let current = self
            .get_session()
            .ok_or_else(|| Error::auth("No session to refresh"))?;
        let url = self.get_auth_url("/token?grant_type=refresh_token");

        let session = Fetch::post(&self.client, &url)
            .header("apikey", &self.key)
            .json(&serde_json::json!({ "refresh_token": current.refresh_token }))?
            .execute::<Session>()
            .await
            .map_err(auth_error)?
            .stamped();

        log::debug!("refreshed session for {}", session.user.id);
        self.set_session(session.clone());
        Ok(session)
    }

    /// Return a usable session, creating an anonymous one when there is none.
    ///
    /// An expired session is refreshed; if that fails a new anonymous identity
    /// is created.
    pub async fn ensure_session(&self) -> Result<Session> {
        match self.get_session() {
            Some(session) if !session.is_expired() => Ok(session),
            Some(_) => match self.refresh_session().await {
                Ok(session) => Ok(session),
                Err(e) => {
                    log::warn!("session refresh failed, signing in again: {}", e);
                    self.sign_in_anonymously().await
                }
            },
            None => self.sign_in_anonymously().await,
        }
    }

    /// The access token of the current session, refreshed first if it has expired.
    ///
    /// Returns `None` when nobody is signed in. Unlike [`ensure_session`](Self::ensure_session)
    /// this never creates an identity; a failed refresh is an error.
    pub async fn valid_access_token(&self) -> Result<Option<String>> {
        match self.get_session() {
            Some(session) if !session.is_expired() => Ok(Some(session.access_token)),
            Some(_) => {
                log::debug!("access token expired, refreshing");
                let session = self.refresh_session().await?;
                Ok(Some(session.access_token))
            }
            None => Ok(None),
        }
    }

    /// Token for the `Authorization` header, refreshing an expired session first.
    /// Falls back to the publishable key when nobody is signed in.
    pub async fn valid_bearer_token(&self) -> Result<String> {
        Ok(self
            .valid_access_token()
            .await?
            .unwrap_or_else(|| self.key.clone()))
    }

    /// Sign out the current user and forget the session.
    pub async fn sign_out(&self) -> Result<()> {
        let token = self
            .access_token()
            .ok_or_else(|| Error::auth("Not logged in"))?;
        let url = self.get_auth_url("/logout");

        let result = Fetch::post(&self.client, &url)
            .header("apikey", &self.key)
            .bearer_auth(&token)
            .execute_empty()
            .await;

        // The local session goes away even if the server call failed.
        self.clear_session();
        result.map_err(auth_error)
    }

    /// Get the current session
    pub fn get_session(&self) -> Option<Session> {
        match self.session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Set the session
    pub fn set_session(&self, session: Session) {
        match self.session.write() {
            Ok(mut guard) => *guard = Some(session),
            Err(poisoned) => *poisoned.into_inner() = Some(session),
        }
    }

    /// Forget the current session without calling the server
    pub fn clear_session(&self) {
        match self.session.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    /// The access token of the current, unexpired session
    pub fn access_token(&self) -> Option<String> {
        self.get_session()
            .filter(|s| !s.is_expired())
            .map(|s| s.access_token)
    }

    /// Token for the `Authorization` header: the session token, or the publishable key.
    pub fn bearer_token(&self) -> String {
        self.access_token().unwrap_or_else(|| self.key.clone())
    }
}

fn auth_error(err: Error) -> Error {
    match err {
        Error::Api { message, .. } => Error::Auth(message),
        other => other,
    }
}
