//! Drink-Off client library
//!
//! Players log in with a username, register drinks with a selfie and watch a
//! live leaderboard; an admin screen cycles through the uploaded photos. All
//! state lives in a Supabase project. This crate holds the typed glue to reach
//! it and the controllers a front end drives:
//!
//! - [`session::SessionController`] resolves a username to a profile
//! - [`registration::DrinkRegistration`] runs the drink form
//! - [`leaderboard::LeaderboardController`] keeps the ranking fresh
//! - [`slideshow::SlideshowController`] cycles through signed photo URLs
//!
//! Build one [`DrinkOff`] per process and share it with every controller.

pub mod auth;
pub mod config;
pub mod drinks;
pub mod error;
pub mod fetch;
pub mod functions;
pub mod leaderboard;
pub mod models;
pub mod postgrest;
pub mod realtime;
pub mod registration;
pub mod session;
pub mod slideshow;
pub mod storage;

use reqwest::Client;

use crate::auth::Auth;
use crate::config::ClientOptions;
use crate::error::Result;
use crate::functions::FunctionsClient;
use crate::postgrest::PostgrestClient;
use crate::realtime::{RealtimeClient, RealtimeClientOptions};
use crate::storage::StorageClient;

/// The backend client shared by all controllers
pub struct DrinkOff {
    /// Client options
    options: ClientOptions,
    /// HTTP client used for requests
    http_client: Client,
    /// Auth client holding the player's session
    auth: Auth,
}

impl DrinkOff {
    /// Create a client from options
    ///
    /// # Example
    ///
    /// ```
    /// use drink_off::{DrinkOff, config::ClientOptions};
    ///
    /// let client = DrinkOff::new(ClientOptions::new(
    ///     "https://your-project.supabase.co",
    ///     "your-anon-key",
    /// ))
    /// .unwrap();
    /// assert_eq!(client.options().photo_bucket, "drink-photos");
    /// ```
    pub fn new(options: ClientOptions) -> Result<Self> {
        options.validate()?;

        let mut builder = Client::builder();
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;
        let auth = Auth::new(&options.url, &options.anon_key, http_client.clone());

        Ok(Self {
            options,
            http_client,
            auth,
        })
    }

    /// Create a client from `SUPABASE_URL` / `SUPABASE_ANON_KEY`
    pub fn from_env() -> Result<Self> {
        Self::new(ClientOptions::from_env()?)
    }

    /// Client options
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Get a reference to the auth client
    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    /// Query a table or view as the current session (or anonymously if there is none)
    pub fn from(&self, table: &str) -> PostgrestClient {
        PostgrestClient::new(
            &self.options.url,
            &self.options.anon_key,
            table,
            &self.auth.bearer_token(),
            self.http_client.clone(),
        )
    }

    /// Like [`from`](Self::from), but refreshes an expired session before building the client
    pub async fn from_fresh(&self, table: &str) -> Result<PostgrestClient> {
        let token = self.auth.valid_bearer_token().await?;
        Ok(PostgrestClient::new(
            &self.options.url,
            &self.options.anon_key,
            table,
            &token,
            self.http_client.clone(),
        ))
    }

    /// Storage client acting as the current session
    pub fn storage(&self) -> StorageClient {
        StorageClient::new(
            &self.options.url,
            &self.options.anon_key,
            &self.auth.bearer_token(),
            self.http_client.clone(),
        )
    }

    /// Edge functions client
    pub fn functions(&self) -> FunctionsClient {
        FunctionsClient::new(
            &self.options.url,
            &self.options.anon_key,
            self.http_client.clone(),
        )
    }

    /// Realtime client
    pub fn realtime(&self) -> RealtimeClient {
        RealtimeClient::new(
            &self.options.url,
            &self.options.anon_key,
            RealtimeClientOptions {
                heartbeat_interval: self.options.heartbeat_interval,
                reconnect_interval: self.options.reconnect_interval,
                max_reconnect_interval: self.options.max_reconnect_interval,
            },
        )
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::config::ClientOptions;
    pub use crate::error::{Error, Result};
    pub use crate::leaderboard::{LeaderboardController, LeaderboardView};
    pub use crate::models::{DrinkType, LeaderboardRow, Profile, Role, SlideshowImage};
    pub use crate::registration::{DrinkRegistration, Photo, RegistrationPhase};
    pub use crate::session::{Destination, LoginResult, SessionController};
    pub use crate::slideshow::{SlideView, SlideshowController};
    pub use crate::DrinkOff;
}
