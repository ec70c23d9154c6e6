//! Configuration options for the Drink-Off client

use std::env;
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};

/// Configuration options for the Drink-Off client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// The base URL of the Supabase project
    pub url: String,

    /// The publishable (anon) API key
    pub anon_key: String,

    /// The request timeout. `None` leaves it to the HTTP client.
    pub request_timeout: Option<Duration>,

    /// Storage bucket holding drink selfies
    pub photo_bucket: String,

    /// Edge function that signs slideshow URLs
    pub slideshow_function: String,

    /// Realtime channel used for leaderboard change notifications
    pub realtime_channel: String,

    /// Number of leaderboard rows to fetch
    pub leaderboard_limit: usize,

    /// How often the leaderboard polls
    pub poll_interval: Duration,

    /// Maximum number of images per slideshow batch
    pub slideshow_limit: usize,

    /// Time each slide stays on screen
    pub slideshow_interval: Duration,

    /// Length of the fade-out window between slides
    pub fade_duration: Duration,

    /// Lifetime of signed slideshow URLs
    pub signed_url_ttl: Duration,

    /// Realtime heartbeat interval
    pub heartbeat_interval: Duration,

    /// First realtime reconnect delay
    pub reconnect_interval: Duration,

    /// Upper bound for the realtime reconnect delay
    pub max_reconnect_interval: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".to_string(),
            anon_key: String::new(),
            request_timeout: None,
            photo_bucket: "drink-photos".to_string(),
            slideshow_function: "admin-slideshow-urls".to_string(),
            realtime_channel: "leaderboard-drinks-changes".to_string(),
            leaderboard_limit: 50,
            poll_interval: Duration::from_secs(10),
            slideshow_limit: 200,
            slideshow_interval: Duration::from_millis(3500),
            fade_duration: Duration::from_millis(250),
            signed_url_ttl: Duration::from_secs(600),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_interval: Duration::from_secs(1),
            max_reconnect_interval: Duration::from_secs(30),
        }
    }
}

impl ClientOptions {
    /// Options for a project URL and publishable key, everything else default
    pub fn new(url: &str, anon_key: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            ..Self::default()
        }
    }

    /// Load options from the environment (and a `.env` file if present).
    ///
    /// `SUPABASE_URL` and `SUPABASE_ANON_KEY` are required. The optional
    /// `DRINK_OFF_LEADERBOARD_LIMIT`, `DRINK_OFF_SLIDESHOW_LIMIT` and
    /// `DRINK_OFF_SLIDESHOW_INTERVAL_MS` override the defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let url = env::var("SUPABASE_URL")
            .map_err(|_| Error::config("SUPABASE_URL environment variable not found"))?;
        let anon_key = env::var("SUPABASE_ANON_KEY")
            .map_err(|_| Error::config("SUPABASE_ANON_KEY environment variable not found"))?;

        let mut options = Self::new(&url, &anon_key);
        if let Some(limit) = parse_var::<usize>("DRINK_OFF_LEADERBOARD_LIMIT")? {
            options.leaderboard_limit = limit;
        }
        if let Some(limit) = parse_var::<usize>("DRINK_OFF_SLIDESHOW_LIMIT")? {
            options.slideshow_limit = limit;
        }
        if let Some(ms) = parse_var::<u64>("DRINK_OFF_SLIDESHOW_INTERVAL_MS")? {
            options.slideshow_interval = Duration::from_millis(ms);
        }
        options.validate()?;
        Ok(options)
    }

    /// Check that the URL parses and the key is present.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "unsupported URL scheme: {}",
                url.scheme()
            )));
        }
        if self.anon_key.is_empty() {
            return Err(Error::config("anon_key cannot be empty"));
        }
        Ok(())
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the photo bucket
    pub fn with_photo_bucket(mut self, value: &str) -> Self {
        self.photo_bucket = value.to_string();
        self
    }

    /// Set the slideshow signing function
    pub fn with_slideshow_function(mut self, value: &str) -> Self {
        self.slideshow_function = value.to_string();
        self
    }

    /// Set the leaderboard row limit
    pub fn with_leaderboard_limit(mut self, value: usize) -> Self {
        self.leaderboard_limit = value;
        self
    }

    /// Set the leaderboard polling interval
    pub fn with_poll_interval(mut self, value: Duration) -> Self {
        self.poll_interval = value;
        self
    }

    /// Set the slideshow batch limit
    pub fn with_slideshow_limit(mut self, value: usize) -> Self {
        self.slideshow_limit = value;
        self
    }

    /// Set the time each slide is shown
    pub fn with_slideshow_interval(mut self, value: Duration) -> Self {
        self.slideshow_interval = value;
        self
    }

    /// Set the fade-out window
    pub fn with_fade_duration(mut self, value: Duration) -> Self {
        self.fade_duration = value;
        self
    }

    /// Set the realtime heartbeat interval
    pub fn with_heartbeat_interval(mut self, value: Duration) -> Self {
        self.heartbeat_interval = value;
        self
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::config(format!("{} is not a valid number: {}", name, raw))),
        Err(_) => Ok(None),
    }
}
