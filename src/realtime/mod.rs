//! Realtime change notifications over the Phoenix WebSocket protocol

mod message;

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::auth::Auth;
use crate::error::{Error, Result};

pub use message::{ChangeEvent, ChangeKind, PostgresChanges, RealtimeMessage};
use message::{HEARTBEAT, PHX_CLOSE, PHX_ERROR, PHX_REPLY, POSTGRES_CHANGES};

const EVENT_BUFFER: usize = 16;
const BACKOFF_FACTOR: f64 = 1.5;

/// Connection options for the realtime client
#[derive(Debug, Clone)]
pub struct RealtimeClientOptions {
    pub heartbeat_interval: Duration,
    pub reconnect_interval: Duration,
    pub max_reconnect_interval: Duration,
}

impl Default for RealtimeClientOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            reconnect_interval: Duration::from_secs(1),
            max_reconnect_interval: Duration::from_secs(30),
        }
    }
}

/// Client for Supabase Realtime
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    url: String,
    key: String,
    options: RealtimeClientOptions,
}

impl RealtimeClient {
    /// Create a new RealtimeClient for a project base URL (`http(s)://…`)
    pub(crate) fn new(url: &str, key: &str, options: RealtimeClientOptions) -> Self {
        Self {
            url: url.to_string(),
            key: key.to_string(),
            options,
        }
    }

    /// Get the WebSocket URL for the Realtime API
    pub fn get_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.url)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(Error::realtime(format!("Unsupported URL scheme: {}", other))),
        };
        url.set_scheme(scheme)
            .map_err(|_| Error::realtime("Failed to set scheme for Realtime URL"))?;
        url.set_path("/realtime/v1/websocket");
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", &self.key)
            .append_pair("vsn", "1.0.0");
        Ok(url.to_string())
    }

    /// Start building a channel subscription
    pub fn channel(&self, name: &str) -> ChannelBuilder {
        ChannelBuilder {
            client: self.clone(),
            name: name.to_string(),
            changes: Vec::new(),
            auth: None,
        }
    }
}

/// Builder for a channel subscription
pub struct ChannelBuilder {
    client: RealtimeClient,
    name: String,
    changes: Vec<PostgresChanges>,
    auth: Option<Auth>,
}

impl ChannelBuilder {
    /// Listen for row changes
    pub fn on_postgres_changes(mut self, changes: PostgresChanges) -> Self {
        self.changes.push(changes);
        self
    }

    /// Send the session's access token with every join, so row-level security
    /// applies to the feed. An expired token is refreshed before each (re)join.
    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Connect and join in the background.
    ///
    /// The returned [`Subscription`] yields a [`ChangeEvent`] per notification.
    /// The connection is re-established with backoff until the subscription is
    /// dropped.
    pub fn subscribe(self) -> Result<Subscription> {
        let ws_url = self.client.get_url()?;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let channel = Arc::new(ChannelTask {
            ws_url,
            topic: format!("realtime:{}", self.name),
            changes: self.changes,
            auth: self.auth,
            options: self.client.options,
            next_ref: AtomicU32::new(1),
        });
        let task = tokio::spawn(channel.run(tx));
        Ok(Subscription {
            events: rx,
            guard: SubscriptionGuard { task },
        })
    }
}

/// A live subscription. Dropping it closes the connection.
pub struct Subscription {
    events: mpsc::Receiver<ChangeEvent>,
    guard: SubscriptionGuard,
}

impl Subscription {
    /// Wait for the next change notification
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    /// Separate the event stream from the connection's lifetime
    pub fn split(self) -> (mpsc::Receiver<ChangeEvent>, SubscriptionGuard) {
        (self.events, self.guard)
    }
}

/// Keeps the connection task alive; aborts it on drop.
pub struct SubscriptionGuard {
    task: JoinHandle<()>,
}

impl SubscriptionGuard {
    /// Stop listening now
    pub fn unsubscribe(self) {}
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct ChannelTask {
    ws_url: String,
    topic: String,
    changes: Vec<PostgresChanges>,
    auth: Option<Auth>,
    options: RealtimeClientOptions,
    next_ref: AtomicU32,
}

impl ChannelTask {
    fn next_ref(&self) -> String {
        self.next_ref.fetch_add(1, Ordering::SeqCst).to_string()
    }

    async fn join_token(&self) -> Option<String> {
        let auth = self.auth.as_ref()?;
        match auth.valid_access_token().await {
            Ok(token) => token,
            Err(e) => {
                log::warn!("joining {} without a token: {}", self.topic, e);
                None
            }
        }
    }

    async fn run(self: Arc<Self>, tx: mpsc::Sender<ChangeEvent>) {
        let mut delay = self.options.reconnect_interval;
        loop {
            match self.listen(&tx).await {
                Ok(joined) => {
                    if joined {
                        delay = self.options.reconnect_interval;
                    }
                    log::info!("realtime channel {} closed", self.topic);
                }
                Err(e) => log::warn!("realtime channel {} failed: {}", self.topic, e),
            }
            if tx.is_closed() {
                return;
            }
            log::debug!("reconnecting {} in {:?}", self.topic, delay);
            sleep(delay).await;
            delay = delay
                .mul_f64(BACKOFF_FACTOR)
                .min(self.options.max_reconnect_interval);
        }
    }

    /// One connection: join, then forward changes until the socket closes.
    /// Returns whether the join was acknowledged.
    async fn listen(&self, tx: &mpsc::Sender<ChangeEvent>) -> Result<bool> {
        let (stream, _) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| Error::realtime(format!("connect failed: {}", e)))?;
        let (mut write, mut read) = stream.split();

        let access_token = self.join_token().await;
        let join_ref = self.next_ref();
        let join = RealtimeMessage::join(
            &self.topic,
            &self.changes,
            access_token.as_deref(),
            join_ref.clone(),
        );
        write
            .send(Message::Text(serde_json::to_string(&join)?))
            .await
            .map_err(|e| Error::realtime(e.to_string()))?;

        let period = self.options.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        let mut joined = false;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let beat = RealtimeMessage::heartbeat(self.next_ref());
                    write
                        .send(Message::Text(serde_json::to_string(&beat)?))
                        .await
                        .map_err(|e| Error::realtime(e.to_string()))?;
                }
                frame = read.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => return Ok(joined),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(Error::realtime(e.to_string())),
                    };
                    let msg: RealtimeMessage = match serde_json::from_str(&text) {
                        Ok(msg) => msg,
                        Err(e) => {
                            log::debug!("ignoring unreadable realtime frame: {}", e);
                            continue;
                        }
                    };
                    if msg.topic != self.topic {
                        continue;
                    }
                    match msg.event.as_str() {
                        PHX_REPLY if msg.message_ref.as_deref() == Some(join_ref.as_str()) => {
                            if msg.reply_status() == Some("ok") {
                                log::info!("joined realtime channel {}", self.topic);
                                joined = true;
                            } else {
                                return Err(Error::realtime(format!(
                                    "join rejected: {}",
                                    msg.payload
                                )));
                            }
                        }
                        POSTGRES_CHANGES => {
                            if let Some(event) = ChangeEvent::from_payload(&msg.payload) {
                                log::debug!("{:?} on {}.{}", event.kind, event.schema, event.table);
                                if tx.send(event).await.is_err() {
                                    return Ok(joined);
                                }
                            }
                        }
                        PHX_ERROR => return Err(Error::realtime(format!("channel error: {}", msg.payload))),
                        PHX_CLOSE => return Ok(joined),
                        HEARTBEAT | PHX_REPLY => {}
                        other => log::debug!("unhandled realtime event {}", other),
                    }
                }
            }
        }
    }
}
