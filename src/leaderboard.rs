//! Live leaderboard: polling plus change notifications, one refresh at a time

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};

use crate::error::Result;
use crate::models::{rank, LeaderboardRow};
use crate::postgrest::Order;
use crate::realtime::{ChangeEvent, PostgresChanges, Subscription, SubscriptionGuard};
use crate::DrinkOff;

const COLUMNS: &str = "username, drinks_count, units_total, last_drink_at";

/// Shown when nobody has registered a drink
pub const EMPTY_MESSAGE: &str = "No drinks yet.";

/// Where leaderboard rows come from
#[async_trait]
pub trait LeaderboardSource: Send + Sync + 'static {
    /// Up to `limit` rows in ranking order
    async fn fetch(&self, limit: usize) -> Result<Vec<LeaderboardRow>>;
}

/// Reads the `leaderboard` view
pub struct LeaderboardService {
    client: Arc<DrinkOff>,
}

impl LeaderboardService {
    /// Service reading through `client`
    pub fn new(client: Arc<DrinkOff>) -> Self {
        Self { client }
    }

    /// Subscribe to every change on the `drinks` table
    pub fn subscribe(&self) -> Result<Subscription> {
        self.client
            .realtime()
            .channel(&self.client.options().realtime_channel)
            .on_postgres_changes(PostgresChanges::all("drinks"))
            .with_auth(self.client.auth().clone())
            .subscribe()
    }
}

#[async_trait]
impl LeaderboardSource for LeaderboardService {
    async fn fetch(&self, limit: usize) -> Result<Vec<LeaderboardRow>> {
        let mut rows = self
            .client
            .from_fresh("leaderboard")
            .await?
            .select(COLUMNS)
            .order("units_total", Order::desc())
            .order("drinks_count", Order::desc())
            .order("last_drink_at", Order::desc())
            .limit(limit)
            .execute::<LeaderboardRow>()
            .await?;
        rank(&mut rows);
        Ok(rows)
    }
}

/// What the leaderboard panel shows
#[derive(Debug, Clone, PartialEq)]
pub enum LeaderboardView {
    Loading,
    Error(String),
    Empty,
    Rows(Vec<LeaderboardRow>),
}

/// Result of a refresh trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    /// Another refresh was already running; this trigger was dropped
    Skipped,
}

#[derive(Debug)]
struct State {
    rows: Vec<LeaderboardRow>,
    loading: bool,
    error: Option<String>,
}

/// Keeps the ranking fresh
pub struct LeaderboardController<S> {
    source: S,
    limit: usize,
    poll_interval: Duration,
    in_flight: AtomicBool,
    state: Mutex<State>,
}

impl LeaderboardController<LeaderboardService> {
    /// Controller over the backend, using the configured limit and poll interval
    pub fn from_client(client: Arc<DrinkOff>) -> Self {
        let limit = client.options().leaderboard_limit;
        let poll_interval = client.options().poll_interval;
        Self::new(LeaderboardService::new(client), limit, poll_interval)
    }
}

impl<S: LeaderboardSource> LeaderboardController<S> {
    /// Controller showing up to `limit` rows, polling every `poll_interval`
    pub fn new(source: S, limit: usize, poll_interval: Duration) -> Self {
        Self {
            source,
            limit,
            poll_interval,
            in_flight: AtomicBool::new(false),
            state: Mutex::new(State {
                rows: Vec::new(),
                loading: true,
                error: None,
            }),
        }
    }

    /// The row source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch once, unless a fetch is already running.
    ///
    /// On failure the previous rows are kept and the error is recorded.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::trace!("leaderboard refresh already running");
            return Ok(RefreshOutcome::Skipped);
        }
        // Cleared on every exit, including cancellation and panics.
        let _in_flight = InFlight(&self.in_flight);

        let result = self.source.fetch(self.limit).await;

        let mut state = self.state();
        state.loading = false;
        match result {
            Ok(rows) => {
                log::debug!("leaderboard refreshed with {} rows", rows.len());
                state.rows = rows;
                state.error = None;
                Ok(RefreshOutcome::Refreshed)
            }
            Err(e) => {
                log::warn!("failed to load leaderboard: {}", e);
                state.error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Show the spinner, then refresh
    pub async fn manual_refresh(&self) -> Result<RefreshOutcome> {
        {
            let mut state = self.state();
            state.loading = true;
            state.error = None;
        }
        self.refresh().await
    }

    /// True until the first fetch settles, and during a manual refresh
    pub fn is_loading(&self) -> bool {
        self.state().loading
    }

    /// Last fetched rows, in ranking order
    pub fn rows(&self) -> Vec<LeaderboardRow> {
        self.state().rows.clone()
    }

    /// What the leaderboard panel shows
    pub fn view(&self) -> LeaderboardView {
        let state = self.state();
        if state.loading {
            LeaderboardView::Loading
        } else if let Some(error) = &state.error {
            LeaderboardView::Error(error.clone())
        } else if state.rows.is_empty() {
            LeaderboardView::Empty
        } else {
            LeaderboardView::Rows(state.rows.clone())
        }
    }

    /// Load now, then refresh on every poll tick and every change event.
    ///
    /// Triggers never wait on each other: each spawns a guarded refresh, so a
    /// trigger that arrives mid-fetch is dropped. Dropping the returned task
    /// stops polling and listening and cancels any refresh it started.
    pub fn start(
        self: &Arc<Self>,
        changes: Option<mpsc::Receiver<ChangeEvent>>,
    ) -> LeaderboardTask {
        let controller = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut changes = changes;
            let mut ticker = interval(controller.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Owned by this task, so aborting it aborts the refreshes too.
            let mut refreshes = JoinSet::new();

            loop {
                tokio::select! {
                    _ = ticker.tick() => controller.trigger(&mut refreshes),
                    Some(_) = refreshes.join_next(), if !refreshes.is_empty() => {}
                    event = next_change(&mut changes) => match event {
                        Some(event) => {
                            log::debug!("{:?} on {}, refreshing", event.kind, event.table);
                            controller.trigger(&mut refreshes);
                        }
                        None => {
                            log::warn!("change feed closed, falling back to polling");
                            changes = None;
                        }
                    },
                }
            }
        });

        LeaderboardTask {
            task,
            _subscription: None,
        }
    }

    /// Like [`start`](Self::start), feeding change events from `subscription`
    pub fn start_with_subscription(self: &Arc<Self>, subscription: Subscription) -> LeaderboardTask {
        let (events, guard) = subscription.split();
        let mut task = self.start(Some(events));
        task._subscription = Some(guard);
        task
    }

    fn trigger(self: &Arc<Self>, refreshes: &mut JoinSet<()>) {
        let controller = Arc::clone(self);
        refreshes.spawn(async move {
            // Failures are recorded in the view.
            let _ = controller.refresh().await;
        });
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn next_change(changes: &mut Option<mpsc::Receiver<ChangeEvent>>) -> Option<ChangeEvent> {
    match changes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Running poll loop. Stops when dropped.
pub struct LeaderboardTask {
    task: JoinHandle<()>,
    _subscription: Option<SubscriptionGuard>,
}

impl LeaderboardTask {
    /// Stop polling; same as dropping the task
    pub fn stop(self) {}
}

impl Drop for LeaderboardTask {
    fn drop(&mut self) {
        self.task.abort();
    }
}
