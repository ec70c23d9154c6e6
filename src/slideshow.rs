//! Admin slideshow over short-lived signed photo URLs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::error::{Error, Result};
use crate::functions::FunctionInvokeOptions;
use crate::models::SlideshowImage;
use crate::DrinkOff;

/// Shown when no photos have been uploaded
pub const EMPTY_MESSAGE: &str = "No images yet.";

/// Where slideshow images come from
#[async_trait]
pub trait ImageSource: Send + Sync + 'static {
    async fn fetch_images(&self, limit: usize) -> Result<Vec<SlideshowImage>>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SlideshowRequest {
    limit: usize,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SlideshowResponse {
    #[serde(default)]
    images: Vec<SlideshowImage>,
}

/// Asks the signing edge function for a batch of photo URLs
pub struct SlideshowService {
    client: Arc<DrinkOff>,
}

impl SlideshowService {
    /// Service calling the function as the client's session
    pub fn new(client: Arc<DrinkOff>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageSource for SlideshowService {
    /// Requires a signed-in session; the function checks the admin role.
    async fn fetch_images(&self, limit: usize) -> Result<Vec<SlideshowImage>> {
        let token = self
            .client
            .auth()
            .valid_access_token()
            .await?
            .ok_or_else(|| Error::auth("Not signed in"))?;
        let options = self.client.options();

        let invoke = FunctionInvokeOptions::new()
            .with_body(SlideshowRequest {
                limit,
                expires_in: options.signed_url_ttl.as_secs(),
            })
            .with_auth(&token);
        let response = self
            .client
            .functions()
            .invoke::<_, SlideshowResponse>(&options.slideshow_function, &invoke)
            .await?;

        log::debug!("fetched {} slideshow images", response.data.images.len());
        Ok(response.data.images)
    }
}

/// What the slideshow panel shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlideView {
    Loading,
    Error(String),
    Empty,
    Showing {
        url: String,
        photo_path: String,
        /// 1-based position in the batch
        position: usize,
        total: usize,
        /// false during the fade-out
        visible: bool,
    },
}

/// Slideshow state without any timers
#[derive(Debug, Clone)]
pub struct SlideshowState {
    images: Vec<SlideshowImage>,
    index: usize,
    loading: bool,
    error: Option<String>,
    visible: bool,
    /// Bumped whenever the batch is swapped or reloaded
    generation: u64,
}

impl Default for SlideshowState {
    fn default() -> Self {
        Self {
            images: Vec::new(),
            index: 0,
            loading: true,
            error: None,
            visible: true,
            generation: 0,
        }
    }
}

impl SlideshowState {
    /// Swap in a new batch and start over from the first image
    pub fn replace(&mut self, images: Vec<SlideshowImage>) {
        self.images = images;
        self.index = 0;
        self.generation += 1;
    }

    /// Move to the next image. Returns true when the batch wrapped to the start.
    pub fn step(&mut self) -> bool {
        if self.images.is_empty() {
            return false;
        }
        let next = self.index + 1;
        if next >= self.images.len() {
            self.index = 0;
            true
        } else {
            self.index = next;
            false
        }
    }

    /// 0-based index of the image on screen
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of images in the batch
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// True when the batch has no images
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Whether the timer should be running
    pub fn is_cycling(&self) -> bool {
        !self.loading && !self.images.is_empty()
    }

    /// The image on screen, if any
    pub fn current(&self) -> Option<&SlideshowImage> {
        self.images.get(self.index)
    }

    /// What the slideshow screen shows
    pub fn view(&self) -> SlideView {
        if self.loading {
            return SlideView::Loading;
        }
        if let Some(error) = &self.error {
            return SlideView::Error(error.clone());
        }
        match self.current() {
            None => SlideView::Empty,
            Some(image) => SlideView::Showing {
                url: image.url.clone(),
                photo_path: image.photo_path.clone(),
                position: self.index + 1,
                total: self.images.len(),
                visible: self.visible,
            },
        }
    }
}

/// What one [`SlideshowController::advance`] did
#[derive(Debug)]
pub enum Advance {
    /// Nothing to show, or still loading
    Idle,
    /// The batch was swapped or reloaded during the fade; the image was not stepped
    Interrupted,
    /// Moved to the next image
    Stepped,
    /// Back at the first image. Holds the background refetch if this wrap started one.
    Wrapped { refetch: Option<JoinHandle<()>> },
}

/// Cycles through the batch and refetches it on every wrap
pub struct SlideshowController<S> {
    source: S,
    limit: usize,
    fade: Duration,
    interval: Mutex<Duration>,
    state: Mutex<SlideshowState>,
    refetching: Arc<AtomicBool>,
    changed: Notify,
}

impl SlideshowController<SlideshowService> {
    /// Controller over the backend, using the configured limit and timings
    pub fn from_client(client: Arc<DrinkOff>) -> Self {
        let options = client.options();
        let (limit, interval, fade) = (
            options.slideshow_limit,
            options.slideshow_interval,
            options.fade_duration,
        );
        Self::new(SlideshowService::new(client), limit, interval, fade)
    }
}

impl<S: ImageSource> SlideshowController<S> {
    /// Controller fetching up to `limit` images and showing each for `interval`
    pub fn new(source: S, limit: usize, interval: Duration, fade: Duration) -> Self {
        Self {
            source,
            limit,
            fade,
            interval: Mutex::new(interval),
            state: Mutex::new(SlideshowState::default()),
            refetching: Arc::new(AtomicBool::new(false)),
            changed: Notify::new(),
        }
    }

    /// The image source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// What the slideshow screen shows
    pub fn view(&self) -> SlideView {
        lock(&self.state).view()
    }

    /// Snapshot of the current state
    pub fn state(&self) -> SlideshowState {
        lock(&self.state).clone()
    }

    /// How long each image stays up
    pub fn interval(&self) -> Duration {
        *lock(&self.interval)
    }

    /// Change the cycle length; a running timer restarts with it
    pub fn set_interval(&self, interval: Duration) {
        *lock(&self.interval) = interval;
        self.changed.notify_waiters();
    }

    /// Load a fresh batch with the spinner showing and start from the first image
    pub async fn refresh(&self) -> Result<()> {
        {
            let mut state = lock(&self.state);
            state.error = None;
            state.loading = true;
            state.generation += 1;
        }
        self.changed.notify_waiters();

        let result = self.source.fetch_images(self.limit).await;

        {
            let mut state = lock(&self.state);
            state.loading = false;
            match &result {
                Ok(images) => state.replace(images.clone()),
                Err(e) => {
                    log::error!("failed to load slideshow images: {}", e);
                    state.error = Some(e.user_message());
                }
            }
        }
        self.changed.notify_waiters();
        result.map(|_| ())
    }

    /// One cycle: fade out, wait the fade window, show the next image.
    ///
    /// Wrapping back to the first image starts a background refetch unless one
    /// is already running. The refetch does not show the spinner; the old batch
    /// stays up until the new one lands. A batch that changes during the fade
    /// is shown from its first image without stepping.
    pub async fn advance(self: &Arc<Self>) -> Advance {
        let generation = {
            let mut state = lock(&self.state);
            if !state.is_cycling() {
                return Advance::Idle;
            }
            state.visible = false;
            state.generation
        };

        sleep(self.fade).await;

        let wrapped = {
            let mut state = lock(&self.state);
            state.visible = true;
            if state.generation != generation || !state.is_cycling() {
                log::trace!("slideshow batch changed during the fade");
                return Advance::Interrupted;
            }
            state.step()
        };

        if wrapped {
            Advance::Wrapped {
                refetch: self.spawn_refetch(),
            }
        } else {
            Advance::Stepped
        }
    }

    /// Load the first batch, then advance on a timer.
    ///
    /// The timer idles while loading or while the batch is empty, and restarts
    /// whenever the batch, loading state or interval changes. Dropping the
    /// returned task stops it along with any refetch it started.
    pub fn start(self: &Arc<Self>) -> SlideshowTask {
        let controller = Arc::clone(self);
        let task = tokio::spawn(async move {
            let _ = controller.refresh().await;
            // Aborted with this task.
            let mut _refetch: Option<AbortOnDrop> = None;

            loop {
                let changed = controller.changed.notified();
                let cycling = lock(&controller.state).is_cycling();
                if !cycling {
                    changed.await;
                    continue;
                }

                let period = controller.interval();
                tokio::select! {
                    _ = changed => {
                        log::trace!("slideshow timer restarted");
                    }
                    _ = sleep(period) => {
                        if let Advance::Wrapped {
                            refetch: Some(handle),
                        } = controller.advance().await
                        {
                            _refetch = Some(AbortOnDrop(handle));
                        }
                    }
                }
            }
        });
        SlideshowTask { task }
    }

    fn spawn_refetch(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self
            .refetching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let refetching = Refetching(Arc::clone(&self.refetching));
        let controller = Arc::clone(self);
        Some(tokio::spawn(async move {
            let _refetching = refetching;
            match controller.source.fetch_images(controller.limit).await {
                Ok(images) => {
                    log::debug!("slideshow wrapped, {} images in new batch", images.len());
                    lock(&controller.state).replace(images);
                    controller.changed.notify_waiters();
                }
                // Keep cycling the old batch.
                Err(e) => log::warn!("slideshow refetch failed: {}", e),
            }
        }))
    }
}

/// Clears the refetch flag when the refetch ends or is aborted
struct Refetching(Arc<AtomicBool>);

impl Drop for Refetching {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Running slideshow timer. Stops when dropped.
pub struct SlideshowTask {
    task: JoinHandle<()>,
}

impl SlideshowTask {
    /// Stop the timer; same as dropping the task
    pub fn stop(self) {}
}

impl Drop for SlideshowTask {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct FakeImages {
        calls: AtomicUsize,
        delay: Duration,
        images: Mutex<Vec<SlideshowImage>>,
        fail: AtomicBool,
    }

    impl FakeImages {
        fn with(count: usize) -> Self {
            Self {
                images: Mutex::new(images(count)),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageSource for FakeImages {
        async fn fetch_images(&self, _limit: usize) -> Result<Vec<SlideshowImage>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::function("Forbidden"));
            }
            Ok(self.images.lock().unwrap().clone())
        }
    }

    fn images(count: usize) -> Vec<SlideshowImage> {
        (0..count)
            .map(|i| SlideshowImage {
                url: format!("https://cdn.test/{}.jpg?token=t", i),
                photo_path: format!("u/2026-10-19/{}.jpg", i),
            })
            .collect()
    }

    fn controller(source: FakeImages) -> Arc<SlideshowController<FakeImages>> {
        Arc::new(SlideshowController::new(
            source,
            200,
            Duration::from_millis(3500),
            Duration::from_millis(250),
        ))
    }

    fn position(view: SlideView) -> Option<(usize, bool)> {
        match view {
            SlideView::Showing {
                position, visible, ..
            } => Some((position, visible)),
            _ => None,
        }
    }

    #[test]
    fn step_wraps_to_the_start() {
        let mut state = SlideshowState::default();
        assert!(!state.step());
        state.replace(images(3));
        assert!(!state.step());
        assert!(!state.step());
        assert_eq!(state.index(), 2);
        assert!(state.step());
        assert_eq!(state.index(), 0);
    }

    #[tokio::test]
    async fn refresh_shows_empty_and_errors() {
        let c = controller(FakeImages::default());
        assert_eq!(c.view(), SlideView::Loading);

        c.refresh().await.unwrap();
        assert_eq!(c.view(), SlideView::Empty);

        c.source().fail.store(true, Ordering::SeqCst);
        assert!(c.refresh().await.is_err());
        assert_eq!(c.view(), SlideView::Error("Forbidden".to_string()));

        c.source().fail.store(false, Ordering::SeqCst);
        *c.source().images.lock().unwrap() = images(2);
        c.refresh().await.unwrap();
        assert_eq!(position(c.view()), Some((1, true)));
    }

    #[tokio::test(start_paused = true)]
    async fn advance_fades_out_then_steps() {
        let c = controller(FakeImages::with(3));
        c.refresh().await.unwrap();

        let running = {
            let c = Arc::clone(&c);
            tokio::spawn(async move { c.advance().await })
        };
        sleep(Duration::from_millis(100)).await;
        assert_eq!(position(c.view()), Some((1, false)));

        assert!(matches!(running.await.unwrap(), Advance::Stepped));
        assert_eq!(position(c.view()), Some((2, true)));
    }

    #[tokio::test(start_paused = true)]
    async fn batch_swapped_during_the_fade_starts_from_its_first_image() {
        let c = controller(FakeImages::with(3));
        c.refresh().await.unwrap();

        let running = {
            let c = Arc::clone(&c);
            tokio::spawn(async move { c.advance().await })
        };
        sleep(Duration::from_millis(100)).await;
        *c.source().images.lock().unwrap() = images(4);
        c.refresh().await.unwrap();

        assert!(matches!(running.await.unwrap(), Advance::Interrupted));
        assert_eq!(
            c.view(),
            SlideView::Showing {
                url: "https://cdn.test/0.jpg?token=t".to_string(),
                photo_path: "u/2026-10-19/0.jpg".to_string(),
                position: 1,
                total: 4,
                visible: true,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn no_step_while_a_refresh_is_loading() {
        let c = controller(FakeImages {
            delay: Duration::from_millis(200),
            ..FakeImages::with(3)
        });
        c.refresh().await.unwrap();
        c.source().images.lock().unwrap().truncate(2);

        let running = {
            let c = Arc::clone(&c);
            tokio::spawn(async move { c.advance().await })
        };
        sleep(Duration::from_millis(100)).await;
        // Still loading when the fade ends.
        let refreshing = {
            let c = Arc::clone(&c);
            tokio::spawn(async move { c.refresh().await })
        };
        sleep(Duration::from_millis(1)).await;
        assert_eq!(c.view(), SlideView::Loading);

        assert!(matches!(running.await.unwrap(), Advance::Interrupted));
        refreshing.await.unwrap().unwrap();
        assert_eq!(c.state().index(), 0);
        assert_eq!(c.state().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn wrap_refetches_once_without_loading() {
        let c = controller(FakeImages {
            delay: Duration::from_secs(1),
            ..FakeImages::with(1)
        });
        c.refresh().await.unwrap();
        assert_eq!(c.source().calls(), 1);

        let refetch = match c.advance().await {
            Advance::Wrapped { refetch } => refetch.expect("first wrap refetches"),
            other => panic!("expected a wrap, got {:?}", other),
        };
        // The old batch stays up while the refetch runs.
        assert_eq!(position(c.view()), Some((1, true)));

        // A second wrap during the refetch does not start another.
        match c.advance().await {
            Advance::Wrapped { refetch } => assert!(refetch.is_none()),
            other => panic!("expected a wrap, got {:?}", other),
        }

        refetch.await.unwrap();
        assert_eq!(c.source().calls(), 2);
        assert!(!matches!(c.view(), SlideView::Loading));
    }

    #[tokio::test(start_paused = true)]
    async fn timer_cycles_at_the_interval() {
        let c = controller(FakeImages::with(3));
        let _task = c.start();

        sleep(Duration::from_millis(1)).await;
        assert_eq!(position(c.view()), Some((1, true)));

        sleep(Duration::from_millis(3500 + 250)).await;
        assert_eq!(position(c.view()), Some((2, true)));

        sleep(Duration::from_millis(3750)).await;
        assert_eq!(position(c.view()), Some((3, true)));
    }

    #[tokio::test(start_paused = true)]
    async fn timer_idles_on_an_empty_batch() {
        let c = controller(FakeImages::default());
        let _task = c.start();

        sleep(Duration::from_secs(30)).await;
        assert_eq!(c.view(), SlideView::Empty);
        assert_eq!(c.source().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_interval_restarts_the_timer() {
        let c = controller(FakeImages::with(3));
        c.set_interval(Duration::from_secs(60));
        let _task = c.start();

        sleep(Duration::from_secs(1)).await;
        c.set_interval(Duration::from_secs(2));
        sleep(Duration::from_millis(2300)).await;
        assert_eq!(position(c.view()), Some((2, true)));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_task_cancels_its_refetch() {
        let c = controller(FakeImages {
            delay: Duration::from_secs(1),
            ..FakeImages::with(1)
        });
        let task = c.start();

        // Loaded at 1s, wrapped at 4.75s, refetch still running at 5s.
        sleep(Duration::from_secs(5)).await;
        assert_eq!(c.source().calls(), 2);
        drop(task);

        *c.source().images.lock().unwrap() = images(2);
        sleep(Duration::from_secs(5)).await;
        assert_eq!(c.state().len(), 1);

        // The aborted refetch does not block the next one.
        match c.advance().await {
            Advance::Wrapped { refetch } => assert!(refetch.is_some()),
            other => panic!("expected a wrap, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_task_stops_the_timer() {
        let c = controller(FakeImages::with(3));
        let task = c.start();
        sleep(Duration::from_millis(1)).await;
        drop(task);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(position(c.view()), Some((1, true)));
    }
}
