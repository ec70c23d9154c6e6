//! Drink form state machine
//!
//! `Idle -> TypeSelected -> PhotoCaptured -> Submitting -> Succeeded | Failed`

use base64::{engine::general_purpose, Engine as _};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::drinks::{DrinkReceipt, DrinkRecorder};
use crate::error::{Error, Result};
use crate::models::DrinkType;

pub use crate::drinks::Photo;

/// Where the form is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationPhase {
    Idle,
    TypeSelected,
    PhotoCaptured,
    Submitting,
    Succeeded,
    Failed,
}

/// Shared registry of live photo previews
#[derive(Debug, Clone, Default)]
pub struct PreviewStore {
    entries: Arc<Mutex<HashMap<Uuid, String>>>,
}

impl PreviewStore {
    /// An empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a preview for `photo`; it stays live until the handle is dropped.
    pub fn create(&self, photo: &Photo) -> PhotoPreview {
        let id = Uuid::new_v4();
        let url = format!(
            "data:{};base64,{}",
            photo.content_type(),
            general_purpose::STANDARD.encode(photo.bytes())
        );
        self.with_entries(|entries| {
            entries.insert(id, url.clone());
        });
        PhotoPreview {
            id,
            url,
            store: self.clone(),
        }
    }

    /// Number of previews not yet released
    pub fn live_count(&self) -> usize {
        self.with_entries(|entries| entries.len())
    }

    /// Look up a live preview by id
    pub fn get(&self, id: &Uuid) -> Option<String> {
        self.with_entries(|entries| entries.get(id).cloned())
    }

    fn release(&self, id: &Uuid) {
        self.with_entries(|entries| {
            entries.remove(id);
        });
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<Uuid, String>) -> T) -> T {
        match self.entries.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

/// A local preview of a captured photo. Dropping it releases the preview.
#[derive(Debug)]
pub struct PhotoPreview {
    id: Uuid,
    url: String,
    store: PreviewStore,
}

impl PhotoPreview {
    /// Key of this preview in its store
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// `data:` URL to show in an image element
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for PhotoPreview {
    fn drop(&mut self) {
        self.store.release(&self.id);
    }
}

#[derive(Debug, Default)]
struct Form {
    selected: Option<DrinkType>,
    photo: Option<Photo>,
    preview: Option<PhotoPreview>,
    submitting: bool,
    success: Option<String>,
    error: Option<String>,
}

impl Form {
    fn clear_messages(&mut self) {
        self.success = None;
        self.error = None;
    }

    fn can_capture(&self) -> bool {
        self.selected.is_some() && !self.submitting
    }
}

/// The drink form
///
/// State sits behind a lock so a renderer sharing the form can watch the
/// `Submitting` phase while [`submit`](Self::submit) is awaited elsewhere.
pub struct DrinkRegistration<R> {
    recorder: R,
    previews: PreviewStore,
    amount: i32,
    clear_type_on_success: bool,
    form: Mutex<Form>,
}

impl<R: DrinkRecorder> DrinkRegistration<R> {
    /// An empty form recording through `recorder`
    pub fn new(recorder: R) -> Self {
        Self::with_previews(recorder, PreviewStore::new())
    }

    /// A form whose previews live in `previews`
    pub fn with_previews(recorder: R, previews: PreviewStore) -> Self {
        Self {
            recorder,
            previews,
            amount: 1,
            clear_type_on_success: false,
            form: Mutex::new(Form::default()),
        }
    }

    /// Also forget the selected type after a successful submit
    pub fn with_clear_type_on_success(mut self, clear: bool) -> Self {
        self.clear_type_on_success = clear;
        self
    }

    /// Points recorded per drink
    pub fn with_amount(mut self, amount: i32) -> Self {
        self.amount = amount;
        self
    }

    /// Current step of the form
    pub fn phase(&self) -> RegistrationPhase {
        let form = self.form();
        if form.submitting {
            RegistrationPhase::Submitting
        } else if form.error.is_some() {
            RegistrationPhase::Failed
        } else if form.success.is_some() {
            RegistrationPhase::Succeeded
        } else if form.photo.is_some() {
            RegistrationPhase::PhotoCaptured
        } else if form.selected.is_some() {
            RegistrationPhase::TypeSelected
        } else {
            RegistrationPhase::Idle
        }
    }

    /// The picked drink type
    pub fn selected_type(&self) -> Option<DrinkType> {
        self.form().selected
    }

    /// Id of the live preview, if a photo is captured
    pub fn preview_id(&self) -> Option<Uuid> {
        self.form().preview.as_ref().map(PhotoPreview::id)
    }

    /// `data:` URL of the live preview, if a photo is captured
    pub fn preview_url(&self) -> Option<String> {
        self.form().preview.as_ref().map(|p| p.url().to_string())
    }

    /// True while a submit is in flight
    pub fn is_submitting(&self) -> bool {
        self.form().submitting
    }

    /// Confirmation after the last successful submit
    pub fn success_message(&self) -> Option<String> {
        self.form().success.clone()
    }

    /// Why the last submit failed
    pub fn error_message(&self) -> Option<String> {
        self.form().error.clone()
    }

    /// Pick a drink type. Ignored while a submit is in flight.
    pub fn select_type(&self, drink_type: DrinkType) {
        let mut form = self.form();
        if form.submitting {
            return;
        }
        form.clear_messages();
        form.selected = Some(drink_type);
    }

    /// Go back to the type picker, dropping the photo
    pub fn clear_type(&self) {
        let mut form = self.form();
        if form.submitting {
            return;
        }
        form.clear_messages();
        form.selected = None;
        form.photo = None;
        form.preview = None;
    }

    /// Whether the camera can be used
    pub fn can_capture(&self) -> bool {
        self.form().can_capture()
    }

    /// Whether the register button is enabled
    pub fn can_submit(&self) -> bool {
        let form = self.form();
        form.selected.is_some() && form.photo.is_some() && !form.submitting
    }

    /// Take (or retake) the selfie
    pub fn capture_photo(&self, photo: Photo) -> Result<()> {
        let mut form = self.form();
        if !form.can_capture() {
            return Err(Error::validation("Pick a drink type first."));
        }
        form.clear_messages();
        // Release the old preview before making the new one.
        form.preview = None;
        form.preview = Some(self.previews.create(&photo));
        form.photo = Some(photo);
        Ok(())
    }

    /// Prompt for the current step
    pub fn instruction(&self) -> &'static str {
        let form = self.form();
        if form.selected.is_none() {
            "Pick a drink type!"
        } else if form.photo.is_none() {
            "Take a selfie with it."
        } else {
            "Register the drink."
        }
    }

    /// Label for the camera button
    pub fn capture_label(&self) -> &'static str {
        if self.form().photo.is_some() {
            "Retake photo?"
        } else {
            "Take a selfie with the drink!"
        }
    }

    /// Record the drink.
    ///
    /// The form reads as `Submitting` until the write settles, and rejects
    /// edits and a second submit meanwhile. On success the photo and preview
    /// are cleared; the type is kept unless the form was built with
    /// [`with_clear_type_on_success`](Self::with_clear_type_on_success).
    pub async fn submit(&self) -> Result<DrinkReceipt> {
        let (drink_type, photo) = {
            let mut form = self.form();
            let ready = match (form.selected, &form.photo) {
                (Some(t), Some(p)) if !form.submitting => Some((t, p.clone())),
                _ => None,
            };
            let Some(ready) = ready else {
                return Err(Error::validation("Pick a drink type and take a photo first."));
            };
            form.submitting = true;
            form.clear_messages();
            ready
        };
        // Also cleared if this future is dropped mid-write.
        let _submitting = Submitting(&self.form);

        let result = self
            .recorder
            .register_drink(drink_type, &photo, self.amount)
            .await;

        let mut form = self.form();
        form.submitting = false;
        match &result {
            Ok(receipt) => {
                log::debug!("drink {} stored at {}", receipt.drink_id, receipt.photo_path);
                form.success = Some(format!("Registered: {} ✅", drink_type));
                form.photo = None;
                form.preview = None;
                if self.clear_type_on_success {
                    form.selected = None;
                }
            }
            Err(e) => {
                log::error!("drink registration failed: {}", e);
                form.error = Some(e.user_message());
            }
        }
        result
    }

    fn form(&self) -> MutexGuard<'_, Form> {
        lock(&self.form)
    }
}

struct Submitting<'a>(&'a Mutex<Form>);

impl Drop for Submitting<'_> {
    fn drop(&mut self) {
        lock(self.0).submitting = false;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct FakeRecorder {
        calls: Arc<AtomicUsize>,
        delay: Duration,
        fail_with: Option<&'static str>,
    }

    #[async_trait]
    impl DrinkRecorder for FakeRecorder {
        async fn register_drink(
            &self,
            drink_type: DrinkType,
            photo: &Photo,
            amount: i32,
        ) -> Result<DrinkReceipt> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as i64 + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(msg) = self.fail_with {
                return Err(Error::inconsistent(msg));
            }
            assert_eq!(amount, 1);
            Ok(DrinkReceipt {
                drink_id: n,
                photo_path: format!("u/2026-10-19/{}.{}-{}", n, photo.extension(), drink_type),
            })
        }
    }

    fn jpeg() -> Photo {
        Photo::new(vec![0xff, 0xd8, 0xff], "image/jpeg")
    }

    #[test]
    fn guards_follow_the_phases() {
        let form = DrinkRegistration::new(FakeRecorder::default());
        assert_eq!(form.phase(), RegistrationPhase::Idle);
        assert!(!form.can_capture());
        assert!(form.capture_photo(jpeg()).is_err());
        assert_eq!(form.instruction(), "Pick a drink type!");

        form.select_type(DrinkType::Beer);
        assert_eq!(form.phase(), RegistrationPhase::TypeSelected);
        assert!(form.can_capture());
        assert!(!form.can_submit());
        assert_eq!(form.instruction(), "Take a selfie with it.");

        form.capture_photo(jpeg()).unwrap();
        assert_eq!(form.phase(), RegistrationPhase::PhotoCaptured);
        assert!(form.can_submit());
        assert_eq!(form.instruction(), "Register the drink.");
        assert_eq!(form.capture_label(), "Retake photo?");
    }

    #[test]
    fn retake_releases_the_old_preview() {
        let store = PreviewStore::new();
        let form = DrinkRegistration::with_previews(FakeRecorder::default(), store.clone());
        form.select_type(DrinkType::Wine);

        form.capture_photo(jpeg()).unwrap();
        let first = form.preview_id().unwrap();
        form.capture_photo(Photo::new(vec![1, 2], "image/png")).unwrap();

        assert_eq!(store.live_count(), 1);
        assert!(store.get(&first).is_none());
        assert!(form.preview_url().unwrap().starts_with("data:image/png;base64,"));

        form.clear_type();
        assert_eq!(store.live_count(), 0);
        assert_eq!(form.phase(), RegistrationPhase::Idle);
    }

    #[tokio::test]
    async fn success_clears_photo_and_keeps_type() {
        let store = PreviewStore::new();
        let recorder = FakeRecorder::default();
        let form = DrinkRegistration::with_previews(recorder.clone(), store.clone());
        form.select_type(DrinkType::Shot);
        form.capture_photo(jpeg()).unwrap();

        let receipt = form.submit().await.unwrap();
        assert_eq!(receipt.drink_id, 1);
        assert_eq!(form.phase(), RegistrationPhase::Succeeded);
        assert_eq!(form.success_message().as_deref(), Some("Registered: Shot ✅"));
        assert_eq!(form.selected_type(), Some(DrinkType::Shot));
        assert!(form.preview_url().is_none());
        assert_eq!(store.live_count(), 0);
        assert!(!form.can_submit());

        // Picking again clears the message.
        form.select_type(DrinkType::Beer);
        assert!(form.success_message().is_none());
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_can_clear_the_type() {
        let form =
            DrinkRegistration::new(FakeRecorder::default()).with_clear_type_on_success(true);
        form.select_type(DrinkType::Other);
        form.capture_photo(jpeg()).unwrap();
        form.submit().await.unwrap();
        assert_eq!(form.selected_type(), None);
        assert_eq!(form.instruction(), "Pick a drink type!");
    }

    #[tokio::test]
    async fn failure_keeps_the_photo_for_a_retry() {
        let recorder = FakeRecorder {
            fail_with: Some("Update ran but photo_path is still null."),
            ..Default::default()
        };
        let form = DrinkRegistration::new(recorder.clone());
        form.select_type(DrinkType::Beer);
        form.capture_photo(jpeg()).unwrap();

        assert!(form.submit().await.is_err());
        assert_eq!(form.phase(), RegistrationPhase::Failed);
        assert_eq!(
            form.error_message().as_deref(),
            Some("Update ran but photo_path is still null.")
        );
        assert!(form.success_message().is_none());
        assert!(form.can_submit());
    }

    #[tokio::test]
    async fn submit_without_photo_makes_no_call() {
        let recorder = FakeRecorder::default();
        let form = DrinkRegistration::new(recorder.clone());
        form.select_type(DrinkType::Beer);
        assert!(form.submit().await.is_err());
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn submitting_is_visible_while_the_write_runs() {
        let recorder = FakeRecorder {
            delay: Duration::from_secs(1),
            ..Default::default()
        };
        let form = Arc::new(DrinkRegistration::new(recorder.clone()));
        form.select_type(DrinkType::Beer);
        form.capture_photo(jpeg()).unwrap();

        let running = {
            let form = Arc::clone(&form);
            tokio::spawn(async move { form.submit().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(form.phase(), RegistrationPhase::Submitting);
        assert!(form.is_submitting());
        assert!(!form.can_submit());
        assert!(!form.can_capture());
        // Edits and a second submit are rejected meanwhile.
        form.select_type(DrinkType::Wine);
        assert_eq!(form.selected_type(), Some(DrinkType::Beer));
        assert!(form.capture_photo(jpeg()).is_err());
        assert!(form.submit().await.is_err());

        running.await.unwrap().unwrap();
        assert_eq!(form.phase(), RegistrationPhase::Succeeded);
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_submit_unlocks_the_form() {
        let recorder = FakeRecorder {
            delay: Duration::from_secs(5),
            ..Default::default()
        };
        let form = DrinkRegistration::new(recorder);
        form.select_type(DrinkType::Beer);
        form.capture_photo(jpeg()).unwrap();

        let abandoned = tokio::time::timeout(Duration::from_millis(10), form.submit()).await;
        assert!(abandoned.is_err());
        assert_eq!(form.phase(), RegistrationPhase::PhotoCaptured);
        assert!(form.can_submit());
    }
}
