//! The three-step drink write: metadata row, photo upload, photo path patch

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::{DrinkType, NewDrink};
use crate::storage::FileOptions;
use crate::DrinkOff;

const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// A captured selfie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    bytes: Vec<u8>,
    content_type: String,
}

impl Photo {
    /// A photo with its MIME type as reported by the camera or file picker
    pub fn new(bytes: Vec<u8>, content_type: &str) -> Self {
        Self {
            bytes,
            content_type: content_type.trim().to_string(),
        }
    }

    /// Encoded image bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// MIME type to upload with; unknown types are sent as JPEG
    pub fn content_type(&self) -> &str {
        if self.content_type.is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            &self.content_type
        }
    }

    /// File extension for the stored object
    pub fn extension(&self) -> &'static str {
        let mime = self.content_type.to_ascii_lowercase();
        if mime.contains("png") {
            "png"
        } else if mime.contains("webp") {
            "webp"
        } else {
            "jpg"
        }
    }
}

/// A fully written drink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrinkReceipt {
    pub drink_id: i64,
    pub photo_path: String,
}

/// Anything that can record a drink with its photo
#[async_trait]
pub trait DrinkRecorder: Send + Sync {
    async fn register_drink(
        &self,
        drink_type: DrinkType,
        photo: &Photo,
        amount: i32,
    ) -> Result<DrinkReceipt>;
}

#[derive(Debug, Deserialize)]
struct DrinkId {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct PatchedDrink {
    id: i64,
    photo_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct PhotoPatch<'a> {
    photo_path: &'a str,
}

/// `<user>/<YYYY-MM-DD>/<drink>.<ext>`, dated in UTC
pub fn photo_path(user_id: &str, date: NaiveDate, drink_id: i64, extension: &str) -> String {
    format!(
        "{}/{}/{}.{}",
        user_id,
        date.format("%Y-%m-%d"),
        drink_id,
        extension
    )
}

/// Drink writes against the backend
pub struct DrinkService {
    client: Arc<DrinkOff>,
}

impl DrinkService {
    /// Service writing as the client's session
    pub fn new(client: Arc<DrinkOff>) -> Self {
        Self { client }
    }

    /// Delete the player's drinks that never got a photo and are older than `max_age`.
    ///
    /// A failed upload leaves such a row behind. Returns the deleted ids.
    pub async fn purge_orphaned_drinks(&self, max_age: Duration) -> Result<Vec<i64>> {
        let session = self.client.auth().ensure_session().await?;
        let cutoff = (Utc::now() - max_age).to_rfc3339_opts(SecondsFormat::Secs, true);

        let removed = self
            .client
            .from("drinks")
            .delete()
            .eq("user_id", session.user_id())
            .is_null("photo_path")
            .lt("created_at", cutoff)
            .select("id")
            .execute::<DrinkId>()
            .await?;

        let ids: Vec<i64> = removed.into_iter().map(|d| d.id).collect();
        if !ids.is_empty() {
            log::info!("purged {} drinks without a photo", ids.len());
        }
        Ok(ids)
    }
}

#[async_trait]
impl DrinkRecorder for DrinkService {
    /// Insert the row, upload the photo, then patch the row with the photo path.
    ///
    /// A failed upload leaves the row without a photo; nothing is rolled back.
    /// The patch must confirm exactly the inserted row with a non-null path.
    async fn register_drink(
        &self,
        drink_type: DrinkType,
        photo: &Photo,
        amount: i32,
    ) -> Result<DrinkReceipt> {
        let session = self.client.auth().ensure_session().await?;
        let user_id = session.user_id();
        if user_id.is_empty() {
            return Err(Error::auth("No authenticated user"));
        }

        let inserted = self
            .client
            .from("drinks")
            .insert(NewDrink {
                user_id,
                drink_type,
                amount,
            })
            .select("id")
            .execute_single::<DrinkId>()
            .await?;
        let drink_id = inserted.id;
        log::debug!("inserted drink {} for {}", drink_id, user_id);

        let path = photo_path(user_id, Utc::now().date_naive(), drink_id, photo.extension());
        let options = FileOptions::default()
            .with_content_type(photo.content_type())
            .with_upsert(false);
        let bucket = self.client.options().photo_bucket.clone();
        if let Err(e) = self
            .client
            .storage()
            .from(&bucket)
            .upload(&path, photo.bytes().to_vec(), options)
            .await
        {
            log::warn!("drink {} is left without a photo: {}", drink_id, e);
            return Err(e);
        }

        let patched = self
            .client
            .from("drinks")
            .update(PhotoPatch { photo_path: &path })
            .eq("id", drink_id)
            .eq("user_id", user_id)
            .select("id, photo_path")
            .execute_maybe_single::<PatchedDrink>()
            .await?
            .ok_or_else(|| {
                Error::inconsistent(
                    "No drink row was updated. Most likely the update is blocked by \
                     row-level security, or user_id doesn't match the inserted row.",
                )
            })?;

        if patched.id != drink_id {
            return Err(Error::inconsistent(format!(
                "Updated drink {} instead of {}",
                patched.id, drink_id
            )));
        }
        let photo_path = patched
            .photo_path
            .ok_or_else(|| Error::inconsistent("Update ran but photo_path is still null."))?;

        log::info!("registered {} as drink {}", drink_type, drink_id);
        Ok(DrinkReceipt {
            drink_id,
            photo_path,
        })
    }
}
