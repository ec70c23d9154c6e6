//! Object storage for drink photos

mod types;

use reqwest::Client;

use crate::error::{Error, Result};
use crate::fetch::Fetch;

pub use types::*;

/// Client for Supabase Storage
pub struct StorageClient {
    /// The base URL for the Supabase project
    url: String,

    /// The publishable API key
    key: String,

    /// Bearer token for uploads
    token: String,

    /// HTTP client used for requests
    client: Client,
}

/// Client for a specific storage bucket
pub struct BucketClient<'a> {
    storage: &'a StorageClient,
    bucket_id: String,
}

impl StorageClient {
    pub(crate) fn new(url: &str, key: &str, token: &str, client: Client) -> Self {
        Self {
            url: url.to_string(),
            key: key.to_string(),
            token: token.to_string(),
            client,
        }
    }

    fn get_url(&self, path: &str) -> String {
        format!("{}/storage/v1{}", self.url, path)
    }

    /// Get a client for a specific bucket
    pub fn from(&self, bucket_id: &str) -> BucketClient<'_> {
        BucketClient {
            storage: self,
            bucket_id: bucket_id.to_string(),
        }
    }
}

impl<'a> BucketClient<'a> {
    /// Upload raw bytes to `path` inside the bucket
    pub async fn upload(
        &self,
        path: &str,
        file_data: Vec<u8>,
        options: FileOptions,
    ) -> Result<UploadResponse> {
        let url = self
            .storage
            .get_url(&format!("/object/{}/{}", self.bucket_id, path));

        Fetch::post(&self.storage.client, &url)
            .header("apikey", &self.storage.key)
            .bearer_auth(&self.storage.token)
            .header("x-upsert", &options.upsert.to_string())
            .bytes(file_data, &options.content_type)
            .execute::<UploadResponse>()
            .await
            .map_err(|e| match e {
                Error::Api { message, .. } => Error::storage(message),
                other => other,
            })
    }
}
