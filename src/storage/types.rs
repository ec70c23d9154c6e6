//! Types for storage operations

use serde::{Deserialize, Serialize};

/// Options for uploading a file
#[derive(Debug, Clone)]
pub struct FileOptions {
    /// MIME type of the body
    pub content_type: String,

    /// Overwrite an existing object at the same path
    pub upsert: bool,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            content_type: "image/jpeg".to_string(),
            upsert: false,
        }
    }
}

impl FileOptions {
    /// Set the content type
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }

    /// Allow overwriting
    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }
}

/// Response to a successful upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    /// `<bucket>/<path>` of the stored object
    #[serde(rename = "Key")]
    pub key: String,

    /// Object id, when the server reports it
    #[serde(rename = "Id", default)]
    pub id: Option<String>,
}
