//! Edge Functions client

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fetch::Fetch;

/// Client for Supabase Edge Functions
pub struct FunctionsClient {
    /// The base URL for the Supabase project
    url: String,

    /// The publishable API key
    key: String,

    /// HTTP client
    client: Client,
}

/// Response from an Edge Function
#[derive(Debug, Clone)]
pub struct FunctionResponse<T> {
    /// Response data
    pub data: T,

    /// Response status
    pub status: u16,
}

/// Options for invoking an edge function
#[derive(Debug, Clone)]
pub struct FunctionInvokeOptions<T> {
    /// Request body
    pub body: Option<T>,

    /// Authorization token
    pub authorization: Option<String>,
}

impl<T> Default for FunctionInvokeOptions<T> {
    fn default() -> Self {
        Self {
            body: None,
            authorization: None,
        }
    }
}

impl<T> FunctionInvokeOptions<T> {
    /// Create new empty invoke options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request body
    pub fn with_body(mut self, body: T) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the authorization token
    pub fn with_auth(mut self, token: &str) -> Self {
        self.authorization = Some(token.to_string());
        self
    }
}

#[derive(Debug, Default, Deserialize)]
struct FunctionErrorBody {
    error: Option<String>,
}

impl FunctionsClient {
    pub(crate) fn new(url: &str, key: &str, client: Client) -> Self {
        Self {
            url: url.to_string(),
            key: key.to_string(),
            client,
        }
    }

    fn get_url(&self, function_name: &str) -> String {
        format!("{}/functions/v1/{}", self.url, function_name)
    }

    /// Invoke an edge function with a JSON body and decode its JSON answer.
    ///
    /// A non-success status fails with the function's `error` field, or
    /// `Function failed (<status>)` when it sent none.
    pub async fn invoke<T: Serialize, R: DeserializeOwned>(
        &self,
        function_name: &str,
        invoke_options: &FunctionInvokeOptions<T>,
    ) -> Result<FunctionResponse<R>> {
        let url = self.get_url(function_name);

        let mut fetch = Fetch::post(&self.client, &url).header("apikey", &self.key);
        if let Some(token) = &invoke_options.authorization {
            fetch = fetch.bearer_auth(token);
        }
        if let Some(body) = &invoke_options.body {
            fetch = fetch.json(body)?;
        }

        let response = fetch.execute_raw().await?;
        let status = response.status().as_u16();

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            let body: FunctionErrorBody = serde_json::from_str(&text).unwrap_or_default();
            let message = body
                .error
                .unwrap_or_else(|| format!("Function failed ({})", status));
            log::warn!("function {} failed with status {}: {}", function_name, status, message);
            return Err(Error::function(message));
        }

        let data = response.json::<R>().await?;
        Ok(FunctionResponse { data, status })
    }
}
