//! Table and view access through the PostgREST API

mod filter;
mod query;
mod types;

use reqwest::Client;
use serde::Serialize;

pub use filter::*;
pub use query::*;
pub use types::*;

/// Client for one table or view
pub struct PostgrestClient {
    target: Target,
}

impl PostgrestClient {
    /// Create a new PostgrestClient.
    ///
    /// `token` is sent as the bearer token: the session's access token, or the
    /// publishable key for unauthenticated reads.
    pub(crate) fn new(url: &str, key: &str, table: &str, token: &str, client: Client) -> Self {
        Self {
            target: Target {
                url: format!("{}/rest/v1/{}", url, table),
                key: key.to_string(),
                token: token.to_string(),
                client,
            },
        }
    }

    /// Select specific columns from the table
    pub fn select(&self, columns: &str) -> SelectBuilder {
        SelectBuilder::new(self.target.clone(), columns)
    }

    /// Insert data into the table
    pub fn insert<T: Serialize>(&self, values: T) -> InsertBuilder<T> {
        InsertBuilder::new(self.target.clone(), values)
    }

    /// Update data in the table
    pub fn update<T: Serialize>(&self, values: T) -> UpdateBuilder<T> {
        UpdateBuilder::new(self.target.clone(), values)
    }

    /// Delete data from the table
    pub fn delete(&self) -> DeleteBuilder {
        DeleteBuilder::new(self.target.clone())
    }
}
