//! Query builders for PostgrestClient

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

use crate::error::Error;
use crate::fetch::{Fetch, FetchBuilder};
use crate::postgrest::filter::{FilterOperator, Order};
use crate::postgrest::types::{RETURN_REPRESENTATION, SINGLE_OBJECT};

/// Base query builder
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    /// Filter and option parameters, in insertion order
    params: Vec<(String, String)>,

    /// `order=` clauses, joined at build time
    orders: Vec<String>,
}

impl QueryBuilder {
    /// Create a new QueryBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter to the query
    pub fn add_param(&mut self, key: &str, value: &str) {
        self.params.push((key.to_string(), value.to_string()));
    }

    /// Set a parameter, replacing any earlier value for the same key
    pub fn set_param(&mut self, key: &str, value: &str) {
        self.params.retain(|(k, _)| k != key);
        self.add_param(key, value);
    }

    /// Add an `op.value` filter on a column
    pub fn add_filter<T: fmt::Display>(&mut self, column: &str, op: FilterOperator, value: T) {
        let filter = op.apply(value);
        self.add_param(column, &filter);
    }

    /// Add an ordering clause; earlier clauses take precedence
    pub fn add_order(&mut self, column: &str, order: Order) {
        self.orders.push(order.render(column));
    }

    /// Get the query parameters
    pub fn get_params(&self) -> Vec<(String, String)> {
        let mut params = self.params.clone();
        if !self.orders.is_empty() {
            params.push(("order".to_string(), self.orders.join(",")));
        }
        params
    }
}

/// Connection details every builder needs
#[derive(Clone)]
pub(crate) struct Target {
    pub(crate) url: String,
    pub(crate) key: String,
    pub(crate) token: String,
    pub(crate) client: Client,
}

impl Target {
    fn request<'a>(&'a self, fetch: fn(&'a Client, &str) -> FetchBuilder<'a>) -> FetchBuilder<'a> {
        fetch(&self.client, &self.url)
            .header("apikey", &self.key)
            .bearer_auth(&self.token)
    }
}

/// Builder for SELECT queries
pub struct SelectBuilder {
    target: Target,
    query: QueryBuilder,
}

impl SelectBuilder {
    pub(crate) fn new(target: Target, columns: &str) -> Self {
        let mut query = QueryBuilder::new();
        query.set_param("select", columns);
        Self { target, query }
    }

    /// Filter rows where column equals a value
    pub fn eq<T: fmt::Display>(&mut self, column: &str, value: T) -> &mut Self {
        self.query.add_filter(column, FilterOperator::Eq, value);
        self
    }

    /// Filter rows where column is null
    pub fn is_null(&mut self, column: &str) -> &mut Self {
        self.query.add_filter(column, FilterOperator::Is, "null");
        self
    }

    /// Order the results by a column; call repeatedly for tie-breakers
    pub fn order(&mut self, column: &str, order: Order) -> &mut Self {
        self.query.add_order(column, order);
        self
    }

    /// Limit the number of rows returned
    pub fn limit(&mut self, count: usize) -> &mut Self {
        self.query.set_param("limit", &count.to_string());
        self
    }

    /// Execute the query and return the results
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<Vec<T>, Error> {
        self.target
            .request(Fetch::get)
            .query(&self.query.get_params())
            .execute::<Vec<T>>()
            .await
    }

    /// Execute the query and return the first row, if any
    pub async fn execute_one<T: DeserializeOwned>(&mut self) -> Result<Option<T>, Error> {
        self.limit(1);
        let results = self.execute::<T>().await?;
        Ok(results.into_iter().next())
    }

    /// Ask for exactly one object. No match (or several) fails with `PGRST116`.
    pub async fn execute_single<T: DeserializeOwned>(&self) -> Result<T, Error> {
        self.target
            .request(Fetch::get)
            .header("Accept", SINGLE_OBJECT)
            .query(&self.query.get_params())
            .execute::<T>()
            .await
    }
}

/// Builder for INSERT queries
pub struct InsertBuilder<T: Serialize> {
    target: Target,
    values: T,
    query: QueryBuilder,
}

impl<T: Serialize> InsertBuilder<T> {
    pub(crate) fn new(target: Target, values: T) -> Self {
        Self {
            target,
            values,
            query: QueryBuilder::new(),
        }
    }

    /// Columns to return for the inserted row(s)
    pub fn select(&mut self, columns: &str) -> &mut Self {
        self.query.set_param("select", columns);
        self
    }

    /// Insert one row and return it
    pub async fn execute_single<R: DeserializeOwned>(&self) -> Result<R, Error> {
        self.target
            .request(Fetch::post)
            .header("Prefer", RETURN_REPRESENTATION)
            .header("Accept", SINGLE_OBJECT)
            .query(&self.query.get_params())
            .json(&self.values)?
            .execute::<R>()
            .await
    }
}

/// Builder for UPDATE queries
pub struct UpdateBuilder<T: Serialize> {
    target: Target,
    values: T,
    query: QueryBuilder,
}

impl<T: Serialize> UpdateBuilder<T> {
    pub(crate) fn new(target: Target, values: T) -> Self {
        Self {
            target,
            values,
            query: QueryBuilder::new(),
        }
    }

    /// Filter rows where column equals a value
    pub fn eq<V: fmt::Display>(&mut self, column: &str, value: V) -> &mut Self {
        self.query.add_filter(column, FilterOperator::Eq, value);
        self
    }

    /// Columns to return for the updated rows
    pub fn select(&mut self, columns: &str) -> &mut Self {
        self.query.set_param("select", columns);
        self
    }

    /// Execute the update and return every updated row
    pub async fn execute<R: DeserializeOwned>(&self) -> Result<Vec<R>, Error> {
        self.target
            .request(Fetch::patch)
            .header("Prefer", RETURN_REPRESENTATION)
            .query(&self.query.get_params())
            .json(&self.values)?
            .execute::<Vec<R>>()
            .await
    }

    /// Execute the update and return the updated row, or `None` when nothing matched
    pub async fn execute_maybe_single<R: DeserializeOwned>(&self) -> Result<Option<R>, Error> {
        let rows = self.execute::<R>().await?;
        if rows.len() > 1 {
            return Err(Error::inconsistent(format!(
                "Expected at most one updated row, got {}",
                rows.len()
            )));
        }
        Ok(rows.into_iter().next())
    }
}

/// Builder for DELETE queries
pub struct DeleteBuilder {
    target: Target,
    query: QueryBuilder,
}

impl DeleteBuilder {
    pub(crate) fn new(target: Target) -> Self {
        Self {
            target,
            query: QueryBuilder::new(),
        }
    }

    /// Filter rows where column equals a value
    pub fn eq<V: fmt::Display>(&mut self, column: &str, value: V) -> &mut Self {
        self.query.add_filter(column, FilterOperator::Eq, value);
        self
    }

    /// Filter rows where column is null
    pub fn is_null(&mut self, column: &str) -> &mut Self {
        self.query.add_filter(column, FilterOperator::Is, "null");
        self
    }

    /// Filter rows where column is less than a value
    pub fn lt<V: fmt::Display>(&mut self, column: &str, value: V) -> &mut Self {
        self.query.add_filter(column, FilterOperator::Lt, value);
        self
    }

    /// Columns to return for the deleted rows
    pub fn select(&mut self, columns: &str) -> &mut Self {
        self.query.set_param("select", columns);
        self
    }

    /// Execute the query and return the deleted rows
    pub async fn execute<R: DeserializeOwned>(&self) -> Result<Vec<R>, Error> {
        self.target
            .request(Fetch::delete)
            .header("Prefer", RETURN_REPRESENTATION)
            .query(&self.query.get_params())
            .execute::<Vec<R>>()
            .await
    }
}
