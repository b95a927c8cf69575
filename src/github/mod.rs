//! Remote repository API.
//!
//! The engine only needs `GET url → {body, headers}`. Pagination travels in
//! the `link` header; see [`link`].

pub mod client;
pub mod link;
pub mod types;

pub use client::HttpApi;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::Result;

/// The remote API seam.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn get(&self, url: &str) -> Result<ApiResponse>;
}

/// A successful response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiResponse {
    pub body: serde_json::Value,
    /// Header values keyed by lower-cased name.
    pub headers: HashMap<String, String>,
}

impl ApiResponse {
    pub fn new(body: serde_json::Value) -> Self {
        Self {
            body,
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Decode the body into a typed payload.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.body)?)
    }

    /// Decode a listing page. A body that is not an array carries no
    /// entries and yields `None`.
    pub fn page<T: DeserializeOwned>(&self) -> Result<Option<Vec<T>>> {
        if !self.body.is_array() {
            return Ok(None);
        }
        Ok(Some(self.json()?))
    }
}
