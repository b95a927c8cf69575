//! reqwest-backed implementation of [`RemoteApi`].

use std::error::Error as StdError;
use std::time::Instant;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use opentelemetry_semantic_conventions::attribute::HTTP_RESPONSE_STATUS_CODE;
use reqwest::header::{ACCEPT, HeaderMap};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::{ApiResponse, RemoteApi};
use crate::error::{Error, Result};
use crate::telemetry::metrics;

const USER_AGENT: &str = concat!("autocrawl/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the repository API.
pub struct HttpApi {
    client: reqwest::Client,
    token: Option<SecretString>,
}

impl HttpApi {
    pub fn new(token: Option<SecretString>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Api(format!("failed to build http client: {e}")))?;
        Ok(Self { client, token })
    }
}

#[async_trait]
impl RemoteApi for HttpApi {
    async fn get(&self, url: &str) -> Result<ApiResponse> {
        let start = Instant::now();
        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| classify(url, e))?;
        let status = response.status();
        metrics::api_requests().add(
            1,
            &[KeyValue::new(
                HTTP_RESPONSE_STATUS_CODE,
                i64::from(status.as_u16()),
            )],
        );

        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let headers = collect_headers(response.headers());
        let body = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| classify(url, e))?;

        let elapsed = start.elapsed().as_millis() as f64;
        metrics::operation_duration_ms().record(elapsed, &[KeyValue::new("operation", "api.get")]);
        debug!(url, status = status.as_u16(), duration_ms = elapsed, "api request");

        Ok(ApiResponse { body, headers })
    }
}

fn collect_headers(headers: &HeaderMap) -> std::collections::HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

fn classify(url: &str, err: reqwest::Error) -> Error {
    if is_name_resolution(&err) {
        metrics::api_requests().add(1, &[KeyValue::new("error", "name_resolution")]);
        Error::NameResolution(format!("{url}: {err}"))
    } else {
        metrics::api_requests().add(1, &[KeyValue::new("error", "transport")]);
        Error::Api(format!("{url}: {err}"))
    }
}

/// Walk the error chain looking for a temporary DNS failure (`EAI_AGAIN`).
///
/// Permanent lookup failures such as an unknown host stay non-transient.
fn is_name_resolution(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        let message = e.to_string().to_ascii_lowercase();
        if message.contains("temporary failure in name resolution")
            || message.contains("eai_again")
        {
            return true;
        }
        current = e.source();
    }
    false
}
