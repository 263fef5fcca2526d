//! Data modeling API client implementation.
//!
//! This module provides the HTTP client for the data modeling REST API. One
//! client serves every resource kind; the kind only decides the endpoint and
//! the item shapes.

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::CdfConfig;
use crate::error::{ApiError, ConfigError, Result};
use crate::schema::{ResourceKind, ResourceRef};

use super::api::{ApiFailure, ApiResult, ResourceApi};
use super::types::{ErrorResponse, ItemsRequest, ItemsResponse};

/// Environment variable holding the bearer token.
pub const TOKEN_ENV_VAR: &str = "CDF_TOKEN";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of attempts for transient failures.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// Data modeling API client.
#[derive(Debug, Clone)]
pub struct CdfClient {
    /// HTTP client.
    client: Client,
    /// Cluster base URL, without trailing slash.
    base_url: String,
    /// Project name.
    project: String,
    /// Bearer token.
    token: String,
    /// Base delay between retries.
    retry_delay: Duration,
}

/// A failed request with the items named by the error body.
#[derive(Debug)]
struct RequestError {
    error: ApiError,
    items: Vec<serde_json::Value>,
}

impl From<ApiError> for RequestError {
    fn from(error: ApiError) -> Self {
        Self {
            error,
            items: Vec::new(),
        }
    }
}

impl CdfClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: &str, project: &str, token: &str) -> Result<Self> {
        Self::with_timeout(base_url, project, token, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(base_url: &str, project: &str, token: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ApiError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            project: project.to_string(),
            token: token.to_string(),
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        })
    }

    /// Creates a client from configuration, reading the token from `CDF_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not set or the client cannot be created.
    pub fn from_config(config: &CdfConfig) -> Result<Self> {
        let token = std::env::var(TOKEN_ENV_VAR).map_err(|_| ConfigError::MissingEnvVar {
            name: TOKEN_ENV_VAR.to_string(),
        })?;
        Self::with_timeout(&config.base_url, &config.project, &token, config.timeout_secs)
    }

    /// Overrides the base delay between retries.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Project this client talks to.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// URL of a data modeling endpoint.
    fn url(&self, endpoint: &str, suffix: &str) -> String {
        format!(
            "{}/api/v1/projects/{}/models/{endpoint}{suffix}",
            self.base_url, self.project
        )
    }

    /// Posts a batch, retrying transient failures.
    async fn post<B: Serialize + Sync, T: DeserializeOwned + Send>(
        &self,
        url: &str,
        items: &[B],
    ) -> std::result::Result<Vec<T>, RequestError> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {MAX_RETRIES}");
                tokio::time::sleep(self.retry_delay * attempt).await;
            }

            match self.post_once(url, items).await {
                Ok(result) => return Ok(result),
                Err(e) if e.error.is_retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ApiError::network("Max retries exceeded").into()))
    }

    /// Posts a single batch.
    async fn post_once<B: Serialize + Sync, T: DeserializeOwned + Send>(
        &self,
        url: &str,
        items: &[B],
    ) -> std::result::Result<Vec<T>, RequestError> {
        trace!("POST {url} with {} item(s)", items.len());

        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(&self.token)
            .json(&ItemsRequest { items })
            .send()
            .await
            .map_err(|e| ApiError::network(format!("Request failed: {e}")))?;

        let status = response.status();

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ApiError::AuthenticationFailed {
                message: String::from("Invalid or expired token"),
            }
            .into());
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(parsed) => RequestError {
                    items: parsed.error.affected_items().cloned().collect(),
                    error: ApiError::request_failed(status.as_u16(), parsed.error.message),
                },
                Err(_) => ApiError::request_failed(status.as_u16(), body).into(),
            });
        }

        let body: ItemsResponse<T> = response.json().await.map_err(|e| ApiError::InvalidResponse {
            message: format!("Failed to parse response: {e}"),
        })?;

        Ok(body.items)
    }

    /// Converts a request error into a failure naming the affected identities.
    ///
    /// The request was rejected as a whole. When the error body does not name
    /// any requested item, every requested item failed.
    fn failure<K: ResourceKind>(error: RequestError, requested: Vec<K::Id>) -> ApiFailure<K::Id> {
        let mut named: Vec<K::Id> = error
            .items
            .iter()
            .filter_map(|item| K::get_id(ResourceRef::Raw(item)).ok())
            .filter(|id| requested.contains(id))
            .collect();
        named.dedup();

        if named.is_empty() {
            return ApiFailure::from_error(&error.error, requested);
        }
        ApiFailure::from_error(&error.error, named)
    }
}

#[async_trait]
impl<K: ResourceKind> ResourceApi<K> for CdfClient {
    async fn create(&self, items: &[K::Write]) -> ApiResult<Vec<K::Read>, K::Id> {
        debug!("Creating {} {}(s)", items.len(), K::NAME);
        self.post(&self.url(K::ENDPOINT, ""), items)
            .await
            .map_err(|e| Self::failure::<K>(e, items.iter().map(K::write_id).collect()))
    }

    async fn retrieve(&self, ids: &[K::Id]) -> ApiResult<Vec<K::Read>, K::Id> {
        debug!("Retrieving {} {}(s)", ids.len(), K::NAME);
        self.post(&self.url(K::ENDPOINT, "/byids"), ids)
            .await
            .map_err(|e| Self::failure::<K>(e, ids.to_vec()))
    }

    async fn update(&self, items: &[K::Write]) -> ApiResult<Vec<K::Read>, K::Id> {
        debug!("Updating {} {}(s)", items.len(), K::NAME);
        self.post(&self.url(K::ENDPOINT, ""), items)
            .await
            .map_err(|e| Self::failure::<K>(e, items.iter().map(K::write_id).collect()))
    }

    async fn delete(&self, ids: &[K::Id]) -> ApiResult<Vec<K::Id>, K::Id> {
        debug!("Deleting {} {}(s)", ids.len(), K::NAME);
        self.post(&self.url(K::ENDPOINT, "/delete"), ids)
            .await
            .map_err(|e| Self::failure::<K>(e, ids.to_vec()))
    }
}
