//! HTTP client for the event query API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;

use super::{BackendError, EventSource, ListEventsRequest, QueryRunRequest};
use crate::event::EventBatch;

/// Event source backed by the REST API
pub struct HttpEventSource {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpEventSource {
    pub fn new(endpoint: impl Into<String>, api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Create from `ROOTCAUSE_API_KEY`
    pub fn from_env(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        Self::from_key(endpoint, std::env::var(API_KEY_ENV).ok(), timeout)
    }

    fn from_key(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key
            .filter(|s| !s.is_empty())
            .ok_or(BackendError::MissingApiKey {
                env_var: API_KEY_ENV,
            })?;

        Self::new(endpoint, api_key, timeout)
    }

    async fn decode(response: Response) -> Result<EventBatch, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

/// Environment variable holding the backend API key
pub const API_KEY_ENV: &str = "ROOTCAUSE_API_KEY";

#[async_trait]
impl EventSource for HttpEventSource {
    async fn list_events(&self, request: &ListEventsRequest) -> Result<EventBatch, BackendError> {
        let response = self
            .client
            .post(format!("{}/events", self.endpoint))
            .header("x-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        Self::decode(response).await
    }

    async fn query_run_events(
        &self,
        request: &QueryRunRequest,
    ) -> Result<EventBatch, BackendError> {
        let limit = request.limit.to_string();
        let response = self
            .client
            .get(format!("{}/query-runs/{}", self.endpoint, request.run_id))
            .header("x-api-key", &self.api_key)
            .query(&[
                ("queryId", request.query_id.as_str()),
                ("service", request.service.as_str()),
                ("events", "true"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        Self::decode(response).await
    }
}
