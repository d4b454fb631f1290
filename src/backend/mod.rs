//! Event query backend abstraction.
//!
//! The pipeline only needs two reads from the observability backend: a page
//! of events matching filters over a time range, and the events of a query
//! run that was submitted earlier.

pub mod http;

use async_trait::async_trait;
use serde::Serialize;

use crate::event::EventBatch;

pub use http::HttpEventSource;

/// Filter applied server-side to a search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryFilter {
    pub key: String,
    pub operation: String,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl QueryFilter {
    /// `key = value` on a string field
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operation: "=".to_string(),
            value: value.into(),
            kind: "string".to_string(),
        }
    }
}

/// Parameters for one page of a search
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsRequest {
    pub datasets: Vec<String>,
    pub filters: Vec<QueryFilter>,
    /// Epoch milliseconds
    pub from: i64,
    /// Epoch milliseconds
    pub to: i64,
    pub service: String,
    pub offset: usize,
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needle: Option<String>,
}

/// Parameters for reading back a query run
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRunRequest {
    pub query_id: String,
    pub run_id: String,
    pub service: String,
    pub limit: usize,
}

/// Failure of a single backend call
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Could not decode backend response: {0}")]
    Decode(String),

    #[error("Backend request timed out")]
    Timeout,

    #[error("Event backend API key not found. Set {env_var} environment variable.")]
    MissingApiKey { env_var: &'static str },
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Network(err.to_string())
        }
    }
}

/// Read access to the event backend
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch one page of events
    async fn list_events(&self, request: &ListEventsRequest) -> Result<EventBatch, BackendError>;

    /// Fetch the events produced by a query run
    async fn query_run_events(&self, request: &QueryRunRequest)
        -> Result<EventBatch, BackendError>;
}
