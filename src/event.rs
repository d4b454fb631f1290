//! Event records as returned by the query backend.
//!
//! The backend hands back loosely structured JSON. Every field the pipeline
//! relies on is decoded leniently: a missing or mistyped field becomes `None`
//! instead of failing the whole batch, and anything not modeled explicitly is
//! kept in a residual map.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Parsed payload of an event (`_parsed` on the wire)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParsedPayload {
    /// Error text, the deduplication key
    #[serde(default, deserialize_with = "lenient_string")]
    pub error: Option<String>,

    /// Human readable message
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: Option<String>,

    /// Short-form message some loggers emit instead of `message`
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub msg: Option<String>,

    /// Everything else the log line carried
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single event from the backend
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "_dataset", default, deserialize_with = "lenient_string")]
    pub dataset: Option<String>,

    #[serde(rename = "_service", default, deserialize_with = "lenient_string")]
    pub service: Option<String>,

    #[serde(rename = "_namespace", default, deserialize_with = "lenient_string")]
    pub namespace: Option<String>,

    #[serde(rename = "_timestamp", default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(rename = "_parsed", default, deserialize_with = "lenient_payload")]
    pub parsed: Option<ParsedPayload>,

    /// Raw log line
    #[serde(rename = "_source", default, deserialize_with = "lenient_string")]
    pub source: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawEvent {
    /// The error text, if the payload carries one
    pub fn error(&self) -> Option<&str> {
        self.parsed.as_ref()?.error.as_deref()
    }

    /// The payload message, if any. `message` wins over `msg`.
    pub fn message(&self) -> Option<&str> {
        let parsed = self.parsed.as_ref()?;
        parsed.message.as_deref().or(parsed.msg.as_deref())
    }

    pub fn dataset(&self) -> &str {
        self.dataset.as_deref().unwrap_or_default()
    }

    pub fn service(&self) -> &str {
        self.service.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }
}

/// A page of events
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventBatch {
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

impl EventBatch {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Accepts epoch milliseconds or an RFC 3339 string
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    })
}

fn lenient_payload<'de, D>(deserializer: D) -> Result<Option<ParsedPayload>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        value @ Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    })
}

#[cfg(test)]
pub(crate) fn test_event(error: Option<&str>, ts_ms: i64) -> RawEvent {
    RawEvent {
        dataset: Some("lambda-logs".to_string()),
        service: Some("default".to_string()),
        namespace: Some("checkout-handler".to_string()),
        timestamp: Utc.timestamp_millis_opt(ts_ms).single(),
        parsed: Some(ParsedPayload {
            error: error.map(str::to_string),
            message: error.map(|e| format!("request failed: {e}")),
            msg: None,
            extra: Map::new(),
        }),
        source: None,
        extra: Map::new(),
    }
}
