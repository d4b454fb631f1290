//! Aggregation of a batch of events into distinct issues.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::dedup::{dedup, ErrorDigest};
use crate::event::RawEvent;

/// One distinct error within a single fetched batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    #[serde(serialize_with = "serialize_digest")]
    pub digest: ErrorDigest,
    /// Error text shared by every folded event
    pub error: String,
    /// Representative message, from the first event seen
    pub message: String,
    pub dataset: String,
    pub service: String,
    pub namespace: String,
    /// Events folded into this issue, counted within the batch only
    pub occurrences: usize,
    pub last_occurrence: Option<DateTime<Utc>>,
}

impl Issue {
    fn from_first(digest: ErrorDigest, event: &RawEvent, error: &str) -> Self {
        Self {
            digest,
            error: error.to_string(),
            message: event.message().unwrap_or(error).to_string(),
            dataset: event.dataset().to_string(),
            service: event.service().to_string(),
            namespace: event.namespace().to_string(),
            occurrences: 0,
            last_occurrence: None,
        }
    }

    fn fold(&mut self, event: &RawEvent) {
        self.occurrences += 1;
        self.last_occurrence = self.last_occurrence.max(event.timestamp);
    }
}

fn serialize_digest<S>(digest: &ErrorDigest, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(digest)
}

/// Group a batch into issues.
///
/// The representatives come from [`dedup`], counts and timestamps come from
/// the full batch. Issues are ordered by occurrence count descending, ties
/// in first-seen order.
pub fn aggregate(batch: &[RawEvent]) -> Vec<Issue> {
    let mut issues = Vec::new();
    let mut index: HashMap<ErrorDigest, usize> = HashMap::new();

    for event in dedup(batch) {
        let Some(error) = event.error() else {
            continue;
        };
        let digest = ErrorDigest::of(error);
        index.insert(digest, issues.len());
        issues.push(Issue::from_first(digest, event, error));
    }

    for event in batch {
        let Some(error) = event.error() else {
            continue;
        };
        if let Some(&slot) = index.get(&ErrorDigest::of(error)) {
            issues[slot].fold(event);
        }
    }

    issues.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
    issues
}
