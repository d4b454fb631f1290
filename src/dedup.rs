//! Content-addressed deduplication of error events.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

use crate::event::RawEvent;

/// SHA-256 of an event's error text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorDigest([u8; 32]);

impl ErrorDigest {
    pub fn of(error: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(error.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Digest of the event's error field, or `None` for a malformed event
    pub fn for_event(event: &RawEvent) -> Option<Self> {
        match event.error() {
            Some(error) => Some(Self::of(error)),
            None => {
                tracing::debug!(
                    dataset = event.dataset(),
                    service = event.service(),
                    "skipping event without an error field"
                );
                None
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ErrorDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Keep the first event for every distinct error, in first-seen order.
///
/// Events without an error field are dropped.
pub fn dedup<'a, I>(events: I) -> Vec<&'a RawEvent>
where
    I: IntoIterator<Item = &'a RawEvent>,
{
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|event| ErrorDigest::for_event(event).is_some_and(|digest| seen.insert(digest)))
        .collect()
}
