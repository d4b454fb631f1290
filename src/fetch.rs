//! Bounded-retry polling of the event backend.
//!
//! The backend is allowed to fail transiently (query runs may still be
//! materializing, the API may return 5xx). Every failure is retried after a
//! fixed delay until the attempt budget runs out.

use std::future::Future;
use std::time::Duration;

use crate::backend::BackendError;

/// Attempt budget and inter-attempt delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(3),
        }
    }
}

/// Where a fetch currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    /// Attempt `n` (1-based) is in flight
    Attempting(u32),
    Success,
    Exhausted,
}

impl FetchState {
    /// Transition taken when the current attempt finishes
    pub fn next(self, succeeded: bool, policy: &RetryPolicy) -> FetchState {
        match self {
            FetchState::Idle => FetchState::Attempting(1),
            FetchState::Attempting(_) if succeeded => FetchState::Success,
            FetchState::Attempting(n) if n >= policy.max_attempts => FetchState::Exhausted,
            FetchState::Attempting(n) => FetchState::Attempting(n + 1),
            terminal => terminal,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FetchState::Success | FetchState::Exhausted)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Failed to get events after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: BackendError,
    },
}

/// Runs a backend call under a [`RetryPolicy`]
#[derive(Debug)]
pub struct RetryingFetcher {
    policy: RetryPolicy,
    state: FetchState,
}

impl RetryingFetcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: FetchState::Idle,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// State reached by the most recent [`fetch`](Self::fetch)
    pub fn state(&self) -> FetchState {
        self.state
    }

    /// Call `op` until it succeeds or the attempt budget is spent
    pub async fn fetch<F, Fut, T>(&mut self, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut attempt = 1;
        self.state = FetchState::Idle.next(false, &self.policy);

        loop {
            let error = match op().await {
                Ok(value) => {
                    self.state = self.state.next(true, &self.policy);
                    return Ok(value);
                }
                Err(err) => err,
            };

            tracing::debug!(
                attempt,
                max_attempts = self.policy.max_attempts,
                "fetch attempt failed: {error}"
            );

            self.state = self.state.next(false, &self.policy);
            match self.state {
                FetchState::Attempting(next) => attempt = next,
                _ => {
                    return Err(FetchError::Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                }
            }

            tokio::time::sleep(self.policy.delay).await;
        }
    }
}
