//! rootcause - interactive root-cause investigation of backend errors
//!
//! This library provides the pipeline behind the `rootcause` CLI: fetching
//! error events with bounded retries, deduplicating and aggregating them into
//! issues, paging through them interactively, and explaining the chosen one
//! with a chat completion.

pub mod backend;
pub mod cli;
pub mod config;
pub mod dedup;
pub mod event;
pub mod explain;
pub mod fetch;
pub mod issues;
pub mod output;
pub mod providers;
pub mod select;
pub mod timeframe;

// Re-export commonly used types
pub use backend::{EventSource, HttpEventSource};
pub use cli::{Cli, Command};
pub use config::Config;
pub use dedup::{dedup, ErrorDigest};
pub use event::{EventBatch, RawEvent};
pub use explain::{ExplanationError, ExplanationStreamer, OutputMode};
pub use fetch::{FetchError, FetchState, RetryPolicy, RetryingFetcher};
pub use issues::{aggregate, Issue};
pub use providers::{CompletionProvider, OpenAIProvider, ProviderError};
pub use select::{load_and_select_event, PaginatedSelector, Prompter, RunSelection, Selection};
pub use timeframe::Timeframe;
