//! Configuration system for the `rootcause` tool.

use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::QueryFilter;
use crate::fetch::RetryPolicy;
use crate::providers::openai::OPENAI_API_BASE;
use crate::providers::CompletionParams;

/// Event backend connection
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub endpoint: String,
    /// Service the events belong to
    pub service: String,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://go.baselime.io/v1".to_string(),
            service: "default".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Search mode defaults
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    pub datasets: Vec<String>,
    pub page_size: usize,
    /// Field holding the log level
    pub level_key: String,
    /// Level to filter for
    pub level: String,
    pub from: String,
    pub to: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            datasets: [
                "apigateway-logs",
                "cloudtrail",
                "cloudwatch-metrics",
                "otel",
                "x-ray",
                "lambda-logs",
                "ecs-logs",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            page_size: 100,
            level_key: "LogLevel".to_string(),
            level: "ERROR".to_string(),
            from: "1h".to_string(),
            to: "now".to_string(),
        }
    }
}

impl SearchConfig {
    pub fn filters(&self) -> Vec<QueryFilter> {
        vec![QueryFilter::equals(&self.level_key, &self.level)]
    }
}

/// Retry behavior for backend reads
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
    /// Events requested from a query run
    pub run_limit: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 3000,
            run_limit: 20,
        }
    }
}

impl FetchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            delay: Duration::from_millis(self.delay_ms),
        }
    }
}

/// Completion request and output pacing
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ExplainConfig {
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub word_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        let params = CompletionParams::default();
        Self {
            model: params.model,
            base_url: OPENAI_API_BASE.to_string(),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            word_delay_ms: 100,
            timeout_secs: 120,
        }
    }
}

impl ExplainConfig {
    pub fn completion_params(&self) -> CompletionParams {
        CompletionParams {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub search: SearchConfig,
    pub fetch: FetchConfig,
    pub explain: ExplainConfig,
}

impl Config {
    /// Load config from file, returning default config if file doesn't exist
    pub fn load() -> Self {
        Self::load_from_path(Self::config_path())
    }

    /// Load config from a specific path
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::read(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %path.display(), "ignoring config file: {err}");
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Get the config file path (~/.config/rootcause/config.toml)
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("rootcause").join("config.toml"))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| env::var(name).ok().filter(|v| !v.is_empty()));
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = lookup("ROOTCAUSE_ENDPOINT") {
            self.backend.endpoint = endpoint;
        }
        if let Some(model) = lookup("ROOTCAUSE_MODEL") {
            self.explain.model = model;
        }
    }
}

/// Generate default config as TOML string
pub fn generate_default_config() -> String {
    r#"# rootcause configuration
# Place this file at ~/.config/rootcause/config.toml

[backend]
endpoint = "https://go.baselime.io/v1"
service = "default"
request_timeout_secs = 30

[search]
# Datasets searched for errors
datasets = [
    "apigateway-logs",
    "cloudtrail",
    "cloudwatch-metrics",
    "otel",
    "x-ray",
    "lambda-logs",
    "ecs-logs",
]
# Events fetched per page
page_size = 100
level_key = "LogLevel"
level = "ERROR"
# Default time range: now, 30m, 1h, 7d or an RFC 3339 timestamp
from = "1h"
to = "now"

[fetch]
max_attempts = 5
delay_ms = 3000
# Events requested from a query run
run_limit = 20

[explain]
model = "gpt-3.5-turbo"
base_url = "https://api.openai.com/v1"
max_tokens = 2000
temperature = 0.5
# Pause between words when replaying the explanation
word_delay_ms = 100
timeout_secs = 120

# Environment variables:
# ROOTCAUSE_API_KEY  - event backend API key (required)
# OPENAI_API_KEY     - completion API key (required for explanations)
# ROOTCAUSE_ENDPOINT - overrides backend.endpoint
# ROOTCAUSE_MODEL    - overrides explain.model
"#
    .to_string()
}

/// Print the default config to stdout
pub fn print_default_config() {
    print!("{}", generate_default_config());
}
