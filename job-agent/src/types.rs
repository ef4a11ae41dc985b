use serde::{Deserialize, Serialize};
use std::fmt;

pub use interfaces::defs::{BlockedSource, Decision, Notifier, Posting, RunSummary, SourceSpec, Verdict};
pub use interfaces::state::SeenSet;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub accept_language: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_redirects: usize,
    /// Minimum spacing between two requests to the same host.
    pub min_host_interval_ms: u64,
    /// Statuses that mean the remote side is throttling or blocking us.
    pub throttle_statuses: Vec<u16>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: BROWSER_USER_AGENT.to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            timeout_seconds: 10,
            max_retries: 2,
            retry_delay_seconds: 2,
            max_redirects: 5,
            min_host_interval_ms: 1000,
            throttle_statuses: vec![429, 999],
        }
    }
}

impl FetchConfig {
    pub fn is_throttle_status(&self, status: u16) -> bool {
        self.throttle_statuses.contains(&status)
    }
}

/// Result of a best-effort component call.
///
/// Components never decide what a failure means for the run; they report it
/// here and the pipeline applies one policy.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ok(T),
    Degraded { value: T, reason: String },
    Failed(String),
}

impl<T> Outcome<T> {
    pub fn degraded(value: T, reason: impl fmt::Display) -> Self {
        Outcome::Degraded {
            value,
            reason: reason.to_string(),
        }
    }

    pub fn failed(reason: impl fmt::Display) -> Self {
        Outcome::Failed(reason.to_string())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn value(self) -> Option<T> {
        match self {
            Outcome::Ok(value) | Outcome::Degraded { value, .. } => Some(value),
            Outcome::Failed(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Ok(_) => None,
            Outcome::Degraded { reason, .. } | Outcome::Failed(reason) => Some(reason),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Throttled by {url} (HTTP {status})")]
    Throttled { status: u16, url: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
