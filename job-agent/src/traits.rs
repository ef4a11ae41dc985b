use crate::types::Result;
use async_trait::async_trait;

/// Retrieves the raw markup behind a URL.
///
/// Implementations map throttling answers to `AgentError::Throttled` and any
/// other non-2xx answer to `AgentError::Status`, so callers can tell "back off
/// for the rest of the run" apart from "this one page is broken".
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String>;
}
