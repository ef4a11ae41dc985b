use crate::traits::PageFetcher;
use crate::types::{AgentError, FetchConfig, Result};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// HTTP client for listing and detail pages.
///
/// Every request goes through a per-host rate limiter, and transient failures
/// (transport errors, 5xx) are retried with exponential backoff. Throttling
/// statuses are never retried.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    rate_limiter: Arc<RwLock<HashMap<String, Instant>>>,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)
                .map_err(|e| AgentError::Config(format!("invalid Accept-Language: {}", e)))?,
        );

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            config,
            rate_limiter: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    fn backoff(&self) -> ExponentialBackoff<backoff::SystemClock> {
        let base = Duration::from_secs(self.config.retry_delay_seconds);
        ExponentialBackoff {
            current_interval: base,
            initial_interval: base,
            max_interval: base * 16,
            multiplier: 2.0,
            max_elapsed_time: Some(base * 60),
            ..Default::default()
        }
    }

    async fn apply_rate_limit(&self, url: &str) -> Result<()> {
        let parsed_url = Url::parse(url)?;
        let host = parsed_url.host_str().unwrap_or("").to_string();
        let min_interval = Duration::from_millis(self.config.min_host_interval_ms);

        let mut rate_limiter = self.rate_limiter.write().await;
        if let Some(last_request) = rate_limiter.get(&host) {
            let elapsed = last_request.elapsed();
            if elapsed < min_interval {
                let wait_time = min_interval - elapsed;
                debug!("Rate limiting {}: waiting {:?}", host, wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        rate_limiter.insert(host, Instant::now());

        Ok(())
    }
}

#[async_trait]
impl PageFetcher for Fetcher {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        let start_time = Instant::now();
        let mut backoff = self.backoff();
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            self.apply_rate_limit(url).await?;

            let retryable = match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if self.config.is_throttle_status(status.as_u16()) {
                        warn!("Throttled by {} (HTTP {})", url, status.as_u16());
                        return Err(AgentError::Throttled {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }

                    if status.is_success() {
                        let body = response.text().await?;
                        info!(
                            "Fetched {} ({} bytes, {} ms)",
                            url,
                            body.len(),
                            start_time.elapsed().as_millis()
                        );
                        return Ok(body);
                    }

                    last_error = Some(AgentError::Status {
                        status: status.as_u16(),
                        url: url.to_string(),
                    });
                    status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT
                }
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect() || e.is_request();
                    last_error = Some(AgentError::Http(e));
                    retryable
                }
            };

            if !retryable || attempt == self.config.max_retries {
                break;
            }
            match backoff.next_backoff() {
                Some(delay) => {
                    warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                    tokio::time::sleep(delay).await;
                }
                None => break,
            }
        }

        let error = last_error.unwrap_or_else(|| AgentError::General(format!("no response from {}", url)));
        warn!("Giving up on {}: {}", url, error);
        Err(error)
    }
}
