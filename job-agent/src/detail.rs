use crate::sources::ListingPage;
use crate::traits::PageFetcher;
use crate::types::{AgentError, Outcome, Result};
use crate::utils::text::{join_lines, truncate_chars};
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailConfig {
    /// Candidate containers for the description, tried in order before `body`.
    pub selectors: Vec<String>,
    pub max_chars: usize,
}

impl Default for DetailConfig {
    fn default() -> Self {
        Self {
            selectors: vec!["div.job-description".to_string()],
            max_chars: 3000,
        }
    }
}

/// Pulls the description text behind a posting link for the classifier.
///
/// Best effort: a failure comes back as `Degraded` with an empty body, except
/// a throttle answer, which is returned as `AgentError::Throttled` so the run
/// can stop talking to that host.
pub struct DetailFetcher {
    fetcher: Arc<dyn PageFetcher>,
    selectors: Vec<Selector>,
    body: Selector,
    max_chars: usize,
}

impl DetailFetcher {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &DetailConfig) -> Result<Self> {
        let selectors = config
            .selectors
            .iter()
            .map(|css| crate::sources::selector(css))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            fetcher,
            selectors,
            body: crate::sources::selector("body")?,
            max_chars: config.max_chars,
        })
    }

    pub async fn fetch(&self, link: &str) -> Result<Outcome<String>> {
        match self.fetcher.fetch_page(link).await {
            Ok(markup) => {
                let text = self.description_text(&markup, link);
                if text.is_empty() {
                    Ok(Outcome::degraded(text, "page has no readable text"))
                } else {
                    Ok(Outcome::Ok(text))
                }
            }
            Err(e @ AgentError::Throttled { .. }) => Err(e),
            Err(e) => {
                warn!("Detail fetch failed for {}: {}", link, e);
                Ok(Outcome::degraded(String::new(), e))
            }
        }
    }

    /// Text of the first matching description container, else the whole body,
    /// bounded to `max_chars`.
    pub fn description_text(&self, markup: &str, link: &str) -> String {
        let page = ListingPage::parse(markup, link, "");
        let document = page.document();

        let container = self
            .selectors
            .iter()
            .find_map(|selector| document.select(selector).next())
            .or_else(|| {
                debug!("No description container on {}, using page body", link);
                document.select(&self.body).next()
            });

        let text = match container {
            Some(element) => join_lines(element.text()),
            None => String::new(),
        };

        truncate_chars(&text, self.max_chars).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    enum StaticPage {
        Markup(&'static str),
        Status(u16),
        Throttled(u16),
    }

    #[async_trait]
    impl PageFetcher for StaticPage {
        async fn fetch_page(&self, url: &str) -> Result<String> {
            let url = url.to_string();
            match *self {
                StaticPage::Markup(markup) => Ok(markup.to_string()),
                StaticPage::Status(status) => Err(AgentError::Status { status, url }),
                StaticPage::Throttled(status) => Err(AgentError::Throttled { status, url }),
            }
        }
    }

    fn detail(page: StaticPage, max_chars: usize) -> DetailFetcher {
        let config = DetailConfig {
            max_chars,
            ..DetailConfig::default()
        };
        DetailFetcher::new(Arc::new(page), &config).unwrap()
    }

    #[tokio::test]
    async fn prefers_description_container() {
        let markup = r#"<html><body><header>Menu</header>
            <div class="job-description"><h2>About</h2><p>We need a growth marketer.</p></div>
            </body></html>"#;

        let outcome = detail(StaticPage::Markup(markup), 3000).fetch("https://englishjobs.fr/job/1").await.unwrap();
        assert_eq!(outcome, Outcome::Ok("About\nWe need a growth marketer.".to_string()));
    }

    #[tokio::test]
    async fn falls_back_to_body_and_truncates() {
        let markup = "<html><body><p>Paris based role</p></body></html>";

        let outcome = detail(StaticPage::Markup(markup), 5).fetch("https://englishjobs.fr/job/2").await.unwrap();
        assert_eq!(outcome, Outcome::Ok("Paris".to_string()));
    }

    #[tokio::test]
    async fn transport_failure_degrades_to_empty_text() {
        let outcome = detail(StaticPage::Status(503), 3000).fetch("https://englishjobs.fr/job/3").await.unwrap();
        assert!(matches!(outcome, Outcome::Degraded { ref value, .. } if value.is_empty()));
    }

    #[tokio::test]
    async fn throttle_answer_is_passed_through() {
        let result = detail(StaticPage::Throttled(429), 3000).fetch("https://englishjobs.fr/job/4").await;
        assert!(matches!(result, Err(AgentError::Throttled { status: 429, .. })));
    }
}
