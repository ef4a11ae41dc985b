pub mod anchor;
pub mod card;

pub use anchor::AnchorExtractor;
pub use card::{CardExtractor, CardSelectors};

use crate::types::{AgentError, Posting, Result};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

/// Parsed markup of one listing page, tagged with where it came from.
pub struct ListingPage {
    document: Html,
    url: String,
    source: String,
}

impl ListingPage {
    pub fn parse(content: &str, url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            document: Html::parse_document(content),
            url: url.into(),
            source: source.into(),
        }
    }

    pub fn document(&self) -> &Html {
        &self.document
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Source-specific strategy that turns a listing page into postings.
///
/// The returned iterator is lazy and follows document order. An element that
/// does not look like a posting is skipped; it never ends the sequence early.
pub trait ListingExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract<'a>(&'a self, page: &'a ListingPage) -> Box<dyn Iterator<Item = Posting> + 'a>;

    fn extract_all(&self, page: &ListingPage) -> Vec<Posting> {
        self.extract(page).collect()
    }
}

fn default_href_contains() -> String {
    "/job/".to_string()
}

/// Which extractor a source uses, as written in the sources file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractorConfig {
    Anchor {
        #[serde(default = "default_href_contains")]
        href_contains: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Card(CardSelectors),
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig::Anchor {
            href_contains: default_href_contains(),
            base_url: None,
        }
    }
}

impl ExtractorConfig {
    pub fn build(&self) -> Result<Box<dyn ListingExtractor>> {
        match self {
            ExtractorConfig::Anchor { href_contains, base_url } => Ok(Box::new(AnchorExtractor::new(
                href_contains.clone(),
                base_url.clone(),
            )?)),
            ExtractorConfig::Card(selectors) => Ok(Box::new(CardExtractor::new(selectors)?)),
        }
    }
}

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| AgentError::Config(format!("invalid CSS selector {:?}: {}", css, e)))
}

/// Trimmed, whitespace-collapsed text content of an element.
pub(crate) fn element_text(element: scraper::ElementRef<'_>) -> String {
    crate::utils::text::collapse_whitespace(&element.text().collect::<String>())
}
