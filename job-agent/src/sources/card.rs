use super::{element_text, selector, ListingExtractor, ListingPage};
use crate::types::{Posting, Result};
use crate::utils::url::{resolve_link, strip_query};
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// CSS selectors for card-style search results. Defaults match the public
/// LinkedIn guest job search markup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardSelectors {
    pub card: String,
    pub link: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub posted: String,
    pub posted_fallback: String,
}

impl Default for CardSelectors {
    fn default() -> Self {
        Self {
            card: "li".to_string(),
            link: "a.base-card__full-link".to_string(),
            title: "h3.base-search-card__title".to_string(),
            company: "h4.base-search-card__subtitle".to_string(),
            location: "span.job-search-card__location".to_string(),
            posted: "time".to_string(),
            posted_fallback: "Recently".to_string(),
        }
    }
}

/// Extracts postings from result cards carrying company, location and
/// posting-date hints. The link without its tracking query string is the id.
pub struct CardExtractor {
    card: Selector,
    link: Selector,
    title: Selector,
    company: Selector,
    location: Selector,
    posted: Selector,
    posted_fallback: String,
}

impl CardExtractor {
    pub fn new(selectors: &CardSelectors) -> Result<Self> {
        Ok(Self {
            card: selector(&selectors.card)?,
            link: selector(&selectors.link)?,
            title: selector(&selectors.title)?,
            company: selector(&selectors.company)?,
            location: selector(&selectors.location)?,
            posted: selector(&selectors.posted)?,
            posted_fallback: selectors.posted_fallback.clone(),
        })
    }

    fn first_text(&self, card: ElementRef<'_>, selector: &Selector) -> Option<String> {
        card.select(selector)
            .next()
            .map(element_text)
            .filter(|text| !text.is_empty())
    }

    fn parse_card(&self, card: ElementRef<'_>, page: &ListingPage) -> std::result::Result<Posting, String> {
        let href = card
            .select(&self.link)
            .next()
            .and_then(|link| link.value().attr("href"))
            .ok_or_else(|| "no link".to_string())?;
        let link = resolve_link(page.url(), href).map_err(|e| format!("bad link {:?}: {}", href, e))?;
        let link = strip_query(&link);

        let title = self
            .first_text(card, &self.title)
            .ok_or_else(|| format!("no title for {}", link))?;

        let posted = self
            .first_text(card, &self.posted)
            .unwrap_or_else(|| self.posted_fallback.clone());

        Ok(Posting::new(link.clone(), title, link, page.source())
            .with_company(self.first_text(card, &self.company))
            .with_location(self.first_text(card, &self.location))
            .with_posted(Some(posted)))
    }
}

impl ListingExtractor for CardExtractor {
    fn name(&self) -> &'static str {
        "card"
    }

    fn extract<'a>(&'a self, page: &'a ListingPage) -> Box<dyn Iterator<Item = Posting> + 'a> {
        let mut yielded = HashSet::new();
        Box::new(
            page.document()
                .select(&self.card)
                .filter_map(move |card| match self.parse_card(card, page) {
                    Ok(posting) => Some(posting),
                    Err(reason) => {
                        debug!("Skipping card on {}: {}", page.source(), reason);
                        None
                    }
                })
                .filter(move |posting| yielded.insert(posting.id.clone())),
        )
    }
}
