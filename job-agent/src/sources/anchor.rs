use super::{element_text, selector, ListingExtractor, ListingPage};
use crate::types::{Posting, Result};
use crate::utils::url::resolve_link;
use scraper::{ElementRef, Selector};
use std::collections::HashSet;
use tracing::debug;

/// Treats every anchor whose `href` contains a marker fragment as a posting.
///
/// Fits boards that render each listing as a plain link to `/job/<slug>`.
/// The resolved absolute link is the posting id.
pub struct AnchorExtractor {
    anchors: Selector,
    href_contains: String,
    base_url: Option<String>,
}

impl AnchorExtractor {
    pub fn new(href_contains: String, base_url: Option<String>) -> Result<Self> {
        Ok(Self {
            anchors: selector("a[href]")?,
            href_contains,
            base_url,
        })
    }

    fn posting_from(&self, anchor: ElementRef<'_>, page: &ListingPage) -> Option<Posting> {
        let href = anchor.value().attr("href")?;
        if !href.contains(&self.href_contains) {
            return None;
        }

        let base = self.base_url.as_deref().unwrap_or(page.url());
        let link = match resolve_link(base, href) {
            Ok(link) => link,
            Err(e) => {
                debug!("Skipping anchor with unusable href {:?}: {}", href, e);
                return None;
            }
        };

        let title = element_text(anchor);
        if title.is_empty() {
            debug!("Skipping anchor without text: {}", link);
            return None;
        }

        Some(Posting::new(link.clone(), title, link, page.source()))
    }
}

impl ListingExtractor for AnchorExtractor {
    fn name(&self) -> &'static str {
        "anchor"
    }

    fn extract<'a>(&'a self, page: &'a ListingPage) -> Box<dyn Iterator<Item = Posting> + 'a> {
        let mut yielded = HashSet::new();
        Box::new(
            page.document()
                .select(&self.anchors)
                .filter_map(move |anchor| self.posting_from(anchor, page))
                .filter(move |posting| yielded.insert(posting.id.clone())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <nav><a href="/about">About</a></nav>
          <ul>
            <li><a href="/job/123-growth-marketer">  Growth
                Marketer </a></li>
            <li><a href="/job/456-content-lead">Content Lead</a></li>
            <li><a href="/job/789-empty"></a></li>
            <li><a href="/job/123-growth-marketer">Growth Marketer (again)</a></li>
            <li><a href="https://other.example.com/job/42">Data Analyst</a></li>
          </ul>
        </body></html>
    "#;

    fn extractor() -> AnchorExtractor {
        AnchorExtractor::new("/job/".to_string(), Some("https://englishjobs.fr".to_string())).unwrap()
    }

    #[test]
    fn extracts_job_links_in_document_order() {
        let page = ListingPage::parse(LISTING, "https://englishjobs.fr/jobs/marketing", "Marketing");
        let postings = extractor().extract_all(&page);

        let ids: Vec<&str> = postings.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "https://englishjobs.fr/job/123-growth-marketer",
                "https://englishjobs.fr/job/456-content-lead",
                "https://other.example.com/job/42",
            ]
        );
        assert_eq!(postings[0].title, "Growth Marketer");
        assert_eq!(postings[0].source, "Marketing");
    }

    #[test]
    fn resolves_against_page_url_without_base() {
        let extractor = AnchorExtractor::new("/job/".to_string(), None).unwrap();
        let page = ListingPage::parse(LISTING, "https://englishjobs.fr/jobs/data", "Data");
        let first = extractor.extract(&page).next().unwrap();
        assert_eq!(first.link, "https://englishjobs.fr/job/123-growth-marketer");
    }

    #[test]
    fn empty_page_yields_nothing() {
        let page = ListingPage::parse("<html><body></body></html>", "https://englishjobs.fr/jobs/data", "Data");
        assert_eq!(extractor().extract(&page).count(), 0);
    }
}
