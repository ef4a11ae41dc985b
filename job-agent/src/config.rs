use crate::classifier::ClassifierConfig;
use crate::detail::DetailConfig;
use crate::llm_adapter::LlmConfig;
use crate::notifier::Markup;
use crate::pipeline::{ConfiguredSource, PacingConfig};
use crate::sources::ExtractorConfig;
use crate::types::{AgentError, FetchConfig, Result, SourceSpec};
use crate::utils::url::expand_template;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// A single listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub label: String,
    pub url: String,
    #[serde(default)]
    pub extractor: ExtractorConfig,
}

/// A search URL expanded over every keyword and location pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchGrid {
    /// URL with `{keyword}` and `{location}` placeholders.
    pub url_template: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub extractor: ExtractorConfig,
}

impl SearchGrid {
    /// One source per (location, keyword), locations outermost.
    pub fn expand(&self) -> Vec<SourceEntry> {
        let locations: Vec<&str> = if self.locations.is_empty() {
            vec![""]
        } else {
            self.locations.iter().map(String::as_str).collect()
        };

        locations
            .iter()
            .flat_map(|location| {
                self.keywords.iter().map(move |keyword| SourceEntry {
                    label: if location.is_empty() {
                        keyword.clone()
                    } else {
                        format!("{} in {}", keyword, location)
                    },
                    url: expand_template(&self.url_template, keyword, location),
                    extractor: self.extractor.clone(),
                })
            })
            .collect()
    }
}

/// Everything the run needs that is not a secret.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub sources: Vec<SourceEntry>,
    pub searches: Vec<SearchGrid>,
    pub pacing: PacingConfig,
    pub fetch: FetchConfig,
    pub detail: DetailConfig,
    pub classifier: ClassifierConfig,
    pub llm: LlmConfig,
    pub markup: Markup,
}

impl AgentConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("cannot read sources file {}: {}", path.display(), e)))?;
        let config = Self::from_json(&content)
            .map_err(|e| AgentError::Config(format!("invalid sources file {}: {}", path.display(), e)))?;
        info!(
            "Loaded {} sources and {} search grids from {}",
            config.sources.len(),
            config.searches.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Plain sources first, then search grids in file order. A URL that
    /// appears twice is scanned once.
    pub fn source_entries(&self) -> Vec<SourceEntry> {
        let mut urls = HashSet::new();
        self.sources
            .iter()
            .cloned()
            .chain(self.searches.iter().flat_map(SearchGrid::expand))
            .filter(|entry| {
                let fresh = urls.insert(entry.url.clone());
                if !fresh {
                    warn!("Dropping duplicate source {} ({})", entry.label, entry.url);
                }
                fresh
            })
            .collect()
    }

    /// Sources with their extractors built. An empty list is a configuration error.
    pub fn build_sources(&self) -> Result<Vec<ConfiguredSource>> {
        let sources = self
            .source_entries()
            .into_iter()
            .map(|entry| {
                let extractor = entry.extractor.build()?;
                Ok(ConfiguredSource::new(
                    SourceSpec {
                        label: entry.label,
                        uri: entry.url,
                    },
                    extractor,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        if sources.is_empty() {
            return Err(AgentError::Config("no sources configured".to_string()));
        }
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Delay;

    const SAMPLE: &str = r#"{
        "sources": [
            {"label": "Marketing", "url": "https://englishjobs.fr/jobs/marketing",
             "extractor": {"kind": "anchor", "base_url": "https://englishjobs.fr"}}
        ],
        "searches": [
            {"url_template": "https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search?keywords={keyword}&location={location}&start=0",
             "keywords": ["Growth Marketing", "SEO Specialist"],
             "locations": ["France"],
             "extractor": {"kind": "card"}}
        ],
        "pacing": {"between_sources": {"mode": "jitter", "min_ms": 15000, "max_ms": 45000}},
        "fetch": {"timeout_seconds": 20},
        "markup": "html"
    }"#;

    #[test]
    fn parses_full_sources_file() {
        let config = AgentConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.markup, Markup::Html);
        assert_eq!(config.fetch.timeout_seconds, 20);
        assert_eq!(config.fetch.throttle_statuses, vec![429, 999]);
        assert_eq!(config.pacing.between_postings, Delay::None);
        assert_eq!(config.classifier.threshold, 50);
    }

    #[test]
    fn expands_search_grid_per_keyword_and_location() {
        let config = AgentConfig::from_json(SAMPLE).unwrap();
        let entries = config.source_entries();

        let labels: Vec<&str> = entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Marketing", "Growth Marketing in France", "SEO Specialist in France"]);
        assert_eq!(
            entries[1].url,
            "https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search?keywords=Growth%20Marketing&location=France&start=0"
        );
        assert!(matches!(entries[2].extractor, ExtractorConfig::Card(_)));
    }

    #[test]
    fn grid_without_locations_uses_keyword_labels() {
        let grid = SearchGrid {
            url_template: "https://jobs.example.com/search?q={keyword}".to_string(),
            keywords: vec!["Data".to_string()],
            locations: Vec::new(),
            extractor: ExtractorConfig::default(),
        };
        let entries = grid.expand();
        assert_eq!(entries[0].label, "Data");
        assert_eq!(entries[0].url, "https://jobs.example.com/search?q=Data");
    }

    #[test]
    fn duplicate_urls_are_scanned_once() {
        let entry = SourceEntry {
            label: "Data".to_string(),
            url: "https://englishjobs.fr/jobs/data".to_string(),
            extractor: ExtractorConfig::default(),
        };
        let config = AgentConfig {
            sources: vec![entry.clone(), SourceEntry { label: "Data again".to_string(), ..entry }],
            ..AgentConfig::default()
        };
        assert_eq!(config.source_entries().len(), 1);
    }

    #[test]
    fn empty_configuration_is_rejected() {
        let config = AgentConfig::from_json("{}").unwrap();
        assert!(matches!(config.build_sources(), Err(AgentError::Config(_))));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let result = AgentConfig::from_file(Path::new("/nonexistent/sources.json"));
        assert!(matches!(result, Err(AgentError::Config(_))));
    }
}
