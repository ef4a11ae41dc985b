use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// One configured listing endpoint, scanned once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub label: String,
    pub uri: String,
}

/// A discovered job listing.
///
/// `id` is the dedup key. Two postings with the same id are the same posting
/// even when the title text has drifted between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Posting {
    pub id: String,
    pub title: String,
    pub link: String,
    pub source: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub posted: Option<String>,
}

impl Posting {
    pub fn new(id: impl Into<String>, title: impl Into<String>, link: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            link: link.into(),
            source: source.into(),
            company: None,
            location: None,
            posted: None,
        }
    }

    pub fn with_company(mut self, company: Option<String>) -> Self {
        self.company = company;
        self
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    pub fn with_posted(mut self, posted: Option<String>) -> Self {
        self.posted = posted;
        self
    }
}

impl PartialEq for Posting {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Posting {}

impl Hash for Posting {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Notify,
    Skip,
}

/// Classifier output for one posting.
///
/// `score` is whatever the scoring service declared; it is carried along for
/// logging and rendering and never re-validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub score: Option<u8>,
    pub decision: Decision,
    pub message: String,
}

impl Verdict {
    pub fn notify(score: Option<u8>, message: impl Into<String>) -> Self {
        Self {
            score,
            decision: Decision::Notify,
            message: message.into(),
        }
    }

    pub fn skip(score: Option<u8>, message: impl Into<String>) -> Self {
        Self {
            score,
            decision: Decision::Skip,
            message: message.into(),
        }
    }

    pub fn should_notify(&self) -> bool {
        self.decision == Decision::Notify
    }
}

/// A source that answered with a throttling status and stopped the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedSource {
    pub label: String,
    pub status: u16,
}

/// Counters for one run, reported through the notifier at the end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub sources_total: usize,
    pub sources_checked: usize,
    pub postings_checked: usize,
    pub postings_new: usize,
    pub notifications_sent: usize,
    pub failed_sources: Vec<String>,
    pub blocked: Option<BlockedSource>,
    pub state_saves: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    pub fn start(sources_total: usize) -> Self {
        Self {
            sources_total,
            sources_checked: 0,
            postings_checked: 0,
            postings_new: 0,
            notifications_sent: 0,
            failed_sources: Vec::new(),
            blocked: None,
            state_saves: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn found_new(&self) -> bool {
        self.postings_new > 0
    }
}

/// Delivery channel for rendered messages. One destination per deployment.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel_name(&self) -> String;

    async fn deliver(&self, message: &str) -> anyhow::Result<()>;
}
