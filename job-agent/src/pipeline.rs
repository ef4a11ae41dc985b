use crate::classifier::RelevanceClassifier;
use crate::detail::DetailFetcher;
use crate::notifier::MessageRenderer;
use crate::sources::{ListingExtractor, ListingPage};
use crate::state::SeenStore;
use crate::traits::PageFetcher;
use crate::types::{AgentError, BlockedSource, Notifier, Outcome, Posting, Result, RunSummary, SeenSet, SourceSpec};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Pause inserted between remote calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Delay {
    #[default]
    None,
    Fixed {
        ms: u64,
    },
    /// Uniformly random in `[min_ms, max_ms]`.
    Jitter {
        min_ms: u64,
        max_ms: u64,
    },
}

impl Delay {
    pub fn duration(&self) -> Duration {
        match *self {
            Delay::None => Duration::ZERO,
            Delay::Fixed { ms } => Duration::from_millis(ms),
            Delay::Jitter { min_ms, max_ms } => {
                let (low, high) = if min_ms <= max_ms { (min_ms, max_ms) } else { (max_ms, min_ms) };
                Duration::from_millis(fastrand::u64(low..=high))
            }
        }
    }

    pub async fn wait(&self) {
        let duration = self.duration();
        if !duration.is_zero() {
            debug!("Pausing {:?}", duration);
            tokio::time::sleep(duration).await;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub between_sources: Delay,
    pub between_postings: Delay,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Report every classified posting, not only matches.
    pub always_notify: bool,
    /// Send a "no new postings" summary when nothing was found.
    pub heartbeat: bool,
    pub announce_start: bool,
    pub pacing: PacingConfig,
}

/// A source together with the strategy that reads its pages.
pub struct ConfiguredSource {
    pub spec: SourceSpec,
    pub extractor: Box<dyn ListingExtractor>,
}

impl ConfiguredSource {
    pub fn new(spec: SourceSpec, extractor: Box<dyn ListingExtractor>) -> Self {
        Self { spec, extractor }
    }
}

/// Lifecycle of one source within a run.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceState {
    Pending,
    Fetching,
    Extracting,
    Postings { total: usize },
    Done { new: usize },
    Failed(String),
    Blocked(u16),
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceState::Pending => write!(f, "pending"),
            SourceState::Fetching => write!(f, "fetching"),
            SourceState::Extracting => write!(f, "extracting"),
            SourceState::Postings { total } => write!(f, "processing {} postings", total),
            SourceState::Done { new } => write!(f, "done ({} new)", new),
            SourceState::Failed(reason) => write!(f, "failed: {}", reason),
            SourceState::Blocked(status) => write!(f, "blocked (HTTP {})", status),
        }
    }
}

fn enter(source: &SourceSpec, state: SourceState) -> SourceState {
    debug!(source = %source.label, "Source {}", state);
    state
}

/// Drives sources through fetch, extract, dedup, classify and notify, and
/// owns the seen set for the duration of a run.
pub struct JobPipeline {
    sources: Vec<ConfiguredSource>,
    fetcher: Arc<dyn PageFetcher>,
    detail: DetailFetcher,
    classifier: RelevanceClassifier,
    notifier: Arc<dyn Notifier>,
    renderer: MessageRenderer,
    store: SeenStore,
    options: PipelineOptions,
}

impl JobPipeline {
    pub async fn run(&self) -> RunSummary {
        let run_id = Uuid::new_v4();
        self.run_inner().instrument(info_span!("run", %run_id)).await
    }

    async fn run_inner(&self) -> RunSummary {
        let mut seen = self.store.load();
        let mut summary = RunSummary::start(self.sources.len());
        let mut saved_len = seen.len();

        info!(
            "Starting run over {} sources with {} seen postings via {}",
            self.sources.len(),
            seen.len(),
            self.notifier.channel_name()
        );

        if self.options.announce_start {
            self.notify(&self.renderer.run_started(Local::now(), self.sources.len())).await;
        }

        for (index, source) in self.sources.iter().enumerate() {
            if index > 0 {
                self.options.pacing.between_sources.wait().await;
            }

            let state = self.process_source(source, &mut seen, &mut summary).await;
            // Blocked sources may have processed postings before the throttle.
            if seen.len() > saved_len && self.persist(&seen, &mut summary) {
                saved_len = seen.len();
            }

            match state {
                SourceState::Done { .. } => summary.sources_checked += 1,
                SourceState::Blocked(status) => {
                    summary.blocked = Some(BlockedSource {
                        label: source.spec.label.clone(),
                        status,
                    });
                    summary.failed_sources.push(source.spec.label.clone());
                    self.notify(&self.renderer.blocked(&source.spec.label, status)).await;
                    let skipped = self.sources.len() - index - 1;
                    warn!("{} throttled the run; skipping {} remaining sources", source.spec.label, skipped);
                    break;
                }
                SourceState::Failed(reason) => {
                    summary.failed_sources.push(source.spec.label.clone());
                    error!("Source {} failed: {}", source.spec.label, reason);
                }
                other => warn!("Source {} ended in unexpected state {}", source.spec.label, other),
            }
        }

        if seen.len() > saved_len {
            self.persist(&seen, &mut summary);
        }

        summary.finish();
        info!(
            "Run finished: {} sources checked, {} postings checked, {} new, {} notifications, {} failed sources",
            summary.sources_checked,
            summary.postings_checked,
            summary.postings_new,
            summary.notifications_sent,
            summary.failed_sources.len()
        );

        if let Some(message) = self.renderer.summary(&summary, self.options.heartbeat) {
            self.notify(&message).await;
        }

        summary
    }

    async fn process_source(&self, source: &ConfiguredSource, seen: &mut SeenSet, summary: &mut RunSummary) -> SourceState {
        let spec = &source.spec;
        enter(spec, SourceState::Pending);
        info!("Checking {} ({})", spec.label, spec.uri);

        enter(spec, SourceState::Fetching);
        let markup = match self.fetcher.fetch_page(&spec.uri).await {
            Ok(markup) => markup,
            Err(AgentError::Throttled { status, .. }) => return enter(spec, SourceState::Blocked(status)),
            Err(e) => return enter(spec, SourceState::Failed(e.to_string())),
        };

        enter(spec, SourceState::Extracting);
        let postings: Vec<Posting> = {
            let page = ListingPage::parse(&markup, &spec.uri, &spec.label);
            source.extractor.extract(&page).collect()
        };
        info!("{} postings on {} ({} extractor)", postings.len(), spec.label, source.extractor.name());
        enter(spec, SourceState::Postings { total: postings.len() });

        let mut new = 0;
        for posting in postings {
            summary.postings_checked += 1;
            if seen.contains(&posting.id) {
                continue;
            }
            if new > 0 {
                self.options.pacing.between_postings.wait().await;
            }

            match self.process_posting(&posting).await {
                Ok(true) => summary.notifications_sent += 1,
                Ok(false) => {}
                Err(AgentError::Throttled { status, url }) => {
                    warn!("Throttled on posting page {}; {} stays unseen", url, posting.id);
                    return enter(spec, SourceState::Blocked(status));
                }
                Err(e) => return enter(spec, SourceState::Failed(e.to_string())),
            }

            // Seen means processed, whatever the verdict or delivery result.
            seen.add(posting.id.clone());
            summary.postings_new += 1;
            new += 1;
        }

        enter(spec, SourceState::Done { new })
    }

    /// Returns whether a notification was delivered for the posting. The
    /// only error is a throttled detail page, which ends the source.
    async fn process_posting(&self, posting: &Posting) -> Result<bool> {
        let detail = match self.detail.fetch(&posting.link).await? {
            Outcome::Ok(text) => text,
            Outcome::Degraded { value, reason } => {
                warn!("Scoring {:?} without full description: {}", posting.title, reason);
                value
            }
            Outcome::Failed(reason) => {
                warn!("Scoring {:?} from title only: {}", posting.title, reason);
                String::new()
            }
        };

        let verdict = match self.classifier.classify(posting, &detail).await {
            Outcome::Ok(verdict) => Some(verdict),
            Outcome::Degraded { value, reason } => {
                warn!("Degraded verdict for {}: {}", posting.id, reason);
                Some(value)
            }
            Outcome::Failed(reason) => {
                warn!("No verdict for {}, treating as skip: {}", posting.id, reason);
                None
            }
        };

        let message = match &verdict {
            Some(verdict) if verdict.should_notify() => Some(self.renderer.matched(posting, verdict)),
            _ if self.options.always_notify => Some(self.renderer.unmatched(posting, verdict.as_ref())),
            _ => None,
        };

        match message {
            Some(message) => Ok(self.notify(&message).await),
            None => {
                info!("Skipped {:?}", posting.title);
                Ok(false)
            }
        }
    }

    /// Delivery failures are logged and swallowed.
    async fn notify(&self, message: &str) -> bool {
        match self.notifier.deliver(message).await {
            Ok(()) => true,
            Err(e) => {
                error!("Delivery via {} failed: {:#}", self.notifier.channel_name(), e);
                false
            }
        }
    }

    fn persist(&self, seen: &SeenSet, summary: &mut RunSummary) -> bool {
        match self.store.save(seen) {
            Ok(()) => {
                summary.state_saves += 1;
                info!("Saved {} seen postings to {}", seen.len(), self.store.path().display());
                true
            }
            Err(e) => {
                error!("Could not save seen postings to {}: {}", self.store.path().display(), e);
                false
            }
        }
    }
}

/// Pipeline builder for easier configuration
#[derive(Default)]
pub struct PipelineBuilder {
    sources: Vec<ConfiguredSource>,
    fetcher: Option<Arc<dyn PageFetcher>>,
    detail: Option<DetailFetcher>,
    classifier: Option<RelevanceClassifier>,
    notifier: Option<Arc<dyn Notifier>>,
    renderer: Option<MessageRenderer>,
    store: Option<SeenStore>,
    options: PipelineOptions,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(mut self, source: ConfiguredSource) -> Self {
        info!("Adding source to pipeline: {}", source.spec.label);
        self.sources.push(source);
        self
    }

    pub fn add_sources(mut self, sources: impl IntoIterator<Item = ConfiguredSource>) -> Self {
        for source in sources {
            self = self.add_source(source);
        }
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn detail_fetcher(mut self, detail: DetailFetcher) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn classifier(mut self, classifier: RelevanceClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn renderer(mut self, renderer: MessageRenderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn store(mut self, store: SeenStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<JobPipeline> {
        let missing = |part: &str| AgentError::Config(format!("pipeline is missing its {}", part));
        Ok(JobPipeline {
            sources: self.sources,
            fetcher: self.fetcher.ok_or_else(|| missing("page fetcher"))?,
            detail: self.detail.ok_or_else(|| missing("detail fetcher"))?,
            classifier: self.classifier.ok_or_else(|| missing("classifier"))?,
            notifier: self.notifier.ok_or_else(|| missing("notifier"))?,
            renderer: self.renderer.unwrap_or_else(|| MessageRenderer::new(Default::default())),
            store: self.store.ok_or_else(|| missing("state store"))?,
            options: self.options,
        })
    }
}

/// What a connectivity check found for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCheck {
    pub label: String,
    pub result: std::result::Result<usize, String>,
}

/// Connectivity self-test: one message through the notifier, one fetch per
/// source. Touches neither the seen set nor the scoring service.
pub async fn check_sources(
    sources: &[ConfiguredSource],
    fetcher: &dyn PageFetcher,
    notifier: &dyn Notifier,
    renderer: &MessageRenderer,
    pacing: &PacingConfig,
) -> (bool, Vec<SourceCheck>) {
    let delivered = match notifier.deliver(&renderer.self_test()).await {
        Ok(()) => true,
        Err(e) => {
            error!("Test message via {} failed: {:#}", notifier.channel_name(), e);
            false
        }
    };

    let mut checks = Vec::with_capacity(sources.len());
    for (index, source) in sources.iter().enumerate() {
        if index > 0 {
            pacing.between_sources.wait().await;
        }
        let (result, blocked) = match fetcher.fetch_page(&source.spec.uri).await {
            Ok(markup) => {
                let page = ListingPage::parse(&markup, &source.spec.uri, &source.spec.label);
                let found = source.extractor.extract(&page).count();
                info!("{}: {} postings on the page", source.spec.label, found);
                (Ok(found), false)
            }
            Err(e) => {
                warn!("{}: {}", source.spec.label, e);
                let blocked = matches!(e, AgentError::Throttled { .. });
                (Err(e.to_string()), blocked)
            }
        };
        checks.push(SourceCheck {
            label: source.spec.label.clone(),
            result,
        });
        if blocked {
            break;
        }
    }

    (delivered, checks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_and_jitter_delays_stay_in_range() {
        assert_eq!(Delay::None.duration(), Duration::ZERO);
        assert_eq!(Delay::Fixed { ms: 5000 }.duration(), Duration::from_secs(5));

        for _ in 0..50 {
            let d = Delay::Jitter { min_ms: 15_000, max_ms: 45_000 }.duration();
            assert!(d >= Duration::from_secs(15) && d <= Duration::from_secs(45));
        }

        let reversed = Delay::Jitter { min_ms: 20, max_ms: 10 }.duration();
        assert!(reversed >= Duration::from_millis(10) && reversed <= Duration::from_millis(20));
    }

    #[test]
    fn delay_parses_from_json() {
        let pacing: PacingConfig = serde_json::from_str(
            r#"{"between_sources": {"mode": "jitter", "min_ms": 15000, "max_ms": 45000},
                "between_postings": {"mode": "fixed", "ms": 5000}}"#,
        )
        .unwrap();
        assert_eq!(pacing.between_sources, Delay::Jitter { min_ms: 15000, max_ms: 45000 });
        assert_eq!(pacing.between_postings, Delay::Fixed { ms: 5000 });

        let defaults: PacingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(defaults.between_sources, Delay::None);
    }

    #[test]
    fn source_states_render_for_logs() {
        assert_eq!(SourceState::Blocked(999).to_string(), "blocked (HTTP 999)");
        assert_eq!(SourceState::Done { new: 2 }.to_string(), "done (2 new)");
    }
}
