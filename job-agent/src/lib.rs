pub mod types;
pub mod traits;
pub mod utils;
pub mod fetcher;
pub mod sources;
pub mod state;
pub mod detail;
pub mod llm_adapter;
pub mod profile;
pub mod classifier;
pub mod notifier;
pub mod config;
pub mod pipeline;

pub use types::*;
pub use traits::PageFetcher;
pub use fetcher::Fetcher;
pub use sources::{AnchorExtractor, CardExtractor, ExtractorConfig, ListingExtractor, ListingPage};
pub use state::SeenStore;
pub use detail::{DetailConfig, DetailFetcher};
pub use llm_adapter::{LlmAdapter, LlmConfig, MockLlmAdapter, OpenRouterAdapter};
pub use profile::{CandidateProfile, ScoringBias};
pub use classifier::{ClassifierConfig, RelevanceClassifier, ResponseStyle};
pub use notifier::{Markup, MessageRenderer, TelegramNotifier};
pub use config::AgentConfig;
pub use pipeline::{check_sources, ConfiguredSource, JobPipeline, PipelineBuilder, PipelineOptions};
