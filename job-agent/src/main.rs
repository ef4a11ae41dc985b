use anyhow::{bail, Context, Result};
use clap::builder::FalseyValueParser;
use clap::{Parser, Subcommand};
use interfaces::LogNotifier;
use job_agent::{
    check_sources, AgentConfig, CandidateProfile, DetailFetcher, Fetcher, Markup, MessageRenderer, Notifier,
    OpenRouterAdapter, PageFetcher, PipelineBuilder, PipelineOptions, RelevanceClassifier, SeenStore,
    TelegramNotifier,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "job-agent", about = "Scans job boards, scores new postings and reports matches to Telegram")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Sources file (JSON)
    #[arg(long, env = "JOB_AGENT_SOURCES", default_value = "sources.json", global = true)]
    sources: PathBuf,

    /// Candidate profile (JSON)
    #[arg(long, env = "JOB_AGENT_PROFILE", default_value = "profile.json", global = true)]
    profile: PathBuf,

    /// Seen-postings state file
    #[arg(long, env = "JOB_AGENT_STATE", default_value = "seen_jobs.json", global = true)]
    state: PathBuf,

    /// Override the model named in the sources file
    #[arg(long, env = "JOB_AGENT_MODEL", global = true)]
    model: Option<String>,

    /// Report every scored posting, matched or not
    #[arg(long, env = "JOB_AGENT_ALWAYS_NOTIFY", value_parser = FalseyValueParser::new(), global = true)]
    always_notify: bool,

    /// Send a summary even when nothing new was found
    #[arg(long, env = "JOB_AGENT_HEARTBEAT", value_parser = FalseyValueParser::new(), global = true)]
    heartbeat: bool,

    /// Send a message when the run starts
    #[arg(long, global = true)]
    announce_start: bool,

    /// Write messages to the log instead of Telegram
    #[arg(long, global = true)]
    dry_run: bool,

    /// Message markup, overriding the sources file
    #[arg(long, value_enum, global = true)]
    markup: Option<Markup>,

    #[arg(long, env = "BOT_TOKEN", hide_env_values = true, global = true)]
    bot_token: Option<String>,

    #[arg(long, env = "CHAT_ID", global = true)]
    chat_id: Option<String>,

    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true, global = true)]
    openrouter_api_key: Option<String>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Scan every source once (default)
    Run,
    /// Send a test message and fetch each source once, without scoring or saving
    Check,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn build_notifier(cli: &Cli, markup: Markup) -> Result<Arc<dyn Notifier>> {
    if cli.dry_run {
        info!("Dry run: messages go to the log only");
        return Ok(Arc::new(LogNotifier));
    }

    match (present(&cli.bot_token), present(&cli.chat_id)) {
        (Some(token), Some(chat_id)) => Ok(Arc::new(TelegramNotifier::new(
            token,
            chat_id,
            markup,
            Duration::from_secs(10),
        )?)),
        _ => bail!("BOT_TOKEN and CHAT_ID must both be set (or pass --dry-run)"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run);

    let mut config = AgentConfig::from_file(&cli.sources)?;
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }
    let markup = cli.markup.unwrap_or(config.markup);

    let sources = config.build_sources()?;
    let fetcher: Arc<dyn PageFetcher> = Arc::new(Fetcher::new(config.fetch.clone())?);
    let notifier = build_notifier(&cli, markup)?;
    let renderer = MessageRenderer::new(markup);

    if command == Command::Check {
        info!("Checking delivery and {} sources", sources.len());
        let (delivered, checks) =
            check_sources(&sources, fetcher.as_ref(), notifier.as_ref(), &renderer, &config.pacing).await;

        for check in &checks {
            match &check.result {
                Ok(found) => info!("OK    {}: {} postings", check.label, found),
                Err(reason) => warn!("FAIL  {}: {}", check.label, reason),
            }
        }
        if checks.len() < sources.len() {
            warn!("Stopped after {} of {} sources", checks.len(), sources.len());
        }
        if !delivered {
            bail!("test message could not be delivered via {}", notifier.channel_name());
        }
        return Ok(());
    }

    let api_key = match present(&cli.openrouter_api_key) {
        Some(key) => key.to_string(),
        None => {
            error!("OPENROUTER_API_KEY is missing; nothing was scanned");
            bail!("OPENROUTER_API_KEY is not set");
        }
    };

    let profile = CandidateProfile::from_file(&cli.profile)
        .with_context(|| format!("loading profile {}", cli.profile.display()))?;
    let adapter = Arc::new(OpenRouterAdapter::new(&api_key, config.llm.clone())?);
    let classifier = RelevanceClassifier::new(Arc::new(profile), adapter, config.classifier.clone(), markup)?;
    let detail = DetailFetcher::new(fetcher.clone(), &config.detail)?;

    let pipeline = PipelineBuilder::new()
        .add_sources(sources)
        .fetcher(fetcher)
        .detail_fetcher(detail)
        .classifier(classifier)
        .notifier(notifier)
        .renderer(renderer)
        .store(SeenStore::new(&cli.state))
        .options(PipelineOptions {
            always_notify: cli.always_notify,
            heartbeat: cli.heartbeat,
            announce_start: cli.announce_start,
            pacing: config.pacing.clone(),
        })
        .build()?;

    let summary = pipeline.run().await;
    if let Some(blocked) = &summary.blocked {
        warn!("Run cut short: {} answered HTTP {}", blocked.label, blocked.status);
    }
    info!(
        "Done: {}/{} sources, {} new postings, {} notifications",
        summary.sources_checked, summary.sources_total, summary.postings_new, summary.notifications_sent
    );
    Ok(())
}
