use crate::types::{AgentError, Notifier, Posting, Result, RunSummary, Verdict};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Text markup understood by the destination channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Markup {
    #[default]
    Markdown,
    Html,
}

impl Markup {
    pub fn parse_mode(&self) -> &'static str {
        match self {
            Markup::Markdown => "Markdown",
            Markup::Html => "HTML",
        }
    }

    pub fn bold(&self, text: &str) -> String {
        match self {
            Markup::Markdown => format!("*{}*", text),
            Markup::Html => format!("<b>{}</b>", text),
        }
    }

    pub fn link(&self, label: &str, url: &str) -> String {
        match self {
            Markup::Markdown => format!("[{}]({})", label, url),
            Markup::Html => format!("<a href='{}'>{}</a>", url, label),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct TelegramReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Delivers messages to one Telegram chat through the Bot API.
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    chat_id: String,
    markup: Markup,
}

impl TelegramNotifier {
    pub const API_BASE: &'static str = "https://api.telegram.org";

    pub fn new(bot_token: &str, chat_id: &str, markup: Markup, timeout: Duration) -> Result<Self> {
        Self::with_api_base(Self::API_BASE, bot_token, chat_id, markup, timeout)
    }

    pub fn with_api_base(api_base: &str, bot_token: &str, chat_id: &str, markup: Markup, timeout: Duration) -> Result<Self> {
        if bot_token.trim().is_empty() || chat_id.trim().is_empty() {
            return Err(AgentError::Config("bot token and chat id are both required".to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;
        let endpoint = format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), bot_token.trim());

        Ok(Self {
            client,
            endpoint,
            chat_id: chat_id.trim().to_string(),
            markup,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn channel_name(&self) -> String {
        format!("telegram:{}", self.chat_id)
    }

    async fn deliver(&self, message: &str) -> anyhow::Result<()> {
        let (mut status, mut reply) = self.send(message, Some(self.markup.parse_mode())).await?;
        if rejected_markup(status, reply.as_ref()) {
            warn!("Telegram could not parse the {} markup; resending as plain text", self.markup.parse_mode());
            (status, reply) = self.send(message, None).await?;
        }

        match reply {
            Some(reply) if status.is_success() && reply.ok => {
                debug!("Delivered message to chat {} ({} chars)", self.chat_id, message.len());
                Ok(())
            }
            Some(reply) => anyhow::bail!(
                "Telegram rejected message (HTTP {}): {}",
                status.as_u16(),
                reply.description.unwrap_or_default()
            ),
            None => anyhow::bail!("Telegram answered HTTP {} with an unreadable body", status.as_u16()),
        }
    }
}

impl TelegramNotifier {
    async fn send(&self, message: &str, parse_mode: Option<&str>) -> anyhow::Result<(StatusCode, Option<TelegramReply>)> {
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text: message,
            parse_mode,
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .context("Telegram request failed")?;

        let status = response.status();
        Ok((status, response.json().await.ok()))
    }
}

/// Telegram answers 400 "can't parse entities" when the text is not valid
/// in the requested parse mode.
fn rejected_markup(status: StatusCode, reply: Option<&TelegramReply>) -> bool {
    status == StatusCode::BAD_REQUEST
        && reply
            .and_then(|reply| reply.description.as_deref())
            .is_some_and(|description| description.to_ascii_lowercase().contains("can't parse entities"))
}

/// Renders the pipeline's messages in the channel's markup.
#[derive(Debug, Clone, Copy)]
pub struct MessageRenderer {
    markup: Markup,
}

impl MessageRenderer {
    pub fn new(markup: Markup) -> Self {
        Self { markup }
    }

    /// A posting the classifier chose to report. The body is the classifier's
    /// own text; only the link is appended.
    pub fn matched(&self, posting: &Posting, verdict: &Verdict) -> String {
        format!("{}\n\n🔗 {}", verdict.message.trim(), self.markup.link("View Job", &posting.link))
    }

    /// A posting reported only because transparency mode is on.
    pub fn unmatched(&self, posting: &Posting, verdict: Option<&Verdict>) -> String {
        let score = verdict
            .and_then(|v| v.score)
            .map(|s| format!(" ({}%)", s))
            .unwrap_or_default();
        let reason = match verdict {
            Some(verdict) => verdict.message.trim().to_string(),
            None => "Could not be scored.".to_string(),
        };

        let mut text = format!("⚪ {}{}\n{}", self.markup.bold("Low match"), score, self.headline(posting));
        if !reason.is_empty() {
            text.push_str(&format!("\n{}", reason));
        }
        text.push_str(&format!("\n🔗 {}", self.markup.link("View Job", &posting.link)));
        text
    }

    fn headline(&self, posting: &Posting) -> String {
        let mut line = self.markup.bold(&posting.title);
        if let Some(company) = &posting.company {
            line.push_str(&format!("\n🏢 {}", company));
        }
        if let Some(location) = &posting.location {
            match &posting.posted {
                Some(posted) => line.push_str(&format!("\n📍 {} ({})", location, posted)),
                None => line.push_str(&format!("\n📍 {}", location)),
            }
        }
        line
    }

    pub fn run_started(&self, at: DateTime<Local>, sources: usize) -> String {
        format!(
            "⏳ {} at {}\nChecking {} sources.",
            self.markup.bold("Job scan started"),
            at.format("%H:%M"),
            sources
        )
    }

    pub fn blocked(&self, source: &str, status: u16) -> String {
        format!(
            "⚠️ {} (HTTP {}) on {}.\nStopping run early.",
            self.markup.bold("Source blocked the bot"),
            status,
            source
        )
    }

    /// End-of-run report. `None` when there is nothing worth sending.
    pub fn summary(&self, summary: &RunSummary, heartbeat: bool) -> Option<String> {
        let title = self.markup.bold("Run Complete");
        if summary.found_new() {
            return Some(format!(
                "✅ {}\nFound {} new jobs, reported {}.",
                title, summary.postings_new, summary.notifications_sent
            ));
        }
        if heartbeat && summary.blocked.is_none() {
            let mut text = format!("✅ {}\nChecked {} sources.\nNo new jobs found.", title, summary.sources_checked);
            if !summary.failed_sources.is_empty() {
                text.push_str(&format!("\n{} sources failed.", summary.failed_sources.len()));
            }
            return Some(text);
        }
        info!("Nothing new and no heartbeat configured; no summary sent");
        None
    }

    pub fn self_test(&self) -> String {
        format!("🚀 {}: if you can read this, delivery works.", self.markup.bold("Bot Test"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting() -> Posting {
        Posting::new("https://jobs.example.com/1", "Growth Marketer", "https://jobs.example.com/1", "Marketing")
            .with_company(Some("Acme".to_string()))
            .with_location(Some("Paris".to_string()))
            .with_posted(Some("2 days ago".to_string()))
    }

    #[test]
    fn matched_message_appends_link_in_markup() {
        let verdict = Verdict::notify(Some(82), "MATCH SCORE: 82%\n");
        let markdown = MessageRenderer::new(Markup::Markdown).matched(&posting(), &verdict);
        assert_eq!(markdown, "MATCH SCORE: 82%\n\n🔗 [View Job](https://jobs.example.com/1)");

        let html = MessageRenderer::new(Markup::Html).matched(&posting(), &verdict);
        assert!(html.ends_with("<a href='https://jobs.example.com/1'>View Job</a>"));
    }

    #[test]
    fn unmatched_message_shows_card_details_and_reason() {
        let verdict = Verdict::skip(Some(30), "Requires fluent German.");
        let text = MessageRenderer::new(Markup::Html).unmatched(&posting(), Some(&verdict));
        assert!(text.contains("<b>Low match</b> (30%)"));
        assert!(text.contains("🏢 Acme"));
        assert!(text.contains("📍 Paris (2 days ago)"));
        assert!(text.contains("Requires fluent German."));
    }

    #[test]
    fn summary_respects_heartbeat_and_blocking() {
        let renderer = MessageRenderer::new(Markup::Markdown);
        let mut summary = RunSummary::start(3);
        summary.sources_checked = 3;

        assert!(renderer.summary(&summary, false).is_none());
        assert!(renderer.summary(&summary, true).unwrap().contains("No new jobs found"));

        summary.blocked = Some(crate::types::BlockedSource {
            label: "LinkedIn".to_string(),
            status: 429,
        });
        assert!(renderer.summary(&summary, true).is_none());

        summary.postings_new = 2;
        summary.notifications_sent = 1;
        assert!(renderer.summary(&summary, false).unwrap().contains("Found 2 new jobs, reported 1"));
    }

    #[test]
    fn notifier_requires_credentials() {
        let result = TelegramNotifier::new("", "123", Markup::Markdown, Duration::from_secs(10));
        assert!(matches!(result, Err(AgentError::Config(_))));
    }

    #[test]
    fn serializes_send_message_payload() {
        let payload = SendMessage {
            chat_id: "781",
            text: "hello",
            parse_mode: Some(Markup::Html.parse_mode()),
            disable_web_page_preview: true,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["parse_mode"], "HTML");
        assert_eq!(json["chat_id"], "781");

        let plain = SendMessage {
            parse_mode: None,
            ..payload
        };
        let json = serde_json::to_value(&plain).unwrap();
        assert!(json.get("parse_mode").is_none());
    }

    fn reply(ok: bool, description: Option<&str>) -> TelegramReply {
        TelegramReply {
            ok,
            description: description.map(str::to_string),
        }
    }

    #[test]
    fn only_entity_parse_errors_fall_back_to_plain_text() {
        let unbalanced = reply(
            false,
            Some("Bad Request: can't parse entities: Can't find end of the entity starting at byte offset 42"),
        );
        assert!(rejected_markup(StatusCode::BAD_REQUEST, Some(&unbalanced)));

        let missing_chat = reply(false, Some("Bad Request: chat not found"));
        assert!(!rejected_markup(StatusCode::BAD_REQUEST, Some(&missing_chat)));
        assert!(!rejected_markup(StatusCode::BAD_REQUEST, None));
        assert!(!rejected_markup(StatusCode::OK, Some(&reply(true, None))));
        assert!(!rejected_markup(StatusCode::TOO_MANY_REQUESTS, Some(&unbalanced)));
    }
}
