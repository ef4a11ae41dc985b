use crate::types::{AgentError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Trait for LLM adapters that score postings
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    /// Get the name of this LLM adapter
    fn adapter_name(&self) -> String;

    /// Send one prompt, get the free-text completion back
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
    /// Sent as `HTTP-Referer` for OpenRouter app attribution.
    pub referer: Option<String>,
    /// Sent as `X-Title` for OpenRouter app attribution.
    pub title: Option<String>,
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "xiaomi/mimo-v2-flash:free".to_string(),
            timeout_seconds: 60,
            referer: None,
            title: Some("Job Hunter Bot".to_string()),
            temperature: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Adapter for OpenAI-compatible chat completion endpoints (OpenRouter by default).
pub struct OpenRouterAdapter {
    client: Client,
    endpoint: String,
    config: LlmConfig,
}

impl OpenRouterAdapter {
    pub fn new(api_key: &str, config: LlmConfig) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(AgentError::Config("missing scoring service API key".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", api_key.trim()))?);
        if let Some(referer) = &config.referer {
            headers.insert("http-referer", header_value(referer)?);
        }
        if let Some(title) = &config.title {
            headers.insert("x-title", header_value(title)?);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .build()?;
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| AgentError::Config(format!("invalid header value: {}", e)))
}

#[async_trait]
impl LlmAdapter for OpenRouterAdapter {
    fn adapter_name(&self) -> String {
        format!("OpenRouter ({})", self.config.model)
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let start = Instant::now();
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %body, "Scoring service error");
            return Err(AgentError::Llm(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Llm(format!("malformed completion: {}", e)))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| AgentError::Llm("empty completion".to_string()))?;

        debug!(
            model = %self.config.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "Chat completion"
        );
        Ok(content)
    }
}

/// Scripted adapter for development and testing.
///
/// Replies with the first rule whose needle occurs in the prompt, else the
/// default reply. Every prompt is recorded.
pub struct MockLlmAdapter {
    name: String,
    rules: Vec<(String, String)>,
    default_reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            default_reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn reply_when(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((needle.into(), reply.into()));
        self
    }

    pub fn reply_otherwise(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = Some(reply.into());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmAdapter for MockLlmAdapter {
    fn adapter_name(&self) -> String {
        format!("Mock LLM Adapter ({})", self.name)
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .or_else(|| self.default_reply.clone());

        match reply {
            Some(reply) => {
                info!("Mock LLM replied ({} chars)", reply.len());
                Ok(reply)
            }
            None => Err(AgentError::Llm("mock has no scripted reply".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_blank_api_key() {
        let result = OpenRouterAdapter::new("  ", LlmConfig::default());
        assert!(matches!(result, Err(AgentError::Config(_))));
    }

    #[test]
    fn builds_endpoint_from_base_url() {
        let config = LlmConfig {
            base_url: "https://llm.example.com/v1/".to_string(),
            ..LlmConfig::default()
        };
        let adapter = OpenRouterAdapter::new("sk-test", config).unwrap();
        assert_eq!(adapter.endpoint, "https://llm.example.com/v1/chat/completions");
        assert!(adapter.adapter_name().contains("mimo"));
    }

    #[test]
    fn parses_chat_completion_payload() {
        let payload = r#"{"id":"gen-1","choices":[{"index":0,"message":{"role":"assistant","content":"  SKIP: needs German  "}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("  SKIP: needs German  "));
    }

    #[tokio::test]
    async fn mock_matches_rules_in_order() {
        let mock = MockLlmAdapter::new("test")
            .reply_when("Title: Growth Marketer", "MATCH SCORE: 80%")
            .reply_otherwise("SKIP");

        assert_eq!(mock.complete("Title: Growth Marketer\n").await.unwrap(), "MATCH SCORE: 80%");
        assert_eq!(mock.complete("Title: Accountant\n").await.unwrap(), "SKIP");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn mock_without_reply_fails() {
        let mock = MockLlmAdapter::new("silent");
        assert!(matches!(mock.complete("anything").await, Err(AgentError::Llm(_))));
    }
}
