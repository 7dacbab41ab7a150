//! LLM enrichment of filtered vacancies
//!
//! Each vacancy is sent to a chat model together with the session's rules; the
//! model answers with a JSON object that becomes the vacancy's
//! [`EnrichmentFields`]. Token usage is priced per model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{EnrichmentFields, LlmSettings, LlmUsage, Vacancy};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Description characters sent to the model
const MAX_DESCRIPTION_CHARS: usize = 6000;

/// LLM client errors
#[derive(Debug, Error)]
pub enum LlmError {
    /// Configuration error (missing API key, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response
    #[error("API error {0}: {1}")]
    Api(u16, String),

    /// Response was not the expected JSON
    #[error("Parse error: {0}")]
    Parse(String),
}

impl LlmError {
    /// Errors that will fail every subsequent request as well
    pub fn is_fatal(&self) -> bool {
        matches!(self, LlmError::Authentication(_) | LlmError::Config(_))
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// One completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask for a JSON object response
    pub json_response: bool,
}

/// Token usage of one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Completion result
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
}

/// Chat-completion capability
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// OpenAI chat-completions client
pub struct OpenAiClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponseRaw {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Message,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::Config("OpenAI API key is empty".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            base_url: OPENAI_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let start = std::time::Instant::now();

        let body = ChatRequestBody {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_response.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "OpenAI request failed");
                LlmError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "OpenAI API error");
            return Err(match status.as_u16() {
                401 | 403 => LlmError::Authentication(error_text),
                429 => LlmError::RateLimited,
                code => LlmError::Api(code, error_text),
            });
        }

        let raw: ChatResponseRaw = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let content = raw
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse("No choices in response".to_string()))?;

        debug!(
            model = %request.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "OpenAI chat completion"
        );

        Ok(CompletionResponse {
            content,
            usage: raw.usage.unwrap_or_default(),
        })
    }
}

/// Builds an LLM client for a resolved API key
pub trait LlmClientFactory: Send + Sync {
    fn create(&self, api_key: &str) -> Result<Arc<dyn LlmClient>, LlmError>;
}

/// Factory for [`OpenAiClient`]
#[derive(Debug, Clone, Default)]
pub struct OpenAiClientFactory {
    base_url: Option<String>,
}

impl OpenAiClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(url: impl Into<String>) -> Self {
        Self {
            base_url: Some(url.into()),
        }
    }
}

impl LlmClientFactory for OpenAiClientFactory {
    fn create(&self, api_key: &str) -> Result<Arc<dyn LlmClient>, LlmError> {
        let client = OpenAiClient::new(api_key)?;
        let client = match &self.base_url {
            Some(url) => client.with_base_url(url.clone()),
            None => client,
        };
        Ok(Arc::new(client))
    }
}

/// Price in USD per 1M (prompt, completion) tokens
pub fn model_price(model: &str) -> Option<(f64, f64)> {
    // Longest prefix first so "gpt-4o-mini" is not priced as "gpt-4o"
    const PRICES: &[(&str, f64, f64)] = &[
        ("gpt-4o-mini", 0.15, 0.60),
        ("gpt-4o", 2.50, 10.00),
        ("gpt-4.1-nano", 0.10, 0.40),
        ("gpt-4.1-mini", 0.40, 1.60),
        ("gpt-4.1", 2.00, 8.00),
        ("gpt-4-turbo", 10.00, 30.00),
        ("gpt-3.5-turbo", 0.50, 1.50),
    ];
    PRICES
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))
        .map(|(_, prompt, completion)| (*prompt, *completion))
}

/// Estimated USD cost of a request; unknown models cost nothing
pub fn estimate_cost(model: &str, usage: &TokenUsage) -> f64 {
    match model_price(model) {
        Some((prompt, completion)) => {
            (usage.prompt_tokens as f64 * prompt + usage.completion_tokens as f64 * completion)
                / 1_000_000.0
        }
        None => 0.0,
    }
}

/// Add one request to the session's usage totals
pub fn accumulate_usage(total: &mut LlmUsage, model: &str, usage: &TokenUsage) {
    total.requests += 1;
    total.prompt_tokens += usage.prompt_tokens;
    total.completion_tokens += usage.completion_tokens;
    total.estimated_cost_usd += estimate_cost(model, usage);
}

/// Fields the model is asked to return
#[derive(Debug, Deserialize)]
struct ModelAnswer {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    seniority: Option<String>,
    #[serde(default)]
    remote_policy: Option<String>,
    #[serde(default)]
    salary_range: Option<String>,
    #[serde(default)]
    tech_stack: Vec<String>,
    #[serde(default)]
    relevance_score: f32,
    #[serde(default)]
    match_reasons: Vec<String>,
}

/// Builds prompts and interprets answers
pub struct Enricher<'a> {
    settings: &'a LlmSettings,
}

impl<'a> Enricher<'a> {
    pub fn new(settings: &'a LlmSettings) -> Self {
        Self { settings }
    }

    pub fn build_request(&self, vacancy: &Vacancy) -> CompletionRequest {
        let mut system = String::from(
            "You evaluate job vacancies for a candidate. Answer with a single JSON object \
             with the keys: summary (string, 2-3 sentences), seniority (string or null), \
             remote_policy (string or null), salary_range (string or null), \
             tech_stack (array of strings), relevance_score (number 0..1), \
             match_reasons (array of strings).",
        );
        if !self.settings.rules.trim().is_empty() {
            system.push_str("\n\nCandidate profile and rules:\n");
            system.push_str(self.settings.rules.trim());
        }

        let description: String = vacancy.description.chars().take(MAX_DESCRIPTION_CHARS).collect();
        let user = format!(
            "Title: {}\nCompany: {}\nLocation: {}\nSource: {}\nURL: {}\n\nDescription:\n{}",
            vacancy.title,
            vacancy.company_or_unknown(),
            vacancy.location.as_deref().unwrap_or("-"),
            vacancy.source,
            vacancy.url,
            description
        );

        CompletionRequest {
            model: self.settings.model.clone(),
            messages: vec![Message::system(system), Message::user(user)],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            json_response: true,
        }
    }

    pub fn parse_answer(&self, content: &str) -> Result<EnrichmentFields, LlmError> {
        let json = strip_code_fence(content);
        let answer: ModelAnswer =
            serde_json::from_str(json).map_err(|e| LlmError::Parse(e.to_string()))?;

        Ok(EnrichmentFields {
            summary: answer.summary,
            seniority: answer.seniority,
            remote_policy: answer.remote_policy,
            salary_range: answer.salary_range,
            tech_stack: answer.tech_stack,
            relevance_score: if answer.relevance_score.is_finite() {
                answer.relevance_score.clamp(0.0, 1.0)
            } else {
                0.0
            },
            match_reasons: answer.match_reasons,
            model: self.settings.model.clone(),
        })
    }

    /// Enrich one vacancy; returns the fields and the usage of the request
    pub async fn enrich(
        &self,
        client: &dyn LlmClient,
        vacancy: &Vacancy,
    ) -> Result<(EnrichmentFields, TokenUsage), LlmError> {
        let response = client.complete(self.build_request(vacancy)).await?;
        let fields = self.parse_answer(&response.content)?;
        Ok((fields, response.usage))
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_price_prefers_longest_prefix() {
        assert_eq!(model_price("gpt-4o-mini-2024-07-18"), Some((0.15, 0.60)));
        assert_eq!(model_price("gpt-4o"), Some((2.50, 10.00)));
        assert_eq!(model_price("unknown-model"), None);
    }

    #[test]
    fn test_accumulate_usage() {
        let mut total = LlmUsage::default();
        let usage = TokenUsage {
            prompt_tokens: 1_000_000,
            completion_tokens: 500_000,
        };
        accumulate_usage(&mut total, "gpt-4o-mini", &usage);
        accumulate_usage(&mut total, "mystery", &usage);

        assert_eq!(total.requests, 2);
        assert_eq!(total.total_tokens(), 3_000_000);
        assert!((total.estimated_cost_usd - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_parse_answer_with_fence_and_clamp() {
        let settings = LlmSettings::default();
        let enricher = Enricher::new(&settings);
        let fields = enricher
            .parse_answer(
                "```json\n{\"summary\": \"Infra role\", \"tech_stack\": [\"k8s\"], \"relevance_score\": 1.7}\n```",
            )
            .unwrap();
        assert_eq!(fields.summary, "Infra role");
        assert_eq!(fields.tech_stack, vec!["k8s".to_string()]);
        assert_eq!(fields.relevance_score, 1.0);
        assert_eq!(fields.model, "gpt-4o-mini");
    }

    #[test]
    fn test_parse_answer_rejects_prose() {
        let settings = LlmSettings::default();
        let enricher = Enricher::new(&settings);
        assert!(matches!(
            enricher.parse_answer("I think this is a great job"),
            Err(LlmError::Parse(_))
        ));
    }

    #[test]
    fn test_fatal_errors() {
        assert!(LlmError::Authentication("bad key".into()).is_fatal());
        assert!(!LlmError::RateLimited.is_fatal());
        assert!(!LlmError::Parse("x".into()).is_fatal());
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(OpenAiClient::new("  "), Err(LlmError::Config(_))));
    }
}
