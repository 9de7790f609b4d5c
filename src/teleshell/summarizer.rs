use crate::teleshell::config::{SummarizerConfig, SummaryLength, SummaryProvider};
use crate::teleshell::message::Message;
use crate::teleshell::util::truncate_with_ellipsis;
use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const MAX_LOCAL_LINES: usize = 12;
const MAX_LOCAL_LINE_CHARS: usize = 200;
const MAX_ERROR_BODY_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SummarizeError {
    #[error("summarization service overloaded: {0}")]
    Overloaded(String),
    #[error("summarization rate limited: {0}")]
    RateLimited(String),
    #[error("summarization failed: {0}")]
    Other(String),
}

impl SummarizeError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SummarizeError::Overloaded(_) | SummarizeError::RateLimited(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SummarizeError::Overloaded(_) => "overloaded",
            SummarizeError::RateLimited(_) => "rate_limited",
            SummarizeError::Other(_) => "other",
        }
    }
}

/// One bounded message set, ready to be turned into a prompt.
#[derive(Debug, Clone)]
pub struct SummaryRequest<'a> {
    pub messages: &'a [Message],
    pub channel_label: &'a str,
    pub time_period: String,
    pub length: &'a SummaryLength,
    pub template: &'a str,
}

impl SummaryRequest<'_> {
    pub fn prompt(&self) -> String {
        build_prompt(
            self.template,
            self.channel_label,
            &self.time_period,
            &length_guideline(self.length),
            &format_messages(self.messages),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryResult {
    pub text: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_secs: f64,
}

pub trait Summarizer {
    fn model(&self) -> &str;
    fn summarize(&self, request: &SummaryRequest<'_>) -> Result<SummaryResult, SummarizeError>;
}

pub fn length_guideline(length: &SummaryLength) -> String {
    match length {
        SummaryLength::Sentences(n) => format!("in up to {n} sentences"),
        SummaryLength::Named(name) => match name.trim() {
            "short" => "in 1-3 concise sentences".to_string(),
            "medium" => "in 4-7 sentences".to_string(),
            "long" => "in 8-12 sentences".to_string(),
            digits if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) => {
                format!("in up to {digits} sentences")
            }
            _ => "in a concise manner".to_string(),
        },
    }
}

pub fn format_messages(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| !m.text.trim().is_empty())
        .map(|m| format!("- {}", m.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(
    template: &str,
    channel_name: &str,
    time_period: &str,
    summary_length_guideline: &str,
    messages: &str,
) -> String {
    template
        .replace("{{channel_name}}", channel_name)
        .replace("{{time_period}}", time_period)
        .replace("{{summary_length_guideline}}", summary_length_guideline)
        .replace("{{messages}}", messages)
}

/// Raw completion from a backend before latency is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

pub trait CompletionBackend {
    fn model(&self) -> &str;
    fn complete(&self, request: &SummaryRequest<'_>) -> Result<Completion, SummarizeError>;
}

pub struct GeminiBackend {
    pub client: Client,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

pub struct OpenAiCompatBackend {
    pub client: Client,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

/// Extractive summary without a network call.
pub struct LocalBackend;

fn snippet(body: &str) -> String {
    truncate_with_ellipsis(body.trim(), MAX_ERROR_BODY_CHARS)
}

pub fn classify_http_failure(provider: &str, status: u16, body: &str) -> SummarizeError {
    let lower = body.to_ascii_lowercase();
    let detail = format!("{provider} call failed with status {status}: {}", snippet(body));
    if status == 429 || lower.contains("resource_exhausted") || lower.contains("rate limit") {
        return SummarizeError::RateLimited(detail);
    }
    if status == 503 || status == 529 || lower.contains("overloaded") {
        return SummarizeError::Overloaded(detail);
    }
    SummarizeError::Other(detail)
}

fn transport_failure(provider: &str, err: reqwest::Error) -> SummarizeError {
    SummarizeError::Other(format!("{provider} request failed: {err}"))
}

fn value_u64(json: &Value, path: &[&str]) -> u64 {
    let mut cursor = json;
    for key in path {
        match cursor.get(key) {
            Some(next) => cursor = next,
            None => return 0,
        }
    }
    cursor.as_u64().unwrap_or(0)
}

pub fn extract_gemini_text(json: &Value) -> Option<String> {
    let parts = json
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(|v| v.get("content"))
        .and_then(|v| v.get("parts"))
        .and_then(Value::as_array)?;
    let chunks: Vec<&str> = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join(""))
    }
}

pub fn extract_openai_compatible_text(json: &Value) -> Option<String> {
    let choices = json.get("choices").and_then(Value::as_array)?;
    let first = choices.first()?;
    let content = first.get("message")?.get("content")?;
    match content {
        Value::String(s) => Some(s.to_string()),
        Value::Array(parts) => {
            let mut chunks = Vec::new();
            for part in parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    chunks.push(text.to_string());
                }
            }
            if chunks.is_empty() {
                None
            } else {
                Some(chunks.join("\n"))
            }
        }
        _ => None,
    }
}

fn read_json(
    provider: &str,
    response: reqwest::blocking::Response,
) -> Result<Value, SummarizeError> {
    let status = response.status();
    let body = response
        .text()
        .map_err(|err| transport_failure(provider, err))?;
    if !status.is_success() {
        return Err(classify_http_failure(provider, status.as_u16(), &body));
    }
    serde_json::from_str(&body)
        .map_err(|err| SummarizeError::Other(format!("{provider} returned invalid JSON: {err}")))
}

impl CompletionBackend for GeminiBackend {
    fn model(&self) -> &str {
        &self.model
    }

    fn complete(&self, request: &SummaryRequest<'_>) -> Result<Completion, SummarizeError> {
        let base = self.base_url.trim_end_matches('/');
        let url = format!("{base}/v1beta/models/{}:generateContent", self.model);
        let payload = serde_json::json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [
                        {"text": request.prompt()}
                    ]
                }
            ]
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .map_err(|err| transport_failure("gemini", err))?;
        let json = read_json("gemini", response)?;
        let text = extract_gemini_text(&json)
            .ok_or_else(|| SummarizeError::Other("gemini response missing text content".into()))?;

        Ok(Completion {
            text,
            model: json
                .get("modelVersion")
                .and_then(Value::as_str)
                .unwrap_or(&self.model)
                .to_string(),
            input_tokens: value_u64(&json, &["usageMetadata", "promptTokenCount"]),
            output_tokens: value_u64(&json, &["usageMetadata", "candidatesTokenCount"]),
        })
    }
}

impl CompletionBackend for OpenAiCompatBackend {
    fn model(&self) -> &str {
        &self.model
    }

    fn complete(&self, request: &SummaryRequest<'_>) -> Result<Completion, SummarizeError> {
        let base = self.base_url.trim_end_matches('/');
        let url = format!("{base}/v1/chat/completions");
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": request.prompt()}
            ],
            "temperature": 0.2
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .map_err(|err| transport_failure("openai-compatible", err))?;
        let json = read_json("openai-compatible", response)?;
        let text = extract_openai_compatible_text(&json).ok_or_else(|| {
            SummarizeError::Other("openai-compatible response missing text content".into())
        })?;

        Ok(Completion {
            text,
            model: json
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(&self.model)
                .to_string(),
            input_tokens: value_u64(&json, &["usage", "prompt_tokens"]),
            output_tokens: value_u64(&json, &["usage", "completion_tokens"]),
        })
    }
}

impl CompletionBackend for LocalBackend {
    fn model(&self) -> &str {
        "local"
    }

    fn complete(&self, request: &SummaryRequest<'_>) -> Result<Completion, SummarizeError> {
        let lines: Vec<String> = request
            .messages
            .iter()
            .map(|m| m.text.trim())
            .filter(|t| !t.is_empty())
            .take(MAX_LOCAL_LINES)
            .map(|t| format!("- {}", truncate_with_ellipsis(t, MAX_LOCAL_LINE_CHARS)))
            .collect();

        let senders: BTreeSet<i64> = request.messages.iter().filter_map(|m| m.sender_id).collect();
        let mut text = format!(
            "## {} ({})\n",
            request.channel_label, request.time_period
        );
        if !senders.is_empty() {
            text.push_str(&format!(
                "{} messages from {} sender(s)\n",
                request.messages.len(),
                senders.len()
            ));
        }
        if lines.is_empty() {
            text.push_str("- no text content in this period\n");
        } else {
            text.push_str(&lines.join("\n"));
            text.push('\n');
        }

        Ok(Completion {
            text,
            model: "local".to_string(),
            input_tokens: 0,
            output_tokens: 0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

/// Wraps a backend with retry-on-transient-failure and latency measurement.
pub struct RetryingSummarizer {
    backend: Box<dyn CompletionBackend>,
    policy: RetryPolicy,
}

impl RetryingSummarizer {
    pub fn new(backend: Box<dyn CompletionBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }
}

impl Summarizer for RetryingSummarizer {
    fn model(&self) -> &str {
        self.backend.model()
    }

    fn summarize(&self, request: &SummaryRequest<'_>) -> Result<SummaryResult, SummarizeError> {
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            match self.backend.complete(request) {
                Ok(out) => {
                    let latency = started.elapsed().as_secs_f64();
                    return Ok(SummaryResult {
                        text: out.text,
                        model: out.model,
                        input_tokens: out.input_tokens,
                        output_tokens: out.output_tokens,
                        latency_secs: (latency * 100.0).round() / 100.0,
                    });
                }
                Err(err) if err.is_transient() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    let delay = self.policy.backoff * attempt;
                    tracing::warn!(
                        model = self.backend.model(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient summarization failure; retrying"
                    );
                    thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Name of the variable(s) that hold the API key for `provider`.
pub fn api_key_hint(provider: SummaryProvider) -> Option<&'static str> {
    match provider {
        SummaryProvider::Gemini => Some("GEMINI_API_KEY"),
        SummaryProvider::OpenaiCompatible => Some("TELESHELL_LLM_API_KEY or OPENAI_API_KEY"),
        SummaryProvider::Local => None,
    }
}

pub fn resolve_api_key(
    provider: SummaryProvider,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Option<String> {
    let vars: &[&str] = match provider {
        SummaryProvider::Gemini => &["GEMINI_API_KEY"],
        SummaryProvider::OpenaiCompatible => &["TELESHELL_LLM_API_KEY", "OPENAI_API_KEY"],
        SummaryProvider::Local => &[],
    };
    vars.iter()
        .filter_map(|var| lookup(var))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Builds the configured summarizer. `api_key` must already be resolved for
/// remote providers.
pub fn build_summarizer(
    cfg: &SummarizerConfig,
    api_key: Option<String>,
) -> anyhow::Result<Box<dyn Summarizer>> {
    let policy = RetryPolicy {
        max_retries: cfg.max_retries,
        backoff: Duration::from_millis(cfg.retry_backoff_ms),
    };
    let model = cfg.model_name().to_string();
    let client = || {
        Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
    };
    let key = || {
        api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("missing API key for {}", cfg.provider))
    };

    let backend: Box<dyn CompletionBackend> = match cfg.provider {
        SummaryProvider::Gemini => Box::new(GeminiBackend {
            client: client()?,
            api_key: key()?,
            model,
            base_url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
        }),
        SummaryProvider::OpenaiCompatible => Box::new(OpenAiCompatBackend {
            client: client()?,
            api_key: key()?,
            model,
            base_url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
        }),
        SummaryProvider::Local => Box::new(LocalBackend),
    };
    Ok(Box::new(RetryingSummarizer::new(backend, policy)))
}
