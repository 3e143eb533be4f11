use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ProviderConfig, ProviderKind};
use crate::language;
use crate::translation::{EchoProvider, TranslateError, TranslationProvider, TranslationRequest};

const SYSTEM_PROMPT: &str = "You are a translation engine. Translate only; output only the \
                             translation, with no notes or explanations.";

/// Shared client. Per-request budgets come from `RetryPolicy`, not from here.
static CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

// --- OpenAI-compatible request/response structs ---

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<OaiMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// --- Simple {text, target} -> {text} structs ---

#[derive(Serialize)]
struct SimpleRequest<'a> {
    text: &'a str,
    target: &'a str,
}

#[derive(Deserialize)]
struct SimpleResponse {
    #[serde(default)]
    text: Option<String>,
}

fn map_send_error(endpoint: &str, e: reqwest::Error) -> TranslateError {
    if e.is_timeout() {
        TranslateError::Timeout
    } else if e.is_connect() {
        TranslateError::Connect(endpoint.to_string())
    } else {
        TranslateError::Network(e.to_string())
    }
}

fn non_empty(text: Option<String>) -> Result<String, TranslateError> {
    let text = text.map(|t| t.trim().to_string()).unwrap_or_default();
    if text.is_empty() {
        Err(TranslateError::Empty)
    } else {
        Ok(text)
    }
}

/// Call each endpoint in order until one succeeds. Reports the last failure.
async fn first_success<'a, F, Fut>(
    endpoints: &'a [String],
    mut call: F,
) -> Result<String, TranslateError>
where
    F: FnMut(&'a str) -> Fut,
    Fut: Future<Output = Result<String, TranslateError>>,
{
    let mut last = TranslateError::NoEndpoints;
    for endpoint in endpoints {
        match call(endpoint).await {
            Ok(text) => return Ok(text),
            Err(e) => {
                warn!("endpoint {endpoint} failed: {e}");
                last = e;
            }
        }
    }
    Err(last)
}

/// OpenAI-style `/v1/chat/completions` backend (llama-server, Ollama, LM Studio).
pub struct ChatCompletionsProvider {
    endpoints: Vec<String>,
    model: String,
    temperature: f32,
}

impl ChatCompletionsProvider {
    pub fn new(endpoints: Vec<String>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            endpoints,
            model: model.into(),
            temperature,
        }
    }

    async fn send_one(
        &self,
        endpoint: &str,
        request: &TranslationRequest,
    ) -> Result<String, TranslateError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                OaiMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.into(),
                },
                OaiMessage {
                    role: "user",
                    content: build_user_prompt(request),
                },
            ],
            temperature: self.temperature,
            stream: false,
        };

        debug!(endpoint, lang = %request.target, chars = request.text.chars().count(), "chat completion request");
        let response = CLIENT
            .post(endpoint)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranslateError::Status(status.as_u16()));
        }

        let resp: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::Malformed(e.to_string()))?;

        non_empty(resp.choices.into_iter().next().and_then(|c| c.message.content))
    }
}

fn build_user_prompt(request: &TranslationRequest) -> String {
    format!(
        "Translate the following caption into {}.\n\n{}",
        language::display_name(&request.target),
        request.text
    )
}

#[async_trait]
impl TranslationProvider for ChatCompletionsProvider {
    async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslateError> {
        first_success(&self.endpoints, |endpoint| self.send_one(endpoint, request)).await
    }
}

/// `POST {text, target} -> {text}` backend, as served by `translate-server`.
pub struct SimpleHttpProvider {
    endpoints: Vec<String>,
}

impl SimpleHttpProvider {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self { endpoints }
    }

    async fn send_one(
        &self,
        endpoint: &str,
        request: &TranslationRequest,
    ) -> Result<String, TranslateError> {
        let response = CLIENT
            .post(endpoint)
            .json(&SimpleRequest {
                text: &request.text,
                target: &request.target,
            })
            .send()
            .await
            .map_err(|e| map_send_error(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranslateError::Status(status.as_u16()));
        }

        let resp: SimpleResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::Malformed(e.to_string()))?;
        non_empty(resp.text)
    }
}

#[async_trait]
impl TranslationProvider for SimpleHttpProvider {
    async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslateError> {
        first_success(&self.endpoints, |endpoint| self.send_one(endpoint, request)).await
    }
}

pub fn build_provider(config: &ProviderConfig) -> Arc<dyn TranslationProvider> {
    match config.kind {
        ProviderKind::ChatCompletions => Arc::new(ChatCompletionsProvider::new(
            config.endpoints.clone(),
            config.model.clone(),
            config.temperature,
        )),
        ProviderKind::Simple => Arc::new(SimpleHttpProvider::new(config.endpoints.clone())),
        ProviderKind::Echo => Arc::new(EchoProvider),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointStatus {
    Running,
    HttpStatus(u16),
    NotRunning,
}

impl std::fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "server running"),
            Self::HttpStatus(code) => write!(f, "server responded HTTP {code}"),
            Self::NotRunning => write!(f, "server not running"),
        }
    }
}

/// `/v1/models` next to an OpenAI-style endpoint; other endpoints are checked as-is.
pub fn models_url(endpoint: &str) -> String {
    match endpoint.find("/v1/") {
        Some(idx) => format!("{}/v1/models", &endpoint[..idx]),
        None => endpoint.to_string(),
    }
}

/// Quick liveness check of a translation endpoint.
pub async fn check_endpoint(endpoint: &str) -> EndpointStatus {
    let url = models_url(endpoint);
    match CLIENT.get(&url).timeout(Duration::from_secs(3)).send().await {
        Ok(resp) if resp.status().is_success() => EndpointStatus::Running,
        Ok(resp) => EndpointStatus::HttpStatus(resp.status().as_u16()),
        Err(e) => {
            debug!("status check of {url} failed: {e}");
            EndpointStatus::NotRunning
        }
    }
}
