use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::config::ProviderConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub text: String,
    /// Language code, e.g. "yo".
    pub target: String,
}

impl TranslationRequest {
    /// Build a request carrying only the trailing `max_chars` characters of `text`.
    pub fn new(text: &str, target: &str, max_chars: usize) -> Self {
        Self {
            text: trailing_window(text, max_chars).to_string(),
            target: target.to_string(),
        }
    }
}

/// Last `max_chars` characters of `text`, cut on a char boundary.
pub fn trailing_window(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    match text.char_indices().nth(count - max_chars) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}

/// Provider failures. `Display` is what ends up on screen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("Request timed out. Is the translation server running?")]
    Timeout,
    #[error("Cannot connect to translation server at {0}.")]
    Connect(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Translation server error (HTTP {0}).")]
    Status(u16),
    #[error("Unexpected response from translation server: {0}")]
    Malformed(String),
    #[error("Empty response from translation server.")]
    Empty,
    #[error("No translation endpoint configured.")]
    NoEndpoints,
    #[error("Unsupported language '{0}'.")]
    UnsupportedLanguage(String),
}

impl TranslateError {
    /// The literal string shown in place of a translation.
    pub fn to_display(&self) -> String {
        format!("(translation error: {self})")
    }
}

#[async_trait]
pub trait TranslationProvider: Send + Sync {
    async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslateError>;
}

/// One bounded attempt, then exactly one retry with a longer budget.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub retry_factor: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry_factor: 1.5,
        }
    }
}

impl From<&ProviderConfig> for RetryPolicy {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            timeout: config.timeout(),
            retry_factor: config.retry_factor,
        }
    }
}

impl RetryPolicy {
    pub fn retry_timeout(&self) -> Duration {
        self.timeout.mul_f32(self.retry_factor.max(1.0))
    }

    pub async fn run(
        &self,
        provider: &dyn TranslationProvider,
        request: &TranslationRequest,
    ) -> Result<String, TranslateError> {
        match attempt(provider, request, self.timeout).await {
            Ok(text) => Ok(text),
            Err(first) => {
                warn!("translation attempt failed ({first}), retrying once");
                attempt(provider, request, self.retry_timeout()).await
            }
        }
    }
}

async fn attempt(
    provider: &dyn TranslationProvider,
    request: &TranslationRequest,
    budget: Duration,
) -> Result<String, TranslateError> {
    tokio::time::timeout(budget, provider.translate(request))
        .await
        .unwrap_or(Err(TranslateError::Timeout))
}

/// Offline placeholder: tags every line with the target code.
pub struct EchoProvider;

#[async_trait]
impl TranslationProvider for EchoProvider {
    async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslateError> {
        Ok(request
            .text
            .split('\n')
            .map(|line| format!("[{}] {line}", request.target))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Flaky {
        calls: AtomicUsize,
        fail_first: usize,
        hang: bool,
    }

    #[async_trait]
    impl TranslationProvider for Flaky {
        async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslateError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                if self.hang {
                    std::future::pending::<()>().await;
                }
                return Err(TranslateError::Status(503));
            }
            Ok(format!("ok:{}", request.text))
        }
    }

    #[test]
    fn trailing_window_respects_char_boundaries() {
        assert_eq!(trailing_window("short", 10), "short");
        assert_eq!(trailing_window("abcdef", 3), "def");
        assert_eq!(trailing_window("h\u{e9}llo w\u{f6}rld", 5), "w\u{f6}rld");
        assert_eq!(trailing_window("Hello world", 0), "");
        assert_eq!(TranslationRequest::new("Hello world", "yo", 0).text, "");
        let req = TranslationRequest::new(&"x".repeat(1000), "ha", 800);
        assert_eq!(req.text.len(), 800);
    }

    #[test]
    fn errors_render_as_sentinel_strings() {
        assert_eq!(
            TranslateError::Status(500).to_display(),
            "(translation error: Translation server error (HTTP 500).)"
        );
        assert!(TranslateError::Timeout.to_display().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn one_failure_is_retried() {
        let provider = Flaky { calls: AtomicUsize::new(0), fail_first: 1, hang: false };
        let req = TranslationRequest::new("hi", "yo", 800);
        let result = RetryPolicy::default().run(&provider, &req).await;
        assert_eq!(result.unwrap(), "ok:hi");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn two_timeouts_surface_timeout() {
        let provider = Flaky { calls: AtomicUsize::new(0), fail_first: 5, hang: true };
        let req = TranslationRequest::new("hi", "yo", 800);
        let start = tokio::time::Instant::now();
        let result = RetryPolicy::default().run(&provider, &req).await;
        assert_eq!(result, Err(TranslateError::Timeout));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(75));
    }

    #[tokio::test]
    async fn echo_tags_each_line() {
        let req = TranslationRequest::new("one\ntwo", "pcm", 800);
        assert_eq!(EchoProvider.translate(&req).await.unwrap(), "[pcm] one\n[pcm] two");
    }
}
