//! LLM interaction: the seam between the pipeline and a language model.
//!
//! The orchestrator talks to a [`TranscriptLlm`], never to a provider
//! directly. [`ProviderLlm`] adapts any `edgequake_llm` provider; tests and
//! embedders can supply their own implementation (a recorded reply, a cache,
//! a local model) without touching the pipeline.
//!
//! This module is deliberately thin. Prompt text lives in [`crate::prompts`];
//! the timeout and the error mapping into [`TranscriptError`] live with the
//! orchestrator. There are no retries here: a failed call is reported once and
//! retrying is the caller's decision.

use crate::error::TranscriptError;
use crate::record::TokenUsage;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, OpenAIProvider};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// One single-turn request: a fixed system instruction plus one user message.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// The model's text reply and its token accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
}

/// Why a model call failed, before it is tied to a provider name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    Auth(String),
    RateLimited { retry_after_secs: Option<u64> },
    Timeout,
    Other(String),
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamError::Auth(d) => write!(f, "authentication failed: {d}"),
            UpstreamError::RateLimited { .. } => f.write_str("rate limited"),
            UpstreamError::Timeout => f.write_str("request timed out"),
            UpstreamError::Other(d) => f.write_str(d),
        }
    }
}

impl UpstreamError {
    /// Attach the provider name and convert into the public error type.
    pub fn into_transcript_error(self, provider: &str, elapsed_ms: u64) -> TranscriptError {
        match self {
            UpstreamError::Auth(detail) => TranscriptError::UpstreamAuthError {
                provider: provider.to_string(),
                detail,
            },
            UpstreamError::RateLimited { retry_after_secs } => {
                TranscriptError::UpstreamRateLimited {
                    provider: provider.to_string(),
                    retry_after_secs,
                }
            }
            UpstreamError::Timeout => TranscriptError::UpstreamTimeout { elapsed_ms },
            UpstreamError::Other(message) => TranscriptError::LlmApiError { message },
        }
    }
}

/// A language model able to answer one transcript-parsing request.
///
/// The returned future is boxed so the trait stays object-safe and can be
/// stored as `Arc<dyn TranscriptLlm>`.
pub trait TranscriptLlm: Send + Sync {
    /// Provider name used in error messages and logs.
    fn name(&self) -> &str;

    fn complete<'a>(
        &'a self,
        request: CompletionRequest<'a>,
    ) -> BoxFuture<'a, Result<Completion, UpstreamError>>;
}

// ── edgequake-llm adapter ────────────────────────────────────────────────────

/// [`TranscriptLlm`] over an `edgequake_llm` provider.
pub struct ProviderLlm {
    provider: Arc<dyn LLMProvider>,
    name: String,
}

impl ProviderLlm {
    pub fn new(provider: Arc<dyn LLMProvider>, name: impl Into<String>) -> Self {
        Self {
            provider,
            name: name.into(),
        }
    }
}

impl fmt::Debug for ProviderLlm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderLlm")
            .field("name", &self.name)
            .field("provider", &"<dyn LLMProvider>")
            .finish()
    }
}

impl TranscriptLlm for ProviderLlm {
    fn name(&self) -> &str {
        &self.name
    }

    fn complete<'a>(
        &'a self,
        request: CompletionRequest<'a>,
    ) -> BoxFuture<'a, Result<Completion, UpstreamError>> {
        Box::pin(async move {
            let messages = vec![
                ChatMessage::system(request.system),
                ChatMessage::user(request.prompt),
            ];
            let options = build_options(request.temperature, request.max_tokens);

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "{}: {} input tokens, {} output tokens",
                        self.name, response.prompt_tokens, response.completion_tokens
                    );
                    Ok(Completion {
                        content: response.content,
                        usage: TokenUsage {
                            input_tokens: response.prompt_tokens,
                            output_tokens: response.completion_tokens,
                        },
                    })
                }
                Err(e) => Err(classify_error(&e.to_string())),
            }
        })
    }
}

/// Build `CompletionOptions` for a parse request.
pub fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

static RE_RETRY_AFTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)retry[- _]?after\D{0,12}(\d{1,5})").unwrap());

/// Sort a provider error message into an [`UpstreamError`].
///
/// Providers surface HTTP failures as text, so this matches on status codes
/// and the phrases the major APIs use.
pub fn classify_error(message: &str) -> UpstreamError {
    let lower = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["401", "403", "unauthorized", "forbidden", "invalid api key", "incorrect api key", "authentication"]) {
        UpstreamError::Auth(message.to_string())
    } else if has(&["429", "rate limit", "rate_limit", "too many requests", "quota"]) {
        UpstreamError::RateLimited {
            retry_after_secs: RE_RETRY_AFTER
                .captures(message)
                .and_then(|c| c[1].parse().ok()),
        }
    } else if has(&["timed out", "timeout", "deadline exceeded"]) {
        UpstreamError::Timeout
    } else {
        UpstreamError::Other(message.to_string())
    }
}

// ── Keyed construction ───────────────────────────────────────────────────────

/// Builds a [`TranscriptLlm`] from the caller's API key and a model id.
///
/// Used when neither an injected model nor an explicit provider is
/// configured, so the key that opened the AI path is the key that pays for
/// the call.
pub type KeyedLlmFactory =
    Arc<dyn Fn(&str, &str) -> Result<Arc<dyn TranscriptLlm>, TranscriptError> + Send + Sync>;

/// The default [`KeyedLlmFactory`]: OpenAI, authenticated with `api_key`.
pub fn openai_with_key(
    api_key: &str,
    model: &str,
) -> Result<Arc<dyn TranscriptLlm>, TranscriptError> {
    let provider = OpenAIProvider::new(api_key.trim()).with_model(model);
    debug!("Using OpenAI with the supplied key, model {}", model);
    Ok(Arc::new(ProviderLlm::new(Arc::new(provider), "openai")))
}

// ── API key gate ─────────────────────────────────────────────────────────────

/// Format check on a caller-supplied API key.
///
/// A key that passes opens the AI path and authenticates the model call
/// unless an explicit provider is configured.
/// Accepts 20–256 characters of `[A-Za-z0-9._-]` after trimming, which covers
/// the key shapes of the common hosted providers.
pub fn is_valid_api_key(key: &str) -> bool {
    let key = key.trim();
    (20..=256).contains(&key.len())
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
