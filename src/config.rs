//! Configuration types for transcript parsing.
//!
//! Every knob lives in [`ParserConfig`], built via [`ParserConfigBuilder`].
//! A config is cheap to clone and safe to share between concurrent parses;
//! nothing in it is mutated during a run.

use crate::error::TranscriptError;
use crate::observer::ParseObserver;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default model when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Numeric bounds used by the confidence gate.
///
/// These are heuristics rather than derived limits, so every one of them is
/// configurable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceThresholds {
    /// Lowest acceptable cumulative GPA. Default: 0.0.
    pub min_gpa: f64,
    /// Highest acceptable cumulative GPA. Default: 4.3 (an all-`A+` scale).
    pub max_gpa: f64,
    /// Records scoring below this are rejected. Default: 0.5.
    pub min_score: f64,
    /// Allowed gap between computed and source-reported GPA. Default: 0.05.
    pub reported_gpa_tolerance: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            min_gpa: 0.0,
            max_gpa: 4.3,
            min_score: 0.5,
            reported_gpa_tolerance: 0.05,
        }
    }
}

impl ConfidenceThresholds {
    pub fn gpa_in_range(&self, gpa: f64) -> bool {
        gpa.is_finite() && gpa >= self.min_gpa && gpa <= self.max_gpa
    }
}

/// What to do when the deterministic record fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FallbackPolicy {
    /// Escalate to the AI path (requires an API key). (default)
    #[default]
    AiFallback,
    /// Return the failing deterministic record with a low-confidence warning.
    AcceptLowConfidence,
}

/// Configuration for a transcript parse.
///
/// # Example
/// ```rust
/// use edgequake_transcript::{FallbackPolicy, ParserConfig};
///
/// let config = ParserConfig::builder()
///     .model("gpt-4.1-mini")
///     .api_timeout_secs(20)
///     .fallback(FallbackPolicy::AiFallback)
///     .build()
///     .unwrap();
/// assert_eq!(config.api_timeout_secs, 20);
/// ```
#[derive(Clone)]
pub struct ParserConfig {
    pub thresholds: ConfidenceThresholds,

    pub fallback: FallbackPolicy,

    /// LLM model identifier. If None, [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, `EDGEQUAKE_LLM_PROVIDER` and
    /// `EDGEQUAKE_MODEL` decide, then OpenAI with the caller's API key.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Extraction wants the most literal reading of the text.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 8192.
    ///
    /// A four-year transcript runs to roughly 4 000 output tokens of JSON.
    /// Too low a limit truncates the reply mid-array, which the response
    /// repair chain can recover only partially.
    pub max_tokens: usize,

    /// Upper bound on the model call, in seconds. Range 1–300. Default: 30.
    pub api_timeout_secs: u64,

    /// Source text beyond this many characters is cut before prompting.
    /// Default: 60 000.
    pub max_prompt_chars: usize,

    /// Custom system instruction. If None, the built-in one.
    pub system_prompt: Option<String>,

    /// Subject codes counted toward the major GPA. Empty means "the subject
    /// with the most GPA credits".
    pub major_subjects: Vec<String>,

    pub observer: Option<Arc<dyn ParseObserver>>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            thresholds: ConfidenceThresholds::default(),
            fallback: FallbackPolicy::default(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 8192,
            api_timeout_secs: 30,
            max_prompt_chars: 60_000,
            system_prompt: None,
            major_subjects: Vec::new(),
            observer: None,
        }
    }
}

impl fmt::Debug for ParserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserConfig")
            .field("thresholds", &self.thresholds)
            .field("fallback", &self.fallback)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_prompt_chars", &self.max_prompt_chars)
            .field("system_prompt", &self.system_prompt.as_ref().map(|s| s.len()))
            .field("major_subjects", &self.major_subjects)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn ParseObserver>"))
            .finish()
    }
}

impl ParserConfig {
    pub fn builder() -> ParserConfigBuilder {
        ParserConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`ParserConfig`].
#[derive(Debug)]
pub struct ParserConfigBuilder {
    config: ParserConfig,
}

impl ParserConfigBuilder {
    pub fn thresholds(mut self, thresholds: ConfidenceThresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    pub fn min_score(mut self, score: f64) -> Self {
        self.config.thresholds.min_score = score.clamp(0.0, 1.0);
        self
    }

    pub fn gpa_range(mut self, min: f64, max: f64) -> Self {
        self.config.thresholds.min_gpa = min;
        self.config.thresholds.max_gpa = max;
        self
    }

    pub fn fallback(mut self, policy: FallbackPolicy) -> Self {
        self.config.fallback = policy;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n.max(256);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.clamp(1, 300);
        self
    }

    pub fn max_prompt_chars(mut self, n: usize) -> Self {
        self.config.max_prompt_chars = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn major_subjects<I, S>(mut self, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.major_subjects = subjects
            .into_iter()
            .map(|s| s.into().trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ParseObserver>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ParserConfig, TranscriptError> {
        let c = &self.config;
        let t = &c.thresholds;
        if !(t.min_gpa.is_finite() && t.max_gpa.is_finite()) || t.min_gpa > t.max_gpa {
            return Err(TranscriptError::InvalidConfig(format!(
                "GPA range must satisfy min ≤ max, got [{}, {}]",
                t.min_gpa, t.max_gpa
            )));
        }
        if !(0.0..=1.0).contains(&t.min_score) {
            return Err(TranscriptError::InvalidConfig(format!(
                "min_score must be 0–1, got {}",
                t.min_score
            )));
        }
        if t.reported_gpa_tolerance < 0.0 {
            return Err(TranscriptError::InvalidConfig(
                "reported_gpa_tolerance must be ≥ 0".into(),
            ));
        }
        if c.max_prompt_chars == 0 {
            return Err(TranscriptError::InvalidConfig(
                "max_prompt_chars must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ParserConfig::default();
        assert_eq!(c.thresholds.max_gpa, 4.3);
        assert_eq!(c.thresholds.min_score, 0.5);
        assert_eq!(c.fallback, FallbackPolicy::AiFallback);
        assert_eq!(c.api_timeout_secs, 30);
        assert_eq!(c.model_or_default(), DEFAULT_MODEL);
    }

    #[test]
    fn setters_clamp() {
        let c = ParserConfig::builder()
            .api_timeout_secs(0)
            .temperature(9.0)
            .min_score(3.0)
            .build()
            .unwrap();
        assert_eq!(c.api_timeout_secs, 1);
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.thresholds.min_score, 1.0);
    }

    #[test]
    fn inverted_gpa_range_rejected() {
        let err = ParserConfig::builder().gpa_range(4.0, 1.0).build().unwrap_err();
        assert!(matches!(err, TranscriptError::InvalidConfig(_)));
    }

    #[test]
    fn major_subjects_normalised() {
        let c = ParserConfig::builder()
            .major_subjects([" cs", "", "Ma"])
            .build()
            .unwrap();
        assert_eq!(c.major_subjects, vec!["CS", "MA"]);
    }

    #[test]
    fn debug_hides_provider_and_prompt() {
        let c = ParserConfig::builder()
            .system_prompt("secret instructions")
            .build()
            .unwrap();
        let s = format!("{c:?}");
        assert!(!s.contains("secret"));
    }
}
