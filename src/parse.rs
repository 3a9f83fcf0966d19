//! Parsing entry points and the two-path orchestrator.
//!
//! ## State machine
//!
//! ```text
//! Start ─▶ TryDeterministic ─┬─ valid ─────────────────────────────▶ Done(Deterministic)
//!                            └─ rejected ─▶ RequireApiKey ─┬─ no key ─▶ Fail(NeedsApiKey)
//!                                                          └─ key ──▶ RunAI
//! RunAI ─▶ RepairAndValidateAI ─┬─ valid ─▶ Done(AiAssisted)
//!                               └─ rejected ─▶ Fail(UnparseableTranscript)
//! ```
//!
//! The deterministic path always runs first and never touches the network.
//! The AI path runs only when a caller-supplied key passes the format check;
//! a missing key is a user-facing error rather than a silent downgrade.
//! Both paths end in the same sanitizer, aggregator and confidence gate, so
//! the record shape does not depend on provenance.
//!
//! The only suspension point is the model call, bounded by
//! `api_timeout_secs`. A timeout is reported as
//! [`TranscriptError::UpstreamTimeout`] and never retried here.

use crate::config::{FallbackPolicy, ParserConfig};
use crate::error::{ParseWarning, TranscriptError};
use crate::observer::{NoopObserver, ParseObserver, PipelineStage};
use crate::pipeline::aggregate::finalize;
use crate::pipeline::confidence::{score, validate, ExtractionSignals, Validation};
use crate::pipeline::course::{CourseLineExtractor, LineGrammar};
use crate::pipeline::llm::{
    is_valid_api_key, openai_with_key, CompletionRequest, KeyedLlmFactory, ProviderLlm,
    TranscriptLlm,
};
use crate::pipeline::normalize::normalize;
use crate::pipeline::period::{lacks_period_markers, split_periods};
use crate::pipeline::response::RepairChain;
use crate::pipeline::sanitize::{sanitize, scrub};
use crate::pipeline::segment::{region_body, segment};
use crate::pipeline::student::{extract_student_info, reported_gpa};
use crate::pipeline::input;
use crate::prompts::{build_prompt_limited, SYSTEM_INSTRUCTION};
use crate::record::{
    CourseStatus, ParseOutput, PeriodRecord, Provenance, RawDocument, RegionKind, TokenUsage,
    TranscriptRecord,
};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of one parse. Exactly one variant per terminal state.
#[derive(Debug)]
pub enum ParseResult {
    Deterministic(ParseOutput),
    AiAssisted(ParseOutput),
    Failed(TranscriptError),
}

impl ParseResult {
    pub fn provenance(&self) -> Option<Provenance> {
        match self {
            ParseResult::Deterministic(_) => Some(Provenance::Deterministic),
            ParseResult::AiAssisted(_) => Some(Provenance::AiAssisted),
            ParseResult::Failed(_) => None,
        }
    }

    pub fn output(&self) -> Option<&ParseOutput> {
        match self {
            ParseResult::Deterministic(o) | ParseResult::AiAssisted(o) => Some(o),
            ParseResult::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&TranscriptError> {
        match self {
            ParseResult::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, ParseResult::Failed(_))
    }

    pub fn into_result(self) -> Result<ParseOutput, TranscriptError> {
        match self {
            ParseResult::Deterministic(o) | ParseResult::AiAssisted(o) => Ok(o),
            ParseResult::Failed(e) => Err(e),
        }
    }
}

/// A scored record plus the evidence that went into its score.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub record: TranscriptRecord,
    pub signals: ExtractionSignals,
    pub validation: Validation,
}

/// Sequences the deterministic and AI-assisted paths.
///
/// Holds no per-parse state: one parser can serve any number of concurrent
/// parses.
#[derive(Clone)]
pub struct TranscriptParser {
    config: ParserConfig,
    extractor: CourseLineExtractor,
    llm: Option<Arc<dyn TranscriptLlm>>,
    keyed_llm: KeyedLlmFactory,
    repair: Arc<RepairChain>,
}

impl std::fmt::Debug for TranscriptParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptParser")
            .field("config", &self.config)
            .field("extractor", &self.extractor)
            .field("llm", &self.llm.as_ref().map(|l| l.name().to_string()))
            .field("repair", &self.repair)
            .finish()
    }
}

impl Default for TranscriptParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

impl TranscriptParser {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            extractor: CourseLineExtractor::default(),
            llm: None,
            keyed_llm: Arc::new(openai_with_key),
            repair: Arc::new(RepairChain::standard()),
        }
    }

    /// Use `llm` for the AI path instead of resolving a provider.
    pub fn with_llm(mut self, llm: Arc<dyn TranscriptLlm>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Build the model from the caller's key with `factory` instead of
    /// [`openai_with_key`]. It receives the trimmed key and the configured
    /// model id.
    pub fn with_llm_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&str, &str) -> Result<Arc<dyn TranscriptLlm>, TranscriptError> + Send + Sync + 'static,
    {
        self.keyed_llm = Arc::new(factory);
        self
    }

    /// Swap the course-line grammar of the deterministic path.
    pub fn with_grammar(mut self, grammar: Arc<dyn LineGrammar>) -> Self {
        self.extractor = CourseLineExtractor::with_grammar(grammar);
        self
    }

    pub fn with_repair_chain(mut self, chain: RepairChain) -> Self {
        self.repair = Arc::new(chain);
        self
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    fn observer(&self) -> &dyn ParseObserver {
        match &self.config.observer {
            Some(o) => o.as_ref(),
            None => &NoopObserver,
        }
    }

    /// Run the full state machine over `doc`.
    ///
    /// `api_key` gates the AI path. Once it passes the format check it also
    /// authenticates the model call, unless an injected model or an explicit
    /// provider is configured.
    pub async fn parse(&self, doc: &RawDocument, api_key: Option<&str>) -> ParseResult {
        let start = Instant::now();
        let result = self.run(doc, api_key, start).await;
        match &result {
            ParseResult::Deterministic(o) | ParseResult::AiAssisted(o) => {
                info!(
                    "Parse complete: {} via {} path, confidence {:.2}, {}ms",
                    o.record.course_count(),
                    o.provenance,
                    o.confidence_score,
                    o.processing_time_ms
                );
                self.observer().on_complete(o.provenance, o.confidence_score);
            }
            ParseResult::Failed(e) => {
                info!("Parse failed after {}ms: {:?}", start.elapsed().as_millis(), e.kind());
                self.observer().on_failed(e.kind());
            }
        }
        result
    }

    async fn run(&self, doc: &RawDocument, api_key: Option<&str>, start: Instant) -> ParseResult {
        let text = normalize(&doc.source_text);
        if text.is_empty() {
            return ParseResult::Failed(TranscriptError::EmptyInput);
        }
        debug!(
            "Parsing {:?} document: {} chars after normalisation",
            doc.source_kind,
            text.len()
        );

        // ── Step 1: Deterministic path ───────────────────────────────────────
        self.observer().on_stage(PipelineStage::TryDeterministic);
        debug!("→ {}", PipelineStage::TryDeterministic);
        let attempt = self.parse_deterministic(&text);
        if attempt.validation.ok {
            return ParseResult::Deterministic(self.finish(attempt.record, Vec::new(), None, start));
        }

        let reasons = attempt.validation.reason_strings();
        warn!(
            "Deterministic record rejected (confidence {:.2}): {}",
            attempt.record.confidence_score,
            reasons.join("; ")
        );
        self.observer()
            .on_deterministic_rejected(attempt.record.confidence_score, &attempt.validation.reasons);

        if self.config.fallback == FallbackPolicy::AcceptLowConfidence {
            let warning = ParseWarning::LowConfidence {
                score: attempt.record.confidence_score,
                reasons,
            };
            return ParseResult::Deterministic(self.finish(
                attempt.record,
                vec![warning],
                None,
                start,
            ));
        }

        // ── Step 2: Key gate ─────────────────────────────────────────────────
        self.observer().on_stage(PipelineStage::RequireApiKey);
        debug!("→ {}", PipelineStage::RequireApiKey);
        let key = match api_key {
            Some(key) if is_valid_api_key(key) => key.trim(),
            Some(_) => {
                debug!("Supplied API key failed the format check");
                return ParseResult::Failed(TranscriptError::NeedsApiKey);
            }
            None => return ParseResult::Failed(TranscriptError::NeedsApiKey),
        };

        // ── Step 3: AI path ──────────────────────────────────────────────────
        match self.parse_ai(&text, key).await {
            Ok((attempt, usage)) if attempt.validation.ok => {
                ParseResult::AiAssisted(self.finish(attempt.record, Vec::new(), Some(usage), start))
            }
            Ok((attempt, _)) => {
                let reasons = attempt.validation.reason_strings();
                warn!("AI-assisted record rejected: {}", reasons.join("; "));
                ParseResult::Failed(TranscriptError::UnparseableTranscript { reasons })
            }
            Err(e) => ParseResult::Failed(e),
        }
    }

    fn finish(
        &self,
        record: TranscriptRecord,
        warnings: Vec<ParseWarning>,
        usage: Option<TokenUsage>,
        start: Instant,
    ) -> ParseOutput {
        ParseOutput {
            provenance: record.provenance,
            confidence_score: record.confidence_score,
            processing_time_ms: start.elapsed().as_millis() as u64,
            warnings,
            usage,
            record,
        }
    }

    /// Build and score a record from normalised text with the line grammar.
    ///
    /// Never fails: anomalies only lower the score.
    pub fn parse_deterministic(&self, text: &str) -> Attempt {
        let segments = segment(text);
        let mut record = TranscriptRecord::empty(Provenance::Deterministic);
        let mut signals = ExtractionSignals::default();

        let student = segments.get(RegionKind::StudentInfo);
        record.student_info = extract_student_info(region_body(text, &student));

        let totals = segments.get(RegionKind::Totals);
        signals.reported_gpa = reported_gpa(region_body(text, &totals));

        for (kind, status) in [
            (RegionKind::CompletedCourses, CourseStatus::Completed),
            (RegionKind::InProgress, CourseStatus::InProgress),
        ] {
            let region = segments.get(kind);
            let blocks = split_periods(text, &region);
            if blocks.is_empty() && lacks_period_markers(text, &region) {
                debug!("{:?} region has content but no period markers", kind);
                signals.course_regions_without_periods += 1;
            }
            if let Some(first) = blocks.first() {
                let lead = text.get(region.start..first.start).unwrap_or("");
                let stray = self.extractor.count_course_like(lead);
                if stray > 0 {
                    debug!("{:?} region has {} course lines before its first period", kind, stray);
                    signals.unmatched_course_lines += stray;
                }
            }

            let mut periods = Vec::with_capacity(blocks.len());
            for block in &blocks {
                let extraction = self.extractor.extract(text, block, status);
                signals.unmatched_course_lines += extraction.unmatched_course_lines;
                if extraction.courses.is_empty() {
                    continue;
                }
                periods.push(PeriodRecord {
                    season: block.season,
                    year: block.year,
                    courses: extraction.courses,
                    summary: Default::default(),
                });
            }
            match status {
                CourseStatus::Completed => record.completed_periods = periods,
                CourseStatus::InProgress => record.in_progress_periods = periods,
            }
        }

        signals.dropped_entries = scrub(&mut record);
        self.score_and_validate(record, signals)
    }

    fn score_and_validate(&self, mut record: TranscriptRecord, signals: ExtractionSignals) -> Attempt {
        finalize(&mut record, &self.config.major_subjects);
        record.confidence_score = score(&record, &signals, &self.config.thresholds);
        let validation = validate(&record, &self.config.thresholds);
        debug!(
            "{} record: {} periods, {} courses, confidence {:.2}, ok={}",
            record.provenance,
            record.period_count(),
            record.course_count(),
            record.confidence_score,
            validation.ok
        );
        Attempt {
            record,
            signals,
            validation,
        }
    }

    /// RunAI and RepairAndValidateAI.
    async fn parse_ai(
        &self,
        text: &str,
        api_key: &str,
    ) -> Result<(Attempt, TokenUsage), TranscriptError> {
        self.observer().on_stage(PipelineStage::RunAi);
        debug!("→ {}", PipelineStage::RunAi);

        let llm = self.resolve_llm(api_key)?;
        let prompt = build_prompt_limited(text, self.config.max_prompt_chars);
        let system = self
            .config
            .system_prompt
            .as_deref()
            .unwrap_or(SYSTEM_INSTRUCTION);
        self.observer().on_ai_request(prompt.chars().count());

        let request = CompletionRequest {
            system,
            prompt: &prompt,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let timeout = Duration::from_secs(self.config.api_timeout_secs);
        let call_start = Instant::now();
        let completion = match tokio::time::timeout(timeout, llm.complete(request)).await {
            Ok(Ok(c)) => c,
            Ok(Err(e)) => {
                let elapsed = call_start.elapsed().as_millis() as u64;
                warn!("{} call failed after {}ms: {}", llm.name(), elapsed, e);
                return Err(e.into_transcript_error(llm.name(), elapsed));
            }
            Err(_) => {
                let elapsed = call_start.elapsed().as_millis() as u64;
                warn!("{} call timed out after {}ms", llm.name(), elapsed);
                return Err(TranscriptError::UpstreamTimeout { elapsed_ms: elapsed });
            }
        };
        debug!(
            "{} replied with {} chars in {}ms",
            llm.name(),
            completion.content.len(),
            call_start.elapsed().as_millis()
        );

        self.observer().on_stage(PipelineStage::RepairAndValidateAi);
        debug!("→ {}", PipelineStage::RepairAndValidateAi);
        let value = self.repair.extract(&completion.content)?;
        let (record, signals) = sanitize(&value);
        Ok((self.score_and_validate(record, signals), completion.usage))
    }

    fn resolve_llm(&self, api_key: &str) -> Result<Arc<dyn TranscriptLlm>, TranscriptError> {
        if let Some(llm) = &self.llm {
            return Ok(Arc::clone(llm));
        }
        match resolve_provider(&self.config)? {
            Some((provider, name)) => Ok(Arc::new(ProviderLlm::new(provider, name))),
            None => (self.keyed_llm)(api_key, self.config.model_or_default()),
        }
    }

    /// Synchronous wrapper around [`TranscriptParser::parse`].
    ///
    /// Creates a temporary tokio runtime internally; do not call from inside
    /// an async context.
    pub fn parse_sync(&self, doc: &RawDocument, api_key: Option<&str>) -> ParseResult {
        match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(self.parse(doc, api_key)),
            Err(e) => ParseResult::Failed(TranscriptError::Internal(format!(
                "Failed to create tokio runtime: {e}"
            ))),
        }
    }
}

/// Parse `doc` with a parser built from `config`.
pub async fn parse(doc: &RawDocument, api_key: Option<&str>, config: &ParserConfig) -> ParseResult {
    TranscriptParser::new(config.clone()).parse(doc, api_key).await
}

/// Extract text from uploaded bytes, then parse it.
pub async fn parse_bytes(
    bytes: &[u8],
    mime: &str,
    api_key: Option<&str>,
    config: &ParserConfig,
) -> ParseResult {
    match input::extract_text(bytes, mime).await {
        Ok(doc) => parse(&doc, api_key, config).await,
        Err(e) => ParseResult::Failed(e),
    }
}

// ── Provider resolution ──────────────────────────────────────────────────────

fn create_provider(
    provider_name: &str,
    model: &str,
) -> Result<(Arc<dyn LLMProvider>, String), TranscriptError> {
    ProviderFactory::create_llm_provider(provider_name, model)
        .map(|p| (p, provider_name.to_string()))
        .map_err(|e| TranscriptError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        })
}

/// Resolve an explicitly configured LLM provider, most specific first.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`), through
///    [`ProviderFactory::create_llm_provider`], which reads that provider's
///    credentials from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
///
/// `None` means nothing was configured; the parser then builds the model
/// from the caller's API key.
pub fn resolve_provider(
    config: &ParserConfig,
) -> Result<Option<(Arc<dyn LLMProvider>, String)>, TranscriptError> {
    if let Some(ref provider) = config.provider {
        let name = config.provider_name.clone().unwrap_or_else(|| "custom".into());
        return Ok(Some((Arc::clone(provider), name)));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, config.model_or_default()).map(Some);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model).map(Some);
        }
    }

    Ok(None)
}
