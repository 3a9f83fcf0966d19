//! # edgequake-transcript
//!
//! Turn academic-transcript text into a validated, structured record.
//!
//! Registrar exports are tabular text with a stable line grammar, so most
//! transcripts parse with a handful of regexes and no model at all. When the
//! layout is unfamiliar the deterministic result scores low, and the crate
//! falls back to a language model given a schema-constrained prompt. Both
//! paths end in the same sanitizer, GPA aggregator and confidence gate, so the
//! output shape never depends on which path produced it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bytes / text
//!  │
//!  ├─ 1. Input       PDF text layer via pdfium, or pasted text
//!  ├─ 2. Normalize   whitespace and line endings
//!  ├─ 3. Segment     STUDENT INFORMATION / INSTITUTION CREDIT / TOTALS / IN PROGRESS
//!  ├─ 4. Extract     periods, then one course per line
//!  ├─ 5. Score       aggregate GPA, confidence gate
//!  └─ 6. Fallback    prompt → model → JSON repair → sanitize → score
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_transcript::{ParseResult, ParserConfig, RawDocument, TranscriptParser};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let text = std::fs::read_to_string("transcript.txt")?;
//!     let parser = TranscriptParser::new(ParserConfig::default());
//!     let key = std::env::var("OPENAI_API_KEY").ok();
//!
//!     match parser.parse(&RawDocument::pasted(text), key.as_deref()).await {
//!         ParseResult::Deterministic(out) | ParseResult::AiAssisted(out) => {
//!             println!("GPA {:.2}", out.record.gpa_summary.cumulative_gpa);
//!         }
//!         ParseResult::Failed(e) => eprintln!("{e}"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `transcript2json` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod observer;
pub mod parse;
pub mod pipeline;
pub mod prompts;
pub mod record;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConfidenceThresholds, FallbackPolicy, ParserConfig, ParserConfigBuilder};
pub use error::{ErrorKind, ParseWarning, TranscriptError};
pub use observer::{NoopObserver, ParseObserver, PipelineStage};
pub use parse::{parse, parse_bytes, ParseResult, TranscriptParser};
pub use pipeline::confidence::{ExtractionSignals, RejectReason, Validation};
pub use pipeline::course::{BannerGrammar, LineGrammar};
pub use pipeline::input::extract_text;
pub use pipeline::llm::{
    openai_with_key, Completion, CompletionRequest, KeyedLlmFactory, ProviderLlm, TranscriptLlm,
    UpstreamError,
};
pub use pipeline::response::{extract_json, RepairChain, RepairStrategy};
pub use record::{
    CourseRecord, CourseStatus, GpaSummary, ParseOutput, PeriodRecord, Provenance, RawDocument,
    SourceKind, StudentInfo, TokenUsage, TranscriptRecord,
};
