//! Error types for the edgequake-transcript library.
//!
//! Two distinct types reflect two distinct outcomes:
//!
//! * [`TranscriptError`]: **Fatal**: the invocation produced no record
//!   (unsupported upload, empty text, missing API key, upstream failure,
//!   unrepairable model reply). Carried by
//!   [`crate::parse::ParseResult::Failed`].
//!
//! * [`ParseWarning`]: **Non-fatal**: a record was returned but the caller
//!   should know it is weak. Attached to [`crate::record::ParseOutput`].
//!
//! Anomalies inside the deterministic path (unmatched lines, missing period
//! markers) are neither: they only lower the confidence score.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// All fatal errors returned by the transcript pipeline.
#[derive(Debug, Error)]
pub enum TranscriptError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The upload is neither plain text nor a PDF.
    #[error("Unsupported file type '{mime}'\nResubmit as a PDF or as pasted text.")]
    UnsupportedFileType { mime: String },

    /// The document contained no text after normalisation.
    #[error("Transcript is empty\nPaste the transcript text or upload a text-based PDF.")]
    EmptyInput,

    /// The PDF could not be opened or its text layer could not be read.
    #[error("Failed to extract text from PDF: {detail}")]
    PdfExtractionFailed { detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Fallback gate ─────────────────────────────────────────────────────
    /// The deterministic parse was not trustworthy and no usable key was
    /// supplied for the AI-assisted path.
    #[error(
        "This transcript format could not be parsed reliably.\n\
Supply an API key to enable AI-assisted parsing."
    )]
    NeedsApiKey,

    /// A key was supplied but no LLM provider could be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Upstream errors ───────────────────────────────────────────────────
    /// The provider rejected the credentials (401/403).
    #[error("Authentication error from provider '{provider}': {detail}")]
    UpstreamAuthError { provider: String, detail: String },

    /// The provider returned HTTP 429.
    #[error("Rate limit exceeded for provider '{provider}'")]
    UpstreamRateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// The LLM call did not finish within the configured timeout.
    #[error("LLM call timed out after {elapsed_ms}ms")]
    UpstreamTimeout { elapsed_ms: u64 },

    /// Any other provider failure.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    // ── Result errors ─────────────────────────────────────────────────────
    /// The model reply could not be turned into JSON even after repair.
    #[error("Malformed model response: {reason}")]
    MalformedResponse { reason: String, original: String },

    /// Both paths ran and neither produced a record that passed validation.
    #[error("Transcript could not be parsed: {}", reasons.join("; "))]
    UnparseableTranscript { reasons: Vec<String> },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Payload-free discriminant of [`TranscriptError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UnsupportedFileType,
    EmptyInput,
    PdfExtraction,
    NeedsApiKey,
    ProviderNotConfigured,
    UpstreamAuthError,
    UpstreamRateLimited,
    UpstreamTimeout,
    UpstreamApi,
    MalformedResponse,
    UnparseableTranscript,
    InvalidConfig,
    Internal,
}

impl TranscriptError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranscriptError::UnsupportedFileType { .. } => ErrorKind::UnsupportedFileType,
            TranscriptError::EmptyInput => ErrorKind::EmptyInput,
            TranscriptError::PdfExtractionFailed { .. } | TranscriptError::PdfiumBindingFailed(_) => {
                ErrorKind::PdfExtraction
            }
            TranscriptError::NeedsApiKey => ErrorKind::NeedsApiKey,
            TranscriptError::ProviderNotConfigured { .. } => ErrorKind::ProviderNotConfigured,
            TranscriptError::UpstreamAuthError { .. } => ErrorKind::UpstreamAuthError,
            TranscriptError::UpstreamRateLimited { .. } => ErrorKind::UpstreamRateLimited,
            TranscriptError::UpstreamTimeout { .. } => ErrorKind::UpstreamTimeout,
            TranscriptError::LlmApiError { .. } => ErrorKind::UpstreamApi,
            TranscriptError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            TranscriptError::UnparseableTranscript { .. } => ErrorKind::UnparseableTranscript,
            TranscriptError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            TranscriptError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether re-running the whole invocation may succeed.
    ///
    /// The pipeline itself never retries; this only informs caller policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UpstreamRateLimited | ErrorKind::UpstreamTimeout | ErrorKind::UpstreamApi
        )
    }

    /// Whether the end user can fix this by changing what they submitted.
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UnsupportedFileType
                | ErrorKind::EmptyInput
                | ErrorKind::NeedsApiKey
                | ErrorKind::UpstreamAuthError
        )
    }
}

/// A non-fatal problem attached to a returned record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ParseWarning {
    /// The caller opted out of AI fallback and accepted a deterministic
    /// record that failed validation.
    LowConfidence { score: f64, reasons: Vec<String> },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::LowConfidence { score, reasons } => write!(
                f,
                "low confidence ({:.2}): {}",
                score,
                reasons.join("; ")
            ),
        }
    }
}
