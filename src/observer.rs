//! Observer hook for pipeline events.
//!
//! Inject an [`Arc<dyn ParseObserver>`] via
//! [`crate::config::ParserConfigBuilder::observer`] to receive an event at
//! each state transition of a parse. Events carry counts, scores and error
//! kinds only; transcript content never reaches an observer.
//!
//! # Example
//!
//! ```rust
//! use edgequake_transcript::{ParseObserver, ParserConfig, PipelineStage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct AiCounter {
//!     calls: AtomicUsize,
//! }
//!
//! impl ParseObserver for AiCounter {
//!     fn on_ai_request(&self, _prompt_chars: usize) {
//!         self.calls.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ParserConfig::builder()
//!     .observer(Arc::new(AiCounter { calls: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::ErrorKind;
use crate::pipeline::confidence::RejectReason;
use crate::record::Provenance;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// States of the orchestrator, in the order a full run visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelineStage {
    TryDeterministic,
    RequireApiKey,
    RunAi,
    RepairAndValidateAi,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::TryDeterministic => "TryDeterministic",
            PipelineStage::RequireApiKey => "RequireApiKey",
            PipelineStage::RunAi => "RunAI",
            PipelineStage::RepairAndValidateAi => "RepairAndValidateAI",
        };
        f.write_str(s)
    }
}

/// Called by [`crate::TranscriptParser`] as a parse moves through its states.
///
/// All methods default to no-ops. Parses may run concurrently against one
/// shared observer, so shared mutable state needs its own synchronisation.
pub trait ParseObserver: Send + Sync {
    fn on_stage(&self, stage: PipelineStage) {
        let _ = stage;
    }

    /// The deterministic record failed the confidence gate.
    fn on_deterministic_rejected(&self, score: f64, reasons: &[RejectReason]) {
        let _ = (score, reasons);
    }

    /// Just before the model call. `prompt_chars` is the user-message length.
    fn on_ai_request(&self, prompt_chars: usize) {
        let _ = prompt_chars;
    }

    fn on_complete(&self, provenance: Provenance, score: f64) {
        let _ = (provenance, score);
    }

    fn on_failed(&self, kind: ErrorKind) {
        let _ = kind;
    }
}

/// The default when no observer is configured.
pub struct NoopObserver;

impl ParseObserver for NoopObserver {}

pub type SharedObserver = Arc<dyn ParseObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        stages: Mutex<Vec<PipelineStage>>,
        failures: Mutex<Vec<ErrorKind>>,
    }

    impl ParseObserver for Recorder {
        fn on_stage(&self, stage: PipelineStage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_failed(&self, kind: ErrorKind) {
            self.failures.lock().unwrap().push(kind);
        }
    }

    #[test]
    fn noop_observer_accepts_everything() {
        let o: SharedObserver = Arc::new(NoopObserver);
        o.on_stage(PipelineStage::RunAi);
        o.on_deterministic_rejected(0.2, &[RejectReason::MissingIdentityAndCourses]);
        o.on_ai_request(1200);
        o.on_complete(Provenance::AiAssisted, 0.9);
        o.on_failed(ErrorKind::NeedsApiKey);
    }

    #[test]
    fn recorder_receives_events() {
        let r = Recorder::default();
        r.on_stage(PipelineStage::TryDeterministic);
        r.on_stage(PipelineStage::RequireApiKey);
        r.on_failed(ErrorKind::NeedsApiKey);
        // Not overridden; must stay a no-op.
        r.on_ai_request(10);

        assert_eq!(
            *r.stages.lock().unwrap(),
            vec![PipelineStage::TryDeterministic, PipelineStage::RequireApiKey]
        );
        assert_eq!(*r.failures.lock().unwrap(), vec![ErrorKind::NeedsApiKey]);
    }

    #[test]
    fn stage_names() {
        assert_eq!(PipelineStage::RunAi.to_string(), "RunAI");
    }
}
