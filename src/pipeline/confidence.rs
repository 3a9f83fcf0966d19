//! Confidence scoring and the validation gate.
//!
//! The gate decides whether the orchestrator trusts a record. It is tuned to
//! reject too often rather than too rarely: a false negative costs one LLM
//! call, a false positive shows a student the wrong GPA.
//!
//! ## Score composition
//!
//! | Signal | Weight |
//! |--------|--------|
//! | student name present | 0.25 |
//! | student id present | 0.10 |
//! | mean course `match_confidence` | 0.35 |
//! | at least one period | 0.15 |
//! | GPA in range (0.05 if it disagrees with the reported GPA) | 0.15 |
//!
//! Penalties: 0.15 per course region holding text but no period marker,
//! 0.02 per course-like line no grammar matched (max 0.20), 0.01 per entry
//! the sanitizer dropped (max 0.10).

use crate::config::ConfidenceThresholds;
use crate::record::{is_known, Provenance, TranscriptRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Side-channel facts gathered while building a record.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractionSignals {
    /// GPA the source itself claims (totals region or model reply).
    pub reported_gpa: Option<f64>,
    pub unmatched_course_lines: usize,
    pub course_regions_without_periods: usize,
    pub dropped_entries: usize,
}

/// Why the gate refused a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum RejectReason {
    /// No student name and no course in either list.
    MissingIdentityAndCourses,
    /// The line grammar matched no course, whatever else was found.
    NoCoursesMatched,
    GpaOutOfRange { gpa: f64, min: f64, max: f64 },
    ScoreBelowThreshold { score: f64, min: f64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MissingIdentityAndCourses => {
                f.write_str("no student name and no courses were found")
            }
            RejectReason::NoCoursesMatched => {
                f.write_str("no course line matched the registrar grammar")
            }
            RejectReason::GpaOutOfRange { gpa, min, max } => {
                write!(f, "cumulative GPA {gpa:.2} is outside [{min}, {max}]")
            }
            RejectReason::ScoreBelowThreshold { score, min } => {
                write!(f, "confidence {score:.2} is below {min:.2}")
            }
        }
    }
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Validation {
    pub ok: bool,
    pub reasons: Vec<RejectReason>,
}

impl Validation {
    pub fn reason_strings(&self) -> Vec<String> {
        self.reasons.iter().map(ToString::to_string).collect()
    }
}

/// Score a record in `[0, 1]`.
pub fn score(
    record: &TranscriptRecord,
    signals: &ExtractionSignals,
    thresholds: &ConfidenceThresholds,
) -> f64 {
    let mut s = 0.0;

    if record.student_info.has_name() {
        s += 0.25;
    }
    if is_known(&record.student_info.student_id) {
        s += 0.10;
    }

    let confidences: Vec<f64> = record
        .completed_courses()
        .chain(record.in_progress_courses())
        .map(|c| c.match_confidence)
        .collect();
    if !confidences.is_empty() {
        s += 0.35 * confidences.iter().sum::<f64>() / confidences.len() as f64;
    }

    if record.period_count() > 0 {
        s += 0.15;
    }

    let gpa = record.gpa_summary.cumulative_gpa;
    if thresholds.gpa_in_range(gpa) {
        let disagrees = signals
            .reported_gpa
            .map(|r| (r - gpa).abs() > thresholds.reported_gpa_tolerance)
            .unwrap_or(false);
        s += if disagrees { 0.05 } else { 0.15 };
    }

    s -= 0.15 * signals.course_regions_without_periods as f64;
    s -= (0.02 * signals.unmatched_course_lines as f64).min(0.20);
    s -= (0.01 * signals.dropped_entries as f64).min(0.10);

    ((s.clamp(0.0, 1.0)) * 1000.0).round() / 1000.0
}

/// Apply the gate to a scored record.
pub fn validate(record: &TranscriptRecord, thresholds: &ConfidenceThresholds) -> Validation {
    let mut reasons = Vec::new();

    if !record.student_info.has_name() && record.course_count() == 0 {
        reasons.push(RejectReason::MissingIdentityAndCourses);
    } else if record.provenance == Provenance::Deterministic && record.course_count() == 0 {
        reasons.push(RejectReason::NoCoursesMatched);
    }

    let gpa = record.gpa_summary.cumulative_gpa;
    if !thresholds.gpa_in_range(gpa) {
        reasons.push(RejectReason::GpaOutOfRange {
            gpa,
            min: thresholds.min_gpa,
            max: thresholds.max_gpa,
        });
    }

    if record.confidence_score < thresholds.min_score {
        reasons.push(RejectReason::ScoreBelowThreshold {
            score: record.confidence_score,
            min: thresholds.min_score,
        });
    }

    Validation {
        ok: reasons.is_empty(),
        reasons,
    }
}
