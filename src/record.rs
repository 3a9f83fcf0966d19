//! Data model shared by both parsing paths.
//!
//! A [`TranscriptRecord`] has the same shape whether it came from the
//! deterministic grammars or from an LLM reply; only [`Provenance`] says
//! which. Everything here is owned by a single pipeline invocation and
//! handed to the caller, never retained.

use crate::error::ParseWarning;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel used for every student-info field the source did not provide.
pub const UNKNOWN: &str = "Unknown";

// ── Input ─────────────────────────────────────────────────────────────────

/// Where the text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    Pdf,
    PastedText,
}

/// Plain transcript text plus its declared origin.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub source_text: String,
    pub source_kind: SourceKind,
}

impl RawDocument {
    pub fn new(source_text: impl Into<String>, source_kind: SourceKind) -> Self {
        Self {
            source_text: source_text.into(),
            source_kind,
        }
    }

    /// Text pasted by the user.
    pub fn pasted(source_text: impl Into<String>) -> Self {
        Self::new(source_text, SourceKind::PastedText)
    }
}

// ── Intermediate structures ───────────────────────────────────────────────

/// Logical region of a transcript, located by an anchor phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegionKind {
    StudentInfo,
    CompletedCourses,
    InProgress,
    Totals,
}

impl RegionKind {
    pub const ALL: [RegionKind; 4] = [
        RegionKind::StudentInfo,
        RegionKind::CompletedCourses,
        RegionKind::Totals,
        RegionKind::InProgress,
    ];
}

/// Byte range `[start, end)` of the normalised text.
///
/// A region whose anchor was not found is empty (`start == end`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRegion {
    pub kind: RegionKind,
    #[serde(rename = "startOffset")]
    pub start: usize,
    #[serde(rename = "endOffset")]
    pub end: usize,
}

impl TextRegion {
    pub fn empty(kind: RegionKind, at: usize) -> Self {
        Self {
            kind,
            start: at,
            end: at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Slice of `source` covered by this region.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Season {
    Fall,
    Spring,
    Summer,
    Unknown,
}

impl Season {
    /// Case-insensitive season name; anything else is `Unknown`.
    pub fn parse(s: &str) -> Season {
        match s.trim().to_ascii_lowercase().as_str() {
            "fall" | "autumn" => Season::Fall,
            "spring" => Season::Spring,
            "summer" => Season::Summer,
            _ => Season::Unknown,
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Season::Fall => "Fall",
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Unknown => UNKNOWN,
        };
        f.write_str(s)
    }
}

/// One academic period inside a course region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodBlock {
    pub season: Season,
    pub year: Option<u16>,
    pub start: usize,
    pub end: usize,
}

impl PeriodBlock {
    pub fn label(&self) -> String {
        period_label(self.season, self.year)
    }

    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("")
    }
}

/// "Fall 2024", "Spring", or "Unknown".
pub fn period_label(season: Season, year: Option<u16>) -> String {
    match (season, year) {
        (Season::Unknown, None) => UNKNOWN.to_string(),
        (Season::Unknown, Some(y)) => y.to_string(),
        (s, None) => s.to_string(),
        (s, Some(y)) => format!("{s} {y}"),
    }
}

// ── Output ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CourseStatus {
    Completed,
    InProgress,
}

/// One course line.
///
/// Downstream consumers should read only `subject_code`, `course_number`,
/// `grade` and `credits`. `match_confidence` measures extraction fidelity,
/// not prerequisite validity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRecord {
    pub subject_code: String,
    pub course_number: String,
    pub title: String,
    pub credits: f64,
    pub grade: Option<String>,
    pub grade_points: f64,
    pub quality_points: f64,
    pub status: CourseStatus,
    pub period: String,
    /// Repeat flag as printed; `"E"` excludes the attempt from GPA.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_flag: Option<String>,
    pub match_confidence: f64,
}

impl CourseRecord {
    /// `"CS 18000"`.
    pub fn code(&self) -> String {
        format!("{} {}", self.subject_code, self.course_number)
    }

    pub fn is_excluded(&self) -> bool {
        self.repeat_flag.as_deref() == Some("E")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInfo {
    pub name: String,
    pub student_id: String,
    pub program: String,
    pub college: String,
    pub campus: String,
}

impl Default for StudentInfo {
    fn default() -> Self {
        Self {
            name: UNKNOWN.to_string(),
            student_id: UNKNOWN.to_string(),
            program: UNKNOWN.to_string(),
            college: UNKNOWN.to_string(),
            campus: UNKNOWN.to_string(),
        }
    }
}

impl StudentInfo {
    pub fn has_name(&self) -> bool {
        is_known(&self.name)
    }
}

/// True for a non-empty value that is not the sentinel.
pub fn is_known(value: &str) -> bool {
    let v = value.trim();
    !v.is_empty() && !v.eq_ignore_ascii_case(UNKNOWN)
}

/// Derived GPA figures. Always recomputed, never copied from a source.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpaSummary {
    #[serde(rename = "cumulativeGPA")]
    pub cumulative_gpa: f64,
    pub total_credits_attempted: f64,
    pub total_credits_earned: f64,
    pub total_quality_points: f64,
    #[serde(rename = "majorGPA")]
    pub major_gpa: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Provenance {
    Deterministic,
    AiAssisted,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Deterministic => f.write_str("deterministic"),
            Provenance::AiAssisted => f.write_str("aiAssisted"),
        }
    }
}

/// Courses of one academic period plus that period's GPA figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodRecord {
    pub season: Season,
    pub year: Option<u16>,
    pub courses: Vec<CourseRecord>,
    pub summary: GpaSummary,
}

impl PeriodRecord {
    pub fn label(&self) -> String {
        period_label(self.season, self.year)
    }
}

/// Root of the structured result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptRecord {
    pub student_info: StudentInfo,
    pub completed_periods: Vec<PeriodRecord>,
    pub in_progress_periods: Vec<PeriodRecord>,
    pub gpa_summary: GpaSummary,
    pub provenance: Provenance,
    pub confidence_score: f64,
}

impl TranscriptRecord {
    pub fn empty(provenance: Provenance) -> Self {
        Self {
            student_info: StudentInfo::default(),
            completed_periods: Vec::new(),
            in_progress_periods: Vec::new(),
            gpa_summary: GpaSummary::default(),
            provenance,
            confidence_score: 0.0,
        }
    }

    pub fn completed_courses(&self) -> impl Iterator<Item = &CourseRecord> {
        self.completed_periods.iter().flat_map(|p| p.courses.iter())
    }

    pub fn in_progress_courses(&self) -> impl Iterator<Item = &CourseRecord> {
        self.in_progress_periods.iter().flat_map(|p| p.courses.iter())
    }

    pub fn course_count(&self) -> usize {
        self.completed_courses().count() + self.in_progress_courses().count()
    }

    pub fn period_count(&self) -> usize {
        self.completed_periods.len() + self.in_progress_periods.len()
    }
}

/// LLM token accounting for the AI-assisted path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// What a successful invocation hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOutput {
    pub record: TranscriptRecord,
    pub provenance: Provenance,
    pub confidence_score: f64,
    pub processing_time_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ParseWarning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn season_parse_is_case_insensitive() {
        assert_eq!(Season::parse("FALL"), Season::Fall);
        assert_eq!(Season::parse(" spring "), Season::Spring);
        assert_eq!(Season::parse("Winter"), Season::Unknown);
    }

    #[test]
    fn text_region_serializes_offsets() {
        let region = TextRegion {
            kind: RegionKind::CompletedCourses,
            start: 12,
            end: 40,
        };
        let json = serde_json::to_value(region).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "completedCourses", "startOffset": 12, "endOffset": 40})
        );
        let back: TextRegion = serde_json::from_value(json).unwrap();
        assert_eq!(back, region);
    }

    #[test]
    fn period_labels() {
        assert_eq!(period_label(Season::Fall, Some(2024)), "Fall 2024");
        assert_eq!(period_label(Season::Summer, None), "Summer");
        assert_eq!(period_label(Season::Unknown, None), "Unknown");
    }

    #[test]
    fn student_info_defaults_to_sentinel() {
        let info = StudentInfo::default();
        assert_eq!(info.name, UNKNOWN);
        assert!(!info.has_name());
        assert!(!is_known("  "));
        assert!(!is_known("unknown"));
        assert!(is_known("Jordan Lee"));
    }

    #[test]
    fn region_text_out_of_bounds_is_empty() {
        let r = TextRegion {
            kind: RegionKind::Totals,
            start: 10,
            end: 50,
        };
        assert_eq!(r.text("short"), "");
        assert!(TextRegion::empty(RegionKind::Totals, 3).is_empty());
    }

    #[test]
    fn gpa_summary_serialises_with_acronym_keys() {
        let json = serde_json::to_value(GpaSummary::default()).unwrap();
        assert!(json.get("cumulativeGPA").is_some());
        assert!(json.get("majorGPA").is_some());
        assert!(json.get("totalCreditsEarned").is_some());
    }
}
