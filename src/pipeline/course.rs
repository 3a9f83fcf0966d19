//! Course-line extraction: one regex match per line inside a period block.
//!
//! ## Grammars
//!
//! ```text
//! completed:   SUBJECT NUMBER CAMPUS LEVEL TITLE GRADE CREDITS QUALITY_POINTS [REPEAT_FLAG]
//! in progress: SUBJECT NUMBER CAMPUS LEVEL TITLE CREDITS
//! ```
//!
//! Grammars sit behind the [`LineGrammar`] trait so a new registrar format
//! is a new implementation handed to [`CourseLineExtractor::with_grammar`],
//! with no change to the orchestrator.
//!
//! Lines that do not match are skipped. Term headers, page footers and
//! registrar notices must never turn into course records; the only trace an
//! unmatched line leaves is a counter that lowers the confidence score when
//! the line *looked* like a course.

use crate::pipeline::grades::{
    expand_title, grade_points, is_known_grade, quality_points, EXCLUDED_FLAG,
};
use crate::record::{CourseRecord, CourseStatus, PeriodBlock};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::sync::Arc;

/// Fields captured from one course line, before grade lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseLine {
    pub subject: String,
    pub number: String,
    pub campus: String,
    pub level: String,
    pub title: String,
    pub grade: Option<String>,
    pub credits: f64,
    /// Quality points as printed on the transcript, if the grammar has them.
    pub listed_quality_points: Option<f64>,
    pub repeat_flag: Option<String>,
}

/// A fixed line grammar for one source format.
pub trait LineGrammar: Send + Sync {
    fn name(&self) -> &str;

    /// Match a line from a completed-courses period block.
    fn parse_completed(&self, line: &str) -> Option<CourseLine>;

    /// Match a line from an in-progress period block.
    fn parse_in_progress(&self, line: &str) -> Option<CourseLine>;

    /// Whether an unmatched line still looks like an attempted course line.
    fn looks_like_course(&self, line: &str) -> bool;
}

// ── Default grammar ──────────────────────────────────────────────────────────

static RE_COMPLETED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<subject>[A-Z]{2,5})\s+(?P<number>\d{3,5})\s+(?P<campus>.+?)\s+(?P<level>[A-Z]{2})\s+(?P<title>.+?)\s+(?P<grade>[A-Z]{1,2}[+-]?)\s+(?P<credits>\d{1,2}\.\d{3})\s+(?P<qp>\d{1,3}\.\d{2,3})(?:\s+(?P<flag>[A-Z]))?$",
    )
    .unwrap()
});

static RE_IN_PROGRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<subject>[A-Z]{2,5})\s+(?P<number>\d{3,5})\s+(?P<campus>.+?)\s+(?P<level>[A-Z]{2})\s+(?P<title>.+?)\s+(?P<credits>\d{1,2}\.\d{3})$",
    )
    .unwrap()
});

static RE_COURSE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2,5}\s+\d{3,5}\b").unwrap());

/// Line grammar of the Banner-style registrar export.
#[derive(Debug, Default, Clone, Copy)]
pub struct BannerGrammar;

impl BannerGrammar {
    fn common(caps: &Captures<'_>) -> Option<CourseLine> {
        Some(CourseLine {
            subject: caps.name("subject")?.as_str().to_string(),
            number: caps.name("number")?.as_str().to_string(),
            campus: caps.name("campus")?.as_str().trim().to_string(),
            level: caps.name("level")?.as_str().to_string(),
            title: caps.name("title")?.as_str().trim().to_string(),
            grade: None,
            credits: caps.name("credits")?.as_str().parse().ok()?,
            listed_quality_points: None,
            repeat_flag: None,
        })
    }
}

impl LineGrammar for BannerGrammar {
    fn name(&self) -> &str {
        "banner"
    }

    fn parse_completed(&self, line: &str) -> Option<CourseLine> {
        let caps = RE_COMPLETED.captures(line.trim())?;
        let mut course = Self::common(&caps)?;
        course.grade = Some(caps.name("grade")?.as_str().to_string());
        course.listed_quality_points = caps.name("qp").and_then(|m| m.as_str().parse().ok());
        course.repeat_flag = caps.name("flag").map(|m| m.as_str().to_string());
        Some(course)
    }

    fn parse_in_progress(&self, line: &str) -> Option<CourseLine> {
        let caps = RE_IN_PROGRESS.captures(line.trim())?;
        Self::common(&caps)
    }

    fn looks_like_course(&self, line: &str) -> bool {
        RE_COURSE_PREFIX.is_match(line.trim())
    }
}

// ── Extractor ────────────────────────────────────────────────────────────────

/// Courses found in one period block.
#[derive(Debug, Clone, Default)]
pub struct BlockExtraction {
    pub courses: Vec<CourseRecord>,
    /// Lines that looked like course lines but matched no grammar.
    pub unmatched_course_lines: usize,
}

/// Applies a [`LineGrammar`] to every line of a period block.
#[derive(Clone)]
pub struct CourseLineExtractor {
    grammar: Arc<dyn LineGrammar>,
}

impl Default for CourseLineExtractor {
    fn default() -> Self {
        Self::with_grammar(Arc::new(BannerGrammar))
    }
}

impl std::fmt::Debug for CourseLineExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourseLineExtractor")
            .field("grammar", &self.grammar.name())
            .finish()
    }
}

impl CourseLineExtractor {
    pub fn with_grammar(grammar: Arc<dyn LineGrammar>) -> Self {
        Self { grammar }
    }

    pub fn grammar_name(&self) -> &str {
        self.grammar.name()
    }

    /// Extract every course in `block` of `text`.
    pub fn extract(&self, text: &str, block: &PeriodBlock, status: CourseStatus) -> BlockExtraction {
        let period = block.label();
        let mut out = BlockExtraction::default();

        // The first line is the `Period:` marker itself.
        for line in block.text(text).lines().skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parsed = match status {
                CourseStatus::Completed => self.grammar.parse_completed(line),
                CourseStatus::InProgress => self.grammar.parse_in_progress(line),
            };
            match parsed {
                Some(course) => out.courses.push(to_record(course, status, &period)),
                None if self.grammar.looks_like_course(line) => out.unmatched_course_lines += 1,
                None => {}
            }
        }
        out
    }

    /// Lines of `slice` that look like course lines. Used for region text
    /// that no period block covers.
    pub fn count_course_like(&self, slice: &str) -> usize {
        slice
            .lines()
            .filter(|line| self.grammar.looks_like_course(line))
            .count()
    }

    /// Convenience form returning only the records.
    pub fn extract_courses(
        &self,
        text: &str,
        block: &PeriodBlock,
        status: CourseStatus,
    ) -> Vec<CourseRecord> {
        self.extract(text, block, status).courses
    }
}

/// Turn a captured line into a record, deriving points and match confidence.
pub fn to_record(line: CourseLine, status: CourseStatus, period: &str) -> CourseRecord {
    let title = expand_title(&line.title);
    let mut confidence: f64 = 1.0;

    let (grade, points, quality) = match (status, line.grade) {
        (CourseStatus::Completed, Some(grade)) => {
            let points = grade_points(&grade);
            let quality = quality_points(line.credits, points);
            if !is_known_grade(&grade) {
                confidence -= 0.3;
            }
            let excluded = line.repeat_flag.as_deref() == Some(EXCLUDED_FLAG);
            if let Some(listed) = line.listed_quality_points {
                if !excluded && (listed - quality).abs() > 0.01 {
                    confidence -= 0.2;
                }
            }
            (Some(grade), points, quality)
        }
        _ => (None, 0.0, 0.0),
    };

    if title.chars().count() < 3 {
        confidence -= 0.2;
    }

    CourseRecord {
        subject_code: line.subject,
        course_number: line.number,
        title,
        credits: line.credits,
        grade,
        grade_points: points,
        quality_points: quality,
        status,
        period: period.to_string(),
        repeat_flag: line.repeat_flag,
        match_confidence: confidence.clamp(0.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Season;

    fn block_over(text: &str) -> PeriodBlock {
        PeriodBlock {
            season: Season::Fall,
            year: Some(2024),
            start: 0,
            end: text.len(),
        }
    }

    #[test]
    fn repeat_flag_e_is_captured() {
        let text = "Period: Fall 2024\nCS 18000 West Lafayette UG Problem Solving F 4.000 0.00 E";
        let courses =
            CourseLineExtractor::default().extract_courses(text, &block_over(text), CourseStatus::Completed);
        assert_eq!(courses.len(), 1);
        let c = &courses[0];
        assert_eq!(c.subject_code, "CS");
        assert_eq!(c.course_number, "18000");
        assert_eq!(c.grade.as_deref(), Some("F"));
        assert_eq!(c.credits, 4.0);
        assert!(c.is_excluded());
        assert_eq!(c.period, "Fall 2024");
        assert_eq!(c.match_confidence, 1.0);
    }

    #[test]
    fn title_stops_before_grade() {
        let line = "MA 16100 West Lafayette UG Intro To C A 3.000 12.00";
        let c = BannerGrammar.parse_completed(line).unwrap();
        assert_eq!(c.campus, "West Lafayette");
        assert_eq!(c.level, "UG");
        assert_eq!(c.title, "Intro To C");
        assert_eq!(c.grade.as_deref(), Some("A"));
        assert_eq!(c.listed_quality_points, Some(12.0));
        assert_eq!(c.repeat_flag, None);
    }

    #[test]
    fn plus_minus_grades() {
        let c = BannerGrammar
            .parse_completed("ENGL 10600 West Lafayette UG First-Year Composition B+ 4.000 13.20")
            .unwrap();
        assert_eq!(c.grade.as_deref(), Some("B+"));
        let rec = to_record(c, CourseStatus::Completed, "Fall 2023");
        assert_eq!(rec.grade_points, 3.3);
        assert_eq!(rec.quality_points, 13.2);
        assert_eq!(rec.match_confidence, 1.0);
    }

    #[test]
    fn in_progress_line() {
        let c = BannerGrammar
            .parse_in_progress("CS 25000 West Lafayette UG Computer Architecture 4.000")
            .unwrap();
        assert_eq!(c.title, "Computer Architecture");
        assert_eq!(c.credits, 4.0);
        assert_eq!(c.grade, None);
    }

    #[test]
    fn credits_need_three_decimals() {
        assert!(BannerGrammar
            .parse_completed("CS 18000 West Lafayette UG Problem Solving A 4.0 16.00")
            .is_none());
        assert!(BannerGrammar
            .parse_in_progress("CS 25000 West Lafayette UG Computer Architecture 4.00")
            .is_none());
    }

    #[test]
    fn headers_and_notices_are_skipped() {
        let text = "Period: Fall 2024\n\
College: Science\n\
Subject Course Campus Level Title Grade Credit Hours Quality Points R\n\
CS 18000 West Lafayette UG Problem Solving A 4.000 16.00\n\
Academic Standing: Good Standing\n\
Unofficial Transcript";
        let out = CourseLineExtractor::default().extract(text, &block_over(text), CourseStatus::Completed);
        assert_eq!(out.courses.len(), 1);
        assert_eq!(out.unmatched_course_lines, 0);
    }

    #[test]
    fn broken_course_line_is_counted_not_emitted() {
        let text = "Period: Fall 2024\nCS 18000 West Lafayette UG Problem Solving A 4";
        let out = CourseLineExtractor::default().extract(text, &block_over(text), CourseStatus::Completed);
        assert!(out.courses.is_empty());
        assert_eq!(out.unmatched_course_lines, 1);
    }

    #[test]
    fn course_like_lines_counted_outside_blocks() {
        let lead = "INSTITUTION CREDIT\n\
CS 18000 West Lafayette UG Problem Solving A 4.000 16.00\n\
Transfer credit accepted\n\
MA 16100 West Lafayette UG Calc I B 5.000 15.00\n";
        assert_eq!(CourseLineExtractor::default().count_course_like(lead), 2);
    }

    #[test]
    fn unknown_grade_lowers_confidence_not_fails() {
        let c = BannerGrammar
            .parse_completed("CS 19300 West Lafayette UG Tools ZZ 1.000 0.00")
            .unwrap();
        let rec = to_record(c, CourseStatus::Completed, "Fall 2024");
        assert_eq!(rec.grade_points, 0.0);
        assert!(rec.match_confidence < 1.0);
    }

    #[test]
    fn disagreeing_quality_points_lower_confidence() {
        let c = BannerGrammar
            .parse_completed("CS 18000 West Lafayette UG Problem Solving A 4.000 12.00")
            .unwrap();
        let rec = to_record(c, CourseStatus::Completed, "Fall 2024");
        assert_eq!(rec.quality_points, 16.0);
        assert!((rec.match_confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn abbreviated_title_is_expanded() {
        let c = BannerGrammar
            .parse_in_progress("CS 24000 West Lafayette UG Prog In C 3.000")
            .unwrap();
        let rec = to_record(c, CourseStatus::InProgress, "Spring 2025");
        assert_eq!(rec.title, "Programming In C");
        assert_eq!(rec.quality_points, 0.0);
    }

    struct PipeGrammar;

    impl LineGrammar for PipeGrammar {
        fn name(&self) -> &str {
            "pipe"
        }
        fn parse_completed(&self, line: &str) -> Option<CourseLine> {
            let parts: Vec<&str> = line.split('|').map(str::trim).collect();
            if parts.len() != 5 {
                return None;
            }
            Some(CourseLine {
                subject: parts[0].to_string(),
                number: parts[1].to_string(),
                campus: String::new(),
                level: String::new(),
                title: parts[2].to_string(),
                grade: Some(parts[3].to_string()),
                credits: parts[4].parse().ok()?,
                listed_quality_points: None,
                repeat_flag: None,
            })
        }
        fn parse_in_progress(&self, _line: &str) -> Option<CourseLine> {
            None
        }
        fn looks_like_course(&self, _line: &str) -> bool {
            false
        }
    }

    #[test]
    fn custom_grammar_is_pluggable() {
        let text = "Period: Fall 2024\nHIST | 10300 | World History | B | 3.0";
        let extractor = CourseLineExtractor::with_grammar(Arc::new(PipeGrammar));
        assert_eq!(extractor.grammar_name(), "pipe");
        let courses = extractor.extract_courses(text, &block_over(text), CourseStatus::Completed);
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].quality_points, 9.0);
    }
}
