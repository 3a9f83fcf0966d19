//! Turn a parsed model reply into a [`TranscriptRecord`] and scrub records
//! from either path.
//!
//! The model is asked for the shape below but is not trusted to honour it.
//! Sections may be maps keyed by period or plain arrays, fields may be
//! missing, numbers may arrive as strings. Missing sections become empty
//! lists; missing student fields become `"Unknown"`.
//!
//! ```json
//! {
//!   "studentInfo": { "name": "...", "studentId": "...", ... },
//!   "completedCourses": {
//!     "fall_2023": { "period": "Fall 2023", "courses": [
//!       { "code": "CS 18000", "title": "...", "credits": 4.0, "grade": "A", "repeatFlag": null }
//!     ] }
//!   },
//!   "coursesInProgress": { ... },
//!   "gpaSummary": { "cumulativeGPA": 3.52 }
//! }
//! ```
//!
//! An entry survives only when its code is at least three characters, is not
//! a bare `Fall 2023`-style header, does not echo the schema ("progression",
//! "in progress"), normalises to `SUBJ 12345`, and carries a non-empty title.

use crate::pipeline::confidence::ExtractionSignals;
use crate::pipeline::grades::{expand_title, grade_points, is_known_grade, quality_points};
use crate::record::{
    period_label, CourseRecord, CourseStatus, PeriodRecord, Provenance, Season, StudentInfo,
    TranscriptRecord, UNKNOWN,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

/// Starting match confidence for a course read from a model reply.
pub const AI_MATCH_CONFIDENCE: f64 = 0.8;

static RE_SEASON_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(fall|spring|summer|winter)\s*[_ -]?\s*\d{4}$").unwrap());

static RE_PERIOD_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(fall|autumn|spring|summer|winter)[\s_-]*(\d{4})|(\d{4})[\s_-]*(fall|autumn|spring|summer|winter)")
        .unwrap()
});

static RE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<subject>[A-Z]{2,5}) ?(?P<number>\d{3,5})$").unwrap());

const SCHEMA_ECHOES: &[&str] = &["progression", "in progress"];

// ── Value helpers ────────────────────────────────────────────────────────────

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

/// String form of a scalar; objects, arrays and null give `None`.
fn text_of(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

fn number_of(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    field(obj, keys).and_then(text_of)
}

// ── Student info ─────────────────────────────────────────────────────────────

fn student_info(root: &Map<String, Value>) -> StudentInfo {
    let mut info = StudentInfo::default();
    let Some(Value::Object(obj)) = field(root, &["studentInfo", "student_info", "student"]) else {
        return info;
    };
    let or_unknown = |keys: &[&str]| text_field(obj, keys).unwrap_or_else(|| UNKNOWN.to_string());
    info.name = or_unknown(&["name", "studentName"]);
    info.student_id = or_unknown(&["studentId", "student_id", "id", "puid"]);
    info.program = or_unknown(&["program", "major"]);
    info.college = or_unknown(&["college", "school"]);
    info.campus = or_unknown(&["campus"]);
    info
}

// ── Periods ──────────────────────────────────────────────────────────────────

/// Season and year from labels like `"Fall 2023"`, `"fall_2023"`, `"2023 Spring"`.
fn parse_period(label: &str) -> (Season, Option<u16>) {
    match RE_PERIOD_LABEL.captures(label) {
        Some(caps) => {
            let season = caps.get(1).or_else(|| caps.get(4)).map(|m| m.as_str());
            let year = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str());
            (
                season.map(Season::parse).unwrap_or(Season::Unknown),
                year.and_then(|y| y.parse().ok()),
            )
        }
        None => (Season::Unknown, None),
    }
}

/// A course entry before filtering, tagged with the period it was listed under.
struct Entry<'a> {
    period: String,
    course: &'a Value,
}

/// Flatten a section (map or array, of periods or of bare courses).
fn section_entries<'a>(section: Option<&'a Value>) -> Vec<Entry<'a>> {
    let mut out = Vec::new();
    let items: Vec<(Option<&str>, &Value)> = match section {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (Some(k.as_str()), v)).collect(),
        Some(Value::Array(items)) => items.iter().map(|v| (None, v)).collect(),
        _ => return out,
    };

    for (key, item) in items {
        match item {
            Value::Object(obj) if obj.get("courses").is_some() => {
                let label = text_field(obj, &["period", "term", "semester"])
                    .or_else(|| key.map(str::to_string))
                    .unwrap_or_else(|| UNKNOWN.to_string());
                if let Some(Value::Array(courses)) = obj.get("courses") {
                    out.extend(courses.iter().map(|course| Entry {
                        period: label.clone(),
                        course,
                    }));
                }
            }
            Value::Object(obj) => {
                let label = text_field(obj, &["period", "term", "semester"])
                    .or_else(|| key.map(str::to_string))
                    .unwrap_or_else(|| UNKNOWN.to_string());
                out.push(Entry {
                    period: label,
                    course: item,
                });
            }
            // `"fall_2023": [ {...}, ... ]`
            Value::Array(courses) => {
                let label = key.unwrap_or(UNKNOWN).to_string();
                out.extend(courses.iter().map(|course| Entry {
                    period: label.clone(),
                    course,
                }));
            }
            _ => out.push(Entry {
                period: UNKNOWN.to_string(),
                course: item,
            }),
        }
    }
    out
}

// ── Course filtering ─────────────────────────────────────────────────────────

fn echoes_schema(s: &str) -> bool {
    let lower = s.to_lowercase();
    SCHEMA_ECHOES.iter().any(|echo| lower.contains(echo))
}

/// Uppercase, collapse whitespace, and split `CS18000` into `CS 18000`.
fn normalize_code(raw: &str) -> Option<(String, String)> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
    let caps = RE_CODE.captures(&collapsed)?;
    Some((caps["subject"].to_string(), caps["number"].to_string()))
}

/// Whether a code/title pair is a real course rather than header or echo noise.
pub fn is_plausible_course(code: &str, title: &str) -> bool {
    let code = code.trim();
    let title = title.trim();
    code.chars().count() >= 3
        && !RE_SEASON_YEAR.is_match(code)
        && !echoes_schema(code)
        && !echoes_schema(title)
        && !title.is_empty()
        && normalize_code(code).is_some()
}

fn course_from(entry: &Entry<'_>, status: CourseStatus) -> Option<CourseRecord> {
    let Value::Object(obj) = entry.course else {
        return None;
    };

    let code = text_field(obj, &["code", "courseCode", "course"]).or_else(|| {
        let subject = text_field(obj, &["subjectCode", "subject"])?;
        let number = text_field(obj, &["courseNumber", "number"])?;
        Some(format!("{subject} {number}"))
    })?;
    let title = text_field(obj, &["title", "courseTitle", "name"]).unwrap_or_default();
    if !is_plausible_course(&code, &title) {
        return None;
    }
    let (subject_code, course_number) = normalize_code(&code)?;

    let mut confidence = AI_MATCH_CONFIDENCE;
    let credits = match field(obj, &["credits", "creditHours", "hours"]).and_then(number_of) {
        Some(c) if c >= 0.0 => c,
        _ => {
            confidence -= 0.2;
            0.0
        }
    };

    let grade = match status {
        CourseStatus::Completed => text_field(obj, &["grade"]).map(|g| g.to_uppercase()),
        CourseStatus::InProgress => None,
    };
    let points = grade.as_deref().map(grade_points).unwrap_or(0.0);
    if let Some(g) = grade.as_deref() {
        if !is_known_grade(g) {
            confidence -= 0.3;
        }
    }

    let repeat_flag = text_field(obj, &["repeatFlag", "repeat_flag", "flag"])
        .map(|f| f.to_uppercase());

    let (season, year) = parse_period(&entry.period);
    let period = match (season, year) {
        (Season::Unknown, None) => entry.period.clone(),
        _ => period_label(season, year),
    };

    Some(CourseRecord {
        subject_code,
        course_number,
        title: expand_title(&title),
        credits,
        quality_points: if grade.is_some() {
            quality_points(credits, points)
        } else {
            0.0
        },
        grade,
        grade_points: points,
        status,
        period,
        repeat_flag,
        match_confidence: confidence.clamp(0.0, 1.0),
    })
}

/// Group courses into periods by label, in order of first appearance.
fn group(courses: Vec<CourseRecord>) -> Vec<PeriodRecord> {
    let mut periods: Vec<PeriodRecord> = Vec::new();
    for course in courses {
        match periods
            .iter_mut()
            .find(|p| p.courses.first().map(|c| c.period == course.period).unwrap_or(false))
        {
            Some(p) => p.courses.push(course),
            None => {
                let (season, year) = parse_period(&course.period);
                periods.push(PeriodRecord {
                    season,
                    year,
                    courses: vec![course],
                    summary: Default::default(),
                });
            }
        }
    }
    periods
}

fn courses_of(section: Option<&Value>, status: CourseStatus, dropped: &mut usize) -> Vec<CourseRecord> {
    section_entries(section)
        .iter()
        .filter_map(|entry| {
            let course = course_from(entry, status);
            if course.is_none() {
                *dropped += 1;
            }
            course
        })
        .collect()
}

// ── Entry points ─────────────────────────────────────────────────────────────

/// Build an AI-assisted record from a parsed reply.
///
/// Summaries are left at zero; the orchestrator recomputes them with the
/// same aggregator the deterministic path uses.
pub fn sanitize(value: &Value) -> (TranscriptRecord, ExtractionSignals) {
    let empty = Map::new();
    let root = value.as_object().unwrap_or(&empty);

    let mut record = TranscriptRecord::empty(Provenance::AiAssisted);
    let mut signals = ExtractionSignals::default();

    record.student_info = student_info(root);

    let completed = courses_of(
        field(root, &["completedCourses", "completed_courses", "courses"]),
        CourseStatus::Completed,
        &mut signals.dropped_entries,
    );
    let in_progress = courses_of(
        field(root, &["coursesInProgress", "inProgressCourses", "courses_in_progress"]),
        CourseStatus::InProgress,
        &mut signals.dropped_entries,
    );
    record.completed_periods = group(completed);
    record.in_progress_periods = group(in_progress);

    signals.reported_gpa = match field(root, &["gpaSummary", "gpa_summary"]) {
        Some(Value::Object(summary)) => {
            field(summary, &["cumulativeGPA", "cumulativeGpa", "gpa"]).and_then(number_of)
        }
        _ => None,
    };

    debug!(
        "Sanitized reply: {} periods, {} courses, {} entries dropped",
        record.period_count(),
        record.course_count(),
        signals.dropped_entries
    );
    (record, signals)
}

/// Re-apply the entry filter and point derivation to an existing record.
///
/// Returns the number of courses removed. Periods left empty are removed too.
pub fn scrub(record: &mut TranscriptRecord) -> usize {
    let mut dropped = 0;
    for periods in [&mut record.completed_periods, &mut record.in_progress_periods] {
        for period in periods.iter_mut() {
            let before = period.courses.len();
            period
                .courses
                .retain(|c| is_plausible_course(&c.code(), &c.title));
            dropped += before - period.courses.len();
            for course in &mut period.courses {
                match (course.status, course.grade.as_deref()) {
                    (CourseStatus::Completed, Some(g)) => {
                        course.grade_points = grade_points(g);
                        course.quality_points = quality_points(course.credits, course.grade_points);
                    }
                    _ => {
                        course.grade_points = 0.0;
                        course.quality_points = 0.0;
                    }
                }
            }
        }
        periods.retain(|p| !p.courses.is_empty());
    }
    for slot in [
        &mut record.student_info.name,
        &mut record.student_info.student_id,
        &mut record.student_info.program,
        &mut record.student_info.college,
        &mut record.student_info.campus,
    ] {
        if slot.trim().is_empty() {
            *slot = UNKNOWN.to_string();
        }
    }
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_sections_become_empty() {
        let (record, signals) = sanitize(&json!({}));
        assert_eq!(record.student_info, StudentInfo::default());
        assert_eq!(record.course_count(), 0);
        assert_eq!(record.provenance, Provenance::AiAssisted);
        assert_eq!(signals, ExtractionSignals::default());
    }

    #[test]
    fn null_and_blank_student_fields_are_unknown() {
        let (record, _) = sanitize(&json!({
            "studentInfo": {"name": "Jordan Lee", "studentId": null, "program": "  ", "campus": 42}
        }));
        assert_eq!(record.student_info.name, "Jordan Lee");
        assert_eq!(record.student_info.student_id, UNKNOWN);
        assert_eq!(record.student_info.program, UNKNOWN);
        assert_eq!(record.student_info.campus, "42");
    }

    #[test]
    fn map_of_periods() {
        let (record, _) = sanitize(&json!({
            "completedCourses": {
                "fall_2023": {"period": "Fall 2023", "courses": [
                    {"code": "CS 18000", "title": "Prog In C", "credits": 4.0, "grade": "a-"},
                    {"code": "MA16100", "title": "Calculus I", "credits": "5", "grade": "B"}
                ]},
                "spring_2024": {"courses": [
                    {"code": "ENGL 10600", "title": "Composition", "credits": 4, "grade": "A"}
                ]}
            }
        }));
        assert_eq!(record.completed_periods.len(), 2);
        let first = &record.completed_periods[0];
        assert_eq!(first.label(), "Fall 2023");
        assert_eq!(first.courses[0].title, "Programming In C");
        assert_eq!(first.courses[0].grade.as_deref(), Some("A-"));
        assert_eq!(first.courses[0].quality_points, 14.8);
        assert_eq!(first.courses[1].subject_code, "MA");
        assert_eq!(first.courses[1].course_number, "16100");
        assert_eq!(first.courses[1].credits, 5.0);
        assert_eq!(record.completed_periods[1].label(), "Spring 2024");
        assert_eq!(record.completed_periods[1].courses[0].period, "Spring 2024");
    }

    #[test]
    fn period_keys_keep_reply_order() {
        let reply = r#"{"completedCourses": {
            "spring_2024": {"courses": [{"code": "CS 25000", "title": "Comp Arch", "credits": 4, "grade": "A"}]},
            "fall_2023": {"courses": [{"code": "CS 18000", "title": "Problem Solving", "credits": 4, "grade": "B"}]},
            "fall_2024": {"courses": [{"code": "CS 25100", "title": "Data Structures", "credits": 3, "grade": "A-"}]}
        }}"#;
        let value: Value = serde_json::from_str(reply).unwrap();
        let (record, _) = sanitize(&value);
        let labels: Vec<String> = record.completed_periods.iter().map(|p| p.label()).collect();
        assert_eq!(labels, ["Spring 2024", "Fall 2023", "Fall 2024"]);
    }

    #[test]
    fn array_sections_and_in_progress() {
        let (record, _) = sanitize(&json!({
            "completedCourses": [
                {"period": "Fall 2023", "courses": [
                    {"subjectCode": "CS", "courseNumber": "24000", "title": "Prog In C", "credits": 3, "grade": "B+"}
                ]}
            ],
            "coursesInProgress": [
                {"code": "CS 25000", "title": "Comp Arch", "credits": 4, "grade": "A", "period": "Spring 2025"}
            ]
        }));
        assert_eq!(record.completed_courses().count(), 1);
        let ip: Vec<_> = record.in_progress_courses().collect();
        assert_eq!(ip.len(), 1);
        assert_eq!(ip[0].status, CourseStatus::InProgress);
        assert_eq!(ip[0].grade, None);
        assert_eq!(ip[0].quality_points, 0.0);
        assert_eq!(ip[0].period, "Spring 2025");
    }

    #[test]
    fn spurious_entries_dropped() {
        let (record, signals) = sanitize(&json!({
            "completedCourses": {"fall_2023": {"period": "Fall 2023", "courses": [
                {"code": "Fall 2023", "title": "Term header", "credits": 0},
                {"code": "fall_2024", "title": "Term header", "credits": 0},
                {"code": "CS", "title": "Too short"},
                {"code": "CS 18000", "title": "Course progression", "credits": 4},
                {"code": "In Progress", "title": "x"},
                {"code": "CS 18200", "title": "", "credits": 3},
                {"code": "CS 18200"},
                {},
                "CS 19300",
                {"code": "CS 19300", "title": "Tools", "credits": 1, "grade": "P"}
            ]}}
        }));
        assert_eq!(record.course_count(), 1);
        assert_eq!(signals.dropped_entries, 9);
        assert_eq!(record.completed_courses().next().unwrap().code(), "CS 19300");
    }

    #[test]
    fn reported_gpa_captured() {
        let (_, signals) = sanitize(&json!({"gpaSummary": {"cumulativeGPA": "3.52"}}));
        assert_eq!(signals.reported_gpa, Some(3.52));
    }

    #[test]
    fn model_quality_points_ignored() {
        let (record, _) = sanitize(&json!({
            "completedCourses": [{"period": "Fall 2023", "courses": [
                {"code": "CS 18000", "title": "Problem Solving", "credits": 4, "grade": "B", "qualityPoints": 99}
            ]}]
        }));
        let c = record.completed_courses().next().unwrap();
        assert_eq!(c.grade_points, 3.0);
        assert_eq!(c.quality_points, 12.0);
        assert_eq!(c.match_confidence, AI_MATCH_CONFIDENCE);
    }

    #[test]
    fn unknown_grade_and_missing_credits_lower_confidence() {
        let (record, _) = sanitize(&json!({
            "completedCourses": [{"period": "Fall 2023", "courses": [
                {"code": "CS 18000", "title": "Problem Solving", "grade": "Z"}
            ]}]
        }));
        let c = record.completed_courses().next().unwrap();
        assert_eq!(c.grade_points, 0.0);
        assert!((c.match_confidence - 0.3).abs() < 1e-9);
    }

    #[test]
    fn period_labels_in_several_forms() {
        assert_eq!(parse_period("fall_2023"), (Season::Fall, Some(2023)));
        assert_eq!(parse_period("2024 Spring"), (Season::Spring, Some(2024)));
        assert_eq!(parse_period("Summer-2022"), (Season::Summer, Some(2022)));
        assert_eq!(parse_period("Transfer credit"), (Season::Unknown, None));
    }

    #[test]
    fn scrub_recomputes_points_and_drops_noise() {
        let (mut record, _) = sanitize(&json!({
            "completedCourses": [{"period": "Fall 2023", "courses": [
                {"code": "CS 18000", "title": "Problem Solving", "credits": 4, "grade": "A"}
            ]}]
        }));
        record.completed_periods[0].courses[0].quality_points = 1.0;
        let mut noise = record.completed_periods[0].courses[0].clone();
        noise.title = "In progress".into();
        record.completed_periods[0].courses.push(noise);
        record.student_info.name = " ".into();

        assert_eq!(scrub(&mut record), 1);
        assert_eq!(record.completed_periods[0].courses[0].quality_points, 16.0);
        assert_eq!(record.student_info.name, UNKNOWN);
    }
}
