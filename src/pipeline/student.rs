//! Student-information and transcript-totals readers.
//!
//! The student block is a list of `Label: value` lines; the labels vary a
//! little between exports, so each field accepts a few aliases. Anything not
//! found stays at the `"Unknown"` sentinel.
//!
//! The totals block is read only for the institution's own cumulative GPA,
//! which serves as a cross-check against the computed figure.

use crate::record::{StudentInfo, UNKNOWN};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<label>[A-Za-z][A-Za-z /]{0,30}?)\s*:\s*(?P<value>.*)$").unwrap());

static RE_TOTALS_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?:Overall|Total Institution|Cumulative)\b.*?(?P<gpa>\d\.\d{2})\s*$").unwrap()
});

fn field_for(label: &str) -> Option<usize> {
    match label.trim().to_ascii_lowercase().as_str() {
        "name" | "student name" => Some(0),
        "student id" | "id" | "puid" | "student number" => Some(1),
        "program" | "major" | "degree program" => Some(2),
        "college" | "school" => Some(3),
        "campus" => Some(4),
        _ => None,
    }
}

/// Read student fields from the student-information region text.
pub fn extract_student_info(region_text: &str) -> StudentInfo {
    let mut info = StudentInfo::default();
    for line in region_text.lines() {
        let Some(caps) = RE_LABEL.captures(line.trim()) else {
            continue;
        };
        let value = caps["value"].trim();
        if value.is_empty() {
            continue;
        }
        let slot = match field_for(&caps["label"]) {
            Some(0) => &mut info.name,
            Some(1) => &mut info.student_id,
            Some(2) => &mut info.program,
            Some(3) => &mut info.college,
            Some(4) => &mut info.campus,
            _ => continue,
        };
        // First occurrence wins; later pages repeat the header.
        if slot.as_str() == UNKNOWN {
            *slot = value.to_string();
        }
    }
    info
}

/// Cumulative GPA printed in the totals region, if present.
///
/// The last `Overall`/`Total Institution`/`Cumulative` line wins.
pub fn reported_gpa(totals_text: &str) -> Option<f64> {
    RE_TOTALS_LINE
        .captures_iter(totals_text)
        .filter_map(|caps| caps["gpa"].parse::<f64>().ok())
        .last()
}
