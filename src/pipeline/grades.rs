//! Static lookup tables: letter grade → grade points, and known title
//! abbreviations → full titles.
//!
//! Both tables are built once on first use and are read-only afterwards, so
//! concurrent invocations share them without locking.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Letter grade → grade points, in display order (used by the prompt).
pub const GRADE_POINTS: &[(&str, f64)] = &[
    ("A+", 4.0),
    ("A", 4.0),
    ("A-", 3.7),
    ("B+", 3.3),
    ("B", 3.0),
    ("B-", 2.7),
    ("C+", 2.3),
    ("C", 2.0),
    ("C-", 1.7),
    ("D+", 1.3),
    ("D", 1.0),
    ("D-", 0.7),
    ("F", 0.0),
    ("W", 0.0),
    ("I", 0.0),
    ("P", 0.0),
    ("S", 0.0),
    ("U", 0.0),
    ("WU", 0.0),
    ("WP", 0.0),
    ("WF", 0.0),
    ("AU", 0.0),
    ("CR", 0.0),
    ("NC", 0.0),
];

static GRADE_TABLE: Lazy<HashMap<&'static str, f64>> =
    Lazy::new(|| GRADE_POINTS.iter().copied().collect());

/// Grade points for a letter grade. Unknown grades map to 0.0.
pub fn grade_points(grade: &str) -> f64 {
    GRADE_TABLE
        .get(grade.trim().to_ascii_uppercase().as_str())
        .copied()
        .unwrap_or(0.0)
}

pub fn is_known_grade(grade: &str) -> bool {
    GRADE_TABLE.contains_key(grade.trim().to_ascii_uppercase().as_str())
}

/// Withdrawal grade, excluded from GPA aggregation.
pub const WITHDRAWN: &str = "W";

/// Repeat flag marking a superseded attempt excluded from GPA.
pub const EXCLUDED_FLAG: &str = "E";

/// Round to two decimal places, the precision transcripts print.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Quality points for a course: `credits × grade points`, rounded.
pub fn quality_points(credits: f64, grade_points: f64) -> f64 {
    round2(credits * grade_points)
}

// ── Title abbreviations ──────────────────────────────────────────────────────

const TITLE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("Prob Solv & O-O Prog", "Problem Solving And Object-Oriented Programming"),
    ("Plane Analytic Geom & Calc I", "Plane Analytic Geometry And Calculus I"),
    ("Plane Analytic Geom & Calc II", "Plane Analytic Geometry And Calculus II"),
    ("Multivariate Calc", "Multivariate Calculus"),
    ("Lin Alg", "Linear Algebra"),
    ("Found Of Comp Sci", "Foundations Of Computer Science"),
    ("Data Struct & Algo", "Data Structures And Algorithms"),
    ("Prog In C", "Programming In C"),
    ("Sys Prog", "Systems Programming"),
    ("Comp Arch", "Computer Architecture"),
    ("Engl Composition I", "English Composition I"),
    ("Intro Psych", "Introduction To Psychology"),
    ("Prin Of Econ", "Principles Of Economics"),
    ("Gen Chem", "General Chemistry"),
    ("Intro Stat", "Introduction To Statistics"),
];

static TITLE_TABLE: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| TITLE_ABBREVIATIONS.iter().copied().collect());

/// Expand a title only when it equals a known abbreviation exactly.
///
/// Partial or ambiguous matches are returned unchanged.
pub fn expand_title(title: &str) -> String {
    let trimmed = title.trim();
    TITLE_TABLE
        .get(trimmed)
        .map(|full| full.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}
