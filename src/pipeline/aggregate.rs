//! GPA aggregation, per period and across the whole transcript.
//!
//! A course counts toward GPA when it is completed, carries a grade, the
//! grade is not a withdrawal (`W`), and the attempt is not flagged `E`.
//! `total_credits_attempted` sums every completed course; the earned and
//! quality-point totals sum only the counted ones.
//!
//! Every function here is pure: the same courses always yield a
//! bit-identical summary.

use crate::pipeline::grades::{round2, WITHDRAWN};
use crate::record::{CourseRecord, CourseStatus, GpaSummary, TranscriptRecord};
use std::collections::BTreeMap;

/// Whether `course` enters the GPA numerator and denominator.
pub fn counts_toward_gpa(course: &CourseRecord) -> bool {
    course.status == CourseStatus::Completed
        && course
            .grade
            .as_deref()
            .map(|g| !g.trim().is_empty() && !g.trim().eq_ignore_ascii_case(WITHDRAWN))
            .unwrap_or(false)
        && !course.is_excluded()
}

/// Summarise `courses`; major GPA is taken over the dominant subject.
pub fn aggregate(courses: &[CourseRecord]) -> GpaSummary {
    let refs: Vec<&CourseRecord> = courses.iter().collect();
    summarize(&refs, &[])
}

/// Summarise `courses`, computing major GPA over `major_subjects`.
///
/// An empty `major_subjects` falls back to the subject with the most GPA
/// credits.
pub fn aggregate_with_major(courses: &[CourseRecord], major_subjects: &[String]) -> GpaSummary {
    let refs: Vec<&CourseRecord> = courses.iter().collect();
    summarize(&refs, major_subjects)
}

fn summarize(courses: &[&CourseRecord], major_subjects: &[String]) -> GpaSummary {
    let attempted: f64 = courses
        .iter()
        .filter(|c| c.status == CourseStatus::Completed)
        .map(|c| c.credits)
        .sum();

    let (earned, quality) = totals(courses.iter().copied().filter(|c| counts_toward_gpa(c)));

    let majors: Vec<String> = if major_subjects.is_empty() {
        dominant_subject(courses).into_iter().collect()
    } else {
        major_subjects.iter().map(|s| s.trim().to_ascii_uppercase()).collect()
    };
    let (major_credits, major_quality) = totals(
        courses
            .iter()
            .copied()
            .filter(|c| counts_toward_gpa(c) && majors.iter().any(|m| *m == c.subject_code)),
    );

    GpaSummary {
        cumulative_gpa: ratio(quality, earned),
        total_credits_attempted: round2(attempted),
        total_credits_earned: earned,
        total_quality_points: quality,
        major_gpa: ratio(major_quality, major_credits),
    }
}

fn totals<'a>(courses: impl Iterator<Item = &'a CourseRecord>) -> (f64, f64) {
    let (credits, quality) = courses.fold((0.0, 0.0), |(cr, qp), c| {
        (cr + c.credits, qp + c.quality_points)
    });
    (round2(credits), round2(quality))
}

fn ratio(quality: f64, credits: f64) -> f64 {
    if credits > 0.0 {
        quality / credits
    } else {
        0.0
    }
}

/// Subject with the most GPA credits; ties go to the alphabetically first.
pub fn dominant_subject(courses: &[&CourseRecord]) -> Option<String> {
    let mut by_subject: BTreeMap<&str, f64> = BTreeMap::new();
    for c in courses.iter().filter(|c| counts_toward_gpa(c)) {
        *by_subject.entry(c.subject_code.as_str()).or_default() += c.credits;
    }
    by_subject
        .into_iter()
        .fold(None::<(&str, f64)>, |best, (subject, credits)| match best {
            Some((_, best_credits)) if best_credits >= credits => best,
            _ => Some((subject, credits)),
        })
        .map(|(subject, _)| subject.to_string())
}

/// Recompute every period summary and the overall summary in place.
///
/// Without configured `major_subjects` the major is the dominant subject of
/// the whole record, so every period's `major_gpa` covers the same subject.
pub fn finalize(record: &mut TranscriptRecord, major_subjects: &[String]) {
    let all: Vec<&CourseRecord> = record
        .completed_courses()
        .chain(record.in_progress_courses())
        .collect();
    let majors: Vec<String> = if major_subjects.is_empty() {
        dominant_subject(&all).into_iter().collect()
    } else {
        major_subjects.to_vec()
    };
    record.gpa_summary = summarize(&all, &majors);

    for period in record
        .completed_periods
        .iter_mut()
        .chain(record.in_progress_periods.iter_mut())
    {
        period.summary = aggregate_with_major(&period.courses, &majors);
    }
}
