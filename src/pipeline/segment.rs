//! Section segmentation: slice a normalised transcript into logical regions.
//!
//! Transcripts exported from the registrar's system print four upper-case
//! banner lines that introduce each part of the document. The first
//! occurrence of each anchor starts a region; the region runs until the next
//! anchor (in text order) or the end of the text.
//!
//! A missing anchor is not an error. Its region is returned empty and later
//! stages treat it as "no data".

use crate::record::{RegionKind, TextRegion};
use tracing::debug;

pub const STUDENT_INFO_ANCHOR: &str = "STUDENT INFORMATION";
pub const COMPLETED_ANCHOR: &str = "INSTITUTION CREDIT";
pub const TOTALS_ANCHOR: &str = "TRANSCRIPT TOTALS";
pub const IN_PROGRESS_ANCHOR: &str = "COURSE(S) IN PROGRESS";

/// Anchor phrase for a region kind. Matching is case-sensitive.
pub fn anchor(kind: RegionKind) -> &'static str {
    match kind {
        RegionKind::StudentInfo => STUDENT_INFO_ANCHOR,
        RegionKind::CompletedCourses => COMPLETED_ANCHOR,
        RegionKind::Totals => TOTALS_ANCHOR,
        RegionKind::InProgress => IN_PROGRESS_ANCHOR,
    }
}

/// The regions of one transcript, ordered by start offset.
///
/// Always holds exactly one region per [`RegionKind`]; empty regions sort
/// last and sit at the end of the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segments {
    regions: Vec<TextRegion>,
}

impl Segments {
    pub fn regions(&self) -> &[TextRegion] {
        &self.regions
    }

    pub fn get(&self, kind: RegionKind) -> TextRegion {
        self.regions
            .iter()
            .copied()
            .find(|r| r.kind == kind)
            .unwrap_or_else(|| TextRegion::empty(kind, 0))
    }

    /// Number of anchors actually found.
    pub fn found_count(&self) -> usize {
        self.regions.iter().filter(|r| !r.is_empty()).count()
    }
}

/// Locate the anchors and build one region per kind.
pub fn segment(text: &str) -> Segments {
    let mut found: Vec<(RegionKind, usize)> = RegionKind::ALL
        .iter()
        .filter_map(|&kind| text.find(anchor(kind)).map(|pos| (kind, pos)))
        .collect();
    found.sort_by_key(|&(_, pos)| pos);

    let mut regions = Vec::with_capacity(RegionKind::ALL.len());
    for (i, &(kind, start)) in found.iter().enumerate() {
        let end = found.get(i + 1).map(|&(_, pos)| pos).unwrap_or(text.len());
        regions.push(TextRegion { kind, start, end });
    }

    for kind in RegionKind::ALL {
        if !found.iter().any(|&(k, _)| k == kind) {
            debug!("Anchor '{}' not found; region left empty", anchor(kind));
            regions.push(TextRegion::empty(kind, text.len()));
        }
    }

    Segments { regions }
}

/// Region text with its anchor line removed.
pub fn region_body<'a>(text: &'a str, region: &TextRegion) -> &'a str {
    let slice = region.text(text);
    slice.strip_prefix(anchor(region.kind)).unwrap_or(slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Header\n\
STUDENT INFORMATION\nName: Jordan Lee\n\
INSTITUTION CREDIT\nPeriod: Fall 2023\nCS 18000 West Lafayette UG Problem Solving A 4.000 16.00\n\
TRANSCRIPT TOTALS\nOverall 4.000 4.000 16.00 4.00\n\
COURSE(S) IN PROGRESS\nPeriod: Spring 2024\nCS 24000 West Lafayette UG Programming In C 3.000";

    #[test]
    fn all_four_regions_found_in_order() {
        let seg = segment(SAMPLE);
        assert_eq!(seg.found_count(), 4);
        let kinds: Vec<_> = seg.regions().iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RegionKind::StudentInfo,
                RegionKind::CompletedCourses,
                RegionKind::Totals,
                RegionKind::InProgress
            ]
        );
    }

    #[test]
    fn regions_do_not_overlap() {
        let seg = segment(SAMPLE);
        for pair in seg.regions().windows(2) {
            assert!(pair[0].end <= pair[1].start, "{:?} overlaps {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn region_bounded_by_next_anchor() {
        let seg = segment(SAMPLE);
        let completed = seg.get(RegionKind::CompletedCourses).text(SAMPLE);
        assert!(completed.starts_with("INSTITUTION CREDIT"));
        assert!(completed.contains("CS 18000"));
        assert!(!completed.contains("TRANSCRIPT TOTALS"));
    }

    #[test]
    fn last_region_runs_to_end() {
        let seg = segment(SAMPLE);
        let r = seg.get(RegionKind::InProgress);
        assert_eq!(r.end, SAMPLE.len());
    }

    #[test]
    fn missing_anchor_yields_empty_region() {
        let text = "STUDENT INFORMATION\nName: A\nINSTITUTION CREDIT\nstuff";
        let seg = segment(text);
        assert_eq!(seg.found_count(), 2);
        assert!(seg.get(RegionKind::Totals).is_empty());
        assert!(seg.get(RegionKind::InProgress).is_empty());
        assert_eq!(seg.get(RegionKind::InProgress).text(text), "");
        assert_eq!(seg.regions().len(), 4);
    }

    #[test]
    fn anchors_are_case_sensitive() {
        let seg = segment("student information\ninstitution credit");
        assert_eq!(seg.found_count(), 0);
    }

    #[test]
    fn first_occurrence_wins() {
        let text = "INSTITUTION CREDIT\na\nINSTITUTION CREDIT\nb";
        let seg = segment(text);
        assert_eq!(seg.get(RegionKind::CompletedCourses).start, 0);
        assert_eq!(seg.get(RegionKind::CompletedCourses).end, text.len());
    }

    #[test]
    fn body_strips_anchor() {
        let seg = segment(SAMPLE);
        let body = region_body(SAMPLE, &seg.get(RegionKind::StudentInfo));
        assert!(body.trim_start().starts_with("Name: Jordan Lee"));
    }
}
