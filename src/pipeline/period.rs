//! Period splitting: cut a course region into per-term blocks.
//!
//! Each `Period: <Season> <Year>` marker opens a block that runs to the next
//! marker or the end of the region. Text before the first marker belongs to
//! no block; course-like lines there are counted as unmatched by the
//! orchestrator. A region without markers yields no blocks; that is a normal
//! outcome for formats that list courses under one implicit term, and the
//! confidence score reflects it.

use crate::record::{PeriodBlock, Season, TextRegion};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_PERIOD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Period:\s*(Fall|Spring|Summer)\s*(\d{4})").unwrap());

/// Split `region` of `text` into period blocks. Offsets are absolute.
pub fn split_periods(text: &str, region: &TextRegion) -> Vec<PeriodBlock> {
    if region.is_empty() {
        return Vec::new();
    }
    let slice = region.text(text);

    let markers: Vec<(usize, Season, Option<u16>)> = RE_PERIOD
        .captures_iter(slice)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((
                region.start + whole.start(),
                Season::parse(&caps[1]),
                caps[2].parse::<u16>().ok(),
            ))
        })
        .collect();

    markers
        .iter()
        .enumerate()
        .map(|(i, &(start, season, year))| PeriodBlock {
            season,
            year,
            start,
            end: markers
                .get(i + 1)
                .map(|&(next, _, _)| next)
                .unwrap_or(region.end),
        })
        .collect()
}

/// True when the region holds text but not a single period marker.
pub fn lacks_period_markers(text: &str, region: &TextRegion) -> bool {
    !region.is_empty()
        && region.text(text).lines().skip(1).any(|l| !l.trim().is_empty())
        && !RE_PERIOD.is_match(region.text(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RegionKind;

    fn whole(text: &str) -> TextRegion {
        TextRegion {
            kind: RegionKind::CompletedCourses,
            start: 0,
            end: text.len(),
        }
    }

    #[test]
    fn splits_on_each_marker() {
        let text = "INSTITUTION CREDIT\nPeriod: Fall 2023\nA\nPeriod: Spring 2024\nB\nPeriod: Summer 2024\nC";
        let blocks = split_periods(text, &whole(text));
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].season, Season::Fall);
        assert_eq!(blocks[0].year, Some(2023));
        assert_eq!(blocks[1].label(), "Spring 2024");
        assert_eq!(blocks[2].end, text.len());
        assert!(blocks[0].text(text).contains('A'));
        assert!(!blocks[0].text(text).contains('B'));
    }

    #[test]
    fn blocks_are_contiguous() {
        let text = "Period: Fall 2023\nx\nPeriod: Spring 2024\ny";
        let blocks = split_periods(text, &whole(text));
        assert_eq!(blocks[0].end, blocks[1].start);
    }

    #[test]
    fn offsets_are_absolute() {
        let text = "prefix text\nPeriod: Fall 2022\nCS 1";
        let region = TextRegion {
            kind: RegionKind::CompletedCourses,
            start: 12,
            end: text.len(),
        };
        let blocks = split_periods(text, &region);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].start, 12);
        assert!(blocks[0].text(text).starts_with("Period: Fall 2022"));
    }

    #[test]
    fn zero_markers_zero_blocks() {
        let text = "INSTITUTION CREDIT\nCS 18000 West Lafayette UG Problem Solving A 4.000 16.00";
        assert!(split_periods(text, &whole(text)).is_empty());
        assert!(lacks_period_markers(text, &whole(text)));
    }

    #[test]
    fn empty_region_zero_blocks() {
        let region = TextRegion::empty(RegionKind::InProgress, 0);
        assert!(split_periods("Period: Fall 2023", &region).is_empty());
        assert!(!lacks_period_markers("Period: Fall 2023", &region));
    }

    #[test]
    fn tolerates_missing_space() {
        let text = "Period:Fall2023\nx";
        let blocks = split_periods(text, &whole(text));
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].year, Some(2023));
    }
}
