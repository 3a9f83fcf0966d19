//! Text normalisation: bring extracted or pasted text to one canonical form.
//!
//! PDF text layers and browser copy/paste produce the same transcript with
//! different whitespace: CRLF line endings, tabs between columns, runs of
//! spaces used for alignment, non-breaking spaces, zero-width characters.
//! The downstream grammars match single spaces and `\n`-separated lines, so
//! every variant is folded here once instead of in every regex.
//!
//! Only whitespace is touched. No character is corrected or guessed.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all normalisation rules in order.
///
/// 1. Normalise line endings (CRLF/CR → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 3. Fold tabs and exotic spaces into a plain space
/// 4. Collapse horizontal whitespace runs and trim every line
/// 5. Collapse runs of blank lines to a single blank line
/// 6. Trim the whole text
pub fn normalize(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = fold_space_variants(&s);
    let s = collapse_horizontal_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Fold space variants ─────────────────────────────────────────────

fn fold_space_variants(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\t' | '\u{00A0}' | '\u{2007}' | '\u{202F}' | '\u{3000}' => ' ',
            '\u{2000}'..='\u{200A}' => ' ',
            other => other,
        })
        .collect()
}

// ── Rule 4: Collapse horizontal whitespace ──────────────────────────────────

static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());

fn collapse_horizontal_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| RE_SPACES.replace_all(line.trim(), " ").into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse blank lines ────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_remove_invisible() {
        assert_eq!(remove_invisible_chars("CS\u{200B} 18000\u{FEFF}"), "CS 18000");
    }

    #[test]
    fn test_tabs_and_nbsp_become_single_spaces() {
        let input = "CS\t18000\u{00A0}\u{00A0}West Lafayette";
        assert_eq!(normalize(input), "CS 18000 West Lafayette");
    }

    #[test]
    fn test_lines_are_trimmed() {
        assert_eq!(normalize("   Period:  Fall 2024   \n  x  "), "Period: Fall 2024\nx");
    }

    #[test]
    fn test_blank_lines_collapse() {
        assert_eq!(normalize("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_idempotent() {
        let once = normalize(" A \r\n\r\n\r\n\tB  C ");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn test_content_untouched() {
        let line = "MA 16100 West Lafayette UG Plane Analytic Geom & Calc I A- 5.000 18.50";
        assert_eq!(normalize(line), line);
    }
}
