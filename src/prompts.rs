//! Prompts for AI-assisted transcript parsing.
//!
//! Centralising every prompt here means changing what the model is told
//! touches exactly one file, and tests can inspect the prompt without a
//! model.
//!
//! The user prompt embeds four things: the target JSON schema, the
//! grade-point table, the `"Unknown"` default policy, and the registrar line
//! grammar the deterministic path uses. The last one biases the model toward
//! reading columns the same way the regex grammar does, so both paths agree
//! on what a course line means.
//!
//! Callers can override the system instruction via
//! [`crate::config::ParserConfig::system_prompt`].

use crate::pipeline::grades::GRADE_POINTS;
use crate::record::UNKNOWN;

/// Fixed system instruction sent with every request.
pub const SYSTEM_INSTRUCTION: &str = "You parse academic transcripts. \
Return JSON only: no markdown fences, no commentary, no explanation.";

/// Target schema, shown to the model verbatim.
pub const RESPONSE_SCHEMA: &str = r#"{
  "studentInfo": {
    "name": string,
    "studentId": string,
    "program": string,
    "college": string,
    "campus": string
  },
  "completedCourses": {
    "<season>_<year>": {
      "period": "<Season> <Year>",
      "courses": [
        {
          "code": "SUBJ 12345",
          "title": string,
          "credits": number,
          "grade": string,
          "repeatFlag": string | null
        }
      ]
    }
  },
  "coursesInProgress": {
    "<season>_<year>": {
      "period": "<Season> <Year>",
      "courses": [
        { "code": "SUBJ 12345", "title": string, "credits": number }
      ]
    }
  },
  "gpaSummary": {
    "cumulativeGPA": number
  }
}"#;

/// Registrar line grammar, matching the deterministic extractor.
pub const LINE_GRAMMAR: &str = "\
Completed course lines:   SUBJECT NUMBER CAMPUS LEVEL TITLE GRADE CREDITS QUALITY_POINTS [REPEAT_FLAG]
In-progress course lines: SUBJECT NUMBER CAMPUS LEVEL TITLE CREDITS
SUBJECT is 2-5 uppercase letters, NUMBER is 3-5 digits, CREDITS and QUALITY_POINTS have three decimals.
Each group of courses follows a line of the form \"Period: <Season> <Year>\".
A REPEAT_FLAG of \"E\" marks an attempt excluded from GPA; keep the course and set repeatFlag to \"E\".
Example: CS 18000 West Lafayette UG Problem Solving And O-O Programming A 4.000 16.00";

/// Notice appended when the source text had to be cut.
pub const TRUNCATION_NOTICE: &str = "\n[... transcript truncated ...]";

/// Render the grade → point table, one grade per line.
pub fn grade_table() -> String {
    GRADE_POINTS
        .iter()
        .map(|(grade, points)| format!("{grade} = {points:.1}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
///
/// Returns the kept prefix and whether anything was dropped.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

/// Build the user message for `raw_text`.
pub fn build_prompt(raw_text: &str) -> String {
    format!(
        "Extract the academic transcript below into JSON matching this schema exactly:\n\n\
{schema}\n\n\
Rules:\n\
- Use the string \"{unknown}\" for any student field that is missing. Never use null or an empty string.\n\
- Omit any section that is absent from the transcript; do not invent courses, grades or credits.\n\
- Only real course lines are courses. Term headers, totals lines and notices are not.\n\
- Copy grades and credits exactly as printed. Do not compute quality points.\n\
- Return a single JSON object and nothing else.\n\n\
Grade points:\n{grades}\n\n\
Source line grammar:\n{grammar}\n\n\
Transcript:\n\"\"\"\n{text}\n\"\"\"",
        schema = RESPONSE_SCHEMA,
        unknown = UNKNOWN,
        grades = grade_table(),
        grammar = LINE_GRAMMAR,
        text = raw_text,
    )
}

/// [`build_prompt`] with the transcript limited to `max_chars` characters.
pub fn build_prompt_limited(raw_text: &str, max_chars: usize) -> String {
    let (kept, truncated) = truncate_chars(raw_text, max_chars);
    if truncated {
        build_prompt(&format!("{kept}{TRUNCATION_NOTICE}"))
    } else {
        build_prompt(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_schema_grades_policy_and_grammar() {
        let p = build_prompt("STUDENT INFORMATION\nName: Jordan Lee");
        assert!(p.contains("\"completedCourses\""));
        assert!(p.contains("\"cumulativeGPA\""));
        assert!(p.contains("A- = 3.7"));
        assert!(p.contains("NC = 0.0"));
        assert!(p.contains("\"Unknown\""));
        assert!(p.contains("SUBJECT NUMBER CAMPUS LEVEL TITLE GRADE"));
        assert!(p.ends_with("Name: Jordan Lee\n\"\"\""));
    }

    #[test]
    fn system_instruction_demands_json_only() {
        assert!(SYSTEM_INSTRUCTION.contains("JSON only"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let (kept, cut) = truncate_chars("ééééé", 3);
        assert_eq!(kept, "ééé");
        assert!(cut);
        let (kept, cut) = truncate_chars("abc", 3);
        assert_eq!(kept, "abc");
        assert!(!cut);
    }

    #[test]
    fn limited_prompt_marks_truncation() {
        let text = "x".repeat(100);
        let p = build_prompt_limited(&text, 10);
        assert!(p.contains(TRUNCATION_NOTICE.trim()));
        assert!(!p.contains(&"x".repeat(11)));
    }
}
