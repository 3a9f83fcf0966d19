//! Turn a model reply into a JSON object.
//!
//! Replies arrive wrapped in markdown fences, prefixed with chatter, or cut
//! off mid-array when the model hits its output limit. Each of those shapes
//! is handled by one [`RepairStrategy`]; a [`RepairChain`] runs them in order,
//! each either transforming the text or skipping. Nothing is invented beyond
//! mechanical repair: truncated tails are cut back to the last complete
//! container boundary and open brackets are closed. Partial strings are never
//! closed, so a repaired object never carries a half-written value.
//!
//! ## Default chain
//!
//! 1. [`StripFences`]        drop ```` ```json ```` / ```` ``` ```` wrappers
//! 2. [`IsolateObject`]      keep the first balanced `{...}` span
//! 3. [`TrimTruncatedTail`]  cut a truncated reply back to a `[`, `}` or `]`
//! 4. [`StripTrailingCommas`]
//! 5. [`CloseBrackets`]      append the missing `]`/`}` innermost first

use crate::error::TranscriptError;
use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::debug;

/// One transform-or-skip step. `None` means "not applicable".
pub trait RepairStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, text: &str) -> Option<String>;
}

// ── Scanner ──────────────────────────────────────────────────────────────────

/// Bracket state of a JSON-ish text, ignoring brackets inside strings.
#[derive(Debug, Default)]
struct Scan {
    /// Open brackets (`{` or `[`) still waiting for a closer.
    open: Vec<u8>,
    in_string: bool,
    /// Byte offset just past the last `[`, `}` or `]` seen outside a string
    /// while the text was still nested.
    last_boundary: Option<usize>,
    /// Byte offset just past the bracket that closed the first root value.
    root_end: Option<usize>,
}

impl Scan {
    fn is_truncated(&self) -> bool {
        self.in_string || !self.open.is_empty()
    }
}

fn scan(text: &str) -> Scan {
    let mut s = Scan::default();
    let mut escaped = false;
    for (i, b) in text.bytes().enumerate() {
        if s.in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => s.in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => s.in_string = true,
            b'{' => s.open.push(b),
            b'[' => {
                s.open.push(b);
                s.last_boundary = Some(i + 1);
            }
            b'}' | b']' => {
                s.open.pop();
                if s.open.is_empty() {
                    if s.root_end.is_none() {
                        s.root_end = Some(i + 1);
                    }
                } else {
                    s.last_boundary = Some(i + 1);
                }
            }
            _ => {}
        }
    }
    s
}

// ── Strategy 1: fences ───────────────────────────────────────────────────────

/// Remove a leading fence line and a trailing fence, either may be missing.
pub struct StripFences;

impl RepairStrategy for StripFences {
    fn name(&self) -> &'static str {
        "strip_fences"
    }

    fn apply(&self, text: &str) -> Option<String> {
        let trimmed = text.trim();
        let mut body = trimmed;
        if body.starts_with("```") {
            body = body.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
        }
        if let Some(stripped) = body.trim_end().strip_suffix("```") {
            body = stripped;
        }
        if body.len() == trimmed.len() {
            return None;
        }
        Some(body.trim().to_string())
    }
}

// ── Strategy 2: isolate ──────────────────────────────────────────────────────

/// Keep the first `{...}` span, or everything from the first `{` when the
/// object never closes.
pub struct IsolateObject;

impl RepairStrategy for IsolateObject {
    fn name(&self) -> &'static str {
        "isolate_object"
    }

    fn apply(&self, text: &str) -> Option<String> {
        let start = text.find('{')?;
        let tail = &text[start..];
        let end = scan(tail).root_end.unwrap_or(tail.len());
        if start == 0 && end == text.len() {
            return None;
        }
        Some(tail[..end].to_string())
    }
}

// ── Strategy 3: truncated tail ───────────────────────────────────────────────

/// Cut a truncated reply back to the last complete container boundary.
///
/// Applies only when brackets are unbalanced or a string is left open.
pub struct TrimTruncatedTail;

impl RepairStrategy for TrimTruncatedTail {
    fn name(&self) -> &'static str {
        "trim_truncated_tail"
    }

    fn apply(&self, text: &str) -> Option<String> {
        let state = scan(text);
        if !state.is_truncated() {
            return None;
        }
        let cut = state.last_boundary?;
        if cut >= text.trim_end().len() {
            return None;
        }
        Some(text[..cut].to_string())
    }
}

// ── Strategy 4: trailing commas ──────────────────────────────────────────────

/// Drop commas followed only by whitespace and a closer or end of text.
pub struct StripTrailingCommas;

impl RepairStrategy for StripTrailingCommas {
    fn name(&self) -> &'static str {
        "strip_trailing_commas"
    }

    fn apply(&self, text: &str) -> Option<String> {
        let bytes = text.as_bytes();
        let mut out = String::with_capacity(text.len());
        let mut in_string = false;
        let mut escaped = false;
        let mut changed = false;
        for (i, ch) in text.char_indices() {
            if in_string {
                match ch {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                out.push(ch);
                continue;
            }
            if ch == ',' {
                let next = bytes[i + 1..].iter().find(|b| !b.is_ascii_whitespace());
                if matches!(next, None | Some(b'}') | Some(b']')) {
                    changed = true;
                    continue;
                }
            }
            if ch == '"' {
                in_string = true;
            }
            out.push(ch);
        }
        changed.then_some(out)
    }
}

// ── Strategy 5: close brackets ───────────────────────────────────────────────

/// Append the closers for every open bracket, innermost first.
///
/// Skips when a string is open or the text ends on `,` or `:`, since closing
/// there would need invented content.
pub struct CloseBrackets;

impl RepairStrategy for CloseBrackets {
    fn name(&self) -> &'static str {
        "close_brackets"
    }

    fn apply(&self, text: &str) -> Option<String> {
        let state = scan(text);
        if state.in_string || state.open.is_empty() {
            return None;
        }
        let body = text.trim_end();
        if body.ends_with(',') || body.ends_with(':') {
            return None;
        }
        let mut out = body.to_string();
        for open in state.open.iter().rev() {
            out.push(if *open == b'{' { '}' } else { ']' });
        }
        Some(out)
    }
}

// ── Chain ────────────────────────────────────────────────────────────────────

/// Result of running a chain over a reply, before parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct Repaired {
    pub text: String,
    /// Names of the strategies that changed the text, in order.
    pub applied: Vec<&'static str>,
}

/// Ordered list of repair strategies.
pub struct RepairChain {
    strategies: Vec<Box<dyn RepairStrategy>>,
}

impl std::fmt::Debug for RepairChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepairChain")
            .field("strategies", &self.names())
            .finish()
    }
}

impl Default for RepairChain {
    fn default() -> Self {
        Self::standard()
    }
}

static STANDARD: Lazy<RepairChain> = Lazy::new(RepairChain::standard);

impl RepairChain {
    /// The five built-in strategies in their canonical order.
    pub fn standard() -> Self {
        Self::empty()
            .with(StripFences)
            .with(IsolateObject)
            .with(TrimTruncatedTail)
            .with(StripTrailingCommas)
            .with(CloseBrackets)
    }

    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Append a strategy to the end of the chain.
    pub fn with(mut self, strategy: impl RepairStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn repair(&self, text: &str) -> Repaired {
        let mut current = text.to_string();
        let mut applied = Vec::new();
        for strategy in &self.strategies {
            if let Some(next) = strategy.apply(&current) {
                applied.push(strategy.name());
                current = next;
            }
        }
        Repaired {
            text: current,
            applied,
        }
    }

    /// Repair `text` and parse it as a JSON object.
    pub fn extract(&self, text: &str) -> Result<Value, TranscriptError> {
        let malformed = |reason: String| TranscriptError::MalformedResponse {
            reason,
            original: text.to_string(),
        };

        if text.trim().is_empty() {
            return Err(malformed("empty response".into()));
        }

        let repaired = self.repair(text);
        if !repaired.applied.is_empty() {
            debug!(
                "Repaired model reply ({} → {} chars) with {:?}",
                text.len(),
                repaired.text.len(),
                repaired.applied
            );
        }

        match serde_json::from_str::<Value>(&repaired.text) {
            Ok(value @ Value::Object(_)) => Ok(value),
            Ok(other) => Err(malformed(format!(
                "expected a JSON object, found {}",
                json_type(&other)
            ))),
            Err(e) => Err(malformed(e.to_string())),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Repair and parse a model reply with the default chain.
pub fn extract_json(text: &str) -> Result<Value, TranscriptError> {
    STANDARD.extract(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_object_untouched() {
        let repaired = RepairChain::standard().repair(r#"{"a": [1, 2]}"#);
        assert!(repaired.applied.is_empty());
        assert_eq!(extract_json(r#"{"a": [1, 2]}"#).unwrap(), json!({"a": [1, 2]}));
    }

    #[test]
    fn strips_fences() {
        let v = extract_json("```json\n{\"a\": 1}\n```").unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn strips_unlabelled_fence_and_missing_closer() {
        assert_eq!(extract_json("```\n{\"a\": 1}").unwrap(), json!({"a": 1}));
    }

    #[test]
    fn isolates_object_from_chatter() {
        let v = extract_json("Here is the data:\n{\"a\": \"{x}\"}\nLet me know!").unwrap();
        assert_eq!(v, json!({"a": "{x}"}));
    }

    #[test]
    fn trailing_commas_removed_outside_strings() {
        let v = extract_json(r#"{"a": [1, 2,], "b": "x,]",}"#).unwrap();
        assert_eq!(v, json!({"a": [1, 2], "b": "x,]"}));
    }

    #[test]
    fn scenario_c_truncated_mid_array() {
        let reply = "```json\n{\"studentInfo\": {\"name\": \"Jordan Lee\"}, \"completedCourses\": \
{\"fall_2023\": {\"period\": \"Fall 2023\", \"courses\": [\
{\"code\": \"CS 18000\", \"title\": \"Problem Solving\", \"credits\": 4, \"grade\": \"A\"}, \
{\"code\": \"MA 16100\", \"title\": \"Plane Analy";
        let v = extract_json(reply).unwrap();
        let courses = v["completedCourses"]["fall_2023"]["courses"].as_array().unwrap();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0]["code"], "CS 18000");
        assert_eq!(v["studentInfo"]["name"], "Jordan Lee");
    }

    #[test]
    fn truncated_right_after_array_open() {
        let v = extract_json(r#"{"completedCourses": {"f": {"period": "Fall 2023", "courses": ["#)
            .unwrap();
        assert_eq!(v["completedCourses"]["f"]["courses"], json!([]));
        assert_eq!(v["completedCourses"]["f"]["period"], "Fall 2023");
    }

    #[test]
    fn open_string_without_boundary_fails() {
        let err = extract_json(r#"{"studentInfo"#).unwrap_err();
        match err {
            TranscriptError::MalformedResponse { original, .. } => {
                assert_eq!(original, r#"{"studentInfo"#)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_and_non_object_replies_fail() {
        assert!(matches!(
            extract_json("   "),
            Err(TranscriptError::MalformedResponse { .. })
        ));
        assert!(matches!(
            extract_json("I could not read this transcript."),
            Err(TranscriptError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn escaped_quotes_do_not_confuse_scanner() {
        let v = extract_json(r#"{"t": "say \"}\" here", "c": [1"#).unwrap();
        assert_eq!(v["t"], "say \"}\" here");
    }

    #[test]
    fn truncation_at_every_offset_yields_prefix_or_error() {
        let full = json!({
            "studentInfo": {"name": "Jordan Lee", "studentId": "0031234567"},
            "completedCourses": {
                "fall_2023": {
                    "period": "Fall 2023",
                    "courses": [
                        {"code": "CS 18000", "title": "Problem Solving", "credits": 4.0, "grade": "A"},
                        {"code": "MA 16100", "title": "Calculus I", "credits": 5.0, "grade": "B+"},
                        {"code": "ENGL 10600", "title": "First-Year Composition", "credits": 4.0, "grade": "A-"}
                    ]
                }
            }
        });
        let text = serde_json::to_string_pretty(&full).unwrap();
        let original = full["completedCourses"]["fall_2023"]["courses"]
            .as_array()
            .unwrap()
            .clone();
        let array_start = text.find("\"courses\"").unwrap();

        for cut in array_start..text.len() {
            if !text.is_char_boundary(cut) {
                continue;
            }
            let Ok(value) = extract_json(&text[..cut]) else {
                continue;
            };
            let Some(courses) = value
                .pointer("/completedCourses/fall_2023/courses")
                .and_then(Value::as_array)
            else {
                continue;
            };
            assert!(courses.len() <= original.len(), "cut {cut}");
            assert_eq!(courses[..], original[..courses.len()], "cut {cut}");
        }
    }

    #[test]
    fn custom_strategy_runs_in_order() {
        struct SingleQuotes;
        impl RepairStrategy for SingleQuotes {
            fn name(&self) -> &'static str {
                "single_quotes"
            }
            fn apply(&self, text: &str) -> Option<String> {
                text.contains('\'').then(|| text.replace('\'', "\""))
            }
        }
        let chain = RepairChain::empty().with(SingleQuotes).with(CloseBrackets);
        assert_eq!(chain.names(), vec!["single_quotes", "close_brackets"]);
        let v = chain.extract("{'a': ['b'").unwrap();
        assert_eq!(v, json!({"a": ["b"]}));
    }
}
