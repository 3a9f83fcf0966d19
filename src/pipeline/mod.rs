//! Pipeline stages for transcript parsing.
//!
//! Each submodule implements exactly one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! deterministic:  normalize ─▶ segment ─▶ period ─▶ course ─┐
//!                                  └──▶ student            │
//!                                                          ├─▶ sanitize::scrub ─▶ aggregate ─▶ confidence
//! AI-assisted:    prompts ─▶ llm ─▶ response ─▶ sanitize ──┘
//! ```
//!
//! 1. [`normalize`]  canonical whitespace and line endings
//! 2. [`segment`]  anchor phrases to [`crate::record::TextRegion`]s
//! 3. [`period`]  `Period: <Season> <Year>` blocks inside a region
//! 4. [`course`]  one course per line through a pluggable grammar
//! 5. [`student`]  labelled student fields and the reported GPA
//! 6. [`grades`]  static grade-point and title tables
//! 7. [`aggregate`]  per-period and cumulative GPA
//! 8. [`confidence`]  score plus accept/reject gate
//! 9. [`llm`]  the model seam; the only stage with network I/O
//! 10. [`response`]  fence stripping and truncation repair of model replies
//! 11. [`sanitize`]  model JSON to record, spurious-entry filtering
//! 12. [`input`]  uploaded bytes to text (pdfium for PDFs)

pub mod aggregate;
pub mod confidence;
pub mod course;
pub mod grades;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod period;
pub mod response;
pub mod sanitize;
pub mod segment;
pub mod student;
