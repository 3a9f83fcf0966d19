//! Input resolution: turn uploaded bytes plus a declared MIME type into a
//! [`RawDocument`].
//!
//! Only two kinds of upload are accepted:
//!
//! * `text/plain` (any charset parameter): decoded as UTF-8, lossily, so a
//!   stray Latin-1 byte costs one replacement character rather than the
//!   whole upload.
//! * `application/pdf`: checked for the `%PDF` magic bytes, then read
//!   page by page through pdfium's text layer. Scanned PDFs without a text
//!   layer come back empty and fail later as [`TranscriptError::EmptyInput`].
//!
//! pdfium is a blocking C library, so the PDF work runs on
//! `tokio::task::spawn_blocking`. The document bytes never touch the disk.

use crate::error::TranscriptError;
use crate::record::{RawDocument, SourceKind};
use pdfium_render::prelude::*;
use tracing::{debug, info};

pub const MIME_TEXT: &str = "text/plain";
pub const MIME_PDF: &str = "application/pdf";

/// Which extractor a MIME type selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Text,
    Pdf,
}

/// Classify a MIME type, ignoring parameters and case.
pub fn classify_mime(mime: &str) -> Result<InputKind, TranscriptError> {
    let essence = mime
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        MIME_TEXT => Ok(InputKind::Text),
        MIME_PDF | "application/x-pdf" => Ok(InputKind::Pdf),
        _ => Err(TranscriptError::UnsupportedFileType {
            mime: mime.to_string(),
        }),
    }
}

/// Guess a MIME type from a file name, for callers that only have a path.
pub fn mime_from_path(path: &str) -> Option<&'static str> {
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(MIME_PDF),
        "txt" | "text" => Some(MIME_TEXT),
        _ => None,
    }
}

/// Extract plain text from uploaded bytes.
///
/// The returned document is not normalised; that is the pipeline's first
/// step.
pub async fn extract_text(bytes: &[u8], mime: &str) -> Result<RawDocument, TranscriptError> {
    match classify_mime(mime)? {
        InputKind::Text => {
            debug!("Decoding {} bytes of pasted text", bytes.len());
            Ok(RawDocument::new(
                String::from_utf8_lossy(bytes).into_owned(),
                SourceKind::PastedText,
            ))
        }
        InputKind::Pdf => {
            if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
                return Err(TranscriptError::PdfExtractionFailed {
                    detail: "missing %PDF header".into(),
                });
            }
            let owned = bytes.to_vec();
            let text = tokio::task::spawn_blocking(move || pdf_text_blocking(&owned))
                .await
                .map_err(|e| TranscriptError::Internal(format!("PDF text task panicked: {e}")))??;
            Ok(RawDocument::new(text, SourceKind::Pdf))
        }
    }
}

/// Bind to pdfium: `PDFIUM_LIB_PATH`, then the working directory, then the
/// system library path.
fn bind_pdfium() -> Result<Pdfium, TranscriptError> {
    let from_env = std::env::var("PDFIUM_LIB_PATH").ok().filter(|p| !p.is_empty());
    let bindings = match from_env {
        Some(path) => Pdfium::bind_to_library(&path),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| TranscriptError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of PDF text extraction.
fn pdf_text_blocking(bytes: &[u8]) -> Result<String, TranscriptError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| TranscriptError::PdfExtractionFailed {
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    let mut text = String::new();
    for (idx, page) in pages.iter().enumerate() {
        let page_text = page
            .text()
            .map_err(|e| TranscriptError::PdfExtractionFailed {
                detail: format!("page {}: {e:?}", idx + 1),
            })?
            .all();
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&page_text);
    }
    info!("Extracted {} chars from {} PDF pages", text.len(), pages.len());
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_classification() {
        assert_eq!(classify_mime("text/plain").unwrap(), InputKind::Text);
        assert_eq!(
            classify_mime("Text/Plain; charset=utf-8").unwrap(),
            InputKind::Text
        );
        assert_eq!(classify_mime("application/pdf").unwrap(), InputKind::Pdf);
        assert!(matches!(
            classify_mime("image/png"),
            Err(TranscriptError::UnsupportedFileType { .. })
        ));
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_from_path("transcript.PDF"), Some(MIME_PDF));
        assert_eq!(mime_from_path("notes.txt"), Some(MIME_TEXT));
        assert_eq!(mime_from_path("scan.png"), None);
        assert_eq!(mime_from_path("README"), None);
    }

    #[test]
    fn text_is_decoded_lossily() {
        let doc = tokio_test::block_on(extract_text(b"Name: J\xfcrgen", "text/plain")).unwrap();
        assert_eq!(doc.source_kind, SourceKind::PastedText);
        assert!(doc.source_text.starts_with("Name: J"));
        assert!(doc.source_text.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn pdf_without_magic_rejected_before_pdfium() {
        let err = extract_text(b"hello", "application/pdf").await.unwrap_err();
        assert!(matches!(err, TranscriptError::PdfExtractionFailed { .. }));
    }

    #[tokio::test]
    async fn unsupported_type_rejected() {
        let err = extract_text(b"\x89PNG", "image/png").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnsupportedFileType);
    }
}
