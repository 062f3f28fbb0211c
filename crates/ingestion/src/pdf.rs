//! PDF text extraction
//!
//! Extracts text content from PDF bytes using lopdf.

use crate::errors::{IngestionError, Result};
use tracing::{debug, warn};

/// Extract the text of every page. Pages that fail are skipped; a document
/// with no text at all is an error.
pub fn extract_text_from_bytes(bytes: &[u8], label: &str) -> Result<String> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| IngestionError::PdfParseError {
        path: label.to_string(),
        message: format!("Failed to load PDF: {}", e),
    })?;

    let pages = doc.get_pages();
    debug!(page_count = pages.len(), "Extracting text from PDF");

    let mut text = String::new();
    for page_num in pages.keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => {
                warn!(page = page_num, error = %e, "Failed to extract text from page, skipping");
            }
        }
    }

    if text.trim().is_empty() {
        return Err(IngestionError::PdfParseError {
            path: label.to_string(),
            message: "No text content extracted from PDF".to_string(),
        });
    }

    let cleaned = clean_text(&text);
    debug!(
        original_len = text.len(),
        cleaned_len = cleaned.len(),
        "Text extraction complete"
    );

    Ok(cleaned)
}

/// Collapse whitespace, drop byte-order marks and normalize curly quotes
pub fn clean_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{FEFF}', "")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        let input = "Hello   World\n\nTest";
        assert_eq!(clean_text(input), "Hello World Test");
    }

    #[test]
    fn test_clean_text_quotes() {
        let input = "\u{FEFF}\u{201C}Aspirin\u{201D} patients\u{2019} outcomes";
        assert_eq!(clean_text(input), "\"Aspirin\" patients' outcomes");
    }

    #[test]
    fn test_invalid_pdf_is_parse_error() {
        let err = extract_text_from_bytes(b"not a pdf", "broken.pdf").unwrap_err();
        match err {
            IngestionError::PdfParseError { path, .. } => assert_eq!(path, "broken.pdf"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
