use anyhow::{Context, Result};
use lopdf::Document;

/// Text content of one PDF page.
#[derive(Debug, Clone)]
pub struct PageText {
    /// 1-based page number
    pub page_number: u32,
    pub text: String,
}

/// Extract per-page text from raw PDF bytes.
///
/// Pages whose text extraction fails or comes back blank are skipped; a
/// document where nothing survives is simply "nothing to index". Input that
/// does not parse as a PDF at all is an error and nothing is committed.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<PageText>> {
    let doc = Document::load_mem(bytes).context("Failed to parse PDF document")?;

    let mut pages = Vec::new();
    for (page_number, _object_id) in doc.get_pages() {
        let text = match doc.extract_text(&[page_number]) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Skipping page {page_number}: text extraction failed: {e}");
                continue;
            }
        };
        if text.trim().is_empty() {
            continue;
        }
        pages.push(PageText { page_number, text });
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_is_parse_error() {
        let result = extract_pages(b"definitely not a pdf");
        assert!(result.is_err());
        let msg = format!("{:#}", result.unwrap_err());
        assert!(msg.contains("Failed to parse PDF document"));
    }

    #[test]
    fn test_empty_bytes_is_parse_error() {
        assert!(extract_pages(&[]).is_err());
    }

    #[test]
    fn test_truncated_header_is_parse_error() {
        // A valid magic prefix with nothing behind it
        assert!(extract_pages(b"%PDF-1.5\n").is_err());
    }
}
