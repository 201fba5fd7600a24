//! PDF chunking: overlapping character windows per page, deterministic ids,
//! and best-effort structural metadata (section headings, citations, figures).

pub mod pdf;

use std::collections::BTreeMap;

use crate::models::{Chunk, ChunkMetadata};
use pdf::PageText;

/// Upper bound on extracted citation / figure mentions per chunk.
const MAX_REFS: usize = 16;

/// Heading candidates longer than this are treated as prose.
const MAX_HEADING_CHARS: usize = 80;

/// Split extracted pages into overlapping chunks.
///
/// Windows are `chunk_size` characters with `overlap` characters shared
/// between consecutive windows, cut on UTF-8 char boundaries, never crossing
/// a page boundary. The chunk index embedded in the id is global across the
/// whole document, so re-chunking identical input reproduces identical ids.
pub fn chunk_pages(
    filename: &str,
    pages: &[PageText],
    chunk_size: usize,
    overlap: usize,
) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    // Keep the window step positive
    let overlap = overlap.min(chunk_size - 1);

    let mut chunks = Vec::new();
    let mut global_index = 0usize;

    for page in pages {
        for window in split_windows(&page.text, chunk_size, overlap) {
            let text = window.trim();
            if text.is_empty() {
                continue;
            }

            let (section, subsection) = extract_headings(text);
            let metadata = ChunkMetadata {
                source: filename.to_string(),
                page: page.page_number,
                section,
                subsection,
                citations: extract_citations(text),
                figure_refs: extract_figure_refs(text),
                extra: BTreeMap::new(),
            };

            chunks.push(Chunk {
                id: format!("{}_page_{}_chunk_{}", filename, page.page_number, global_index),
                text: text.to_string(),
                metadata,
            });
            global_index += 1;
        }
    }

    chunks
}

/// Cut `text` into windows of `size` chars stepping by `size - overlap`.
fn split_windows(text: &str, size: usize, overlap: usize) -> Vec<&str> {
    let boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let total = boundaries.len();
    if total == 0 {
        return Vec::new();
    }

    let step = size - overlap;
    let mut windows = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + size).min(total);
        let byte_start = boundaries[start];
        let byte_end = if end == total { text.len() } else { boundaries[end] };
        windows.push(&text[byte_start..byte_end]);
        if end == total {
            break;
        }
        start += step;
    }
    windows
}

/// First and second heading-like lines of a chunk.
///
/// A heading here is a short line (≤80 chars, ≤10 words, at least 3 letters)
/// starting with an uppercase letter or a section number and not ending in
/// sentence punctuation. Best effort; papers without recognizable headings
/// simply get no section metadata.
fn extract_headings(text: &str) -> (Option<String>, Option<String>) {
    let mut found = text
        .lines()
        .map(str::trim)
        .filter(|line| looks_like_heading(line))
        .map(str::to_string);
    (found.next(), found.next())
}

fn looks_like_heading(line: &str) -> bool {
    if line.is_empty() || line.len() > MAX_HEADING_CHARS {
        return false;
    }
    if line.split_whitespace().count() > 10 {
        return false;
    }
    if line.chars().filter(|c| c.is_alphabetic()).count() < 3 {
        return false;
    }
    let starts_like_heading = line
        .chars()
        .next()
        .map(|c| c.is_uppercase() || c.is_ascii_digit())
        .unwrap_or(false);
    starts_like_heading && !line.ends_with(['.', ',', ';', ':', '!', '?'])
}

/// Bracketed numeric reference groups: `[12]`, `[3, 7]`, `[2-5]`.
fn extract_citations(text: &str) -> Option<Vec<String>> {
    let mut refs: Vec<String> = Vec::new();
    let mut rest = text;

    while refs.len() < MAX_REFS {
        let Some(open) = rest.find('[') else { break };
        rest = &rest[open + 1..];
        let Some(close) = rest.find(']') else { break };
        let inner = &rest[..close];
        rest = &rest[close + 1..];

        if inner.is_empty() || inner.len() > 32 {
            continue;
        }
        let citation_like = inner
            .chars()
            .all(|c| c.is_ascii_digit() || c == ',' || c == '-' || c == '–' || c.is_whitespace());
        if !citation_like {
            continue;
        }

        for part in inner.split(',') {
            let part = part.trim();
            if part.is_empty() || !part.chars().any(|c| c.is_ascii_digit()) {
                continue;
            }
            if !refs.iter().any(|r| r == part) {
                refs.push(part.to_string());
            }
            if refs.len() >= MAX_REFS {
                break;
            }
        }
    }

    if refs.is_empty() {
        None
    } else {
        Some(refs)
    }
}

/// `Figure N` / `Fig. N` mentions, normalized to `Figure N`.
fn extract_figure_refs(text: &str) -> Option<Vec<String>> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut refs: Vec<String> = Vec::new();

    for pair in words.windows(2) {
        if !matches!(pair[0], "Figure" | "FIGURE" | "Fig." | "Fig") {
            continue;
        }
        let number: String = pair[1]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if number.is_empty() {
            continue;
        }
        let label = format!("Figure {number}");
        if !refs.contains(&label) {
            refs.push(label);
        }
        if refs.len() >= MAX_REFS {
            break;
        }
    }

    if refs.is_empty() {
        None
    } else {
        Some(refs)
    }
}
