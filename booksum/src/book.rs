// Document loading: EPUB and plain-text extraction

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::Path;

/// Extract the full document text from a book file.
///
/// EPUB files are flattened to one plain-text string in spine order. When
/// `start_at` is given, every spine item before the one with that idref is
/// skipped (front matter, covers, tables of contents). Plain `.txt` files
/// are read whole. Any other extension is rejected.
pub fn extract_text(path: &Path, start_at: Option<&str>) -> Result<String> {
    match path.extension().and_then(OsStr::to_str) {
        Some(ext) if ext.eq_ignore_ascii_case("epub") => read_epub(path, start_at),
        Some(ext) if ext.eq_ignore_ascii_case("txt") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read text file: {}", path.display())),
        _ => anyhow::bail!(
            "Unsupported file type: {} (expected .epub or .txt)",
            path.display()
        ),
    }
}

/// Read an EPUB and concatenate its content documents into one string.
fn read_epub(path: &Path, start_at: Option<&str>) -> Result<String> {
    let mut doc = epub::doc::EpubDoc::new(path)
        .map_err(|e| anyhow::anyhow!("Failed to open EPUB: {}", e))?;

    let spine = doc.spine.clone();
    let mut started = start_at.is_none();
    let mut text = String::new();

    for spine_item in spine.iter() {
        if !started {
            if start_at == Some(spine_item.idref.as_str()) {
                started = true;
            } else {
                continue;
            }
        }

        if let Some((content_bytes, _mime)) = doc.get_resource(&spine_item.idref) {
            let html = String::from_utf8_lossy(&content_bytes).to_string();
            let plain = html_to_text(&html);

            if plain.trim().is_empty() {
                continue;
            }

            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(plain.trim());
        }
    }

    if !started {
        anyhow::bail!(
            "Start item {:?} not found in EPUB spine",
            start_at.unwrap_or_default()
        );
    }

    Ok(text)
}

/// Convert HTML to plain text
fn html_to_text(html: &str) -> String {
    let text = html2text::from_read(html.as_bytes(), 1000);

    // Clean up the text
    clean_text(&text)
}

/// Clean up extracted text
fn clean_text(text: &str) -> String {
    let mut result = String::new();
    let mut prev_was_newline = false;

    for line in text.lines() {
        let trimmed = line.trim();

        // Skip empty lines but preserve paragraph breaks
        if trimmed.is_empty() {
            if !prev_was_newline && !result.is_empty() {
                result.push_str("\n\n");
                prev_was_newline = true;
            }
            continue;
        }

        prev_was_newline = false;

        // Add space if needed
        if !result.is_empty() && !result.ends_with('\n') {
            result.push(' ');
        }

        result.push_str(trimmed);
    }

    // Decode common HTML entities
    result
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&mdash;", "—")
        .replace("&ndash;", "–")
        .replace("&hellip;", "...")
        .replace("&rsquo;", "'")
        .replace("&lsquo;", "'")
        .replace("&rdquo;", "\"")
        .replace("&ldquo;", "\"")
}
