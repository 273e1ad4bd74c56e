//! Overlapping, sentence-aligned windows over a single document string.
//!
//! The engine is a pure, restartable generator: enumerating it twice over
//! the same input yields the same chunks, and nothing is read or written
//! outside the document string.

/// Marks that end a sentence.
const SENTENCE_TERMINALS: [char; 3] = ['.', '!', '?'];

/// Lazy iterator over cleaned chunk windows. Created by [`chunk_windows`].
#[derive(Debug, Clone)]
pub struct ChunkWindows<'a> {
    text: &'a str,
    /// Byte offset of every char boundary, including the end of the string
    boundaries: Vec<usize>,
    chunk_size: usize,
    overlap: usize,
    /// Cursor position in chars; steps by `chunk_size`
    cursor: usize,
    emitted_single: bool,
}

/// Split a document into overlapping, sentence-clipped windows.
///
/// The cursor advances in steps of `chunk_size` characters while more than
/// one window's worth of text remains; each raw window is widened by
/// `overlap` characters on both sides (clamped to the document), then
/// clipped to sentence boundaries. A document that fits in a single window
/// is emitted whole, untouched by clipping, since both of its edges are
/// real document boundaries.
///
/// All sizes and offsets are measured in characters, not bytes.
///
/// # Panics
/// Panics if `chunk_size` is zero.
pub fn chunk_windows(text: &str, chunk_size: usize, overlap: usize) -> ChunkWindows<'_> {
    assert!(chunk_size > 0, "chunk_size must be positive");

    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain([text.len()])
        .collect();

    ChunkWindows {
        text,
        boundaries,
        chunk_size,
        overlap,
        cursor: 0,
        emitted_single: false,
    }
}

impl Iterator for ChunkWindows<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let len = self.boundaries.len() - 1;
        if len == 0 {
            return None;
        }

        if len <= self.chunk_size {
            if self.emitted_single {
                return None;
            }
            self.emitted_single = true;
            let whole = self.text.trim();
            if whole.is_empty() {
                return None;
            }
            return Some(whole.to_string());
        }

        if self.cursor >= len - self.chunk_size {
            return None;
        }

        let start = self.cursor.saturating_sub(self.overlap);
        let end = (self.cursor + self.chunk_size + self.overlap).min(len);
        let raw = &self.text[self.boundaries[start]..self.boundaries[end]];
        self.cursor += self.chunk_size;

        Some(clip_to_sentences(raw))
    }
}

/// Trim a raw window to sentence boundaries.
///
/// Everything after the last terminal mark is discarded (a trailing partial
/// sentence). When the window starts mid-sentence, everything up to and
/// including the first terminal mark is discarded as well (a leading partial
/// sentence). A window with no terminal mark at all collapses to the empty
/// string; callers must tolerate empty chunks.
///
/// A window that already begins at a sentence start is kept whole, so
/// clipping an already-clipped chunk leaves it unchanged.
pub fn clip_to_sentences(raw: &str) -> String {
    let text = raw.trim();

    let Some(last) = text.rfind(SENTENCE_TERMINALS) else {
        return String::new();
    };
    // Terminal marks are ASCII, so `last + 1` is a char boundary
    let text = &text[..=last];

    if !begins_mid_sentence(text) {
        return text.to_string();
    }

    let first = text.find(SENTENCE_TERMINALS).unwrap_or(last);
    text[first + 1..].trim_start().to_string()
}

/// Whether the text starts inside a sentence rather than at the start of one.
fn begins_mid_sentence(text: &str) -> bool {
    match text.chars().next() {
        None => false,
        Some(c) => {
            !(c.is_uppercase()
                || c.is_numeric()
                || matches!(c, '"' | '\'' | '(' | '\u{201c}' | '\u{2018}'))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a document of exactly `len` chars from a repeating sentence.
    fn document_of(len: usize) -> String {
        let sentence = "The quiet librarian catalogued another forgotten manuscript today. ";
        let mut text = sentence.repeat(len / sentence.len() + 1);
        text.truncate(len);
        text
    }

    #[test]
    fn test_empty_document_yields_nothing() {
        let chunks: Vec<String> = chunk_windows("", 3000, 400).collect();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_blank_document_yields_nothing() {
        let chunks: Vec<String> = chunk_windows("   \n\n  ", 3000, 400).collect();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_short_document_emitted_whole() {
        let text = "Tiny book. The end.";
        let chunks: Vec<String> = chunk_windows(text, 3000, 400).collect();
        assert_eq!(chunks, vec!["Tiny book. The end."]);
    }

    #[test]
    fn test_short_document_without_punctuation_survives() {
        // Clipping would erase it; a whole-document window is kept as-is
        let chunks: Vec<String> = chunk_windows("just a fragment", 3000, 400).collect();
        assert_eq!(chunks, vec!["just a fragment"]);
    }

    #[test]
    fn test_window_count_formula() {
        // ceil((10000 - 3000) / 3000) = 3 windows
        let text = document_of(10_000);
        let chunks: Vec<String> = chunk_windows(&text, 3000, 400).collect();
        assert_eq!(chunks.len(), 3);

        // Exact-multiple remainder: ceil((13000 - 3000) / 3000) = 4 windows
        let text = document_of(13_000);
        let chunks: Vec<String> = chunk_windows(&text, 3000, 400).collect();
        assert_eq!(chunks.len(), 4);
    }

    #[test]
    fn test_window_width_bounded() {
        let text = document_of(10_000);
        for chunk in chunk_windows(&text, 3000, 400) {
            // Clipping only removes characters from the raw window
            assert!(chunk.chars().count() <= 3000 + 2 * 400);
        }
    }

    #[test]
    fn test_chunks_are_sentence_aligned() {
        let text = document_of(10_000);
        for chunk in chunk_windows(&text, 3000, 400) {
            assert!(!chunk.is_empty());
            assert!(chunk.ends_with(['.', '!', '?']));
            assert!(chunk.chars().next().unwrap().is_uppercase());
        }
    }

    #[test]
    fn test_restartable() {
        let text = document_of(8_000);
        let first: Vec<String> = chunk_windows(&text, 2000, 300).collect();
        let second: Vec<String> = chunk_windows(&text, 2000, 300).collect();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_sentence_cover() {
        // Distinct numbered sentences; overlap exceeds the sentence length,
        // so every sentence ending before the final-window cutoff must land
        // fully inside at least one chunk.
        let sentences: Vec<String> = (0..40)
            .map(|n| format!("Entry number {:02} of the expedition log follows here. ", n))
            .collect();
        let text = sentences.concat();
        let chunk_size = 200;
        let overlap = 60;
        let len = text.chars().count();

        let joined = chunk_windows(&text, chunk_size, overlap).collect::<Vec<_>>().join("\n");

        let mut offset = 0;
        for sentence in &sentences {
            let end = offset + sentence.len();
            if end <= len - chunk_size {
                let trimmed = sentence.trim();
                assert!(
                    joined.contains(trimmed),
                    "sentence not covered: {}",
                    trimmed
                );
            }
            offset = end;
        }
    }

    #[test]
    fn test_multibyte_document_cuts_at_char_boundaries() {
        let sentence = "Der Bücherwurm las über die größten Irrtümer der Astronomie. ";
        let text = sentence.repeat(40);
        // Would panic on a byte-offset slice inside a multi-byte char
        let chunks: Vec<String> = chunk_windows(&text, 500, 80).collect();
        assert!(!chunks.is_empty());
        for chunk in chunks {
            assert!(chunk.ends_with('.'));
        }
    }

    #[test]
    fn test_clip_no_punctuation_is_empty() {
        assert_eq!(clip_to_sentences("no terminal punctuation here"), "");
        assert_eq!(clip_to_sentences(""), "");
        assert_eq!(clip_to_sentences("   "), "");
    }

    #[test]
    fn test_clip_keeps_complete_leading_sentence() {
        assert_eq!(
            clip_to_sentences("Hello world. This is a test"),
            "Hello world."
        );
    }

    #[test]
    fn test_clip_drops_partial_sentences_on_both_sides() {
        assert_eq!(
            clip_to_sentences("incomplete start. Full sentence here. incomplete end"),
            "Full sentence here."
        );
    }

    #[test]
    fn test_clip_drops_leading_partial_with_single_terminal() {
        // Only one terminal and a mid-sentence start: nothing whole survives
        assert_eq!(clip_to_sentences("ne two. Three fo"), "");
    }

    #[test]
    fn test_clip_trims_whitespace() {
        assert_eq!(
            clip_to_sentences("  \n Second thoughts arrived. trailing bits"),
            "Second thoughts arrived."
        );
    }

    #[test]
    fn test_clip_idempotent() {
        let samples = [
            "Hello world. This is a test",
            "incomplete start. Full sentence here. incomplete end",
            "rag end. One whole sentence. Another whole sentence. dangling",
            "no punctuation at all",
            "\u{201c}Quoted opener.\u{201d} said nobody",
        ];
        for sample in samples {
            let once = clip_to_sentences(sample);
            let twice = clip_to_sentences(&once);
            assert_eq!(once, twice, "clip not idempotent for: {}", sample);
        }
    }
}
