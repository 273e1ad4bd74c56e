//! Encoding repair for model replies.
//!
//! Replies occasionally come back with mojibake: UTF-8 text that was
//! decoded as Windows-1252 somewhere along the way, so "don't" turns into
//! "donâ€™t". Each suspect reply is re-encoded to Windows-1252 bytes and
//! decoded again as UTF-8. Text that cannot be coerced back to clean UTF-8
//! is an error; a corrupt summary must never be persisted or fed back into
//! the next prompt.

use anyhow::{Result, bail};

/// Double-encoded text needs one pass per encoding layer; more than a few
/// layers means the reply is beyond saving.
const MAX_PASSES: usize = 3;

/// Repair the encoding of a model reply.
///
/// Clean text passes through unchanged. Text showing Windows-1252 mojibake
/// signatures is re-decoded; if the garbling cannot be undone, or the reply
/// contains U+FFFD replacement characters, an error is returned.
pub fn fix_text(text: &str) -> Result<String> {
    if text.contains('\u{fffd}') {
        bail!("reply contains replacement characters; data was lost before repair");
    }

    let mut current = text.to_string();
    for _ in 0..MAX_PASSES {
        if !looks_garbled(&current) {
            return Ok(current);
        }
        match recode_windows_1252(&current) {
            Some(fixed) if fixed != current => current = fixed,
            _ => break,
        }
    }

    if looks_garbled(&current) {
        bail!("unable to repair text encoding in reply");
    }
    Ok(current)
}

/// Detect the classic UTF-8-read-as-Windows-1252 signatures.
///
/// UTF-8 lead bytes 0xC2/0xC3 decode to 'Â'/'Ã', and three-byte sequences
/// for punctuation start with 0xE2 0x80, which decodes to "â€". Ordinary
/// prose never pairs these with the characters that follow them here.
fn looks_garbled(text: &str) -> bool {
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\u{c2}' | '\u{c3}' => {
                if let Some(&next) = chars.peek() {
                    if !next.is_ascii() {
                        return true;
                    }
                }
            }
            '\u{e2}' => {
                if chars.peek() == Some(&'\u{20ac}') {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

/// Map a char back to the Windows-1252 byte it was decoded from.
fn windows_1252_byte(c: char) -> Option<u8> {
    let code = c as u32;
    if code <= 0xFF {
        return Some(code as u8);
    }
    // The 0x80..=0x9F range maps to printable punctuation in Windows-1252
    let byte = match c {
        '\u{20ac}' => 0x80,
        '\u{201a}' => 0x82,
        '\u{192}' => 0x83,
        '\u{201e}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{2c6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{152}' => 0x8C,
        '\u{17d}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201c}' => 0x93,
        '\u{201d}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{2dc}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{161}' => 0x9A,
        '\u{203a}' => 0x9B,
        '\u{153}' => 0x9C,
        '\u{17e}' => 0x9E,
        '\u{178}' => 0x9F,
        _ => return None,
    };
    Some(byte)
}

/// Undo one layer of Windows-1252 mis-decoding.
///
/// Returns None when the text contains characters that could not have come
/// from a Windows-1252 decode, or when the recovered bytes are not UTF-8.
fn recode_windows_1252(text: &str) -> Option<String> {
    let bytes: Option<Vec<u8>> = text.chars().map(windows_1252_byte).collect();
    String::from_utf8(bytes?).ok()
}
