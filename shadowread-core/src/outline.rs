//! Chapter outline extraction.
//!
//! The document is scanned in fixed windows that are decoded independently.
//! A heading that straddles two windows is not reported.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::decode;
use crate::error::ReaderError;
use crate::source::{read_full, ByteSource};

/// Bytes per scan window. A multiple of the character width.
pub const OUTLINE_WINDOW: usize = 1024;

static HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[^\S\n]*(?:正文[^\S\n]*)?第[\x{4e00}-\x{9fa5}a-zA-Z0-9]{1,7}章[^\n]{1,35}")
        .expect("valid heading pattern")
});

pub fn extract_headings<S: ByteSource + ?Sized>(
    source: &mut S,
    total_bytes: u64,
) -> Result<Vec<String>, ReaderError> {
    let mut headings = Vec::new();
    let mut buf = vec![0u8; OUTLINE_WINDOW];
    let mut offset = 0u64;

    while offset < total_bytes {
        let read = read_full(source, offset, &mut buf)?;
        if read == 0 {
            break;
        }
        let text = decode::decode(&buf[..read])?;
        headings.extend(headings_in(&text));
        offset += read as u64;
    }

    debug!(count = headings.len(), "extracted outline");
    Ok(headings)
}

/// Heading lines found in one decoded window, in order of appearance.
pub fn headings_in(text: &str) -> Vec<String> {
    HEADING
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}
