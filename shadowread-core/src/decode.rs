//! Fixed-width text codec.
//!
//! Documents are stored as little-endian 32-bit code points, so every
//! character occupies exactly [`CHAR_WIDTH`] bytes and a byte offset that is a
//! multiple of the width always lands on a character boundary.

use crate::error::DecodeError;

/// Bytes per character in the stored document encoding.
pub const CHAR_WIDTH: usize = 4;

pub fn decode(bytes: &[u8]) -> Result<String, DecodeError> {
    if bytes.len() % CHAR_WIDTH != 0 {
        return Err(DecodeError::Misaligned { len: bytes.len() });
    }

    let mut text = String::with_capacity(bytes.len() / CHAR_WIDTH);
    for (index, unit) in bytes.chunks_exact(CHAR_WIDTH).enumerate() {
        let value = u32::from_le_bytes([unit[0], unit[1], unit[2], unit[3]]);
        let ch = char::from_u32(value).ok_or(DecodeError::InvalidCodePoint {
            value,
            offset: index * CHAR_WIDTH,
        })?;
        text.push(ch);
    }
    Ok(text)
}

pub fn encode(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.chars().count() * CHAR_WIDTH);
    for ch in text.chars() {
        bytes.extend_from_slice(&(ch as u32).to_le_bytes());
    }
    bytes
}
