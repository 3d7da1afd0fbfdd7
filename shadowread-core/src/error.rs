use std::io;

use thiserror::Error;

use crate::decode::CHAR_WIDTH;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("byte span of {len} bytes is not a whole number of {width}-byte units", width = CHAR_WIDTH)]
    Misaligned { len: usize },
    #[error("invalid code point {value:#x} at byte {offset}")]
    InvalidCodePoint { value: u32, offset: usize },
}

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),
    #[error("decode failure: {0}")]
    Decode(#[from] DecodeError),
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),
    #[error("page size must be positive")]
    InvalidPageSize,
    #[error("search keyword is empty")]
    EmptyKeyword,
    #[error("document handle has been released")]
    Released,
}
