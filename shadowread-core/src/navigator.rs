//! Page-at-a-time reading over a fixed-width encoded document.
//!
//! The navigator owns a byte cursor marking how much of the document has been
//! consumed. Each page is decoded from a bounded read, cut at the first line
//! break, and only the bytes up to and including that break are committed, so
//! the cursor always stays on a character boundary and the rest of the read
//! buffer is simply read again on the next call.

use tracing::{debug, instrument, trace};

use crate::decode::{self, CHAR_WIDTH};
use crate::error::ReaderError;
use crate::outline;
use crate::source::{read_full, ByteSource};
use crate::store::BookState;
use crate::Parser;

/// One decoded page and the number of bytes it used up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageResult {
    pub text: String,
    pub bytes_consumed: u64,
}

impl PageResult {
    pub fn new(text: impl Into<String>, bytes_consumed: u64) -> Self {
        Self {
            text: text.into(),
            bytes_consumed,
        }
    }

    /// The sentinel returned when no further text exists.
    pub fn end_of_document() -> Self {
        Self::default()
    }

    pub fn is_end_of_document(&self) -> bool {
        self.text.is_empty()
    }
}

pub struct PageNavigator<S: ByteSource> {
    source: Option<S>,
    total_bytes: u64,
    cursor: u64,
    /// Cursor value at the start of the page most recently returned.
    page_start: u64,
}

impl<S: ByteSource> PageNavigator<S> {
    pub fn new(source: S, cursor: u64) -> Self {
        let total_bytes = source.size();
        let cursor = align_down(cursor.min(total_bytes));
        Self {
            source: Some(source),
            total_bytes,
            cursor,
            page_start: cursor,
        }
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Where a resumed session should start: the beginning of the page on
    /// display, so that reopening shows it again instead of skipping it.
    pub fn persisted_cursor(&self) -> u64 {
        self.page_start
    }

    /// Performs one read at `at` without touching the cursor.
    pub fn read_page(&mut self, page_size: usize, at: u64) -> Result<PageResult, ReaderError> {
        let source = self.source.as_mut().ok_or(ReaderError::Released)?;
        let remaining = self.total_bytes.saturating_sub(at);
        let requested = (page_size.saturating_mul(CHAR_WIDTH) as u64).min(remaining) as usize;
        if requested == 0 {
            return Ok(PageResult::end_of_document());
        }

        let mut buf = vec![0u8; requested];
        let read = read_full(source, at, &mut buf)?;
        if read == 0 {
            return Ok(PageResult::end_of_document());
        }
        buf.truncate(read);

        let mut text = decode::decode(&buf)?;
        let mut consumed = read as u64;
        if let Some(byte_index) = text.find('\n') {
            let chars = text[..byte_index].chars().count();
            consumed = ((chars + 1) * CHAR_WIDTH) as u64;
            text.truncate(byte_index);
        }

        let text = text.replace('\r', "").trim().to_string();
        Ok(PageResult {
            text,
            bytes_consumed: consumed,
        })
    }

    fn source_mut(&mut self) -> Result<&mut S, ReaderError> {
        self.source.as_mut().ok_or(ReaderError::Released)
    }
}

impl<S: ByteSource> Parser for PageNavigator<S> {
    #[instrument(skip(self))]
    fn fetch_forward(&mut self, page_size: usize) -> Result<PageResult, ReaderError> {
        if page_size == 0 {
            return Err(ReaderError::InvalidPageSize);
        }
        if self.source.is_none() {
            return Err(ReaderError::Released);
        }

        while self.cursor < self.total_bytes {
            let start = self.cursor;
            let page = self.read_page(page_size, start)?;
            if page.bytes_consumed == 0 {
                break;
            }
            self.cursor = (start + page.bytes_consumed).min(self.total_bytes);
            if page.is_end_of_document() {
                trace!(start, skipped = page.bytes_consumed, "skipped blank span");
                continue;
            }
            self.page_start = start;
            return Ok(page);
        }

        debug!(cursor = self.cursor, "end of document");
        Ok(PageResult::end_of_document())
    }

    fn fetch_backward(&mut self, page_size: usize) -> Result<PageResult, ReaderError> {
        if page_size == 0 {
            return Err(ReaderError::InvalidPageSize);
        }
        let rewind = page_size.saturating_mul(2 * CHAR_WIDTH) as u64;
        self.cursor = self.cursor.saturating_sub(rewind);
        self.fetch_forward(page_size)
    }

    fn current_percent(&self) -> String {
        if self.total_bytes == 0 {
            return "0.00%".to_string();
        }
        format!(
            "{:.2}%",
            self.cursor as f64 / self.total_bytes as f64 * 100.0
        )
    }

    fn persisted_state(&self) -> BookState {
        BookState::local(self.persisted_cursor())
    }

    #[instrument(skip(self))]
    fn outline(&mut self) -> Result<Vec<String>, ReaderError> {
        let total_bytes = self.total_bytes;
        let source = self.source_mut()?;
        outline::extract_headings(source, total_bytes)
    }

    fn release(&mut self) {
        if self.source.take().is_some() {
            debug!("released byte source");
        }
    }
}

fn align_down(offset: u64) -> u64 {
    offset - offset % CHAR_WIDTH as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::encode;
    use crate::source::MemoryByteSource;

    fn navigator(text: &str) -> PageNavigator<MemoryByteSource> {
        PageNavigator::new(MemoryByteSource::new(encode(text)), 0)
    }

    fn bytes(chars: usize) -> u64 {
        (chars * CHAR_WIDTH) as u64
    }

    #[test]
    fn page_is_cut_at_first_line_break() {
        let mut nav = navigator("hello\r\nworld\n");
        let page = nav.fetch_forward(20).unwrap();
        assert_eq!(page.text, "hello");
        assert_eq!(page.bytes_consumed, bytes(7));
        assert_eq!(nav.cursor(), bytes(7));

        let page = nav.fetch_forward(20).unwrap();
        assert_eq!(page.text, "world");
        assert_eq!(nav.cursor(), nav.total_bytes());
        assert!(nav.fetch_forward(20).unwrap().is_end_of_document());
    }

    #[test]
    fn long_lines_split_at_page_boundary() {
        let mut nav = navigator("abcdefghij\n");
        assert_eq!(nav.fetch_forward(4).unwrap().text, "abcd");
        assert_eq!(nav.fetch_forward(4).unwrap().text, "efgh");
        let page = nav.fetch_forward(4).unwrap();
        assert_eq!(page.text, "ij");
        assert_eq!(page.bytes_consumed, bytes(3));
    }

    #[test]
    fn blank_lines_are_skipped_transparently() {
        let mut nav = navigator("\n\r\n   \n\nfirst\n\n\n");
        let page = nav.fetch_forward(10).unwrap();
        assert_eq!(page.text, "first");
        assert_eq!(nav.persisted_cursor(), bytes(8));

        let end = nav.fetch_forward(10).unwrap();
        assert!(end.is_end_of_document());
        assert_eq!(nav.cursor(), nav.total_bytes());
        assert_eq!(nav.persisted_cursor(), bytes(8));
    }

    #[test]
    fn pages_never_contain_line_breaks_or_carriage_returns() {
        let mut nav = navigator("  one\r\ntwo  \r\n\r\nthree four five six\rseven\n");
        loop {
            let page = nav.fetch_forward(6).unwrap();
            if page.is_end_of_document() {
                break;
            }
            assert!(!page.text.contains('\n'));
            assert!(!page.text.contains('\r'));
            assert_eq!(page.text, page.text.trim());
        }
    }

    #[test]
    fn cursor_and_percent_never_decrease_when_reading_forward() {
        let mut nav = navigator("a line\nanother line\n\nshort\nthe final line of the book\n");
        let mut last_cursor = 0;
        let mut last_percent = 0.0f64;
        while !nav.fetch_forward(8).unwrap().is_end_of_document() {
            assert!(nav.cursor() >= last_cursor);
            let percent: f64 = nav
                .current_percent()
                .trim_end_matches('%')
                .parse()
                .unwrap();
            assert!(percent >= last_percent);
            last_cursor = nav.cursor();
            last_percent = percent;
        }
        assert_eq!(nav.current_percent(), "100.00%");
    }

    #[test]
    fn backward_rewinds_two_pages_and_reads_forward() {
        let mut nav = navigator("aaaabbbbccccdddd");
        assert_eq!(nav.fetch_forward(4).unwrap().text, "aaaa");
        assert_eq!(nav.fetch_forward(4).unwrap().text, "bbbb");
        assert_eq!(nav.fetch_forward(4).unwrap().text, "cccc");

        let before = nav.cursor();
        assert_eq!(nav.fetch_backward(4).unwrap().text, "bbbb");
        assert!(nav.cursor() <= before);
        assert_eq!(nav.fetch_forward(4).unwrap().text, "cccc");
    }

    #[test]
    fn backward_at_start_redisplays_first_page() {
        let mut nav = navigator("first\nsecond\n");
        assert_eq!(nav.fetch_forward(10).unwrap().text, "first");
        assert_eq!(nav.fetch_backward(10).unwrap().text, "first");
        assert_eq!(nav.persisted_cursor(), 0);
    }

    #[test]
    fn persisted_cursor_points_at_displayed_page() {
        let mut nav = navigator("one\ntwo\nthree\n");
        nav.fetch_forward(10).unwrap();
        nav.fetch_forward(10).unwrap();
        assert_eq!(nav.persisted_state(), BookState::local(bytes(4)));

        let mut resumed = PageNavigator::new(
            MemoryByteSource::new(encode("one\ntwo\nthree\n")),
            nav.persisted_cursor(),
        );
        assert_eq!(resumed.fetch_forward(10).unwrap().text, "two");
    }

    #[test]
    fn restored_cursor_is_clamped_and_aligned() {
        let nav = PageNavigator::new(MemoryByteSource::new(encode("abc")), 7);
        assert_eq!(nav.cursor(), 4);
        let nav = PageNavigator::new(MemoryByteSource::new(encode("abc")), 1_000);
        assert_eq!(nav.cursor(), 12);
    }

    #[test]
    fn percent_is_formatted_with_two_decimals() {
        let mut nav = navigator("abc\ndefgh\n");
        assert_eq!(nav.current_percent(), "0.00%");
        nav.fetch_forward(10).unwrap();
        assert_eq!(nav.current_percent(), "40.00%");
        assert_eq!(navigator("").current_percent(), "0.00%");
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let mut nav = navigator("text");
        assert!(matches!(
            nav.fetch_forward(0),
            Err(ReaderError::InvalidPageSize)
        ));
        assert!(matches!(
            nav.fetch_backward(0),
            Err(ReaderError::InvalidPageSize)
        ));
    }

    #[test]
    fn malformed_bytes_fail_the_read() {
        let mut raw = encode("ok");
        raw.extend_from_slice(&0xDFFFu32.to_le_bytes());
        let mut nav = PageNavigator::new(MemoryByteSource::new(raw), 0);
        assert!(matches!(nav.fetch_forward(10), Err(ReaderError::Decode(_))));
        assert_eq!(nav.cursor(), 0);
    }

    #[test]
    fn release_is_idempotent_and_blocks_reads() {
        let mut nav = navigator("text\n");
        nav.release();
        nav.release();
        assert!(matches!(nav.fetch_forward(4), Err(ReaderError::Released)));
        assert!(matches!(nav.outline(), Err(ReaderError::Released)));
    }
}
