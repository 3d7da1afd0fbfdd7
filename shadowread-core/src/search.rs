//! Forward keyword search that pages through the document.
//!
//! Text is matched as it streams in page by page, so a keyword may begin on
//! one page and finish on the next. Only a bounded tail of the streamed text
//! is retained for building the result.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::ReaderError;
use crate::navigator::PageResult;
use crate::Parser;

/// Characters of streamed text kept for building a search result.
pub const DEFAULT_SEARCH_WINDOW: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Any mismatch drops the partial match and matching restarts at the
    /// next character. Keywords with a repeated prefix ("aab" in "aaab") can
    /// be missed.
    #[default]
    Restart,
    /// Falls back to the longest partial match that is still viable.
    Prefix,
}

struct KeywordMatcher {
    keyword: Vec<char>,
    fallback: Vec<usize>,
    matched: usize,
    mode: MatchMode,
}

impl KeywordMatcher {
    fn new(keyword: &str, mode: MatchMode) -> Self {
        let keyword: Vec<char> = keyword.chars().collect();
        let fallback = prefix_function(&keyword);
        Self {
            keyword,
            fallback,
            matched: 0,
            mode,
        }
    }

    /// Feeds one character. Returns true once the whole keyword has matched.
    fn feed(&mut self, ch: char) -> bool {
        match self.mode {
            MatchMode::Restart => {
                if ch == self.keyword[self.matched] {
                    self.matched += 1;
                } else {
                    self.matched = 0;
                }
            }
            MatchMode::Prefix => {
                while self.matched > 0 && ch != self.keyword[self.matched] {
                    self.matched = self.fallback[self.matched - 1];
                }
                if ch == self.keyword[self.matched] {
                    self.matched += 1;
                }
            }
        }
        self.matched == self.keyword.len()
    }

    fn len(&self) -> usize {
        self.keyword.len()
    }
}

fn prefix_function(pattern: &[char]) -> Vec<usize> {
    let mut table = vec![0; pattern.len()];
    let mut k = 0;
    for i in 1..pattern.len() {
        while k > 0 && pattern[i] != pattern[k] {
            k = table[k - 1];
        }
        if pattern[i] == pattern[k] {
            k += 1;
        }
        table[i] = k;
    }
    table
}

/// Per-call search bookkeeping.
struct SearchState {
    matcher: KeywordMatcher,
    /// Tail of the streamed text, at most `window` characters.
    accumulated: VecDeque<char>,
    /// Characters dropped from the front of `accumulated` so far.
    consumed_text_offset: usize,
    /// Characters streamed so far.
    streamed: usize,
    /// Whether the previous page ended inside a partial match.
    saw_partial_match_at_page_end: bool,
}

impl SearchState {
    fn push_page(&mut self, text: &str, window: usize) {
        self.accumulated.extend(text.chars());
        if self.accumulated.len() > window {
            let dropped = self.accumulated.len() - window;
            self.accumulated.drain(..dropped);
            self.consumed_text_offset += dropped;
        }
    }

    /// The retained text from its front, capped to `limit` characters.
    fn retained(&self, limit: usize) -> String {
        self.accumulated.iter().take(limit).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchEngine {
    window: usize,
    mode: MatchMode,
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_WINDOW, MatchMode::default())
    }
}

impl SearchEngine {
    pub fn new(window: usize, mode: MatchMode) -> Self {
        Self {
            window: window.max(1),
            mode,
        }
    }

    /// Pages forward until `keyword` is found.
    ///
    /// The result is the retained search window from its front, capped to
    /// `page_size` characters, so text of earlier pages still in the window
    /// leads the result. When the match began on the previously streamed
    /// page, that page is fetched again through [`Parser::fetch_backward`].
    /// Returns the end-of-document sentinel when the keyword never appears.
    #[instrument(skip(self, parser))]
    pub fn search_forward<P: Parser + ?Sized>(
        &self,
        parser: &mut P,
        keyword: &str,
        page_size: usize,
    ) -> Result<PageResult, ReaderError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(ReaderError::EmptyKeyword);
        }

        let mut state = SearchState {
            matcher: KeywordMatcher::new(keyword, self.mode),
            accumulated: VecDeque::with_capacity(self.window + page_size),
            consumed_text_offset: 0,
            streamed: 0,
            saw_partial_match_at_page_end: false,
        };

        loop {
            let page = parser.fetch_forward(page_size)?;
            if page.is_end_of_document() {
                debug!("keyword not found before end of document");
                return Ok(PageResult::end_of_document());
            }

            let page_start = state.streamed;
            state.push_page(&page.text, self.window);

            for ch in page.text.chars() {
                let position = state.streamed;
                state.streamed += 1;
                if !state.matcher.feed(ch) {
                    continue;
                }

                let match_start = position + 1 - state.matcher.len();
                if state.saw_partial_match_at_page_end && match_start < page_start {
                    debug!(match_start, page_start, "match straddles page boundary");
                    return parser.fetch_backward(page_size);
                }

                debug!(match_start, skipped = state.consumed_text_offset, "keyword found");
                return Ok(PageResult {
                    text: state.retained(page_size),
                    bytes_consumed: page.bytes_consumed,
                });
            }

            state.saw_partial_match_at_page_end = state.matcher.matched > 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::encode;
    use crate::navigator::PageNavigator;
    use crate::source::MemoryByteSource;

    fn navigator(text: &str) -> PageNavigator<MemoryByteSource> {
        PageNavigator::new(MemoryByteSource::new(encode(text)), 0)
    }

    #[test]
    fn finds_keyword_on_first_page() {
        let mut nav = navigator("hello world\nsecond line\n");
        let engine = SearchEngine::default();
        let hit = engine.search_forward(&mut nav, "world", 20).unwrap();
        assert_eq!(hit.text, "hello world");

        let mut reference = navigator("hello world\nsecond line\n");
        reference.fetch_forward(20).unwrap();
        assert_eq!(nav.current_percent(), reference.current_percent());
        assert_eq!(nav.persisted_cursor(), 0);
    }

    #[test]
    fn keyword_is_trimmed() {
        let mut nav = navigator("alpha\nbeta gamma\n");
        let hit = SearchEngine::default()
            .search_forward(&mut nav, "  gamma \t", 20)
            .unwrap();
        assert!(hit.text.ends_with("beta gamma"));
    }

    #[test]
    fn result_leads_with_earlier_pages_still_in_window() {
        let mut nav = navigator("alpha\nbeta gamma\nafter\n");
        let hit = SearchEngine::default()
            .search_forward(&mut nav, "gamma", 20)
            .unwrap();
        assert_eq!(hit.text, "alphabeta gamma");
        assert_eq!(nav.persisted_cursor(), 6 * 4);

        let mut nav = navigator("one\ntwo\nthree cat\n");
        let hit = SearchEngine::default()
            .search_forward(&mut nav, "cat", 10)
            .unwrap();
        assert_eq!(hit.text, "onetwothre");
    }

    #[test]
    fn straddling_match_resolves_to_earlier_page() {
        // pages: "xxxxthe ca", "t sat down", "by the fir", "e"
        let mut nav = navigator("xxxxthe cat sat down by the fire");
        let engine = SearchEngine::default();
        let hit = engine.search_forward(&mut nav, "cat", 10).unwrap();
        assert_eq!(hit.text, "xxxxthe ca");
        assert_eq!(nav.persisted_cursor(), 0);
    }

    #[test]
    fn match_after_abandoned_partial_stays_on_current_page() {
        // page 1 ends with "ca", page 2 breaks it off and then holds a full "cat"
        let mut nav = navigator("xxxxxxxxcaxx cat xx");
        let hit = SearchEngine::default()
            .search_forward(&mut nav, "cat", 10)
            .unwrap();
        assert_eq!(hit.text, "xxxxxxxxca");
        assert_eq!(nav.persisted_cursor(), 10 * 4);
    }

    #[test]
    fn missing_keyword_reaches_end_of_document() {
        let mut nav = navigator("one\ntwo\nthree\n");
        nav.fetch_forward(10).unwrap();
        nav.fetch_forward(10).unwrap();
        let displayed = nav.persisted_cursor();

        let result = SearchEngine::default()
            .search_forward(&mut nav, "zebra", 10)
            .unwrap();
        assert!(result.is_end_of_document());
        assert_eq!(nav.cursor(), nav.total_bytes());
        assert_eq!(nav.persisted_cursor(), displayed + 4 * 4);
    }

    #[test]
    fn empty_keyword_is_rejected() {
        let mut nav = navigator("text\n");
        assert!(matches!(
            SearchEngine::default().search_forward(&mut nav, "   ", 10),
            Err(ReaderError::EmptyKeyword)
        ));
        assert_eq!(nav.cursor(), 0);
    }

    #[test]
    fn restart_mode_misses_repeated_prefix_keywords() {
        let mut nav = navigator("xaab\n");
        let result = SearchEngine::new(DEFAULT_SEARCH_WINDOW, MatchMode::Restart)
            .search_forward(&mut nav, "ab", 10)
            .unwrap();
        assert!(result.is_end_of_document());
    }

    #[test]
    fn prefix_mode_finds_repeated_prefix_keywords() {
        let mut nav = navigator("xaab\n");
        let result = SearchEngine::new(DEFAULT_SEARCH_WINDOW, MatchMode::Prefix)
            .search_forward(&mut nav, "ab", 10)
            .unwrap();
        assert_eq!(result.text, "xaab");

        let mut nav = navigator("aaab\n");
        let result = SearchEngine::new(DEFAULT_SEARCH_WINDOW, MatchMode::Prefix)
            .search_forward(&mut nav, "aab", 10)
            .unwrap();
        assert_eq!(result.text, "aaab");
    }

    #[test]
    fn result_slice_is_bounded_by_window_and_page_size() {
        let line: String = std::iter::repeat('y').take(95).chain("needle".chars()).collect();
        let mut nav = navigator(&format!("{}\n", line));
        let hit = SearchEngine::new(20, MatchMode::Restart)
            .search_forward(&mut nav, "needle", 200)
            .unwrap();
        assert_eq!(hit.text.chars().count(), 20);
        assert!(hit.text.ends_with("needle"));
    }

    #[test]
    fn keyword_longer_than_a_page_resolves_to_page_before_completion() {
        // pages: "short", "need", "le li", ...
        let mut nav = navigator("short needle line\n");
        let hit = SearchEngine::default()
            .search_forward(&mut nav, "needle", 5)
            .unwrap();
        assert_eq!(hit.text, "need");
        assert_eq!(nav.persisted_cursor(), 5 * 4);
    }

    #[test]
    fn prefix_function_matches_reference_values() {
        let pattern: Vec<char> = "aabaaab".chars().collect();
        assert_eq!(prefix_function(&pattern), vec![0, 1, 0, 1, 2, 2, 3]);
    }
}
