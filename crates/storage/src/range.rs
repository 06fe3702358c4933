//! Lazy prefix ranges
//!
//! A [`Range`] pulls pairs from a [`VersionedStore`] one page at a time.
//! Each page is read under the structure's shared latch and the next page
//! seeks strictly after the last key returned, so a range never holds a
//! latch between pages and survives concurrent inserts, bursts and
//! garbage collection without repeating or skipping keys visible to its
//! view.

use std::collections::VecDeque;
use std::fmt;
use strata_core::ReadView;

use crate::store::VersionedStore;

/// Pairs fetched per page
pub const DEFAULT_RANGE_PAGE_SIZE: usize = 64;

/// Iterator over the visible pairs whose key starts with a prefix
pub struct Range<'a, V> {
    store: &'a dyn VersionedStore<V>,
    prefix: String,
    view: ReadView,
    page_size: usize,
    cursor: Option<String>,
    buffered: VecDeque<(String, V)>,
    exhausted: bool,
}

impl<'a, V> Range<'a, V> {
    /// Range over `store` at `view`
    pub fn new(store: &'a dyn VersionedStore<V>, prefix: &str, view: ReadView) -> Self {
        Range {
            store,
            prefix: prefix.to_string(),
            view,
            page_size: DEFAULT_RANGE_PAGE_SIZE,
            cursor: None,
            buffered: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Override the page size (at least one)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Prefix being scanned
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// View the range reads at
    pub fn view(&self) -> ReadView {
        self.view
    }

    /// Start over from the first key
    pub fn restart(&mut self) {
        self.cursor = None;
        self.buffered.clear();
        self.exhausted = false;
    }

    fn fill(&mut self) {
        let page = self
            .store
            .scan(&self.prefix, self.cursor.as_deref(), self.view, self.page_size);
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some((last, _)) = page.last() {
            self.cursor = Some(last.clone());
        }
        self.buffered.extend(page);
    }
}

impl<'a, V> Iterator for Range<'a, V> {
    type Item = (String, V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffered.is_empty() && !self.exhausted {
            self.fill();
        }
        self.buffered.pop_front()
    }
}

impl<'a, V> fmt::Debug for Range<'a, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Range")
            .field("prefix", &self.prefix)
            .field("view", &self.view)
            .field("cursor", &self.cursor)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
