//! kubedeck selection: name filter, recency sort and page window over any resource kind.
//!
//! Every listable kind implements [`Cell`]; [`select`] then runs the same pipeline
//! for all of them: filter, then sort, then paginate. The match total is taken
//! after filtering and before paging.

#![forbid(unsafe_code)]

mod cells;

use chrono::{DateTime, Utc};
use deck_core::{DeckError, DeckResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use cells::Cell;

/// Validated selection parameters. Construction fails fast on a non-positive
/// page size or page number, so the engine never sees one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSelectionQuery")]
pub struct SelectionQuery {
    name: String,
    page_size: usize,
    page: usize,
}

impl SelectionQuery {
    pub fn new(name: impl Into<String>, page_size: i64, page: i64) -> DeckResult<Self> {
        if page_size < 1 {
            return Err(DeckError::validation(format!("page size must be > 0 (got {})", page_size)));
        }
        if page < 1 {
            return Err(DeckError::validation(format!("page number must be >= 1 (got {})", page)));
        }
        Ok(Self { name: name.into(), page_size: page_size as usize, page: page as usize })
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn page_size(&self) -> usize { self.page_size }
    pub fn page(&self) -> usize { self.page }

    /// Zero-based `[start, end)` of the requested page, before clamping to a list length.
    pub fn window(&self) -> (usize, usize) {
        let start = self.page_size.saturating_mul(self.page.saturating_sub(1));
        let end = self.page_size.saturating_mul(self.page);
        (start, end)
    }
}

// Wire form; decoding goes through `SelectionQuery::new`.
#[derive(Deserialize)]
struct RawSelectionQuery {
    #[serde(default)]
    name: String,
    page_size: i64,
    page: i64,
}

impl TryFrom<RawSelectionQuery> for SelectionQuery {
    type Error = DeckError;

    fn try_from(raw: RawSelectionQuery) -> DeckResult<Self> { Self::new(raw.name, raw.page_size, raw.page) }
}

/// Windowed, ordered result plus the number of items that matched the filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Keep cells whose name contains `needle` (case-sensitive). An empty needle keeps all.
pub fn filter<T: Cell>(items: Vec<T>, needle: &str) -> Vec<T> {
    if needle.is_empty() {
        return items;
    }
    items.into_iter().filter(|c| c.name().contains(needle)).collect()
}

/// Most recently created first. Stable: equal timestamps keep their input order.
pub fn sort<T: Cell>(mut items: Vec<T>) -> Vec<T> {
    items.sort_by(|a, b| b.created().cmp(&a.created()));
    items
}

/// Cut the page window out of `items`. A window past the end is empty, not an error.
pub fn paginate<T>(items: Vec<T>, query: &SelectionQuery) -> Vec<T> {
    let (start, end) = query.window();
    let end = end.min(items.len());
    if start >= end {
        return Vec::new();
    }
    items.into_iter().skip(start).take(end - start).collect()
}

/// Filter, sort and paginate, in that order.
pub fn select<T: Cell>(items: Vec<T>, query: &SelectionQuery) -> Selection<T> {
    let listed = items.len();
    let filtered = filter(items, query.name());
    let total = filtered.len();
    let page = paginate(sort(filtered), query);
    metrics::histogram!("select_total_matched", total as f64);
    debug!(listed, total, returned = page.len(), page = query.page(), size = query.page_size(), "select");
    Selection { items: page, total }
}

/// Fallback creation time for objects the server has not stamped; sorts last.
pub fn unset_creation() -> DateTime<Utc> { DateTime::<Utc>::MIN_UTC }
