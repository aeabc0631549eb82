//! Cursor-paginated enumeration of the source library into the ledger.
//!
//! Both walks follow the same rules: request a page (through the retrier),
//! persist every item, then stop when the page is empty or carries no next
//! cursor. A page that cannot be fetched ends that walk early; the items
//! already persisted stay valid.

pub mod album;
pub mod file;

pub use album::AlbumEnumerator;
pub use file::FileEnumerator;

use crate::source::types::Page;

/// Outcome of one walk (the album walk, or a single album's file walk).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub pages: u64,
    pub items: u64,
    /// False when a page exhausted its retries and the walk was cut short.
    pub completed: bool,
}

/// Cursor for the next request, or `None` when the walk is finished.
pub(crate) fn next_cursor<T>(page: &Page<T>) -> Option<String> {
    if page.list.is_empty() {
        return None;
    }
    page.next_cursor().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(items: usize, cursor: Option<&str>) -> Page<u32> {
        Page {
            list: (0..items as u32).collect(),
            cursor: cursor.map(str::to_string),
            errno: 0,
        }
    }

    #[test]
    fn test_continues_with_items_and_cursor() {
        assert_eq!(next_cursor(&page(3, Some("c2"))), Some("c2".to_string()));
    }

    #[test]
    fn test_stops_on_empty_list_even_with_cursor() {
        assert_eq!(next_cursor(&page(0, Some("c2"))), None);
    }

    #[test]
    fn test_stops_on_missing_or_empty_cursor() {
        assert_eq!(next_cursor(&page(3, None)), None);
        assert_eq!(next_cursor(&page(3, Some(""))), None);
    }
}
