use tracing::debug;

use crate::favorites::FavoritesStore;
use crate::model::{PhotoRecord, ResultSet};
use crate::FeedError;

/// Cursor over a result set for the full-screen detail view.
///
/// Stepping stops at either end; there is no wraparound. An empty pager is
/// allowed but has no current photo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetailPager {
    items: ResultSet,
    index: usize,
}

impl DetailPager {
    /// Fails with `OutOfRange` when `start` is past the end of a non-empty
    /// set. Out-of-range starts are not clamped.
    pub fn new(items: ResultSet, start: usize) -> Result<Self, FeedError> {
        if items.is_empty() {
            return Ok(Self { items, index: 0 });
        }
        if start >= items.len() {
            return Err(FeedError::OutOfRange {
                index: start,
                len: items.len(),
            });
        }
        Ok(Self {
            items,
            index: start,
        })
    }

    /// Returns whether the index moved.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        if self.has_next() {
            self.index += 1;
            true
        } else {
            debug!(index = self.index, "already at last photo");
            false
        }
    }

    pub fn previous(&mut self) -> bool {
        if self.has_previous() {
            self.index -= 1;
            true
        } else {
            false
        }
    }

    pub fn current(&self) -> Result<&PhotoRecord, FeedError> {
        self.items.get(self.index).ok_or(FeedError::OutOfRange {
            index: self.index,
            len: self.items.len(),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_next(&self) -> bool {
        self.index + 1 < self.items.len()
    }

    pub fn has_previous(&self) -> bool {
        self.index > 0
    }

    /// 1-based `(current, total)`, or `None` when empty.
    pub fn position(&self) -> Option<(usize, usize)> {
        (!self.is_empty()).then(|| (self.index + 1, self.items.len()))
    }

    pub fn position_label(&self) -> Option<String> {
        self.position()
            .map(|(current, total)| format!("({current} of {total})"))
    }

    pub fn items(&self) -> &ResultSet {
        &self.items
    }

    pub fn is_favorite(&self, favorites: &FavoritesStore) -> bool {
        self.current()
            .is_ok_and(|photo| favorites.contains(photo.id()))
    }

    /// Favorites or unfavorites the current photo and returns the new state.
    pub fn toggle_favorite(&self, favorites: &FavoritesStore) -> Result<bool, FeedError> {
        let photo = self.current()?;
        Ok(favorites.toggle(photo))
    }
}
