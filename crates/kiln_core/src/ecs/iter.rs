//! # Pool Iteration
//!
//! [`PoolIter`] walks the live slots of one pool, yielding the owning id and
//! mutable references to the fetched components.
//!
//! It is a lending iterator: each item borrows the iterator, so it is driven
//! with `while let` instead of `for`:
//!
//! ```rust,ignore
//! let mut iter = pool.iter::<(Position,)>()?;
//! while let Some((id, (position,))) = iter.next() {
//!     position.x += 1.0;
//! }
//! ```

use std::fmt;

use super::entity::EntityId;
use super::fetch::Fetch;

/// Cursor over the live slots of one pool.
pub struct PoolIter<'a, F: Fetch> {
    ids: &'a [EntityId],
    columns: F::Columns<'a>,
    cursor: usize,
}

impl<F: Fetch> fmt::Debug for PoolIter<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolIter")
            .field("fetch", &std::any::type_name::<F>())
            .field("total", &self.ids.len())
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

impl<'a, F: Fetch> PoolIter<'a, F> {
    pub(crate) fn new(ids: &'a [EntityId], columns: F::Columns<'a>) -> Self {
        Self {
            ids,
            columns,
            cursor: 0,
        }
    }

    /// Yields the next slot and advances.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<(EntityId, F::Item<'_>)> {
        let id = *self.ids.get(self.cursor)?;
        let index = self.cursor;
        self.cursor += 1;
        Some((id, F::item(&mut self.columns, index)))
    }

    /// Number of slots not yet visited.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len() - self.cursor
    }

    /// Checks if there is nothing left to visit.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks if the cursor has passed the last live slot.
    #[inline]
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cursor >= self.ids.len()
    }

    /// Total number of live slots, independent of the cursor.
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.ids.len()
    }

    /// Rewinds to the first slot.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Calls `f` on every remaining slot.
    pub fn for_each(&mut self, mut f: impl FnMut(EntityId, F::Item<'_>)) {
        while let Some((id, item)) = self.next() {
            f(id, item);
        }
    }
}
