/*!
 * Free Block Index
 * Per-family ordering of free blocks, largest first
 */

use crate::core::types::{Offset, PageId, Size};
use std::cmp::Reverse;
use std::collections::BTreeSet;

/// Location of a block: owning page plus byte offset inside it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(super) struct BlockRef {
    pub page: PageId,
    pub offset: Offset,
}

/// Free blocks of one family ordered by descending size
///
/// Entries are keyed by the size the block had when it was inserted, so a
/// block must be removed before its size changes. Ties are broken by page
/// then offset, which keeps block selection deterministic.
#[derive(Debug, Default)]
pub(super) struct FreeBlockIndex {
    entries: BTreeSet<(Reverse<Size>, BlockRef)>,
}

impl FreeBlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the block was already indexed
    pub fn insert(&mut self, size: Size, block: BlockRef) -> bool {
        self.entries.insert((Reverse(size), block))
    }

    /// Returns false if the block was not indexed under `size`
    pub fn remove(&mut self, size: Size, block: BlockRef) -> bool {
        self.entries.remove(&(Reverse(size), block))
    }

    pub fn contains(&self, size: Size, block: BlockRef) -> bool {
        self.entries.contains(&(Reverse(size), block))
    }

    /// Largest free block, if any
    pub fn peek_largest(&self) -> Option<(Size, BlockRef)> {
        self.entries
            .first()
            .map(|&(Reverse(size), block)| (size, block))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Size, BlockRef)> + '_ {
        self.entries
            .iter()
            .map(|&(Reverse(size), block)| (size, block))
    }
}
