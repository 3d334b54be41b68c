/*!
 * VM Pages
 * Page-resident block chains and the page arena
 */

use crate::core::limits::{page_capacity, BLOCK_HEADER_SIZE, PAGE_HEADER_SIZE};
use crate::core::types::{Address, FamilyId, Offset, PageId, Size};
use ahash::AHashMap;
use std::collections::BTreeMap;
use std::ptr::NonNull;

/// Metadata of one block inside a page
///
/// `prev`/`next` are the address-order neighbors inside the same page,
/// `None` at the page boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct BlockMeta {
    pub is_free: bool,
    pub size: Size,
    pub offset: Offset,
    pub prev: Option<Offset>,
    pub next: Option<Offset>,
}

impl BlockMeta {
    /// Offset one past the end of this block's payload
    #[inline]
    pub fn end(&self) -> Offset {
        self.offset + BLOCK_HEADER_SIZE + self.size
    }
}

/// One page granted to a family
///
/// Blocks are keyed by offset; their prev/next links form the address-ordered
/// chain that covers the allocatable region with no gaps.
#[derive(Debug)]
pub(super) struct VmPage {
    base: NonNull<u8>,
    size: Size,
    family: FamilyId,
    blocks: BTreeMap<Offset, BlockMeta>,
}

// SAFETY: a page is exclusively owned by one family inside one manager; its
// memory is only touched through that manager
unsafe impl Send for VmPage {}

impl VmPage {
    /// Wrap a fresh page as one free block spanning the whole capacity
    pub fn new(base: NonNull<u8>, size: Size, family: FamilyId) -> Self {
        let first = BlockMeta {
            is_free: true,
            size: page_capacity(size) - BLOCK_HEADER_SIZE,
            offset: PAGE_HEADER_SIZE,
            prev: None,
            next: None,
        };
        let mut blocks = BTreeMap::new();
        blocks.insert(PAGE_HEADER_SIZE, first);
        Self {
            base,
            size,
            family,
            blocks,
        }
    }

    #[inline]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    #[inline]
    pub fn base_addr(&self) -> Address {
        self.base.as_ptr() as Address
    }

    #[inline]
    pub fn size(&self) -> Size {
        self.size
    }

    /// Back-reference to the owning family
    #[inline]
    pub fn family(&self) -> FamilyId {
        self.family
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, offset: Offset) -> Option<&BlockMeta> {
        self.blocks.get(&offset)
    }

    pub fn block_mut(&mut self, offset: Offset) -> Option<&mut BlockMeta> {
        self.blocks.get_mut(&offset)
    }

    /// Block whose header or payload covers `offset`
    pub fn containing(&self, offset: Offset) -> Option<&BlockMeta> {
        self.blocks
            .range(..=offset)
            .next_back()
            .map(|(_, block)| block)
            .filter(|block| offset < self.span_end(block))
    }

    /// Where the next block starts, or the page end for the last block
    #[inline]
    pub fn span_end(&self, block: &BlockMeta) -> Offset {
        block.next.unwrap_or(self.size)
    }

    /// Recompute a block's size from its literal extent in the page
    ///
    /// Slack left behind by earlier splits is absorbed here.
    pub fn refit(&mut self, offset: Offset) -> Size {
        let end = match self.blocks.get(&offset) {
            Some(block) => self.span_end(block),
            None => return 0,
        };
        match self.blocks.get_mut(&offset) {
            Some(block) => {
                block.size = end - offset - BLOCK_HEADER_SIZE;
                block.size
            }
            None => 0,
        }
    }

    /// Link `block` into the chain right after the block at `after`
    pub fn insert_after(&mut self, after: Offset, mut block: BlockMeta) {
        let next = self.blocks.get(&after).and_then(|b| b.next);
        block.prev = Some(after);
        block.next = next;

        if let Some(prev) = self.blocks.get_mut(&after) {
            prev.next = Some(block.offset);
        }
        if let Some(next) = next.and_then(|off| self.blocks.get_mut(&off)) {
            next.prev = Some(block.offset);
        }
        self.blocks.insert(block.offset, block);
    }

    /// Remove a block from the chain, stitching its neighbors together
    pub fn unlink(&mut self, offset: Offset) -> Option<BlockMeta> {
        let block = self.blocks.remove(&offset)?;
        if let Some(prev) = block.prev.and_then(|off| self.blocks.get_mut(&off)) {
            prev.next = block.next;
        }
        if let Some(next) = block.next.and_then(|off| self.blocks.get_mut(&off)) {
            next.prev = block.prev;
        }
        Some(block)
    }

    /// Blocks in address order, following the chain links
    pub fn chain(&self) -> ChainIter<'_> {
        ChainIter {
            page: self,
            cursor: Some(PAGE_HEADER_SIZE),
        }
    }

    /// True once the page holds a single free block over its whole capacity
    pub fn is_empty(&self) -> bool {
        match self.blocks.get(&PAGE_HEADER_SIZE) {
            Some(first) => {
                self.blocks.len() == 1
                    && first.is_free
                    && first.next.is_none()
                    && first.size == page_capacity(self.size) - BLOCK_HEADER_SIZE
            }
            None => false,
        }
    }

    /// First payload byte of the block at `offset`
    pub fn payload(&self, offset: Offset) -> NonNull<u8> {
        // SAFETY: block offsets always lie inside the page, so the payload
        // start is within (or one past) the page allocation
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset + BLOCK_HEADER_SIZE)) }
    }
}

/// Address-order walk over a page's chain
pub(super) struct ChainIter<'a> {
    page: &'a VmPage,
    cursor: Option<Offset>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = &'a BlockMeta;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.page.blocks.get(&self.cursor?)?;
        self.cursor = block.next;
        Some(block)
    }
}

/// Arena of live pages with stable, recyclable identifiers
#[derive(Debug, Default)]
pub(super) struct PageArena {
    slots: Vec<Option<VmPage>>,
    vacant: Vec<u32>,
    by_base: AHashMap<Address, PageId>,
}

impl PageArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, page: VmPage) -> PageId {
        let base = page.base_addr();
        let id = match self.vacant.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(page);
                PageId(slot)
            }
            None => {
                self.slots.push(Some(page));
                PageId((self.slots.len() - 1) as u32)
            }
        };
        self.by_base.insert(base, id);
        id
    }

    pub fn remove(&mut self, id: PageId) -> Option<VmPage> {
        let page = self.slots.get_mut(id.index())?.take()?;
        self.by_base.remove(&page.base_addr());
        self.vacant.push(id.0);
        Some(page)
    }

    pub fn get(&self, id: PageId) -> Option<&VmPage> {
        self.slots.get(id.index())?.as_ref()
    }

    pub fn get_mut(&mut self, id: PageId) -> Option<&mut VmPage> {
        self.slots.get_mut(id.index())?.as_mut()
    }

    /// Page whose first byte sits at `base`
    pub fn resolve(&self, base: Address) -> Option<PageId> {
        self.by_base.get(&base).copied()
    }

    pub fn len(&self) -> usize {
        self.by_base.len()
    }

    /// Take every live page out of the arena
    pub fn drain(&mut self) -> Vec<VmPage> {
        self.by_base.clear();
        self.vacant.clear();
        self.slots.drain(..).flatten().collect()
    }
}
