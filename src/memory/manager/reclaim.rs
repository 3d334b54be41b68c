/*!
 * Block Reclamation
 * Release, eager coalescing and page return
 */

use super::free_list::BlockRef;
use super::MemoryManager;
use crate::core::limits::{BLOCK_HEADER_SIZE, PAGES_PER_REQUEST};
use crate::core::types::{Address, FamilyId, PageId, Size};
use crate::memory::types::{fatal, MemoryError, MemoryResult};
use std::ptr::NonNull;
use tracing::{debug, instrument, trace, warn};

impl MemoryManager {
    /// Return an allocation to its family
    ///
    /// The block merges with any free neighbor, and a page left with nothing
    /// allocated is handed back to the page source right away. Releasing an
    /// already-free block is fatal; a pointer this manager never returned
    /// yields `InvalidAddress` and changes nothing.
    #[instrument(level = "debug", skip(self))]
    pub fn release(&mut self, ptr: NonNull<u8>) -> MemoryResult<()> {
        let block = match self.locate(ptr) {
            Ok(block) => block,
            Err(err @ MemoryError::DoubleFree(_)) => fatal(err),
            Err(err) => {
                warn!(error = %err, "Rejected release");
                return Err(err);
            }
        };

        let family = self.free_block(block);
        self.debug_audit(family);
        Ok(())
    }

    /// True if `ptr` is the start of a live allocation from this manager
    pub fn is_valid(&self, ptr: NonNull<u8>) -> bool {
        self.locate(ptr).is_ok()
    }

    /// Payload bytes behind a live allocation
    ///
    /// Can exceed the requested size when a split left too little room for
    /// another block header.
    pub fn block_size(&self, ptr: NonNull<u8>) -> Option<Size> {
        let at = self.locate(ptr).ok()?;
        self.pages.get(at.page)?.block(at.offset).map(|b| b.size)
    }

    /// Page serving a live allocation
    pub fn page_of(&self, ptr: NonNull<u8>) -> MemoryResult<PageId> {
        self.locate(ptr).map(|at| at.page)
    }

    /// Map a user pointer back to the block it was carved from
    fn locate(&self, ptr: NonNull<u8>) -> MemoryResult<BlockRef> {
        let addr = ptr.as_ptr() as Address;
        let base = addr & !(self.page_size - 1);
        let invalid = || MemoryError::InvalidAddress(addr);

        let page_id = self.pages.resolve(base).ok_or_else(invalid)?;
        let page = self.pages.get(page_id).ok_or_else(invalid)?;
        let offset = addr - base;
        let block = page.containing(offset).ok_or_else(invalid)?;

        if block.is_free {
            return Err(MemoryError::DoubleFree(addr));
        }
        if block.offset + BLOCK_HEADER_SIZE != offset {
            return Err(invalid());
        }
        Ok(BlockRef {
            page: page_id,
            offset: block.offset,
        })
    }

    /// Free a located block, coalesce, and return its page if it emptied
    fn free_block(&mut self, at: BlockRef) -> FamilyId {
        let Self {
            families,
            pages,
            source,
            ..
        } = self;

        let Some(page) = pages.get_mut(at.page) else {
            fatal(MemoryError::CorruptionDetected {
                family: "?".to_string(),
                detail: format!("{} missing from page arena", at.page),
            })
        };
        let family = page.family();
        let Some(owner) = families.get_mut(family.index()) else {
            fatal(MemoryError::CorruptionDetected {
                family: family.to_string(),
                detail: format!("{} refers to an unknown family", at.page),
            })
        };

        let next = match page.block_mut(at.offset) {
            Some(block) => {
                block.is_free = true;
                block.next
            }
            None => fatal(owner.corruption(format!("no block at {}+{}", at.page, at.offset))),
        };

        if let Some(next_offset) = next {
            let neighbor = page.block(next_offset).copied();
            if let Some(neighbor) = neighbor.filter(|b| b.is_free) {
                let indexed = BlockRef {
                    page: at.page,
                    offset: next_offset,
                };
                if !owner.free_index.remove(neighbor.size, indexed) {
                    fatal(owner.corruption(format!(
                        "free block at {}+{} missing from free index",
                        at.page, next_offset
                    )));
                }
                page.unlink(next_offset);
                trace!(page = %at.page, offset = at.offset, absorbed = next_offset, "Merged with next block");
            }
        }

        let mut survivor = at.offset;
        let prev = page.block(at.offset).and_then(|b| b.prev);
        if let Some(prev_offset) = prev {
            let neighbor = page.block(prev_offset).copied();
            if let Some(neighbor) = neighbor.filter(|b| b.is_free) {
                let indexed = BlockRef {
                    page: at.page,
                    offset: prev_offset,
                };
                if !owner.free_index.remove(neighbor.size, indexed) {
                    fatal(owner.corruption(format!(
                        "free block at {}+{} missing from free index",
                        at.page, prev_offset
                    )));
                }
                page.unlink(at.offset);
                survivor = prev_offset;
                trace!(page = %at.page, offset = prev_offset, absorbed = at.offset, "Merged into previous block");
            }
        }

        let size = page.refit(survivor);

        if page.is_empty() {
            owner.pages.retain(|&id| id != at.page);
            if let Some(page) = pages.remove(at.page) {
                // SAFETY: the page came from `request(PAGES_PER_REQUEST)` and no
                // block on it is allocated any more
                unsafe { source.release(page.base(), PAGES_PER_REQUEST) };
            }
            debug!(
                family = %family,
                page = %at.page,
                pages = owner.pages.len(),
                "Returned empty VM page"
            );
        } else {
            owner.free_index.insert(
                size,
                BlockRef {
                    page: at.page,
                    offset: survivor,
                },
            );
            debug!(family = %family, page = %at.page, offset = survivor, size, "Released block");
        }

        family
    }
}
