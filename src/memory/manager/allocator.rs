/*!
 * Memory Allocator Implementation
 * Biggest-fit block selection and splitting
 */

use super::free_list::BlockRef;
use super::page::{BlockMeta, VmPage};
use super::MemoryManager;
use crate::core::limits::{BLOCK_HEADER_SIZE, PAGES_PER_REQUEST, PAGE_HEADER_SIZE};
use crate::core::types::{FamilyId, PageId, Size};
use crate::memory::types::{fatal, MemoryError, MemoryResult};
use std::ptr::NonNull;
use tracing::{debug, instrument, trace};

impl MemoryManager {
    /// Allocate `units` records of the family registered under `name`
    ///
    /// Returns a pointer to `units × record_size` zero-filled bytes that stay
    /// valid until passed to [`release`](Self::release).
    #[instrument(level = "debug", skip(self))]
    pub fn allocate(&mut self, name: &str, units: usize) -> MemoryResult<NonNull<u8>> {
        let family = self.lookup(name)?;
        self.allocate_in(family, units)
    }

    /// Allocate `units` records from a family handle
    pub fn allocate_in(&mut self, family: FamilyId, units: usize) -> MemoryResult<NonNull<u8>> {
        if units == 0 {
            return Err(MemoryError::ZeroUnits);
        }

        let record_size = self.family(family)?.record_size;
        let capacity = self.max_allocatable();
        let requested = units
            .checked_mul(record_size)
            .filter(|&bytes| bytes <= capacity)
            .ok_or(MemoryError::RequestExceedsPageCapacity {
                requested: units.saturating_mul(record_size),
                capacity,
            })?;

        let block = match self.families[family.index()].free_index.peek_largest() {
            Some((size, block)) if size >= requested => block,
            _ => self.grow_family(family)?,
        };
        let granted = self.split(family, block, requested);

        let payload = self.page_or_fatal(family, block.page).payload(block.offset);
        // SAFETY: the payload of a block lies inside its page and the block
        // was just marked allocated, so nothing else refers to these bytes
        unsafe { std::ptr::write_bytes(payload.as_ptr(), 0, granted) };

        debug!(
            family = %family,
            page = %block.page,
            offset = block.offset,
            requested,
            granted,
            "Allocated block"
        );

        self.debug_audit(family);
        Ok(payload)
    }

    /// Add a fresh page to a family and index it as one free block
    fn grow_family(&mut self, family: FamilyId) -> MemoryResult<BlockRef> {
        let base = self.source.request(PAGES_PER_REQUEST)?;
        let page = VmPage::new(base, self.page_size, family);
        let size = match page.block(PAGE_HEADER_SIZE) {
            Some(first) => first.size,
            None => 0,
        };

        let page_id = self.pages.insert(page);
        let block = BlockRef {
            page: page_id,
            offset: PAGE_HEADER_SIZE,
        };
        let owner = &mut self.families[family.index()];
        owner.pages.push(page_id);
        owner.free_index.insert(size, block);

        debug!(
            family = %family,
            page = %page_id,
            pages = owner.pages.len(),
            "Added VM page to family"
        );
        Ok(block)
    }

    /// Carve `requested` bytes out of the free block at `at`
    ///
    /// Returns the payload size actually granted, which exceeds `requested`
    /// when the leftover was too small to host a block header.
    pub(super) fn split(&mut self, family: FamilyId, at: BlockRef, requested: Size) -> Size {
        let Self {
            families, pages, ..
        } = self;
        let owner = &mut families[family.index()];
        let Some(page) = pages.get_mut(at.page) else {
            fatal(owner.corruption(format!("{} missing from page arena", at.page)))
        };
        let Some(block) = page.block(at.offset).copied() else {
            fatal(owner.corruption(format!("no block at {}+{}", at.page, at.offset)))
        };

        if !block.is_free || block.size < requested {
            fatal(owner.corruption(format!(
                "cannot split block at {}+{} (free: {}, size: {}, requested: {})",
                at.page, at.offset, block.is_free, block.size, requested
            )));
        }
        if !owner.free_index.remove(block.size, at) {
            fatal(owner.corruption(format!(
                "free block at {}+{} missing from free index",
                at.page, at.offset
            )));
        }

        let remaining = block.size - requested;
        let mut granted = requested;

        if remaining >= BLOCK_HEADER_SIZE {
            let tail = BlockMeta {
                is_free: true,
                size: remaining - BLOCK_HEADER_SIZE,
                offset: at.offset + BLOCK_HEADER_SIZE + requested,
                prev: None,
                next: None,
            };
            page.insert_after(at.offset, tail);
            owner.free_index.insert(
                tail.size,
                BlockRef {
                    page: at.page,
                    offset: tail.offset,
                },
            );
            trace!(page = %at.page, offset = tail.offset, size = tail.size, "Split off free tail");
        } else if remaining > 0 {
            // Hard fragmentation: no room for a header, the bytes stay with the allocation
            granted += remaining;
            trace!(page = %at.page, offset = at.offset, slack = remaining, "Folded leftover into block");
        }

        if let Some(meta) = page.block_mut(at.offset) {
            meta.is_free = false;
            meta.size = granted;
        }
        granted
    }

    pub(super) fn page_or_fatal(&self, family: FamilyId, page: PageId) -> &VmPage {
        match self.pages.get(page) {
            Some(page) => page,
            None => fatal(MemoryError::CorruptionDetected {
                family: self.family_name(family).unwrap_or("?").to_string(),
                detail: format!("{} missing from page arena", page),
            }),
        }
    }
}
