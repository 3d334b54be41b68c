/*!
 * Consistency Audit and Statistics
 * Structural checks over a family's pages and usage reporting
 */

use super::free_list::BlockRef;
use super::MemoryManager;
use crate::core::limits::{page_capacity, BLOCK_HEADER_SIZE, PAGE_HEADER_SIZE};
use crate::core::types::{FamilyId, Offset};
use crate::memory::types::{fatal, BlockInfo, FamilyStats, MemoryResult};

impl MemoryManager {
    /// Check every structural invariant of one family
    ///
    /// Walks each page's chain and cross-checks it against the free index.
    /// Returns `CorruptionDetected` describing the first violation found.
    pub fn audit(&self, name: &str) -> MemoryResult<()> {
        let family = self.lookup(name)?;
        self.audit_family(family)
    }

    /// Audit all registered families
    pub fn audit_all(&self) -> MemoryResult<()> {
        (0..self.families.len() as u32).try_for_each(|id| self.audit_family(FamilyId(id)))
    }

    pub(super) fn audit_family(&self, id: FamilyId) -> MemoryResult<()> {
        let family = self.family(id)?;
        let capacity = page_capacity(self.page_size);
        let mut free_blocks = 0;

        for &page_id in &family.pages {
            let page = self
                .pages
                .get(page_id)
                .ok_or_else(|| family.corruption(format!("{page_id} is not in the page arena")))?;
            if page.family() != id {
                return Err(family.corruption(format!(
                    "{page_id} belongs to {} but is listed here",
                    page.family()
                )));
            }

            let mut expected: Offset = PAGE_HEADER_SIZE;
            let mut prev: Option<Offset> = None;
            let mut prev_free = false;
            let mut accounted = 0;
            let mut walked = 0;

            // A cyclic chain stops after one extra step and fails the count check
            for block in page.chain().take(page.block_count() + 1) {
                if block.offset != expected {
                    return Err(family.corruption(format!(
                        "{page_id}: block at {} but expected one at {expected}",
                        block.offset
                    )));
                }
                if block.prev != prev {
                    return Err(family.corruption(format!(
                        "{page_id}: block at {} links back to {:?}, expected {:?}",
                        block.offset, block.prev, prev
                    )));
                }

                let indexed = family.free_index.contains(
                    block.size,
                    BlockRef {
                        page: page_id,
                        offset: block.offset,
                    },
                );
                if block.is_free != indexed {
                    return Err(family.corruption(format!(
                        "{page_id}: block at {} is_free={} but indexed={indexed}",
                        block.offset, block.is_free
                    )));
                }
                if block.is_free {
                    if prev_free {
                        return Err(family.corruption(format!(
                            "{page_id}: adjacent free blocks at {:?} and {}",
                            prev, block.offset
                        )));
                    }
                    free_blocks += 1;
                }

                accounted += BLOCK_HEADER_SIZE + block.size;
                expected = block.end();
                prev = Some(block.offset);
                prev_free = block.is_free;
                walked += 1;
            }

            if walked != page.block_count() {
                return Err(family.corruption(format!(
                    "{page_id}: chain reaches {walked} of {} blocks",
                    page.block_count()
                )));
            }
            if accounted != capacity {
                return Err(family.corruption(format!(
                    "{page_id}: blocks cover {accounted} bytes of {capacity}"
                )));
            }
            if page.is_empty() {
                return Err(family.corruption(format!("{page_id} is empty but still held")));
            }
        }

        if family.pages.is_empty() && !family.free_index.is_empty() {
            return Err(family.corruption("free index is populated but no pages are held"));
        }
        if free_blocks != family.free_index.len() {
            let stale = family
                .free_index
                .iter()
                .find(|(_, at)| !family.pages.contains(&at.page))
                .map(|(size, at)| format!(" (e.g. {}+{} size {size})", at.page, at.offset))
                .unwrap_or_default();
            return Err(family.corruption(format!(
                "free index holds {} entries for {free_blocks} free blocks{stale}",
                family.free_index.len()
            )));
        }
        Ok(())
    }

    /// Audit after every mutation in debug builds; a violation is fatal
    pub(super) fn debug_audit(&self, family: FamilyId) {
        if cfg!(debug_assertions) {
            if let Err(err) = self.audit_family(family) {
                fatal(err);
            }
        }
    }

    /// Usage summary of one family
    pub fn family_stats(&self, name: &str) -> MemoryResult<FamilyStats> {
        let id = self.lookup(name)?;
        let family = self.family(id)?;

        let mut stats = FamilyStats {
            name: family.name.to_string(),
            record_size: family.record_size,
            pages: family.pages.len(),
            allocated_blocks: 0,
            free_blocks: 0,
            allocated_bytes: 0,
            free_bytes: 0,
            largest_free: family.free_index.peek_largest().map(|(size, _)| size),
        };

        for page in family.pages.iter().filter_map(|&p| self.pages.get(p)) {
            for block in page.chain() {
                if block.is_free {
                    stats.free_blocks += 1;
                    stats.free_bytes += block.size;
                } else {
                    stats.allocated_blocks += 1;
                    stats.allocated_bytes += block.size;
                }
            }
        }
        Ok(stats)
    }

    /// Every block of a family, page by page in address order
    pub fn blocks(&self, name: &str) -> MemoryResult<Vec<BlockInfo>> {
        let id = self.lookup(name)?;
        let family = self.family(id)?;

        Ok(family
            .pages
            .iter()
            .filter_map(|&p| self.pages.get(p).map(|page| (p, page)))
            .flat_map(|(page_id, page)| {
                page.chain().map(move |block| BlockInfo {
                    page: page_id,
                    offset: block.offset,
                    size: block.size,
                    is_free: block.is_free,
                })
            })
            .collect())
    }
}
