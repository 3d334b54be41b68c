/*!
 * Memory Management
 *
 * Typed page-family allocator with biggest-fit splitting and eager coalescing.
 *
 * ## Layout
 *
 * Every record type is registered as a **page family** with a fixed record
 * size. A family owns whole pages obtained from a [`PageSource`]; each page
 * carries a page header followed by an address-ordered chain of blocks, and
 * every block is a block header followed by its payload.
 *
 * ## Allocation
 *
 * - **Biggest-fit**: the family's free index is ordered by descending size and
 *   only its largest block is considered
 * - **Splitting**: the tail of the chosen block becomes a new free block when
 *   it can hold a header; smaller leftovers are folded into the allocation
 * - **Page growth**: a new page is requested only when the largest free block
 *   is too small
 *
 * ## Reclamation
 *
 * - **Coalescing**: a released block merges with free address neighbors
 *   immediately, sizes recomputed from block positions
 * - **Page release**: a page that becomes one free block over its full
 *   capacity goes straight back to the page source
 *
 * The manager is a plain value with no internal locking. Wrap it in
 * [`SharedMemoryManager`] to share it between threads.
 */

mod allocator;
mod audit;
mod free_list;
mod page;
mod reclaim;
mod registry;
mod shared;
mod typed;

pub use shared::SharedMemoryManager;
pub use typed::family_name_of;

use super::page_source::validate_page_size;
use super::traits::PageSource;
use super::types::MemoryResult;
use crate::config::MmConfig;
use crate::core::limits::{max_allocatable, page_capacity, PAGES_PER_REQUEST};
use crate::core::types::{FamilyId, Size};
use ahash::AHashMap;
use page::PageArena;
use registry::{FamilyName, PageFamily};
use tracing::info;

/// Allocator context
///
/// Holds the family registry, every page granted to a family, and the page
/// source those pages come from. All state lives in this value.
pub struct MemoryManager {
    source: Box<dyn PageSource>,
    page_size: Size,
    families: Vec<PageFamily>,
    names: AHashMap<FamilyName, FamilyId>,
    pages: PageArena,
}

impl MemoryManager {
    /// Create a manager from configuration
    pub fn init(config: &MmConfig) -> MemoryResult<Self> {
        config.validate()?;
        Self::with_source(config.build_source()?)
    }

    /// Create a manager on top of an explicit page source
    pub fn with_source<S>(source: S) -> MemoryResult<Self>
    where
        S: PageSource + 'static,
    {
        let page_size = source.page_size();
        validate_page_size(page_size)?;

        info!(
            page_size,
            capacity = page_capacity(page_size),
            max_record = max_allocatable(page_size),
            "Memory manager initialized"
        );

        Ok(Self {
            source: Box::new(source),
            page_size,
            families: Vec::new(),
            names: AHashMap::new(),
            pages: PageArena::new(),
        })
    }

    /// Page size every family of this manager uses
    pub fn page_size(&self) -> Size {
        self.page_size
    }

    /// Allocatable bytes per page (page size minus the page header)
    pub fn page_capacity(&self) -> Size {
        page_capacity(self.page_size)
    }

    /// Largest single allocation or record size this manager accepts
    pub fn max_allocatable(&self) -> Size {
        max_allocatable(self.page_size)
    }

    /// Pages currently held across all families
    pub fn pages_held(&self) -> usize {
        self.pages.len()
    }

    /// Pages the page source reports as handed out
    pub fn source_pages_outstanding(&self) -> usize {
        self.source.pages_outstanding()
    }

    /// Release every page and tear the manager down
    ///
    /// Returns the number of pages given back to the page source. Any pointer
    /// obtained from this manager dangles afterwards.
    pub fn shutdown(mut self) -> usize {
        let released = self.release_all_pages();
        info!(released, families = self.families.len(), "Memory manager shut down");
        released
    }

    fn release_all_pages(&mut self) -> usize {
        let pages = self.pages.drain();
        let released = pages.len();
        for page in pages {
            // SAFETY: every arena page came from `request(PAGES_PER_REQUEST)`
            // on this source and is dropped from all bookkeeping here
            unsafe { self.source.release(page.base(), PAGES_PER_REQUEST) };
        }
        for family in &mut self.families {
            family.reset();
        }
        released
    }
}

impl Drop for MemoryManager {
    fn drop(&mut self) {
        self.release_all_pages();
    }
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("page_size", &self.page_size)
            .field("families", &self.families.len())
            .field("pages", &self.pages.len())
            .finish()
    }
}
