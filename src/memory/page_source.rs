/*!
 * Page Sources
 * OS-backed and heap-backed suppliers of whole pages
 */

use super::traits::PageSource;
use super::types::{MemoryError, MemoryResult};
use crate::core::limits::MIN_PAGE_SIZE;
use crate::core::types::Size;
use nix::sys::mman::{mmap_anonymous, munmap, MapFlags, ProtFlags};
use nix::unistd::{sysconf, SysconfVar};
use std::alloc::{self, Layout};
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use tracing::{debug, error, warn};

/// Page size reported by the operating system
pub fn os_page_size() -> MemoryResult<Size> {
    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 => Ok(size as Size),
        Ok(_) => Err(MemoryError::InvalidConfig(
            "sysconf(PAGE_SIZE) reported no page size".into(),
        )),
        Err(errno) => Err(MemoryError::InvalidConfig(format!(
            "sysconf(PAGE_SIZE) failed: {}",
            errno
        ))),
    }
}

/// Reject page sizes the allocator cannot lay blocks out in
pub(crate) fn validate_page_size(page_size: Size) -> MemoryResult<()> {
    if !page_size.is_power_of_two() || page_size < MIN_PAGE_SIZE {
        return Err(MemoryError::InvalidConfig(format!(
            "page size {} must be a power of two of at least {} bytes",
            page_size, MIN_PAGE_SIZE
        )));
    }
    Ok(())
}

/// Optional cap on pages handed out at once
#[derive(Debug, Clone, Copy, Default)]
struct PageBudget {
    limit: Option<usize>,
    outstanding: usize,
}

impl PageBudget {
    fn reserve(&self, units: usize, page_size: Size) -> MemoryResult<()> {
        match self.limit {
            Some(limit) if self.outstanding + units > limit => Err(MemoryError::OutOfMemory {
                pages: units,
                page_size,
                reason: format!(
                    "page budget of {} exhausted ({} outstanding)",
                    limit, self.outstanding
                ),
            }),
            _ => Ok(()),
        }
    }
}

/// Anonymous private mappings straight from the kernel
///
/// Mappings are page-aligned and zero-filled by the kernel.
#[derive(Debug)]
pub struct OsPageSource {
    page_size: Size,
    budget: PageBudget,
}

impl OsPageSource {
    pub fn new() -> MemoryResult<Self> {
        let page_size = os_page_size()?;
        validate_page_size(page_size)?;
        Ok(Self {
            page_size,
            budget: PageBudget::default(),
        })
    }

    /// Cap the number of pages this source will map at once
    pub fn with_budget(mut self, pages: usize) -> Self {
        self.budget.limit = Some(pages);
        self
    }
}

impl PageSource for OsPageSource {
    fn page_size(&self) -> Size {
        self.page_size
    }

    fn request(&mut self, units: usize) -> MemoryResult<NonNull<u8>> {
        self.budget.reserve(units, self.page_size)?;

        let length = units
            .checked_mul(self.page_size)
            .and_then(NonZeroUsize::new)
            .ok_or_else(|| MemoryError::OutOfMemory {
                pages: units,
                page_size: self.page_size,
                reason: "invalid mapping length".into(),
            })?;

        // SAFETY: a fresh anonymous mapping with no address hint cannot alias
        // any existing Rust object
        let mapping = unsafe {
            mmap_anonymous(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_PRIVATE,
            )
        }
        .map_err(|errno| {
            error!(units, page_size = self.page_size, %errno, "VM page allocation failed");
            MemoryError::OutOfMemory {
                pages: units,
                page_size: self.page_size,
                reason: errno.to_string(),
            }
        })?;

        self.budget.outstanding += units;
        debug!(units, addr = ?mapping, "mapped VM pages from kernel");
        Ok(mapping.cast::<u8>())
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>, units: usize) {
        // SAFETY: the caller guarantees `ptr` is a live mapping of `units` pages
        if let Err(errno) = unsafe { munmap(ptr.cast(), units * self.page_size) } {
            error!(units, addr = ?ptr, %errno, "could not munmap VM pages");
        } else {
            debug!(units, addr = ?ptr, "returned VM pages to kernel");
        }
        self.budget.outstanding = self.budget.outstanding.saturating_sub(units);
    }

    fn pages_outstanding(&self) -> usize {
        self.budget.outstanding
    }
}

/// Page-aligned zeroed allocations from the global allocator
///
/// Lets the page size differ from the host's, which keeps layouts and tests
/// deterministic across platforms.
#[derive(Debug)]
pub struct HeapPageSource {
    page_size: Size,
    budget: PageBudget,
}

impl HeapPageSource {
    pub fn new(page_size: Size) -> MemoryResult<Self> {
        validate_page_size(page_size)?;
        Ok(Self {
            page_size,
            budget: PageBudget::default(),
        })
    }

    /// Cap the number of pages this source will hand out at once
    pub fn with_budget(mut self, pages: usize) -> Self {
        self.budget.limit = Some(pages);
        self
    }

    fn layout(&self, units: usize) -> MemoryResult<Layout> {
        units
            .checked_mul(self.page_size)
            .filter(|&len| len > 0)
            .and_then(|len| Layout::from_size_align(len, self.page_size).ok())
            .ok_or_else(|| MemoryError::OutOfMemory {
                pages: units,
                page_size: self.page_size,
                reason: "invalid page layout".into(),
            })
    }
}

impl PageSource for HeapPageSource {
    fn page_size(&self) -> Size {
        self.page_size
    }

    fn request(&mut self, units: usize) -> MemoryResult<NonNull<u8>> {
        self.budget.reserve(units, self.page_size)?;
        let layout = self.layout(units)?;

        // SAFETY: layout has a non-zero size
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or_else(|| {
            error!(units, page_size = self.page_size, "heap page allocation failed");
            MemoryError::OutOfMemory {
                pages: units,
                page_size: self.page_size,
                reason: "global allocator returned null".into(),
            }
        })?;

        self.budget.outstanding += units;
        Ok(ptr)
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>, units: usize) {
        match self.layout(units) {
            Ok(layout) => {
                // SAFETY: the caller guarantees `ptr` came from `request(units)`,
                // which used this exact layout
                unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
                self.budget.outstanding = self.budget.outstanding.saturating_sub(units);
            }
            Err(e) => warn!(error = %e, addr = ?ptr, "leaking heap pages with unknown layout"),
        }
    }

    fn pages_outstanding(&self) -> usize {
        self.budget.outstanding
    }
}
