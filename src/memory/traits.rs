/*!
 * Memory Traits
 * Page source abstraction consumed by the allocator
 */

use super::types::MemoryResult;
use crate::core::types::Size;
use std::ptr::NonNull;

/// Supplier of whole, page-aligned, zero-filled pages
pub trait PageSource: Send {
    /// Size in bytes of one page handed out by this source
    fn page_size(&self) -> Size;

    /// Obtain `units` contiguous pages
    ///
    /// The returned memory is aligned to [`page_size`](Self::page_size) and
    /// zero-filled. Fails with `OutOfMemory` when the pages cannot be supplied.
    fn request(&mut self, units: usize) -> MemoryResult<NonNull<u8>>;

    /// Give pages back
    ///
    /// Failures are logged by the implementation and never surfaced.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`request`](Self::request) on this source with
    /// the same `units`, and must not be used again afterwards.
    unsafe fn release(&mut self, ptr: NonNull<u8>, units: usize);

    /// Pages currently handed out and not yet released
    fn pages_outstanding(&self) -> usize;
}

impl<S: PageSource + ?Sized> PageSource for Box<S> {
    fn page_size(&self) -> Size {
        (**self).page_size()
    }

    fn request(&mut self, units: usize) -> MemoryResult<NonNull<u8>> {
        (**self).request(units)
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>, units: usize) {
        // SAFETY: contract forwarded unchanged to the boxed source
        unsafe { (**self).release(ptr, units) }
    }

    fn pages_outstanding(&self) -> usize {
        (**self).pages_outstanding()
    }
}
