/*!
 * System Limits and Constants
 *
 * Page layout constants and registry bounds, grouped by domain.
 */

use super::types::Size;

// =============================================================================
// PAGE LAYOUT
// =============================================================================

/// Bytes reserved at the start of every VM page
/// Covers the family back-reference and the page list links
pub const PAGE_HEADER_SIZE: Size = 32;

/// Bytes reserved in front of every block payload
pub const BLOCK_HEADER_SIZE: Size = 32;

/// Pages requested from or returned to the page source per call
pub const PAGES_PER_REQUEST: usize = 1;

/// Smallest page size a manager accepts
/// Must leave room for both headers and a useful payload
pub const MIN_PAGE_SIZE: Size = 256;

/// Page size used by the heap page source when none is configured
pub const DEFAULT_HEAP_PAGE_SIZE: Size = 4096;

// =============================================================================
// REGISTRY LIMITS
// =============================================================================

/// Longest accepted family name, in bytes
pub const MAX_FAMILY_NAME_LEN: usize = 32;

/// Allocatable bytes of a page: everything after the page header
#[inline]
pub const fn page_capacity(page_size: Size) -> Size {
    page_size - PAGE_HEADER_SIZE
}

/// Largest payload a single block can carry on a page of `page_size` bytes
#[inline]
pub const fn max_allocatable(page_size: Size) -> Size {
    page_size - PAGE_HEADER_SIZE - BLOCK_HEADER_SIZE
}
