/*!
 * Typed Memory Manager Library
 * Page-family allocator exposed as a library
 *
 * Record types are registered once with a fixed size, then allocated and
 * released in multiples of that size. Each family draws whole pages from a
 * page source, serves requests biggest-fit, and hands pages back as soon as
 * they empty out.
 */

pub mod config;
pub mod core;
pub mod memory;
pub mod monitoring;

// Re-exports
pub use config::{MmConfig, PageBackend};
pub use crate::core::types::{Address, FamilyId, Offset, PageId, Size};
pub use memory::{
    family_name_of, os_page_size, BlockInfo, FamilyStats, HeapPageSource, MemoryError,
    MemoryManager, MemoryResult, OsPageSource, PageSource, SharedMemoryManager,
};
pub use monitoring::init_tracing;
