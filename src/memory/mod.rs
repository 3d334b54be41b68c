/*!
 * Memory Module
 * Page-family allocator, page sources and their shared types
 */

pub mod manager;
pub mod page_source;
pub mod traits;
pub mod types;

pub use manager::{family_name_of, MemoryManager, SharedMemoryManager};
pub use page_source::{os_page_size, HeapPageSource, OsPageSource};
pub use traits::PageSource;
pub use types::{BlockInfo, FamilyStats, MemoryError, MemoryResult};
