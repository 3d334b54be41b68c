/*!
 * Shared fixtures for memory tests
 */

use std::ptr::NonNull;
use typed_mm::{MemoryManager, MmConfig};

/// Page size every deterministic test runs with
pub const PAGE: usize = 4096;

/// Heap-backed manager with 4096-byte pages regardless of host
pub fn manager() -> MemoryManager {
    MemoryManager::init(&MmConfig::heap(PAGE)).expect("heap-backed manager")
}

/// Same, with a cap on pages held at once
pub fn budgeted_manager(pages: usize) -> MemoryManager {
    MemoryManager::init(&MmConfig::heap(PAGE).with_page_budget(pages))
        .expect("budgeted heap-backed manager")
}

pub fn fill(ptr: NonNull<u8>, len: usize, byte: u8) {
    unsafe { std::ptr::write_bytes(ptr.as_ptr(), byte, len) };
}

pub fn bytes<'a>(ptr: NonNull<u8>, len: usize) -> &'a [u8] {
    unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len) }
}
