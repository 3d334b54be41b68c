/*!
 * Shared Memory Manager
 * Thread-safe handle over one manager
 */

use super::MemoryManager;
use crate::config::MmConfig;
use crate::core::types::{FamilyId, Size};
use crate::memory::types::{FamilyStats, MemoryResult};
use parking_lot::Mutex;
use std::ptr::NonNull;
use std::sync::Arc;

/// Cloneable handle serializing every operation through one lock
///
/// Pointers handed out stay valid across threads for as long as the
/// allocation lives; moving them between threads is up to the caller.
#[derive(Clone, Debug)]
pub struct SharedMemoryManager {
    inner: Arc<Mutex<MemoryManager>>,
}

impl SharedMemoryManager {
    pub fn new(manager: MemoryManager) -> Self {
        Self {
            inner: Arc::new(Mutex::new(manager)),
        }
    }

    pub fn init(config: &MmConfig) -> MemoryResult<Self> {
        MemoryManager::init(config).map(Self::new)
    }

    pub fn register(&self, name: &str, record_size: Size) -> MemoryResult<FamilyId> {
        self.inner.lock().register(name, record_size)
    }

    pub fn register_type<T>(&self) -> MemoryResult<FamilyId> {
        self.inner.lock().register_type::<T>()
    }

    pub fn allocate(&self, name: &str, units: usize) -> MemoryResult<NonNull<u8>> {
        self.inner.lock().allocate(name, units)
    }

    pub fn release(&self, ptr: NonNull<u8>) -> MemoryResult<()> {
        self.inner.lock().release(ptr)
    }

    pub fn family_stats(&self, name: &str) -> MemoryResult<FamilyStats> {
        self.inner.lock().family_stats(name)
    }

    /// Run `f` with exclusive access to the manager
    pub fn with<R>(&self, f: impl FnOnce(&mut MemoryManager) -> R) -> R {
        f(&mut self.inner.lock())
    }
}
