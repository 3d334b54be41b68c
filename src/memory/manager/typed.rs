/*!
 * Typed Registration
 * Family names and sizes derived from Rust types
 */

use super::MemoryManager;
use crate::core::types::{Address, FamilyId};
use crate::memory::types::{MemoryError, MemoryResult};
use std::mem;
use std::ptr::NonNull;

/// Family name used for `T` by the typed API
///
/// The module path is dropped, generic arguments are kept verbatim:
/// `app::Employee` becomes `Employee`, `alloc::vec::Vec<u8>` becomes `Vec<u8>`.
pub fn family_name_of<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let (path, generics) = match full.find('<') {
        Some(at) => full.split_at(at),
        None => (full, ""),
    };
    let last = path.rsplit("::").next().unwrap_or(path);
    format!("{last}{generics}")
}

impl MemoryManager {
    /// Register `T` under [`family_name_of::<T>()`](family_name_of) with its `size_of`
    pub fn register_type<T>(&mut self) -> MemoryResult<FamilyId> {
        self.register(&family_name_of::<T>(), mem::size_of::<T>())
    }

    /// Handle of the family registered for `T`
    pub fn lookup_type<T>(&self) -> MemoryResult<FamilyId> {
        self.lookup(&family_name_of::<T>())
    }

    /// Allocate `units` zeroed records of `T`
    ///
    /// Payloads sit at page offsets that are multiples of the header size, so
    /// any `T` aligned to at most that much is served. Stricter alignment
    /// fails with `AlignmentError` and leaves nothing allocated.
    pub fn allocate_type<T>(&mut self, units: usize) -> MemoryResult<NonNull<T>> {
        let family = self.lookup_type::<T>()?;
        let ptr = self.allocate_in(family, units)?;

        let alignment = mem::align_of::<T>();
        let address = ptr.as_ptr() as Address;
        if address % alignment != 0 {
            self.release(ptr)?;
            return Err(MemoryError::AlignmentError { address, alignment });
        }
        Ok(ptr.cast())
    }

    /// Release records obtained from [`allocate_type`](Self::allocate_type)
    pub fn release_type<T>(&mut self, ptr: NonNull<T>) -> MemoryResult<()> {
        self.release(ptr.cast())
    }
}
