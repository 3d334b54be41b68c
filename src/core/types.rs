/*!
 * Core Types
 * Common types used across the memory manager
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address type for memory operations
pub type Address = usize;

/// Size type for memory operations
pub type Size = usize;

/// Byte offset from the start of a page
pub type Offset = usize;

/// Handle of a registered page family
///
/// Index into the manager's family arena. Families are never unregistered,
/// so a handle stays valid for the lifetime of the manager that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FamilyId(pub(crate) u32);

impl FamilyId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FamilyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "family#{}", self.0)
    }
}

/// Handle of a VM page held by some family
///
/// Slots are recycled once a page goes back to the page source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub(crate) u32);

impl PageId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page#{}", self.0)
    }
}
