/*!
 * Page Family Registry
 * Name to family mapping owned by the manager
 */

use super::free_list::FreeBlockIndex;
use super::MemoryManager;
use crate::core::limits::MAX_FAMILY_NAME_LEN;
use crate::core::types::{FamilyId, PageId, Size};
use crate::memory::types::{MemoryError, MemoryResult};
use tracing::{info, instrument, warn};

/// Family names are short, so they stay inline
pub(super) type FamilyName = smartstring::alias::String;

/// One registered record type and the pages serving it
#[derive(Debug)]
pub(super) struct PageFamily {
    pub name: FamilyName,
    pub record_size: Size,
    pub pages: Vec<PageId>,
    pub free_index: FreeBlockIndex,
}

impl PageFamily {
    fn new(name: FamilyName, record_size: Size) -> Self {
        Self {
            name,
            record_size,
            pages: Vec::new(),
            free_index: FreeBlockIndex::new(),
        }
    }

    /// Forget every page, used once the pages themselves are gone
    pub fn reset(&mut self) {
        self.pages.clear();
        self.free_index = FreeBlockIndex::new();
    }

    pub fn corruption(&self, detail: impl Into<String>) -> MemoryError {
        MemoryError::CorruptionDetected {
            family: self.name.to_string(),
            detail: detail.into(),
        }
    }
}

impl MemoryManager {
    /// Register a record type under `name`
    ///
    /// Fails with `DuplicateFamily` if the name is taken and with
    /// `RecordTooLarge` if one record cannot fit in a page. A failed
    /// registration leaves the registry untouched.
    #[instrument(level = "debug", skip(self))]
    pub fn register(&mut self, name: &str, record_size: Size) -> MemoryResult<FamilyId> {
        if name.is_empty() || name.len() > MAX_FAMILY_NAME_LEN {
            return Err(MemoryError::InvalidFamilyName(name.to_string()));
        }
        if self.names.contains_key(name) {
            warn!(family = name, "page family already registered");
            return Err(MemoryError::DuplicateFamily(name.to_string()));
        }
        if record_size == 0 {
            return Err(MemoryError::ZeroSizedRecord);
        }
        let max = self.max_allocatable();
        if record_size > max {
            return Err(MemoryError::RecordTooLarge {
                size: record_size,
                max,
            });
        }

        let id = FamilyId(self.families.len() as u32);
        let name = FamilyName::from(name);
        self.families.push(PageFamily::new(name.clone(), record_size));
        self.names.insert(name, id);

        info!(family = %id, record_size, "Page family registered");
        Ok(id)
    }

    /// Handle of the family registered under `name`
    pub fn lookup(&self, name: &str) -> MemoryResult<FamilyId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| MemoryError::NotFound(name.to_string()))
    }

    /// Name a family was registered with
    pub fn family_name(&self, family: FamilyId) -> Option<&str> {
        self.families.get(family.index()).map(|f| f.name.as_str())
    }

    /// Record size of a family
    pub fn record_size(&self, family: FamilyId) -> Option<Size> {
        self.families.get(family.index()).map(|f| f.record_size)
    }

    /// Registered family names, in registration order
    pub fn families(&self) -> impl Iterator<Item = &str> + '_ {
        self.families.iter().map(|f| f.name.as_str())
    }

    /// Owning family of a page
    pub fn family_of(&self, page: PageId) -> Option<FamilyId> {
        self.pages.get(page).map(|p| p.family())
    }

    pub(super) fn family(&self, id: FamilyId) -> MemoryResult<&PageFamily> {
        self.families
            .get(id.index())
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))
    }
}
