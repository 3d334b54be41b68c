/*!
 * Configuration
 * Page source selection and sizing for a memory manager
 */

use crate::core::limits::DEFAULT_HEAP_PAGE_SIZE;
use crate::core::types::Size;
use crate::memory::page_source::{os_page_size, validate_page_size};
use crate::memory::{HeapPageSource, MemoryError, MemoryResult, OsPageSource, PageSource};
use serde::{Deserialize, Serialize};

pub const PAGE_SIZE_ENV: &str = "TYPED_MM_PAGE_SIZE";
pub const BACKEND_ENV: &str = "TYPED_MM_BACKEND";
pub const PAGE_BUDGET_ENV: &str = "TYPED_MM_PAGE_BUDGET";

/// Where pages come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageBackend {
    /// Anonymous mappings from the kernel
    #[default]
    Os,
    /// Page-aligned blocks from the global allocator
    Heap,
}

/// Memory manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MmConfig {
    /// Page size in bytes; `None` means the OS page size (or 4096 for the heap backend)
    pub page_size: Option<Size>,
    pub backend: PageBackend,
    /// Maximum pages held at once; `None` is unbounded
    pub page_budget: Option<usize>,
}

impl MmConfig {
    /// Heap-backed pages of a fixed size
    pub fn heap(page_size: Size) -> Self {
        Self {
            page_size: Some(page_size),
            backend: PageBackend::Heap,
            page_budget: None,
        }
    }

    pub fn with_page_budget(mut self, pages: usize) -> Self {
        self.page_budget = Some(pages);
        self
    }

    /// Load configuration from `TYPED_MM_*` environment variables
    pub fn from_env() -> MemoryResult<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> MemoryResult<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(BACKEND_ENV) {
            config.backend = match raw.trim().to_ascii_lowercase().as_str() {
                "os" => PageBackend::Os,
                "heap" => PageBackend::Heap,
                other => {
                    return Err(MemoryError::InvalidConfig(format!(
                        "{BACKEND_ENV}: unknown backend '{other}' (expected os or heap)"
                    )))
                }
            };
        }
        if let Some(raw) = lookup(PAGE_SIZE_ENV) {
            config.page_size = Some(parse_count(PAGE_SIZE_ENV, &raw)?);
        }
        if let Some(raw) = lookup(PAGE_BUDGET_ENV) {
            config.page_budget = Some(parse_count(PAGE_BUDGET_ENV, &raw)?);
        }

        Ok(config)
    }

    /// Reject settings no page source could honor
    pub fn validate(&self) -> MemoryResult<()> {
        if let Some(page_size) = self.page_size {
            validate_page_size(page_size)?;
            if self.backend == PageBackend::Os {
                let os = os_page_size()?;
                if page_size != os {
                    return Err(MemoryError::InvalidConfig(format!(
                        "OS backend pages are {os} bytes, not {page_size}"
                    )));
                }
            }
        }
        if self.page_budget == Some(0) {
            return Err(MemoryError::InvalidConfig(
                "page budget must allow at least one page".into(),
            ));
        }
        Ok(())
    }

    /// Page size a manager built from this config will use
    pub fn effective_page_size(&self) -> MemoryResult<Size> {
        match (self.page_size, self.backend) {
            (Some(size), _) => Ok(size),
            (None, PageBackend::Os) => os_page_size(),
            (None, PageBackend::Heap) => Ok(DEFAULT_HEAP_PAGE_SIZE),
        }
    }

    pub(crate) fn build_source(&self) -> MemoryResult<Box<dyn PageSource>> {
        let source: Box<dyn PageSource> = match (self.backend, self.page_budget) {
            (PageBackend::Os, None) => Box::new(OsPageSource::new()?),
            (PageBackend::Os, Some(pages)) => Box::new(OsPageSource::new()?.with_budget(pages)),
            (PageBackend::Heap, budget) => {
                let source = HeapPageSource::new(self.effective_page_size()?)?;
                match budget {
                    Some(pages) => Box::new(source.with_budget(pages)),
                    None => Box::new(source),
                }
            }
        };
        Ok(source)
    }
}

fn parse_count(key: &str, raw: &str) -> MemoryResult<usize> {
    raw.trim()
        .parse()
        .map_err(|e| MemoryError::InvalidConfig(format!("{key}: '{raw}' is not a count ({e})")))
}
