/*!
 * Memory Types
 * Errors and snapshot types shared by the page-family allocator
 */

use crate::core::limits::MAX_FAMILY_NAME_LEN;
use crate::core::types::{Address, Offset, PageId, Size};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

/// Memory operation result
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Memory errors
///
/// `DoubleFree` and `CorruptionDetected` are never handed back from the
/// allocation paths: they go through [`fatal`] instead. They still exist as
/// values so audits can report them and tests can match on them.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum MemoryError {
    #[error("Page family '{0}' is already registered")]
    #[diagnostic(
        code(memory::duplicate_family),
        help("Each record type may be registered once per memory manager.")
    )]
    DuplicateFamily(String),

    #[error("Record size {size} bytes exceeds the {max} bytes a single page can hold")]
    #[diagnostic(
        code(memory::record_too_large),
        help("Records must fit in one page after the page and block headers.")
    )]
    RecordTooLarge { size: Size, max: Size },

    #[error("Record size must be non-zero")]
    #[diagnostic(code(memory::zero_sized_record))]
    ZeroSizedRecord,

    #[error("Invalid family name '{0}': expected 1..={} bytes", MAX_FAMILY_NAME_LEN)]
    #[diagnostic(code(memory::invalid_family_name))]
    InvalidFamilyName(String),

    #[error("Page family '{0}' is not registered")]
    #[diagnostic(
        code(memory::family_not_found),
        help("Register the record type before allocating from it.")
    )]
    NotFound(String),

    #[error("Requested {requested} bytes exceeds page capacity of {capacity} bytes")]
    #[diagnostic(
        code(memory::request_exceeds_page),
        help("A single allocation cannot span pages. Request fewer units.")
    )]
    RequestExceedsPageCapacity { requested: Size, capacity: Size },

    #[error("Allocation request for zero units")]
    #[diagnostic(code(memory::zero_units))]
    ZeroUnits,

    #[error("Out of memory: could not obtain {pages} page(s) of {page_size} bytes: {reason}")]
    #[diagnostic(
        code(memory::out_of_memory),
        help("The page source refused the request. Release records or raise the page budget.")
    )]
    OutOfMemory {
        pages: usize,
        page_size: Size,
        reason: String,
    },

    #[error("Double free detected at 0x{0:x}")]
    #[diagnostic(code(memory::double_free))]
    DoubleFree(Address),

    #[error("Invalid memory address: 0x{0:x}")]
    #[diagnostic(
        code(memory::invalid_address),
        help("Only pointers returned by allocate() may be released.")
    )]
    InvalidAddress(Address),

    #[error("Alignment error: address 0x{address:x}, required alignment {alignment}")]
    #[diagnostic(code(memory::alignment))]
    AlignmentError { address: Address, alignment: usize },

    #[error("Memory corruption detected in family '{family}': {detail}")]
    #[diagnostic(code(memory::corruption))]
    CorruptionDetected { family: String, detail: String },

    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(memory::invalid_config))]
    InvalidConfig(String),
}

impl MemoryError {
    /// Whether continuing after this error would risk corrupting live allocations
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MemoryError::DoubleFree(_) | MemoryError::CorruptionDetected { .. }
        )
    }
}

/// Abort the current operation on an unrecoverable allocator fault
///
/// Metadata is no longer trustworthy at this point, so the fault is logged
/// and turned into a panic (an abort under `panic = "abort"`).
#[cold]
#[track_caller]
pub(crate) fn fatal(err: MemoryError) -> ! {
    error!(error = %err, fatal = true, "allocator invariant broken, aborting");
    panic!("{}", err)
}

/// Per-family usage snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyStats {
    pub name: String,
    pub record_size: Size,
    pub pages: usize,
    pub allocated_blocks: usize,
    pub free_blocks: usize,
    pub allocated_bytes: Size,
    pub free_bytes: Size,
    pub largest_free: Option<Size>,
}

/// One block as seen by diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub page: PageId,
    pub offset: Offset,
    pub size: Size,
    pub is_free: bool,
}
