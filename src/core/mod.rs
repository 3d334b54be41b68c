/*!
 * Core Module
 * Fundamental types and layout limits
 */

pub mod limits;
pub mod types;

// Re-export for convenience
pub use types::*;
