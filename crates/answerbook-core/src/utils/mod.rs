//! Utility functions for ids and text handling.

pub mod format;
pub mod ids;

// Re-export commonly used functions at module level
pub use format::{non_empty_lines, normalize_text, truncate_string};
pub use ids::new_document_id;
