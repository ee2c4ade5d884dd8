//! Document domain model.
//!
//! # Responsibility
//! - Define the typed document aggregate and its record types.
//! - Describe shallow patches applied by `save`.
//! - Validate JSON candidates before they are persisted.
//!
//! # Invariants
//! - Thought IDs are unique within `thoughts`, model IDs within `models`.
//! - `tags` is a cache derived from thought and model tags.

pub mod document;
pub mod patch;
pub mod validation;
