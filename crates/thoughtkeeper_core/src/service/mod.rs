//! Store use-case services.
//!
//! # Responsibility
//! - Orchestrate storage, schema and notification into document-level APIs.
//! - Keep callers decoupled from storage keys and serialization details.

pub mod backup;
pub mod consistency;
pub mod document_store;
pub mod freshness;
