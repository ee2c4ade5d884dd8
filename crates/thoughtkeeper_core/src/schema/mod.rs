//! Default document, schema migration engine and field salvage.
//!
//! # Invariants
//! - Every document leaving this module as `Migrated` carries every declared
//!   key and the current `dataVersion`.

pub mod coerce;
pub mod defaults;
pub mod migrate;
