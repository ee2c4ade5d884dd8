//! Document schema migration.
//!
//! # Responsibility
//! - Upgrade any stored document to the current `dataVersion`.
//! - Backfill declared keys missing from a current-version document.
//!
//! # Invariants
//! - `migrate(migrate(d)) == migrate(d)`.
//! - Unknown fields are never discarded.
//! - This module never persists; callers decide what to write.

use crate::model::document::{fields, DATA_VERSION};
use crate::schema::defaults::create_default;
use log::info;
use serde_json::{Map, Value};

/// Result of running the migration engine over a raw document.
#[derive(Debug, Clone, PartialEq)]
pub struct Migration {
    pub document: Map<String, Value>,
    pub outcome: MigrationOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Input already carried the current schema version and was returned as-is.
    Current,
    /// Input was upgraded. `from` is the previous `dataVersion`, if any.
    Migrated { from: Option<String> },
}

impl Migration {
    pub fn migrated(&self) -> bool {
        matches!(self.outcome, MigrationOutcome::Migrated { .. })
    }
}

/// Brings `raw` up to `DATA_VERSION`, stamping `now` on migration.
pub fn migrate(raw: Map<String, Value>, now: &str) -> Migration {
    let from = stored_version(&raw);
    if from.as_deref() == Some(DATA_VERSION) {
        return Migration {
            document: raw,
            outcome: MigrationOutcome::Current,
        };
    }

    info!(
        "event=document_migrate module=schema status=start from_version={} to_version={}",
        from.as_deref().unwrap_or("legacy"),
        DATA_VERSION
    );

    let mut document = raw;
    fill_missing(&mut document, now);
    document.insert(
        fields::DATA_VERSION.to_string(),
        Value::String(DATA_VERSION.to_string()),
    );
    document.insert(
        fields::LAST_MODIFIED.to_string(),
        Value::String(now.to_string()),
    );

    Migration {
        document,
        outcome: MigrationOutcome::Migrated { from },
    }
}

/// Fills declared keys that are absent or null from the defaults.
///
/// Returns the names of the keys that were filled. `dataVersion` and
/// existing values are left untouched.
pub fn backfill_missing(document: &mut Map<String, Value>, now: &str) -> Vec<&'static str> {
    fill_missing(document, now)
}

fn fill_missing(document: &mut Map<String, Value>, now: &str) -> Vec<&'static str> {
    let mut defaults = create_default(now).to_map();
    let mut filled = Vec::new();
    for field in fields::DECLARED {
        let present = document.get(*field).is_some_and(|value| !value.is_null());
        if present {
            continue;
        }
        if let Some(default_value) = defaults.remove(*field) {
            document.insert(field.to_string(), default_value);
            filled.push(*field);
        }
    }
    filled
}

fn stored_version(raw: &Map<String, Value>) -> Option<String> {
    match raw.get(fields::DATA_VERSION) {
        None | Some(Value::Null) => None,
        Some(Value::String(version)) => Some(version.clone()),
        Some(other) => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{backfill_missing, migrate, MigrationOutcome};
    use crate::model::document::{Document, DATA_VERSION};
    use serde_json::{json, Map, Value};

    const NOW: &str = "2024-06-01T00:00:00.000Z";
    const LATER: &str = "2024-07-01T00:00:00.000Z";

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn legacy_document_is_filled_from_defaults() {
        let raw = object(json!({"thoughts": [{"id": "#1"}], "dataVersion": "0.9"}));
        let migration = migrate(raw, NOW);

        assert_eq!(
            migration.outcome,
            MigrationOutcome::Migrated {
                from: Some("0.9".to_string())
            }
        );
        let doc = Document::from_map(migration.document).unwrap();
        assert_eq!(doc.data_version, DATA_VERSION);
        assert!(doc.models.is_empty());
        assert_eq!(doc.thoughts.len(), 1);
        assert_eq!(doc.thoughts[0].id(), Some("#1"));
        assert_eq!(doc.created_at, NOW);
        assert_eq!(doc.last_modified, NOW);
    }

    #[test]
    fn null_fields_are_replaced_and_created_at_is_preserved() {
        let raw = object(json!({
            "models": null,
            "nextModelId": null,
            "createdAt": "2020-01-01T00:00:00.000Z"
        }));
        let doc = Document::from_map(migrate(raw, NOW).document).unwrap();
        assert!(doc.models.is_empty());
        assert_eq!(doc.next_model_id, 81);
        assert_eq!(doc.created_at, "2020-01-01T00:00:00.000Z");
    }

    #[test]
    fn unknown_fields_pass_through() {
        let raw = object(json!({"customPanel": {"open": true}}));
        let migration = migrate(raw, NOW);
        assert_eq!(migration.document["customPanel"], json!({"open": true}));
    }

    #[test]
    fn current_version_is_a_no_op() {
        let raw = object(json!({"dataVersion": DATA_VERSION, "thoughts": []}));
        let migration = migrate(raw.clone(), NOW);
        assert_eq!(migration.outcome, MigrationOutcome::Current);
        assert_eq!(migration.document, raw);
    }

    #[test]
    fn migration_is_idempotent() {
        let inputs = [
            json!({}),
            json!({"dataVersion": "1.0", "tags": {"a": 1}}),
            json!({"dataVersion": 3, "models": [{"id": "M-1", "name": "x"}]}),
        ];
        for input in inputs {
            let once = migrate(object(input), NOW).document;
            let twice = migrate(once.clone(), LATER).document;
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn non_string_version_is_reported() {
        let migration = migrate(object(json!({"dataVersion": 1})), NOW);
        assert_eq!(
            migration.outcome,
            MigrationOutcome::Migrated {
                from: Some("1".to_string())
            }
        );
    }

    #[test]
    fn backfill_only_touches_missing_keys() {
        let mut doc = object(json!({"dataVersion": DATA_VERSION, "currentVersion": "v9"}));
        let filled = backfill_missing(&mut doc, NOW);
        assert!(filled.contains(&"thoughts"));
        assert!(!filled.contains(&"currentVersion"));
        assert_eq!(doc["currentVersion"], "v9");
        assert!(Document::from_map(doc).is_ok());
    }
}
