//! Field-level salvage of stored documents.
//!
//! # Responsibility
//! - Bring every declared field into the shape the typed `Document` reads.
//! - Keep the user's collections when a secondary field is mistyped.
//!
//! # Invariants
//! - Values that already fit are never touched.
//! - A field is replaced by its default only when nothing in it is salvageable.
//! - After `coerce_declared`, `Document::from_map` accepts every declared field.

use crate::model::document::fields;
use crate::schema::defaults::create_default;
use serde_json::{Map, Number, Value};

const MILESTONE_FIELDS: &[&str] = &["id", "version", "date", "event"];

enum Coerced {
    Fits,
    Salvaged(Value),
    Unusable,
}

/// Repairs mistyped declared fields in place.
///
/// Returns the names of the fields that were changed. Absent fields are left
/// to `backfill_missing`.
pub fn coerce_declared(document: &mut Map<String, Value>, now: &str) -> Vec<&'static str> {
    let mut defaults: Option<Map<String, Value>> = None;
    let mut changed = Vec::new();

    for field in fields::DECLARED {
        let Some(value) = document.get(*field) else {
            continue;
        };
        let replacement = match coerce_field(field, value) {
            Coerced::Fits => continue,
            Coerced::Salvaged(value) => value,
            Coerced::Unusable => defaults
                .get_or_insert_with(|| create_default(now).to_map())
                .remove(*field)
                .unwrap_or(Value::Null),
        };
        document.insert(field.to_string(), replacement);
        changed.push(*field);
    }
    changed
}

fn coerce_field(field: &str, value: &Value) -> Coerced {
    match field {
        fields::THOUGHTS | fields::MODELS => records(value),
        fields::TAGS => counts(value),
        fields::TAG_CATEGORIES | fields::MODEL_CONNECTIONS => string_lists(value),
        fields::TIMELINE => timeline(value),
        fields::NEXT_THOUGHT_ID | fields::NEXT_MODEL_ID => counter(value),
        _ => text(value),
    }
}

/// Arrays of objects; non-object entries are dropped.
fn records(value: &Value) -> Coerced {
    let Value::Array(items) = value else {
        return Coerced::Unusable;
    };
    if items.iter().all(Value::is_object) {
        return Coerced::Fits;
    }
    Coerced::Salvaged(Value::Array(
        items.iter().filter(|item| item.is_object()).cloned().collect(),
    ))
}

/// Label → count; counts that are not non-negative integers are dropped so
/// the consistency check reports them as missing from the cache.
fn counts(value: &Value) -> Coerced {
    let Value::Object(entries) = value else {
        return Coerced::Unusable;
    };
    let mut changed = false;
    let mut kept = Map::new();
    for (label, count) in entries {
        match whole_number(count) {
            Some(number) => {
                changed |= !count.is_u64();
                kept.insert(label.clone(), Value::Number(Number::from(number)));
            }
            None => changed = true,
        }
    }
    if changed {
        Coerced::Salvaged(Value::Object(kept))
    } else {
        Coerced::Fits
    }
}

fn counter(value: &Value) -> Coerced {
    if value.is_u64() {
        return Coerced::Fits;
    }
    match whole_number(value) {
        Some(number) => Coerced::Salvaged(Value::Number(Number::from(number))),
        None => Coerced::Unusable,
    }
}

fn text(value: &Value) -> Coerced {
    if value.is_string() {
        return Coerced::Fits;
    }
    scalar_text(value).map_or(Coerced::Unusable, Coerced::Salvaged)
}

/// Key → list of strings; non-list entries are dropped, scalars stringified.
fn string_lists(value: &Value) -> Coerced {
    let Value::Object(entries) = value else {
        return Coerced::Unusable;
    };
    let mut changed = false;
    let mut kept = Map::new();
    for (key, list) in entries {
        let Value::Array(items) = list else {
            changed = true;
            continue;
        };
        changed |= !items.iter().all(Value::is_string);
        let texts = items.iter().filter_map(scalar_text).collect();
        kept.insert(key.clone(), Value::Array(texts));
    }
    if changed {
        Coerced::Salvaged(Value::Object(kept))
    } else {
        Coerced::Fits
    }
}

/// Milestones whose required fields, when present, are strings; extra fields
/// are kept.
fn timeline(value: &Value) -> Coerced {
    let Value::Array(items) = value else {
        return Coerced::Unusable;
    };
    let mut changed = false;
    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        let Value::Object(milestone) = item else {
            changed = true;
            continue;
        };
        let mut milestone = milestone.clone();
        for key in MILESTONE_FIELDS {
            let fixed = match milestone.get(*key) {
                Some(Value::String(_)) | None => None,
                Some(other) => {
                    Some(scalar_text(other).unwrap_or_else(|| Value::String(String::new())))
                }
            };
            if let Some(fixed) = fixed {
                changed = true;
                milestone.insert(key.to_string(), fixed);
            }
        }
        kept.push(Value::Object(milestone));
    }
    if changed {
        Coerced::Salvaged(Value::Array(kept))
    } else {
        Coerced::Fits
    }
}

fn whole_number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.is_finite() && *float >= 0.0 && float.fract() == 0.0)
                .map(|float| float as u64)
        }),
        Value::String(digits) => digits.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<Value> {
    match value {
        Value::String(_) => Some(value.clone()),
        Value::Number(_) | Value::Bool(_) => Some(Value::String(value.to_string())),
        _ => None,
    }
}
