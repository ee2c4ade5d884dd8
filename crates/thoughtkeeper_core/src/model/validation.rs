//! Candidate document validation.
//!
//! # Responsibility
//! - Decide whether a JSON candidate is well-formed enough to persist.
//!
//! # Invariants
//! - Rules run in a fixed order and stop at the first failure:
//!   presence, then type shape, then thought ID uniqueness, then model ID
//!   uniqueness.
//! - Validation never panics; failures are returned as values.

use crate::model::document::fields;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Fields whose absence rejects a candidate outright.
pub const REQUIRED_FIELDS: &[&str] = &[
    fields::THOUGHTS,
    fields::MODELS,
    fields::TAGS,
    fields::CURRENT_VERSION,
];

/// Reason a candidate document was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingField(&'static str),
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    DuplicateThoughtId(String),
    DuplicateModelId(String),
    /// Strict mode: thought at `index` has no usable `id`.
    MissingThoughtId { index: usize },
    /// Strict mode: model at `index` has no usable `id`.
    MissingModelId { index: usize },
    /// Strict mode: model has no usable `name`.
    MissingModelName { id: String },
    /// A declared field exists but cannot be read as its schema type.
    Shape(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing required field `{field}`"),
            Self::WrongType { field, expected } => {
                write!(f, "field `{field}` must be {expected}")
            }
            Self::DuplicateThoughtId(id) => write!(f, "duplicate thought id `{id}`"),
            Self::DuplicateModelId(id) => write!(f, "duplicate model id `{id}`"),
            Self::MissingThoughtId { index } => write!(f, "thought #{index} has no id"),
            Self::MissingModelId { index } => write!(f, "model #{index} has no id"),
            Self::MissingModelName { id } => write!(f, "model `{id}` has no name"),
            Self::Shape(details) => write!(f, "malformed document: {details}"),
        }
    }
}

impl Error for ValidationError {}

/// Runs presence, type and uniqueness checks.
pub fn validate(candidate: &Map<String, Value>) -> Result<(), ValidationError> {
    for field in REQUIRED_FIELDS {
        if !candidate.contains_key(*field) {
            return Err(ValidationError::MissingField(field));
        }
    }

    let thoughts = array_field(candidate, fields::THOUGHTS)?;
    let models = array_field(candidate, fields::MODELS)?;
    if !candidate.get(fields::TAGS).is_some_and(Value::is_object) {
        return Err(ValidationError::WrongType {
            field: fields::TAGS,
            expected: "an object",
        });
    }

    if let Some(id) = first_duplicate_id(thoughts) {
        return Err(ValidationError::DuplicateThoughtId(id));
    }
    if let Some(id) = first_duplicate_id(models) {
        return Err(ValidationError::DuplicateModelId(id));
    }

    Ok(())
}

/// `validate` plus non-empty thought IDs and non-empty model IDs and names.
pub fn validate_integrity(candidate: &Map<String, Value>) -> Result<(), ValidationError> {
    validate(candidate)?;

    let thoughts = array_field(candidate, fields::THOUGHTS)?;
    for (index, thought) in thoughts.iter().enumerate() {
        if non_empty_str(thought, "id").is_none() {
            return Err(ValidationError::MissingThoughtId { index });
        }
    }

    let models = array_field(candidate, fields::MODELS)?;
    for (index, model) in models.iter().enumerate() {
        let Some(id) = non_empty_str(model, "id") else {
            return Err(ValidationError::MissingModelId { index });
        };
        if non_empty_str(model, "name").is_none() {
            return Err(ValidationError::MissingModelName { id: id.to_string() });
        }
    }

    Ok(())
}

fn array_field<'a>(
    candidate: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a Vec<Value>, ValidationError> {
    candidate
        .get(field)
        .and_then(Value::as_array)
        .ok_or(ValidationError::WrongType {
            field,
            expected: "an array",
        })
}

/// Entries without an `id` share one identity, so two of them collide.
fn first_duplicate_id(records: &[Value]) -> Option<String> {
    let mut seen = HashSet::new();
    for record in records {
        let key = match record.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(other) => other.to_string(),
            None => "undefined".to_string(),
        };
        if !seen.insert(key.clone()) {
            return Some(key);
        }
    }
    None
}

fn non_empty_str<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::{validate, validate_integrity, ValidationError};
    use serde_json::{json, Map, Value};

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn minimal() -> Value {
        json!({"thoughts": [], "models": [], "tags": {}, "currentVersion": "v1"})
    }

    #[test]
    fn accepts_minimal_candidate() {
        assert_eq!(validate(&object(minimal())), Ok(()));
    }

    #[test]
    fn reports_first_missing_field_in_order() {
        let candidate = object(json!({"thoughts": [], "tags": {}}));
        assert_eq!(
            validate(&candidate),
            Err(ValidationError::MissingField("models"))
        );
    }

    #[test]
    fn presence_is_checked_before_types() {
        let candidate = object(json!({"thoughts": "x", "models": []}));
        assert_eq!(
            validate(&candidate),
            Err(ValidationError::MissingField("tags"))
        );
    }

    #[test]
    fn rejects_wrong_shapes() {
        let mut candidate = minimal();
        candidate["tags"] = json!([]);
        assert!(matches!(
            validate(&object(candidate)),
            Err(ValidationError::WrongType { field: "tags", .. })
        ));

        let mut candidate = minimal();
        candidate["models"] = json!({});
        assert!(matches!(
            validate(&object(candidate)),
            Err(ValidationError::WrongType { field: "models", .. })
        ));
    }

    #[test]
    fn thought_duplicates_are_reported_before_model_duplicates() {
        let mut candidate = minimal();
        candidate["thoughts"] = json!([{"id": "#1"}, {"id": "#1"}]);
        candidate["models"] = json!([{"id": "M-1"}, {"id": "M-1"}]);
        assert_eq!(
            validate(&object(candidate)),
            Err(ValidationError::DuplicateThoughtId("#1".to_string()))
        );
    }

    #[test]
    fn records_without_id_collide() {
        let mut candidate = minimal();
        candidate["models"] = json!([{"name": "a"}, {"name": "b"}]);
        assert!(matches!(
            validate(&object(candidate)),
            Err(ValidationError::DuplicateModelId(_))
        ));
    }

    #[test]
    fn strict_mode_requires_model_names() {
        let mut candidate = minimal();
        candidate["thoughts"] = json!([{"id": "#1"}]);
        candidate["models"] = json!([{"id": "M-1", "name": " "}]);
        let candidate = object(candidate);
        assert_eq!(validate(&candidate), Ok(()));
        assert_eq!(
            validate_integrity(&candidate),
            Err(ValidationError::MissingModelName {
                id: "M-1".to_string()
            })
        );
    }

    #[test]
    fn strict_mode_requires_thought_ids() {
        let mut candidate = minimal();
        candidate["thoughts"] = json!([{"id": ""}]);
        assert_eq!(
            validate_integrity(&object(candidate)),
            Err(ValidationError::MissingThoughtId { index: 0 })
        );
    }
}
