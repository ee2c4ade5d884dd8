//! Shallow document patches.
//!
//! # Invariants
//! - Applying a patch replaces whole top-level values; nested values are not
//!   merged.
//! - Null and absent fields never overwrite the base document.

use crate::model::document::{fields, Document, Model, TagCounts, Thought};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPatch {
    fields: Map<String, Value>,
}

impl DocumentPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// A patch carrying every field of `document`.
    pub fn from_document(document: &Document) -> Self {
        Self::from_map(document.to_map())
    }

    pub fn thoughts(self, thoughts: Vec<Thought>) -> Self {
        let items = thoughts
            .into_iter()
            .map(|thought| Value::Object(thought.fields().clone()))
            .collect();
        self.set(fields::THOUGHTS, Value::Array(items))
    }

    pub fn models(self, models: Vec<Model>) -> Self {
        let items = models
            .into_iter()
            .map(|model| Value::Object(model.fields().clone()))
            .collect();
        self.set(fields::MODELS, Value::Array(items))
    }

    pub fn tags(self, tags: &TagCounts) -> Self {
        let counts = tags
            .iter()
            .map(|(label, count)| (label.clone(), Value::from(*count)))
            .collect();
        self.set(fields::TAGS, Value::Object(counts))
    }

    pub fn current_version(self, version: impl Into<String>) -> Self {
        self.set(fields::CURRENT_VERSION, Value::String(version.into()))
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn remove(mut self, key: &str) -> Self {
        self.fields.remove(key);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Writes every non-null patch field over `base`.
    pub fn apply_to(&self, base: &mut Map<String, Value>) {
        for (key, value) in &self.fields {
            if value.is_null() {
                continue;
            }
            base.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DocumentPatch;
    use crate::model::document::Thought;
    use serde_json::{json, Value};

    #[test]
    fn null_and_absent_fields_keep_base_values() {
        let mut base = json!({"thoughts": [{"id": "#1"}], "currentVersion": "v1", "tags": {}})
            .as_object()
            .cloned()
            .unwrap();
        let patch = DocumentPatch::new()
            .set("currentVersion", Value::Null)
            .set("tags", json!({"a": 1}));

        patch.apply_to(&mut base);

        assert_eq!(base["currentVersion"], "v1");
        assert_eq!(base["thoughts"], json!([{"id": "#1"}]));
        assert_eq!(base["tags"], json!({"a": 1}));
    }

    #[test]
    fn typed_setters_produce_plain_json() {
        let patch = DocumentPatch::new().thoughts(vec![Thought::new("#7").with_tags(["x"])]);
        assert_eq!(
            patch.get("thoughts"),
            Some(&json!([{"id": "#7", "tags": ["x"]}]))
        );
    }
}
