//! Document aggregate and its record types.
//!
//! # Responsibility
//! - Define the typed view of the single persisted JSON document.
//! - Keep freeform thought/model fields and unknown top-level fields intact.
//!
//! # Invariants
//! - Serialized field names are camelCase and match the stored JSON shape.
//! - Unknown top-level keys survive a parse/serialize cycle unchanged.
//! - Thoughts and models are JSON objects; only `id`, `name`, `tags` have
//!   accessors, everything else is passthrough.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Schema version written to `dataVersion`.
pub const DATA_VERSION: &str = "2.0";

/// Top-level JSON field names.
pub mod fields {
    pub const THOUGHTS: &str = "thoughts";
    pub const MODELS: &str = "models";
    pub const TAGS: &str = "tags";
    pub const TAG_CATEGORIES: &str = "tagCategories";
    pub const TIMELINE: &str = "timeline";
    pub const MODEL_CONNECTIONS: &str = "modelConnections";
    pub const CURRENT_VERSION: &str = "currentVersion";
    pub const DATA_VERSION: &str = "dataVersion";
    pub const NEXT_THOUGHT_ID: &str = "nextThoughtId";
    pub const NEXT_MODEL_ID: &str = "nextModelId";
    pub const LAST_SAVED: &str = "lastSaved";
    pub const LAST_MODIFIED: &str = "lastModified";
    pub const CREATED_AT: &str = "createdAt";
    pub const EXPORT_INFO: &str = "exportInfo";

    /// Every key the schema declares, in canonical order.
    pub const DECLARED: &[&str] = &[
        THOUGHTS,
        MODELS,
        TAGS,
        TAG_CATEGORIES,
        TIMELINE,
        MODEL_CONNECTIONS,
        CURRENT_VERSION,
        DATA_VERSION,
        NEXT_THOUGHT_ID,
        NEXT_MODEL_ID,
        LAST_SAVED,
        LAST_MODIFIED,
        CREATED_AT,
    ];
}

/// Label → occurrence count cache.
pub type TagCounts = BTreeMap<String, u64>;

/// One recorded thought.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Thought {
    fields: Map<String, Value>,
}

impl Thought {
    pub fn new(id: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("id".to_string(), Value::String(id.into()));
        Self { fields }
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.insert("tags".to_string(), tags_value(tags));
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.fields.get("id").and_then(Value::as_str)
    }

    /// String tags only; a missing or non-array `tags` field yields nothing.
    pub fn tags(&self) -> Vec<&str> {
        record_tags(&self.fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// One entry of the model taxonomy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Model {
    fields: Map<String, Value>,
}

impl Model {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("id".to_string(), Value::String(id.into()));
        fields.insert("name".to_string(), Value::String(name.into()));
        Self { fields }
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.insert("tags".to_string(), tags_value(tags));
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.fields.get("id").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(Value::as_str)
    }

    pub fn tags(&self) -> Vec<&str> {
        record_tags(&self.fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Immutable historical timeline record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub event: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Milestone {
    pub fn new(id: &str, version: &str, date: &str, event: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
            date: date.to_string(),
            event: event.to_string(),
            extra: Map::new(),
        }
    }
}

/// The single persisted aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub thoughts: Vec<Thought>,
    pub models: Vec<Model>,
    pub tags: TagCounts,
    pub tag_categories: BTreeMap<String, Vec<String>>,
    pub timeline: Vec<Milestone>,
    pub model_connections: BTreeMap<String, Vec<String>>,
    pub current_version: String,
    pub data_version: String,
    pub next_thought_id: u64,
    pub next_model_id: u64,
    pub last_saved: String,
    pub last_modified: String,
    pub created_at: String,
    /// Fields this schema does not declare, kept for forward compatibility.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    /// Converts a JSON object into the typed document.
    ///
    /// Fails when a declared field is missing or has the wrong JSON type.
    pub fn from_map(map: Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(map))
    }

    /// Converts back into a JSON object carrying every declared field.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            // Struct serialization always yields an object.
            _ => Map::new(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn thought(&self, id: &str) -> Option<&Thought> {
        self.thoughts.iter().find(|thought| thought.id() == Some(id))
    }

    pub fn model(&self, id: &str) -> Option<&Model> {
        self.models.iter().find(|model| model.id() == Some(id))
    }
}

fn tags_value<I, S>(tags: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Value::Array(
        tags.into_iter()
            .map(|tag| Value::String(tag.into()))
            .collect(),
    )
}

fn record_tags(fields: &Map<String, Value>) -> Vec<&str> {
    match fields.get("tags") {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}
