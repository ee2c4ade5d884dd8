//! Derived-state checks and repairs.
//!
//! # Responsibility
//! - Recompute tag counts and ID counters from the source collections.
//! - Diff recomputed state against the stored caches.
//!
//! # Invariants
//! - Tag counts are always recomputed from scratch; labels no longer
//!   referenced disappear instead of lingering at zero.
//! - ID counters only consider non-negative integer suffixes.

use crate::model::document::{Document, Model, TagCounts, Thought};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};

pub const THOUGHT_ID_PREFIX: &str = "#";
pub const MODEL_ID_PREFIX: &str = "M-";

static LEADING_INTEGER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\+?(\d+)").expect("valid leading integer regex"));

/// One label whose cached count disagrees with the recomputed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMismatch {
    pub tag: String,
    /// `None` when the label is referenced but missing from the cache.
    pub stored: Option<u64>,
    pub calculated: u64,
}

/// An ID counter that does not exceed the IDs already in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterLag {
    pub counter: &'static str,
    pub stored: u64,
    pub expected: u64,
}

/// Aggregate counts exposed to UI collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentStats {
    pub thoughts: usize,
    pub models: usize,
    pub tags: usize,
    pub timeline: usize,
    pub model_connections: usize,
    pub current_version: String,
    pub last_saved: String,
    pub data_version: String,
}

impl DocumentStats {
    pub fn of(document: &Document) -> Self {
        Self {
            thoughts: document.thoughts.len(),
            models: document.models.len(),
            tags: document.tags.len(),
            timeline: document.timeline.len(),
            model_connections: document.model_connections.len(),
            current_version: document.current_version.clone(),
            last_saved: document.last_saved.clone(),
            data_version: document.data_version.clone(),
        }
    }
}

/// Read-only integrity report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub consistent: bool,
    pub stats: DocumentStats,
    pub inconsistencies: Vec<TagMismatch>,
    pub duplicate_thought_ids: Vec<String>,
    pub duplicate_model_ids: Vec<String>,
    pub counter_lags: Vec<CounterLag>,
}

/// What `repair_document` changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairSummary {
    pub tags_before: usize,
    pub tags_after: usize,
    pub next_thought_id: u64,
    pub next_model_id: u64,
}

/// Counts every tag occurrence across thoughts and models.
pub fn tally_tags(thoughts: &[Thought], models: &[Model]) -> TagCounts {
    let mut counts = TagCounts::new();
    let labels = thoughts
        .iter()
        .flat_map(Thought::tags)
        .chain(models.iter().flat_map(Model::tags));
    for label in labels {
        *counts.entry(label.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Integer following the first occurrence of `prefix` in `id`.
///
/// `"#12"` → 12, `"M-7b"` → 7, `"draft"` → `None`.
pub fn numeric_suffix(id: &str, prefix: &str) -> Option<u64> {
    let stripped = id.replacen(prefix, "", 1);
    LEADING_INTEGER_RE
        .captures(&stripped)
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse::<u64>().ok())
}

/// `max(suffix) + 1` over the given IDs, or `None` when none is numeric.
pub fn next_counter<'a>(ids: impl IntoIterator<Item = &'a str>, prefix: &str) -> Option<u64> {
    ids.into_iter()
        .filter_map(|id| numeric_suffix(id, prefix))
        .max()
        .map(|max| max.saturating_add(1))
}

/// Compares cached derived state with what the source collections imply.
pub fn check_document(document: &Document) -> ConsistencyReport {
    let calculated = tally_tags(&document.thoughts, &document.models);
    let labels: BTreeSet<&String> = document.tags.keys().chain(calculated.keys()).collect();
    let inconsistencies: Vec<TagMismatch> = labels
        .into_iter()
        .filter_map(|label| {
            let stored = document.tags.get(label).copied();
            let expected = calculated.get(label).copied().unwrap_or(0);
            if stored == Some(expected) {
                return None;
            }
            Some(TagMismatch {
                tag: label.clone(),
                stored,
                calculated: expected,
            })
        })
        .collect();

    let duplicate_thought_ids = duplicates(document.thoughts.iter().filter_map(Thought::id));
    let duplicate_model_ids = duplicates(document.models.iter().filter_map(Model::id));

    let mut counter_lags = Vec::new();
    if let Some(expected) = thought_counter(document) {
        if document.next_thought_id < expected {
            counter_lags.push(CounterLag {
                counter: "nextThoughtId",
                stored: document.next_thought_id,
                expected,
            });
        }
    }
    if let Some(expected) = model_counter(document) {
        if document.next_model_id < expected {
            counter_lags.push(CounterLag {
                counter: "nextModelId",
                stored: document.next_model_id,
                expected,
            });
        }
    }

    ConsistencyReport {
        consistent: inconsistencies.is_empty()
            && duplicate_thought_ids.is_empty()
            && duplicate_model_ids.is_empty()
            && counter_lags.is_empty(),
        stats: DocumentStats::of(document),
        inconsistencies,
        duplicate_thought_ids,
        duplicate_model_ids,
        counter_lags,
    }
}

/// Recomputes tag counts and ID counters in place.
///
/// Counters are reset to `max + 1` whenever a numeric ID exists, even when
/// the stored counter was higher; otherwise they are left untouched.
pub fn repair_document(document: &mut Document) -> RepairSummary {
    let tags_before = document.tags.len();
    document.tags = tally_tags(&document.thoughts, &document.models);

    if let Some(next) = thought_counter(document) {
        document.next_thought_id = next;
    }
    if let Some(next) = model_counter(document) {
        document.next_model_id = next;
    }

    RepairSummary {
        tags_before,
        tags_after: document.tags.len(),
        next_thought_id: document.next_thought_id,
        next_model_id: document.next_model_id,
    }
}

fn thought_counter(document: &Document) -> Option<u64> {
    next_counter(
        document.thoughts.iter().filter_map(Thought::id),
        THOUGHT_ID_PREFIX,
    )
}

fn model_counter(document: &Document) -> Option<u64> {
    next_counter(document.models.iter().filter_map(Model::id), MODEL_ID_PREFIX)
}

fn duplicates<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut repeated = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            repeated.insert(id.to_string());
        }
    }
    repeated.into_iter().collect()
}
