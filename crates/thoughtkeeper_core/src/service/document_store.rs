//! Document store: the single entry point for reading and writing the
//! persisted document.
//!
//! # Responsibility
//! - Load, migrate and persist the canonical document.
//! - Merge and validate patches before committing them.
//! - Run backups, repair, restore, import/export and clear.
//! - Announce every committed write through the `ChangeBus`.
//!
//! # Invariants
//! - Every write of the canonical key goes through `commit`, which notifies.
//! - Repair, restore, import and clear back up the live value before writing.
//! - A rejected write leaves storage untouched.
//! - Returned documents always carry the current `dataVersion`.
//! - Nothing in here panics on bad stored data; failures are `StoreError`s.

use crate::clock::{epoch_millis, format_iso, Clock};
use crate::config::StoreConfig;
use crate::model::document::{fields, Document, DATA_VERSION};
use crate::model::patch::DocumentPatch;
use crate::model::validation::{validate, validate_integrity, ValidationError};
use crate::notify::{ChangeBus, DataUpdated, StorageChange};
use crate::schema::coerce::coerce_declared;
use crate::schema::defaults::create_default;
use crate::schema::migrate::{backfill_missing, migrate, MigrationOutcome};
use crate::service::backup::{self, BackupEntry};
use crate::service::consistency::{
    check_document, repair_document, ConsistencyReport, DocumentStats,
};
use crate::storage::{KeyValueStore, StorageError};
use log::{error, info, warn};
use serde_json::{json, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Label written to `exportInfo.source`.
pub const EXPORT_SOURCE: &str = "思维协同处理器";

pub type StoreResult<T> = Result<T, StoreError>;

/// Store-boundary failure.
#[derive(Debug)]
pub enum StoreError {
    /// Host storage failed (quota, disabled, backend).
    Storage(StorageError),
    /// The document could not be serialized.
    Serialization(serde_json::Error),
    /// The candidate document was rejected; storage is unchanged.
    Validation(ValidationError),
    /// Import input is not a usable document.
    InvalidImport(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "document serialization failed: {err}"),
            Self::Validation(err) => write!(f, "document validation failed: {err}"),
            Self::InvalidImport(reason) => write!(f, "invalid import data: {reason}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::InvalidImport(_) => None,
        }
    }
}

impl From<StorageError> for StoreError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

impl From<ValidationError> for StoreError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Caller's answer to "really delete everything?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
}

/// Result of `DocumentStore::clear`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearOutcome {
    Declined,
    Cleared { backup_key: Option<String> },
}

/// How the canonical value was turned into a document.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LoadSource {
    /// Nothing stored; defaults.
    Empty,
    /// Stored value is already current and complete.
    Current,
    /// Stored value was migrated or backfilled and needs persisting.
    Upgraded,
    /// Some declared fields were mistyped and have been salvaged; the raw
    /// value is kept until the next write backs it up.
    Coerced,
    /// Stored value is unusable; defaults stand in for it.
    Unusable,
}

struct Loaded {
    document: Document,
    source: LoadSource,
}

/// Document store over injected storage, transport and clock.
pub struct DocumentStore<S: KeyValueStore, B: ChangeBus, C: Clock> {
    storage: S,
    bus: B,
    clock: C,
    config: StoreConfig,
}

impl<S: KeyValueStore, B: ChangeBus, C: Clock> DocumentStore<S, B, C> {
    /// Creates a store with the default configuration.
    pub fn new(storage: S, bus: B, clock: C) -> Self {
        Self {
            storage,
            bus,
            clock,
            config: StoreConfig::default(),
        }
    }

    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns the full document, never failing.
    ///
    /// Missing, unparsable or unreadable stored values yield the default
    /// document. A migrated document is persisted before being returned.
    /// Mistyped fields are salvaged in memory and left for the next `save`.
    pub fn load(&self) -> Document {
        match self.try_load() {
            Ok(document) => document,
            Err(err) => {
                error!(
                    "event=document_load module=store status=error error_code=load_failed error={err}"
                );
                self.default_document()
            }
        }
    }

    /// Like `load`, but surfaces storage failures instead of masking them.
    pub fn try_load(&self) -> StoreResult<Document> {
        let loaded = self.read_document()?;
        if loaded.source != LoadSource::Upgraded {
            return Ok(loaded.document);
        }

        match self.commit(loaded.document.clone()) {
            Ok(document) => Ok(document),
            Err(err) => {
                warn!(
                    "event=document_migrate module=store status=error error_code=persist_failed error={err}"
                );
                Ok(loaded.document)
            }
        }
    }

    /// Shallow-merges `patch` over the current document and commits it.
    ///
    /// # Errors
    /// - `Validation` when the merged document is malformed; nothing is written.
    /// - `Storage` when the current value cannot be read or the write fails.
    pub fn save(&self, patch: DocumentPatch) -> StoreResult<Document> {
        let current = self.read_document()?;
        let mut merged = current.document.to_map();
        patch.apply_to(&mut merged);
        merged.insert(
            fields::DATA_VERSION.to_string(),
            Value::String(DATA_VERSION.to_string()),
        );

        if let Err(err) = validate(&merged) {
            warn!("event=document_save module=store status=rejected reason={err}");
            return Err(err.into());
        }
        let document = Document::from_map(merged).map_err(|err| {
            warn!("event=document_save module=store status=rejected reason=shape error={err}");
            ValidationError::Shape(err.to_string())
        })?;

        if matches!(current.source, LoadSource::Unusable | LoadSource::Coerced) {
            self.create_backup()?;
        }
        self.commit(document)
    }

    /// Snapshots the raw canonical value. `None` when nothing is stored.
    pub fn create_backup(&self) -> StoreResult<Option<String>> {
        Ok(backup::create_backup(
            &self.storage,
            &self.config,
            &self.clock,
        )?)
    }

    /// Backups newest first.
    pub fn list_backups(&self) -> StoreResult<Vec<BackupEntry>> {
        Ok(backup::list_backups(&self.storage, &self.config)?)
    }

    /// Recomputes tag counts and ID counters and persists the result.
    ///
    /// Always backs up first; aborts without writing when the backup fails.
    pub fn repair(&self) -> StoreResult<Document> {
        info!("event=document_repair module=store status=start");
        let backup_key = self.create_backup()?;

        let mut document = self.read_document()?.document;
        let summary = repair_document(&mut document);
        let document = self.commit(document)?;

        info!(
            "event=document_repair module=store status=ok backup={} tags_before={} tags_after={} next_thought_id={} next_model_id={}",
            backup_key.as_deref().unwrap_or("none"),
            summary.tags_before,
            summary.tags_after,
            summary.next_thought_id,
            summary.next_model_id
        );
        Ok(document)
    }

    /// Replaces the live document with the newest usable backup.
    ///
    /// Falls back to the default document when no backup exists or the newest
    /// one fails to parse or validate. The live value is backed up first.
    pub fn restore_from_latest_backup(&self) -> StoreResult<Document> {
        let newest = self.list_backups()?.into_iter().next();
        let restored = match &newest {
            Some(entry) => self.read_backup(entry)?,
            None => None,
        };

        self.create_backup()?;

        let document = match restored {
            Some(document) => {
                info!(
                    "event=document_restore module=store status=ok source={}",
                    newest.map(|entry| entry.key).unwrap_or_default()
                );
                document
            }
            None => {
                warn!("event=document_restore module=store status=fallback source=defaults");
                self.default_document()
            }
        };
        self.commit(document)
    }

    /// Read-only integrity report; never writes.
    pub fn check_consistency(&self) -> StoreResult<ConsistencyReport> {
        let loaded = self.read_document()?;
        let report = check_document(&loaded.document);
        info!(
            "event=consistency_check module=store status=ok consistent={} tag_mismatches={} duplicate_ids={} counter_lags={}",
            report.consistent,
            report.inconsistencies.len(),
            report.duplicate_thought_ids.len() + report.duplicate_model_ids.len(),
            report.counter_lags.len()
        );
        Ok(report)
    }

    /// Pretty JSON of the full document plus an `exportInfo` block.
    pub fn export_json(&self) -> StoreResult<String> {
        let document = self.try_load()?;
        let mut map = document.to_map();
        map.insert(
            fields::EXPORT_INFO.to_string(),
            json!({
                "exportedAt": self.now_iso(),
                "source": EXPORT_SOURCE,
                "version": document.current_version,
            }),
        );
        Ok(serde_json::to_string_pretty(&Value::Object(map))?)
    }

    /// Parses, backs up the live value, migrates and saves imported JSON.
    pub fn import_json(&self, text: &str) -> StoreResult<Document> {
        let parsed: Value = serde_json::from_str(text)
            .map_err(|err| StoreError::InvalidImport(format!("not valid JSON: {err}")))?;
        let Value::Object(mut imported) = parsed else {
            return Err(StoreError::InvalidImport(
                "top-level value must be an object".to_string(),
            ));
        };
        for field in [fields::THOUGHTS, fields::MODELS] {
            if imported.get(field).map_or(true, Value::is_null) {
                return Err(StoreError::InvalidImport(format!(
                    "missing required field `{field}`"
                )));
            }
        }

        self.create_backup()?;
        imported.remove(fields::EXPORT_INFO);
        let migration = migrate(imported, &self.now_iso());
        if let MigrationOutcome::Migrated { from } = &migration.outcome {
            info!(
                "event=document_import module=store status=migrated from_version={}",
                from.as_deref().unwrap_or("legacy")
            );
        }

        let document = self.save(DocumentPatch::from_map(migration.document))?;
        info!(
            "event=document_import module=store status=ok thoughts={} models={}",
            document.thoughts.len(),
            document.models.len()
        );
        Ok(document)
    }

    /// Deletes the canonical document after backing it up.
    ///
    /// Does nothing unless the caller passes `Confirmation::Confirmed`.
    pub fn clear(&self, confirmation: Confirmation) -> StoreResult<ClearOutcome> {
        if confirmation != Confirmation::Confirmed {
            info!("event=document_clear module=store status=declined");
            return Ok(ClearOutcome::Declined);
        }

        let backup_key = self.create_backup()?;
        self.storage.remove(&self.config.canonical_key)?;
        info!(
            "event=document_clear module=store status=ok backup={}",
            backup_key.as_deref().unwrap_or("none")
        );
        self.notify(None);
        Ok(ClearOutcome::Cleared { backup_key })
    }

    pub fn stats(&self) -> DocumentStats {
        DocumentStats::of(&self.load())
    }

    /// Startup routine: repair tag or counter drift, start listening for
    /// foreign writes, report stats.
    ///
    /// Duplicate IDs are only reported; repair cannot resolve them, and
    /// repairing on every start would rotate the real backups out.
    pub fn initialize(&self) -> StoreResult<DocumentStats> {
        info!("event=store_init module=store status=start");
        let report = self.check_consistency()?;
        if !report.inconsistencies.is_empty() || !report.counter_lags.is_empty() {
            warn!(
                "event=store_init module=store status=repairing tag_mismatches={} counter_lags={}",
                report.inconsistencies.len(),
                report.counter_lags.len()
            );
            self.repair()?;
        }
        if !report.duplicate_thought_ids.is_empty() || !report.duplicate_model_ids.is_empty() {
            warn!(
                "event=store_init module=store status=degraded duplicate_thought_ids={} duplicate_model_ids={}",
                report.duplicate_thought_ids.len(),
                report.duplicate_model_ids.len()
            );
        }

        self.bus.listen_for_refresh(&self.config.canonical_key);
        let stats = self.stats();
        info!(
            "event=store_init module=store status=ok thoughts={} models={} tags={}",
            stats.thoughts, stats.models, stats.tags
        );
        Ok(stats)
    }

    /// `lastSaved` of the stored document, read without migrating.
    pub fn saved_marker(&self) -> StoreResult<Option<String>> {
        let Some(raw) = self.storage.get(&self.config.canonical_key)? else {
            return Ok(None);
        };
        let marker = serde_json::from_str::<Value>(&raw).ok().and_then(|value| {
            value
                .get(fields::LAST_SAVED)
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        Ok(marker)
    }

    fn read_document(&self) -> StoreResult<Loaded> {
        let Some(raw) = self.storage.get(&self.config.canonical_key)? else {
            info!("event=document_load module=store status=ok source=defaults");
            return Ok(Loaded {
                document: self.default_document(),
                source: LoadSource::Empty,
            });
        };

        let map = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Ok(self.unusable("not_an_object")),
            Err(_) => return Ok(self.unusable("parse_failed")),
        };

        let now = self.now_iso();
        let migration = migrate(map, &now);
        let mut upgraded = migration.migrated();
        let mut map = migration.document;
        if !upgraded {
            let filled = backfill_missing(&mut map, &now);
            if !filled.is_empty() {
                info!(
                    "event=document_backfill module=store status=ok fields={}",
                    filled.join(",")
                );
                upgraded = true;
            }
        }
        let coerced = coerce_declared(&mut map, &now);
        if !coerced.is_empty() {
            warn!(
                "event=document_coerce module=store status=ok fields={}",
                coerced.join(",")
            );
        }

        let source = if !coerced.is_empty() {
            LoadSource::Coerced
        } else if upgraded {
            LoadSource::Upgraded
        } else {
            LoadSource::Current
        };
        match Document::from_map(map) {
            Ok(document) => Ok(Loaded { document, source }),
            Err(_) => Ok(self.unusable("shape_mismatch")),
        }
    }

    /// Parses, migrates and strictly validates one backup slot.
    fn read_backup(&self, entry: &BackupEntry) -> StoreResult<Option<Document>> {
        let Some(raw) = self.storage.get(&entry.key)? else {
            return Ok(None);
        };
        let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&raw) else {
            warn!(
                "event=backup_read module=store status=error key={} error_code=parse_failed",
                entry.key
            );
            return Ok(None);
        };

        let now = self.now_iso();
        let mut map = migrate(map, &now).document;
        backfill_missing(&mut map, &now);
        coerce_declared(&mut map, &now);
        if let Err(err) = validate_integrity(&map) {
            warn!(
                "event=backup_read module=store status=error key={} error_code=invalid reason={}",
                entry.key, err
            );
            return Ok(None);
        }
        Ok(Document::from_map(map).ok())
    }

    /// Stamps save times, writes the canonical key and notifies.
    fn commit(&self, mut document: Document) -> StoreResult<Document> {
        let now = self.now_iso();
        document.last_saved = now.clone();
        document.last_modified = now;
        document.data_version = DATA_VERSION.to_string();

        let serialized = document.to_json()?;
        if let Err(err) = self.storage.set(&self.config.canonical_key, &serialized) {
            error!(
                "event=document_save module=store status=error error_code=storage_write_failed error={err}"
            );
            return Err(err.into());
        }

        info!(
            "event=document_save module=store status=ok thoughts={} models={} tags={} bytes={}",
            document.thoughts.len(),
            document.models.len(),
            document.tags.len(),
            serialized.len()
        );
        self.notify(Some(serialized));
        Ok(document)
    }

    fn notify(&self, new_value: Option<String>) {
        let origin = self.bus.context_id();
        self.bus.publish_cross_context(StorageChange {
            key: self.config.canonical_key.clone(),
            new_value,
            origin,
        });
        self.bus.publish_same_context(DataUpdated {
            timestamp_ms: epoch_millis(self.clock.now()),
            origin,
        });
    }

    fn unusable(&self, reason: &str) -> Loaded {
        error!("event=document_load module=store status=error error_code={reason}");
        Loaded {
            document: self.default_document(),
            source: LoadSource::Unusable,
        }
    }

    fn default_document(&self) -> Document {
        create_default(&self.now_iso())
    }

    fn now_iso(&self) -> String {
        format_iso(self.clock.now())
    }
}
