//! Timestamped backup slots.
//!
//! # Responsibility
//! - Snapshot the raw canonical value under a timestamp-suffixed key.
//! - Enumerate and prune backups by their embedded timestamp.
//!
//! # Invariants
//! - A new backup key is always newer than every existing backup, so the
//!   backup just written is never the one pruned.
//! - Keys carrying a known prefix but no parseable stamp are left alone.

use crate::clock::{format_backup_stamp, parse_backup_stamp, Clock};
use crate::config::StoreConfig;
use crate::storage::{KeyValueStore, StorageResult};
use log::{info, warn};
use time::{Duration, OffsetDateTime};

/// One stored backup slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub key: String,
    pub created_at: OffsetDateTime,
}

/// Lists backups under every known prefix, newest first.
pub fn list_backups(
    storage: &impl KeyValueStore,
    config: &StoreConfig,
) -> StorageResult<Vec<BackupEntry>> {
    let mut entries: Vec<BackupEntry> = storage
        .keys()?
        .into_iter()
        .filter_map(|key| {
            let created_at = config
                .backup_prefixes()
                .find_map(|prefix| key.strip_prefix(prefix))
                .and_then(parse_backup_stamp)?;
            Some(BackupEntry { key, created_at })
        })
        .collect();

    entries.sort_by(|left, right| {
        right
            .created_at
            .cmp(&left.created_at)
            .then_with(|| right.key.cmp(&left.key))
    });
    Ok(entries)
}

/// Copies the raw canonical value into a new backup slot, then prunes.
///
/// Returns `None` without writing when nothing is stored.
pub fn create_backup(
    storage: &impl KeyValueStore,
    config: &StoreConfig,
    clock: &impl Clock,
) -> StorageResult<Option<String>> {
    let Some(raw) = storage.get(&config.canonical_key)? else {
        return Ok(None);
    };

    let existing = list_backups(storage, config)?;
    let mut created_at = clock.now();
    if let Some(newest) = existing.first() {
        if newest.created_at >= created_at {
            created_at = newest.created_at + Duration::milliseconds(1);
        }
    }

    let key = format!(
        "{}{}",
        config.backup_prefix,
        format_backup_stamp(created_at)
    );
    storage.set(&key, &raw)?;
    info!(
        "event=backup_create module=backup status=ok key={} bytes={}",
        key,
        raw.len()
    );

    if let Err(err) = prune_backups(storage, config) {
        warn!("event=backup_prune module=backup status=error error={err}");
    }
    Ok(Some(key))
}

/// Removes the oldest backups beyond the retention count.
///
/// Returns the removed keys, oldest last.
pub fn prune_backups(
    storage: &impl KeyValueStore,
    config: &StoreConfig,
) -> StorageResult<Vec<String>> {
    let entries = list_backups(storage, config)?;
    let mut removed = Vec::new();
    for entry in entries.into_iter().skip(config.backup_retention()) {
        storage.remove(&entry.key)?;
        removed.push(entry.key);
    }
    if !removed.is_empty() {
        info!(
            "event=backup_prune module=backup status=ok removed={} retention={}",
            removed.len(),
            config.backup_retention()
        );
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::{create_backup, list_backups};
    use crate::clock::ManualClock;
    use crate::config::{StoreConfig, LEGACY_BACKUP_PREFIX};
    use crate::storage::{KeyValueStore, MemoryKeyValueStore};
    use time::macros::datetime;
    use time::Duration;

    #[test]
    fn nothing_stored_means_no_backup() {
        let storage = MemoryKeyValueStore::new();
        let clock = ManualClock::fixed(datetime!(2024-01-01 00:00 UTC));
        let key = create_backup(&storage, &StoreConfig::default(), &clock).unwrap();
        assert_eq!(key, None);
        assert!(storage.is_empty());
    }

    #[test]
    fn backup_key_embeds_dashed_timestamp() {
        let storage = MemoryKeyValueStore::new();
        let config = StoreConfig::default();
        storage.set(&config.canonical_key, "{\"a\":1}").unwrap();
        let clock = ManualClock::fixed(datetime!(2024-02-03 04:05:06.789 UTC));

        let key = create_backup(&storage, &config, &clock).unwrap().unwrap();

        assert_eq!(
            key,
            "backup_structuredThoughtAssistant_2024-02-03T04-05-06-789Z"
        );
        assert_eq!(storage.get(&key).unwrap().as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn same_instant_backups_get_distinct_increasing_keys() {
        let storage = MemoryKeyValueStore::new();
        let config = StoreConfig::default();
        storage.set(&config.canonical_key, "{}").unwrap();
        let clock = ManualClock::fixed(datetime!(2024-01-01 00:00 UTC));

        let first = create_backup(&storage, &config, &clock).unwrap().unwrap();
        let second = create_backup(&storage, &config, &clock).unwrap().unwrap();

        assert_ne!(first, second);
        let listed = list_backups(&storage, &config).unwrap();
        assert_eq!(listed[0].key, second);
    }

    #[test]
    fn retention_keeps_most_recent_across_prefixes() {
        let storage = MemoryKeyValueStore::new();
        let config = StoreConfig::default();
        storage.set(&config.canonical_key, "{}").unwrap();
        storage
            .set(
                &format!("{LEGACY_BACKUP_PREFIX}2020-01-01T00-00-00-000Z"),
                "{}",
            )
            .unwrap();
        let clock = ManualClock::ticking(datetime!(2024-01-01 00:00 UTC), Duration::seconds(1));

        let mut created = Vec::new();
        for _ in 0..7 {
            created.push(create_backup(&storage, &config, &clock).unwrap().unwrap());
        }

        let listed: Vec<String> = list_backups(&storage, &config)
            .unwrap()
            .into_iter()
            .map(|entry| entry.key)
            .collect();
        let expected: Vec<String> = created.iter().rev().take(5).cloned().collect();
        assert_eq!(listed, expected);
    }

    #[test]
    fn retention_of_one_keeps_the_fresh_backup() {
        let storage = MemoryKeyValueStore::new();
        let config = StoreConfig::default().with_backup_retention(0);
        storage.set(&config.canonical_key, "{}").unwrap();
        let clock = ManualClock::ticking(datetime!(2024-01-01 00:00 UTC), Duration::seconds(1));

        create_backup(&storage, &config, &clock).unwrap();
        let newest = create_backup(&storage, &config, &clock).unwrap().unwrap();

        let listed = list_backups(&storage, &config).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, newest);
    }

    #[test]
    fn unparseable_backup_keys_are_ignored() {
        let storage = MemoryKeyValueStore::new();
        let config = StoreConfig::default();
        storage
            .set("backup_structuredThoughtAssistant_manual", "{}")
            .unwrap();
        assert!(list_backups(&storage, &config).unwrap().is_empty());
    }
}
