//! Store configuration.
//!
//! # Invariants
//! - `backup_retention` is at least 1, so a fresh backup is never pruned by
//!   its own creation.
//! - `backup_prefix` is always part of `backup_prefixes()`.

use std::time::Duration;

/// Storage key holding the serialized document.
pub const CANONICAL_KEY: &str = "structuredThoughtAssistant";
/// Prefix of backup keys written by this crate.
pub const BACKUP_PREFIX: &str = "backup_structuredThoughtAssistant_";
/// Prefix older repair runs wrote backups under; still read and pruned.
pub const LEGACY_BACKUP_PREFIX: &str = "structuredThoughtAssistant_backup_";
pub const DEFAULT_BACKUP_RETENTION: usize = 5;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub canonical_key: String,
    pub backup_prefix: String,
    pub legacy_backup_prefixes: Vec<String>,
    backup_retention: usize,
    pub poll_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            canonical_key: CANONICAL_KEY.to_string(),
            backup_prefix: BACKUP_PREFIX.to_string(),
            legacy_backup_prefixes: vec![LEGACY_BACKUP_PREFIX.to_string()],
            backup_retention: DEFAULT_BACKUP_RETENTION,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_canonical_key(mut self, key: impl Into<String>) -> Self {
        self.canonical_key = key.into();
        self
    }

    pub fn with_backup_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.backup_prefix = prefix.into();
        self
    }

    pub fn with_backup_retention(mut self, retention: usize) -> Self {
        self.backup_retention = retention.max(1);
        self
    }

    /// How many backups survive pruning; never less than 1.
    pub fn backup_retention(&self) -> usize {
        self.backup_retention
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Every prefix a backup key may start with, current prefix first.
    pub fn backup_prefixes(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.backup_prefix.as_str())
            .chain(self.legacy_backup_prefixes.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::StoreConfig;

    #[test]
    fn retention_is_clamped_to_one() {
        let config = StoreConfig::new().with_backup_retention(0);
        assert_eq!(config.backup_retention(), 1);
    }

    #[test]
    fn current_prefix_is_listed_first() {
        let config = StoreConfig::new().with_backup_prefix("bk_");
        let prefixes: Vec<&str> = config.backup_prefixes().collect();
        assert_eq!(prefixes[0], "bk_");
        assert_eq!(prefixes.len(), 2);
    }
}
