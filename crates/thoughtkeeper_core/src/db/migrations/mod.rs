//! Versioned migrations of the `kv_entries` table.
//!
//! Table schema only; the document's own `dataVersion` is handled by
//! `schema::migrate`.
//!
//! # Invariants
//! - Versions are contiguous from 1 and applied in one transaction.
//! - After each step `PRAGMA user_version` equals that step's version.

use crate::db::{DbError, DbResult};
use log::{error, info};
use rusqlite::{Connection, Transaction};

struct TableMigration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const TABLE_MIGRATIONS: &[TableMigration] = &[
    TableMigration {
        version: 1,
        name: "kv_entries",
        sql: include_str!("0001_kv_entries.sql"),
    },
    TableMigration {
        version: 2,
        name: "kv_entries_size",
        sql: include_str!("0002_kv_entries_size.sql"),
    },
];

/// Newest table version this binary can write.
pub fn latest_version() -> u32 {
    TABLE_MIGRATIONS.last().map_or(0, |step| step.version)
}

/// Table version recorded in the store file.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}

/// Brings the `kv_entries` table up to `latest_version()`.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the file is newer than this binary.
/// - `Migration` naming the step that failed; nothing is committed then.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let stored = schema_version(conn)?;
    let latest = latest_version();
    if stored > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: stored,
            latest_supported: latest,
        });
    }

    let pending: Vec<&TableMigration> = TABLE_MIGRATIONS
        .iter()
        .filter(|step| step.version > stored)
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for step in pending {
        if let Err(source) = run_step(&tx, step) {
            error!(
                "event=kv_migrate module=db status=error version={} name={} error={}",
                step.version, step.name, source
            );
            return Err(DbError::Migration {
                version: step.version,
                name: step.name,
                source,
            });
        }
        info!(
            "event=kv_migrate module=db status=ok version={} name={}",
            step.version, step.name
        );
    }
    tx.commit()?;

    info!("event=kv_migrate module=db status=done from_version={stored} to_version={latest}");
    Ok(())
}

fn run_step(tx: &Transaction<'_>, step: &TableMigration) -> rusqlite::Result<()> {
    tx.execute_batch(step.sql)?;
    tx.pragma_update(None, "user_version", step.version)
}
