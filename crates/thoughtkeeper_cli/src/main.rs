//! Command-line front end for the thought document store.
//!
//! # Responsibility
//! - Open the SQLite-backed store and expose every maintenance operation.
//! - Keep stdout machine-friendly; diagnostics go to the log file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use thoughtkeeper_core::{
    core_version, default_log_level, describe_data_age, init_logging, open_db, ClearOutcome,
    Clock, Confirmation, DocumentStore, FreshnessMonitor, NullBus, SqliteKeyValueStore,
    SystemClock,
};

const DB_PATH_ENV: &str = "THOUGHTKEEPER_DB_PATH";
const DEFAULT_DB_FILE: &str = "thoughtkeeper.sqlite3";

type Store<'conn> = DocumentStore<SqliteKeyValueStore<'conn>, NullBus, SystemClock>;

/// thoughtkeeper - maintain the structured thought document
#[derive(Parser)]
#[command(name = "thoughtkeeper")]
#[command(version)]
struct Cli {
    /// SQLite file holding the store (falls back to $THOUGHTKEEPER_DB_PATH)
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,

    /// Log level: trace|debug|info|warn|error
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Absolute directory for rotated log files; logging is off without it
    #[arg(long, value_name = "DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print document statistics
    Stats,
    /// Print the full document as JSON
    Show,
    /// Export the document with export metadata
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Import a previously exported document
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Report tag-count and ID-counter inconsistencies
    Check,
    /// Recompute tag counts and ID counters
    Repair,
    /// Snapshot the current document
    Backup,
    /// List backups, newest first
    Backups,
    /// Replace the document with the newest usable backup
    Restore,
    /// Delete the document after backing it up
    Clear {
        /// Required: confirms the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Poll for writes made by other processes
    Watch {
        #[arg(long, value_name = "SECONDS")]
        interval_secs: Option<u64>,
        /// Stop after this many polls
        #[arg(long, value_name = "N")]
        max_polls: Option<u64>,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Some(log_dir) = &cli.log_dir {
        let level = cli
            .log_level
            .clone()
            .unwrap_or_else(|| default_log_level().to_string());
        init_logging(&level, log_dir).context("Failed to initialize logging")?;
    }

    let db_path = resolve_db_path(cli.db.as_deref());
    ensure_parent_directory(&db_path)?;
    let conn = open_db(&db_path)
        .with_context(|| format!("Failed to open store at {}", db_path.display()))?;
    info!(
        "event=cli_start module=cli status=ok version={} command={}",
        core_version(),
        command_name(&cli.command)
    );

    let store: Store<'_> =
        DocumentStore::new(SqliteKeyValueStore::new(&conn), NullBus::new(), SystemClock);
    execute(&store, &cli.command)
}

fn execute(store: &Store<'_>, command: &Commands) -> Result<()> {
    match command {
        Commands::Stats => {
            let stats = store.stats();
            println!("thoughts={}", stats.thoughts);
            println!("models={}", stats.models);
            println!("tags={}", stats.tags);
            println!("timeline={}", stats.timeline);
            println!("model_connections={}", stats.model_connections);
            println!("current_version={}", stats.current_version);
            println!("data_version={}", stats.data_version);
            let age = describe_data_age(&stats.last_saved, SystemClock.now())
                .unwrap_or_else(|| "unknown".to_string());
            println!("last_saved={} ({age})", stats.last_saved);
        }
        Commands::Show => {
            let document = store.try_load().context("Failed to load document")?;
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        Commands::Export { output } => {
            let exported = store.export_json().context("Failed to export document")?;
            match output {
                Some(path) => {
                    std::fs::write(path, exported)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Exported to {}", path.display());
                }
                None => println!("{exported}"),
            }
        }
        Commands::Import { file } => {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let document = store.import_json(&text).context("Import failed")?;
            println!(
                "Imported {} thoughts and {} models",
                document.thoughts.len(),
                document.models.len()
            );
        }
        Commands::Check => {
            let report = store.check_consistency()?;
            println!("consistent={}", report.consistent);
            for mismatch in &report.inconsistencies {
                let stored = mismatch
                    .stored
                    .map_or_else(|| "missing".to_string(), |count| count.to_string());
                println!(
                    "tag {:?}: stored={} calculated={}",
                    mismatch.tag, stored, mismatch.calculated
                );
            }
            for id in &report.duplicate_thought_ids {
                println!("duplicate thought id {id}");
            }
            for id in &report.duplicate_model_ids {
                println!("duplicate model id {id}");
            }
            for lag in &report.counter_lags {
                println!(
                    "{} is {} but should be at least {}",
                    lag.counter, lag.stored, lag.expected
                );
            }
        }
        Commands::Repair => {
            let document = store.repair().context("Repair failed")?;
            println!(
                "Repaired: tags={} nextThoughtId={} nextModelId={}",
                document.tags.len(),
                document.next_thought_id,
                document.next_model_id
            );
        }
        Commands::Backup => match store.create_backup()? {
            Some(key) => println!("{key}"),
            None => println!("Nothing stored; no backup written"),
        },
        Commands::Backups => {
            for entry in store.list_backups()? {
                println!("{}", entry.key);
            }
        }
        Commands::Restore => {
            let document = store.restore_from_latest_backup().context("Restore failed")?;
            println!(
                "Restored {} thoughts and {} models",
                document.thoughts.len(),
                document.models.len()
            );
        }
        Commands::Clear { yes } => {
            let confirmation = if *yes {
                Confirmation::Confirmed
            } else {
                Confirmation::Declined
            };
            match store.clear(confirmation)? {
                ClearOutcome::Declined => bail!("Refusing to clear without --yes"),
                ClearOutcome::Cleared { backup_key } => println!(
                    "Cleared; backup: {}",
                    backup_key.as_deref().unwrap_or("none")
                ),
            }
        }
        Commands::Watch {
            interval_secs,
            max_polls,
        } => watch(store, *interval_secs, *max_polls)?,
    }
    Ok(())
}

fn watch(store: &Store<'_>, interval_secs: Option<u64>, max_polls: Option<u64>) -> Result<()> {
    let mut monitor = FreshnessMonitor::from_store(store)?;
    let interval = interval_secs.map_or_else(|| monitor.poll_interval(), Duration::from_secs);
    println!("Watching every {}s", interval.as_secs());

    let mut polls = 0_u64;
    while max_polls.map_or(true, |limit| polls < limit) {
        std::thread::sleep(interval);
        polls += 1;
        if monitor.check_for_updates(store)?.is_some() {
            let stats = store.stats();
            println!(
                "Document changed: lastSaved={} thoughts={} models={}",
                stats.last_saved, stats.thoughts, stats.models
            );
        }
    }
    Ok(())
}

fn resolve_db_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match std::env::var(DB_PATH_ENV) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value.trim()),
        _ => std::env::temp_dir().join(DEFAULT_DB_FILE),
    }
}

fn ensure_parent_directory(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create store directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Stats => "stats",
        Commands::Show => "show",
        Commands::Export { .. } => "export",
        Commands::Import { .. } => "import",
        Commands::Check => "check",
        Commands::Repair => "repair",
        Commands::Backup => "backup",
        Commands::Backups => "backups",
        Commands::Restore => "restore",
        Commands::Clear { .. } => "clear",
        Commands::Watch { .. } => "watch",
    }
}

#[cfg(test)]
mod tests {
    use super::{resolve_db_path, Cli, Commands};
    use clap::Parser;
    use std::path::{Path, PathBuf};

    #[test]
    fn explicit_db_path_wins() {
        assert_eq!(
            resolve_db_path(Some(Path::new("/tmp/a.sqlite3"))),
            PathBuf::from("/tmp/a.sqlite3")
        );
    }

    #[test]
    fn clear_flag_parses() {
        let cli = Cli::try_parse_from(["thoughtkeeper", "clear", "--yes"]).unwrap();
        assert!(matches!(cli.command, Commands::Clear { yes: true }));
    }

    #[test]
    fn global_db_flag_is_accepted_after_subcommand() {
        let cli =
            Cli::try_parse_from(["thoughtkeeper", "stats", "--db", "/tmp/x.sqlite3"]).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.sqlite3")));
    }
}
