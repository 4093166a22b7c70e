//! Backup ledger operations: listing, selection, and reversal.
//!
//! Reversal walks the caller's selection in order, undoing stow management
//! first for link entries, then moving each backup back over its original.
//! Per-entry failures are collected, never fatal to the batch. The manifest
//! is saved once after the loop.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::core::backup::{BackupEntry, BackupLedger, Manifest, MutationKind};
use crate::core::link::LinkManager;
use crate::infra::io::path_occupied;

/// Why one selected entry could not be restored.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RevertFailure {
    #[error("backup file not found: {}", backup.display())]
    BackupMissing { original: PathBuf, backup: PathBuf },

    #[error("failed to restore {}: {message}", original.display())]
    Io { original: PathBuf, message: String },
}

/// Outcome of a revert batch.
#[derive(Debug, Default, Serialize)]
pub struct RevertReport {
    pub restored: Vec<PathBuf>,
    pub failures: Vec<RevertFailure>,
}

impl RevertReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Restore each selected entry, in the given order.
#[instrument(skip_all, fields(selected = selected.len()))]
pub fn revert(
    ledger: &BackupLedger,
    selected: &[BackupEntry],
    linker: &dyn LinkManager,
) -> Result<RevertReport> {
    let mut manifest = ledger.load();
    let mut report = RevertReport::default();

    for entry in selected {
        // Drop the managed link before putting the old file back
        if let MutationKind::Stow { package } = &entry.kind {
            if let Err(e) = linker.unlink(package) {
                warn!(package = %package, error = %e, "unlink failed; restoring anyway");
            }
        }

        if !path_occupied(&entry.backup) {
            error!(backup = %entry.backup.display(), "backup file not found");
            report.failures.push(RevertFailure::BackupMissing {
                original: entry.original.clone(),
                backup: entry.backup.clone(),
            });
            continue;
        }

        if let Err(e) = restore_one(entry) {
            error!(original = %entry.original.display(), error = %e, "restore failed");
            report.failures.push(RevertFailure::Io {
                original: entry.original.clone(),
                message: e.to_string(),
            });
            continue;
        }

        manifest.entries.retain(|e| !e.same_record(entry));
        info!(original = %entry.original.display(), "restored");
        report.restored.push(entry.original.clone());
    }

    if !report.restored.is_empty() {
        ledger.save(&manifest)?;
    }
    Ok(report)
}

fn restore_one(entry: &BackupEntry) -> io::Result<()> {
    match fs::symlink_metadata(&entry.original) {
        Ok(meta) if meta.is_dir() => {
            return Err(io::Error::other(format!(
                "{} is a directory",
                entry.original.display()
            )));
        }
        Ok(_) => fs::remove_file(&entry.original)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    // Unstowing may prune now-empty parent directories
    if let Some(parent) = entry.original.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(&entry.backup, &entry.original)
}

/// Default restore candidates: the newest entry per original, in
/// first-seen order. Older entries stay reachable by explicit backup path.
pub fn restore_candidates(manifest: &Manifest) -> Vec<BackupEntry> {
    let mut latest: IndexMap<&Path, &BackupEntry> = IndexMap::new();
    for e in &manifest.entries {
        let slot = latest.entry(e.original.as_path()).or_insert(e);
        if e.timestamp >= slot.timestamp {
            *slot = e;
        }
    }
    latest.into_values().cloned().collect()
}

/// Resolve CLI-level selections to ledger entries, preserving request order.
///
/// - `originals`: newest entry for each path
/// - `backups`: the exact entry owning each backup path
/// - `all`: every default candidate
pub fn resolve_selection(
    ledger: &BackupLedger,
    originals: &[PathBuf],
    backups: &[PathBuf],
    all: bool,
) -> Result<Vec<BackupEntry>> {
    let manifest = ledger.load();
    if all {
        return Ok(restore_candidates(&manifest));
    }

    let candidates = restore_candidates(&manifest);
    let mut out = Vec::new();
    for o in originals {
        match candidates.iter().find(|e| &e.original == o) {
            Some(e) => out.push(e.clone()),
            None => bail!("No backup recorded for {}", o.display()),
        }
    }
    for b in backups {
        match manifest.entries.iter().find(|e| &e.backup == b) {
            Some(e) => out.push(e.clone()),
            None => bail!("No ledger entry owns backup {}", b.display()),
        }
    }
    Ok(out)
}

/// Request structure for listing ledger entries
#[derive(Debug, Default)]
pub struct ListRequest {
    /// Include superseded entries, not just the newest per original
    pub all: bool,
    /// Relative window such as "7d" or "24h"
    pub since: Option<String>,
}

/// Ledger entry with derived display fields
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    #[serde(flatten)]
    pub entry: BackupEntry,
    pub recorded: String,
    pub backup_exists: bool,
    /// How many entries exist for the same original
    pub versions: usize,
}

/// List ledger entries, newest first.
pub fn list_entries(ledger: &BackupLedger, req: &ListRequest) -> Result<Vec<EntryInfo>> {
    let since = match req.since.as_deref() {
        Some(s) => Some(parse_relative_time(s)?.timestamp_millis()),
        None => None,
    };

    let manifest = ledger.load();
    let mut entries = if req.all {
        manifest.entries.clone()
    } else {
        restore_candidates(&manifest)
    };
    if let Some(bound) = since {
        entries.retain(|e| e.timestamp >= bound);
    }
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    Ok(entries
        .into_iter()
        .map(|e| {
            let versions = manifest
                .entries
                .iter()
                .filter(|x| x.original == e.original)
                .count();
            EntryInfo {
                recorded: format_millis(e.timestamp),
                backup_exists: path_occupied(&e.backup),
                versions,
                entry: e,
            }
        })
        .collect())
}

/// Render epoch millis in local time for humans.
pub fn format_millis(ms: i64) -> String {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// Parse relative time specifications like "7d", "24h"
fn parse_relative_time(time_str: &str) -> Result<DateTime<Utc>> {
    let time_str = time_str.trim();
    if time_str.is_empty() {
        bail!("Empty time specification");
    }

    let Some(unit) = time_str.chars().last() else {
        bail!("Empty time specification");
    };
    if !matches!(unit, 'w' | 'd' | 'h' | 'm' | 's') {
        bail!("Invalid time unit in '{}'. Use w, d, h, m, or s", time_str);
    }
    let number_str = &time_str[..time_str.len() - 1];

    // Parse and reject negatives
    let number: i64 = number_str
        .parse()
        .with_context(|| format!("Invalid number '{}' in time specification", number_str))?;
    if number < 0 {
        bail!("Negative durations are not allowed: '{}'", time_str);
    }

    let duration = match unit {
        'w' => Duration::try_weeks(number),
        'd' => Duration::try_days(number),
        'h' => Duration::try_hours(number),
        'm' => Duration::try_minutes(number),
        _ => Duration::try_seconds(number),
    };

    duration
        .and_then(|d| Utc::now().checked_sub_signed(d))
        .with_context(|| format!("Time span '{}' is out of range", time_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(original: &str, backup: &str, ts: i64) -> BackupEntry {
        BackupEntry {
            original: PathBuf::from(original),
            backup: PathBuf::from(backup),
            kind: MutationKind::File,
            timestamp: ts,
        }
    }

    #[test]
    fn test_parse_relative_time() {
        let base_time = Utc::now();

        let result = parse_relative_time("7d").unwrap();
        let expected = base_time - Duration::days(7);
        assert!((result - expected).num_seconds().abs() < 5);

        let result = parse_relative_time("2w").unwrap();
        let expected = base_time - Duration::weeks(2);
        assert!((result - expected).num_seconds().abs() < 5);

        assert!(parse_relative_time("-7d").is_err());
        assert!(parse_relative_time("abc").is_err());
        assert!(parse_relative_time("7x").is_err());
        assert!(parse_relative_time("").is_err());
    }

    #[test]
    fn huge_relative_time_is_an_error() {
        assert!(parse_relative_time("9999999999999999d").is_err());
        assert!(parse_relative_time("9223372036854775807s").is_err());
    }

    #[test]
    fn candidates_keep_newest_per_original_in_first_seen_order() {
        let manifest = Manifest {
            version: 1,
            entries: vec![
                entry("/b", "/b.1", 10),
                entry("/a", "/a.1", 5),
                entry("/b", "/b.2", 30),
                entry("/a", "/a.0", 1),
            ],
        };
        let c = restore_candidates(&manifest);
        let got: Vec<_> = c.iter().map(|e| e.backup.to_str().unwrap()).collect();
        assert_eq!(got, vec!["/b.2", "/a.1"]);
    }

    #[test]
    fn format_millis_is_readable() {
        let s = format_millis(0);
        assert_eq!(s.len(), "1970-01-01 00:00:00".len());
    }
}
