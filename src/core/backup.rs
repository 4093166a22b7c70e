//! Backup ledger: the single record of every reversible mutation.
//!
//! A JSON manifest lists `(original, backup, kind, timestamp)` entries. The
//! whole file is re-read on every operation and rewritten atomically (temp
//! file + rename) on every save; there is no in-process caching and no lock,
//! so concurrent tool invocations race (last writer wins).
//!
//! Physical preservation writes `<path>.dotfiles-backup.<epoch-millis>` next
//! to the original, either as a copy (file stays in place) or by renaming the
//! original away (file is about to be replaced).

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

use crate::infra::io::{path_occupied, write_atomic};

/// Current manifest schema version.
pub const MANIFEST_VERSION: u32 = 1;

/// Infix of every backup file name.
pub const BACKUP_MARKER: &str = "dotfiles-backup";

/// What kind of mutation an entry undoes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MutationKind {
    /// Plain file overwritten or edited in place
    File,
    /// File displaced by a stow-managed link for `package`
    Stow {
        #[serde(rename = "stowPackage")]
        package: String,
    },
}

impl MutationKind {
    pub fn label(&self) -> String {
        match self {
            MutationKind::File => "file".to_string(),
            MutationKind::Stow { package } => format!("stow:{package}"),
        }
    }
}

/// One destructive mutation and where its pre-image lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackupEntry {
    pub original: PathBuf,
    pub backup: PathBuf,
    #[serde(flatten)]
    pub kind: MutationKind,
    /// Epoch milliseconds at recording time
    pub timestamp: i64,
}

impl BackupEntry {
    /// Same mutation record (timestamp aside).
    pub fn same_record(&self, other: &BackupEntry) -> bool {
        self.original == other.original && self.backup == other.backup
    }
}

/// Persisted, ordered ledger contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub entries: Vec<BackupEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: Vec::new(),
        }
    }
}

/// How the pre-mutation content is preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupMode {
    /// Copy; the original stays in place (edited afterwards)
    Copy,
    /// Rename; the original slot is freed (replaced afterwards)
    Rename,
}

/// Handle on the manifest file. Holds only the path.
#[derive(Debug, Clone)]
pub struct BackupLedger {
    manifest_path: PathBuf,
}

impl BackupLedger {
    pub fn new<P: Into<PathBuf>>(manifest_path: P) -> Self {
        Self {
            manifest_path: manifest_path.into(),
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Read the manifest; absent or unparsable means "no history".
    pub fn load(&self) -> Manifest {
        let text = match fs::read_to_string(&self.manifest_path) {
            Ok(t) => t,
            Err(_) => return Manifest::default(),
        };
        match serde_json::from_str::<Manifest>(&text) {
            Ok(m) => {
                if m.version != MANIFEST_VERSION {
                    warn!(
                        version = m.version,
                        expected = MANIFEST_VERSION,
                        "unexpected manifest version; reading anyway"
                    );
                }
                m
            }
            Err(e) => {
                warn!(
                    path = %self.manifest_path.display(),
                    error = %e,
                    "unparsable backup manifest; treating as empty"
                );
                Manifest::default()
            }
        }
    }

    /// Persist the full manifest atomically.
    pub fn save(&self, manifest: &Manifest) -> Result<()> {
        let text = serde_json::to_string_pretty(manifest).context("serialize manifest")?;
        write_atomic(&self.manifest_path, text.as_bytes())
            .with_context(|| format!("write manifest: {}", self.manifest_path.display()))
    }

    /// Record a mutation: load, push with a fresh timestamp, save.
    #[instrument(skip(self), fields(original = %original.display()))]
    pub fn append(&self, original: &Path, backup: &Path, kind: MutationKind) -> Result<BackupEntry> {
        let entry = BackupEntry {
            original: original.to_path_buf(),
            backup: backup.to_path_buf(),
            kind,
            timestamp: Utc::now().timestamp_millis(),
        };
        let mut manifest = self.load();
        manifest.entries.push(entry.clone());
        self.save(&manifest)?;
        debug!(backup = %backup.display(), "ledger entry appended");
        Ok(entry)
    }

    /// Drop one record (matched on original + backup) and save.
    pub fn remove(&self, entry: &BackupEntry) -> Result<bool> {
        let mut manifest = self.load();
        let before = manifest.entries.len();
        manifest.entries.retain(|e| !e.same_record(entry));
        let removed = manifest.entries.len() != before;
        if removed {
            self.save(&manifest)?;
        }
        Ok(removed)
    }

    /// All entries for `original`, in ledger order.
    pub fn entries_for(&self, original: &Path) -> Vec<BackupEntry> {
        self.load()
            .entries
            .into_iter()
            .filter(|e| e.original == original)
            .collect()
    }

    /// Most recent entry for `original`.
    pub fn latest_for(&self, original: &Path) -> Option<BackupEntry> {
        self.entries_for(original)
            .into_iter()
            .max_by_key(|e| e.timestamp)
    }

    /// Write-ahead preservation: record first, then copy/rename, and roll the
    /// record back if the physical step fails.
    ///
    /// A crash between the two steps leaves an entry whose backup is missing,
    /// which revert reports and skips, instead of an unrecorded orphan file.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn preserve(&self, path: &Path, mode: BackupMode, kind: MutationKind) -> Result<BackupEntry> {
        let (backup, _) = next_backup_path(path);
        let entry = self.append(path, &backup, kind)?;

        if let Err(e) = preserve_to(path, &backup, mode) {
            if let Err(rollback) = self.remove(&entry) {
                warn!(error = %rollback, "failed to roll back ledger entry");
            }
            return Err(e);
        }

        info!(backup = %backup.display(), "backed up");
        Ok(entry)
    }
}

/// `<path>.dotfiles-backup.<millis>`.
pub fn backup_path_for(path: &Path, millis: i64) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(format!(".{BACKUP_MARKER}.{millis}"));
    PathBuf::from(name)
}

/// First free backup path at or after the current millisecond.
fn next_backup_path(path: &Path) -> (PathBuf, i64) {
    let mut millis = Utc::now().timestamp_millis();
    loop {
        let candidate = backup_path_for(path, millis);
        if !path_occupied(&candidate) {
            return (candidate, millis);
        }
        millis += 1;
    }
}

fn preserve_to(path: &Path, backup: &Path, mode: BackupMode) -> Result<()> {
    match mode {
        BackupMode::Copy => {
            fs::copy(path, backup).with_context(|| {
                format!("copy {} → {}", path.display(), backup.display())
            })?;
        }
        BackupMode::Rename => {
            fs::rename(path, backup).with_context(|| {
                format!("rename {} → {}", path.display(), backup.display())
            })?;
        }
    }
    Ok(())
}

/// Physically preserve `path` and return the backup location.
///
/// Nothing is recorded; the caller must `append` afterwards. A failure or
/// interrupt between the two leaves an unrecorded backup file on disk.
pub fn backup_file(path: &Path, mode: BackupMode) -> Result<PathBuf> {
    let (backup, _) = next_backup_path(path);
    preserve_to(path, &backup, mode)?;
    Ok(backup)
}
