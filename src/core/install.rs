//! Template file installation with an explicit conflict policy.

use anyhow::{Context, Result};
use serde::Serialize;
use std::{fs, path::Path};
use tracing::{info, instrument};

use crate::core::backup::{BackupEntry, BackupLedger, BackupMode, MutationKind};

/// What to do when the destination already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Preserve the existing file in the ledger, then replace it
    Backup,
    /// Leave the existing file alone
    Skip,
    /// Replace without a backup
    Overwrite,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InstallOutcome {
    /// Nothing to install from
    SourceMissing,
    Skipped,
    Installed { backup: Option<BackupEntry> },
}

/// Copy `source` to `target`, honoring `policy` if `target` exists.
#[instrument(skip(ledger), fields(source = %source.display(), target = %target.display()))]
pub fn install_template(
    ledger: &BackupLedger,
    source: &Path,
    target: &Path,
    policy: ConflictPolicy,
) -> Result<InstallOutcome> {
    if !source.is_file() {
        return Ok(InstallOutcome::SourceMissing);
    }

    let mut backup = None;
    if let Ok(meta) = fs::symlink_metadata(target) {
        match policy {
            ConflictPolicy::Skip => return Ok(InstallOutcome::Skipped),
            ConflictPolicy::Backup => {
                backup = Some(ledger.preserve(target, BackupMode::Rename, MutationKind::File)?);
            }
            // Replace the link itself; copying through it would clobber its source
            ConflictPolicy::Overwrite if meta.file_type().is_symlink() => {
                fs::remove_file(target)
                    .with_context(|| format!("remove link: {}", target.display()))?;
            }
            ConflictPolicy::Overwrite => {}
        }
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create parent dir: {}", parent.display()))?;
    }
    fs::copy(source, target)
        .with_context(|| format!("copy {} → {}", source.display(), target.display()))?;
    info!("template installed");
    Ok(InstallOutcome::Installed { backup })
}
