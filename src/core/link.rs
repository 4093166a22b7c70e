//! Stow-managed configuration packages.
//!
//! A package is a directory under the stow root whose tree mirrors `$HOME`.
//! Linking it displaces whatever already sits at the package's targets, so
//! every displaced file goes through the ledger as a `stow` entry first.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, info, instrument, warn};

use crate::core::backup::{BackupEntry, BackupLedger, BackupMode, MutationKind};
use crate::core::install::ConflictPolicy;

/// Something that can link and unlink configuration packages.
pub trait LinkManager {
    /// Create the package's links under the target directory.
    fn link(&self, package: &str) -> Result<()>;
    /// Remove the package's links.
    fn unlink(&self, package: &str) -> Result<()>;
    /// Is `path` already a link into the managed tree?
    fn owns(&self, path: &Path) -> bool;
    /// Does the package exist at all?
    fn has_package(&self, package: &str) -> bool;
}

/// GNU stow driven through the command line.
#[derive(Debug, Clone)]
pub struct StowLinker {
    stow_dir: PathBuf,
    target_dir: PathBuf,
}

impl StowLinker {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(stow_dir: P, target_dir: Q) -> Self {
        Self {
            stow_dir: stow_dir.into(),
            target_dir: target_dir.into(),
        }
    }

    fn run(&self, extra: &[&str], package: &str) -> Result<()> {
        let output = Command::new("stow")
            .arg("-d")
            .arg(&self.stow_dir)
            .arg("-t")
            .arg(&self.target_dir)
            .args(extra)
            .arg(package)
            .output()
            .context("spawn stow")?;
        if !output.status.success() {
            bail!(
                "stow {} failed: {}",
                package,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

impl LinkManager for StowLinker {
    fn link(&self, package: &str) -> Result<()> {
        self.run(&[], package)
    }

    fn unlink(&self, package: &str) -> Result<()> {
        self.run(&["-D"], package)
    }

    fn owns(&self, path: &Path) -> bool {
        let is_link = fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if !is_link {
            return false;
        }
        match (dunce::canonicalize(path), dunce::canonicalize(&self.stow_dir)) {
            (Ok(resolved), Ok(root)) => resolved.starts_with(root),
            _ => false,
        }
    }

    fn has_package(&self, package: &str) -> bool {
        self.stow_dir.join(package).is_dir()
    }
}

/// Current state of one package target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    Missing,
    Linked,
    /// Something foreign occupies the slot
    Occupied,
}

/// Inspect each `home`-relative target of a package.
pub fn plan_package(
    linker: &dyn LinkManager,
    home: &Path,
    targets: &[PathBuf],
) -> Vec<(PathBuf, TargetState)> {
    targets
        .iter()
        .map(|t| {
            let path = home.join(t);
            let state = if linker.owns(&path) {
                TargetState::Linked
            } else if fs::symlink_metadata(&path).is_ok() {
                TargetState::Occupied
            } else {
                TargetState::Missing
            };
            (path, state)
        })
        .collect()
}

/// Result of installing one package.
#[derive(Debug, Default, Serialize)]
pub struct LinkReport {
    pub package: String,
    pub linked: bool,
    pub already_linked: Vec<PathBuf>,
    pub backed_up: Vec<BackupEntry>,
    pub removed: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

/// Link a package, clearing occupied targets according to `policy`.
///
/// With `Skip`, a single foreign file leaves the whole package untouched,
/// since stow refuses to link over it anyway.
#[instrument(skip(ledger, linker, home, targets))]
pub fn install_package(
    ledger: &BackupLedger,
    linker: &dyn LinkManager,
    home: &Path,
    package: &str,
    targets: &[PathBuf],
    policy: ConflictPolicy,
) -> Result<LinkReport> {
    if !linker.has_package(package) {
        bail!("Stow package not found: {package}");
    }

    let plan = plan_package(linker, home, targets);
    let mut report = LinkReport {
        package: package.to_string(),
        ..Default::default()
    };

    if policy == ConflictPolicy::Skip {
        let occupied: Vec<PathBuf> = plan
            .iter()
            .filter(|(_, s)| *s == TargetState::Occupied)
            .map(|(p, _)| p.clone())
            .collect();
        if !occupied.is_empty() {
            warn!(package, count = occupied.len(), "existing files; skipping package");
            report.skipped = occupied;
            return Ok(report);
        }
    }

    let mut needs_link = false;
    for (path, state) in &plan {
        match state {
            TargetState::Linked => {
                debug!(path = %path.display(), "already linked");
                report.already_linked.push(path.clone());
            }
            TargetState::Occupied => {
                if policy == ConflictPolicy::Backup {
                    let entry = ledger.preserve(
                        path,
                        BackupMode::Rename,
                        MutationKind::Stow {
                            package: package.to_string(),
                        },
                    )?;
                    report.backed_up.push(entry);
                } else {
                    fs::remove_file(path)
                        .with_context(|| format!("remove {}", path.display()))?;
                    report.removed.push(path.clone());
                }
                needs_link = true;
            }
            TargetState::Missing => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("create parent dir: {}", parent.display()))?;
                }
                needs_link = true;
            }
        }
    }

    if needs_link {
        linker.link(package)?;
        report.linked = true;
        info!(package, "package linked");
    }
    Ok(report)
}
