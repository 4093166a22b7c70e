//! Integration tests for package linking and template installation
#![cfg(unix)]

use anyhow::Result;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use dotmerge::core::backup::{BackupLedger, MutationKind};
use dotmerge::core::backup_ops::revert;
use dotmerge::core::install::ConflictPolicy;
use dotmerge::core::link::{LinkManager, TargetState, install_package, plan_package};

/// Minimal stow: symlinks every file of `<root>/<package>` into `home`.
struct SymlinkFarm {
    root: PathBuf,
    home: PathBuf,
}

impl SymlinkFarm {
    fn files(&self, package: &str) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let mut stack = vec![self.root.join(package)];
        while let Some(dir) = stack.pop() {
            for e in fs::read_dir(&dir).unwrap() {
                let p = e.unwrap().path();
                if p.is_dir() {
                    stack.push(p);
                } else {
                    out.push(p);
                }
            }
        }
        out
    }
}

impl LinkManager for SymlinkFarm {
    fn link(&self, package: &str) -> Result<()> {
        let base = self.root.join(package);
        for src in self.files(package) {
            let dest = self.home.join(src.strip_prefix(&base)?);
            fs::create_dir_all(dest.parent().unwrap())?;
            if fs::symlink_metadata(&dest).is_err() {
                symlink(&src, &dest)?;
            }
        }
        Ok(())
    }

    fn unlink(&self, package: &str) -> Result<()> {
        let base = self.root.join(package);
        for src in self.files(package) {
            let dest = self.home.join(src.strip_prefix(&base)?);
            if self.owns(&dest) {
                fs::remove_file(&dest)?;
            }
        }
        Ok(())
    }

    fn owns(&self, path: &Path) -> bool {
        fs::read_link(path)
            .map(|t| t.starts_with(&self.root))
            .unwrap_or(false)
    }

    fn has_package(&self, package: &str) -> bool {
        self.root.join(package).is_dir()
    }
}

fn setup() -> Result<(TempDir, BackupLedger, SymlinkFarm)> {
    let temp = TempDir::new()?;
    let root = temp.path().join("stow");
    let home = temp.path().join("home");
    fs::create_dir_all(root.join("tmux"))?;
    fs::create_dir_all(&home)?;
    fs::write(root.join("tmux/.tmux.conf"), "set -g prefix C-a\n")?;

    let ledger = BackupLedger::new(temp.path().join("manifest.json"));
    Ok((temp, ledger, SymlinkFarm { root, home }))
}

fn targets() -> Vec<PathBuf> {
    vec![PathBuf::from(".tmux.conf")]
}

#[test]
fn links_into_empty_home() -> Result<()> {
    let (_temp, ledger, farm) = setup()?;
    let report = install_package(&ledger, &farm, &farm.home, "tmux", &targets(), ConflictPolicy::Backup)?;

    assert!(report.linked);
    assert!(report.backed_up.is_empty());
    assert!(farm.owns(&farm.home.join(".tmux.conf")));
    assert!(ledger.load().entries.is_empty());
    Ok(())
}

#[test]
fn existing_file_is_backed_up_then_reverted() -> Result<()> {
    let (_temp, ledger, farm) = setup()?;
    let conf = farm.home.join(".tmux.conf");
    fs::write(&conf, "mine\n")?;

    let report = install_package(&ledger, &farm, &farm.home, "tmux", &targets(), ConflictPolicy::Backup)?;
    assert!(report.linked);
    assert_eq!(report.backed_up.len(), 1);
    assert_eq!(
        report.backed_up[0].kind,
        MutationKind::Stow {
            package: "tmux".to_string()
        }
    );
    assert_eq!(fs::read_to_string(&conf)?, "set -g prefix C-a\n");

    let entries = ledger.load().entries;
    let undo = revert(&ledger, &entries, &farm)?;
    assert!(undo.is_clean());
    assert!(!farm.owns(&conf));
    assert_eq!(fs::read_to_string(&conf)?, "mine\n");
    Ok(())
}

#[test]
fn skip_policy_leaves_package_alone() -> Result<()> {
    let (_temp, ledger, farm) = setup()?;
    let conf = farm.home.join(".tmux.conf");
    fs::write(&conf, "mine\n")?;

    let report = install_package(&ledger, &farm, &farm.home, "tmux", &targets(), ConflictPolicy::Skip)?;
    assert!(!report.linked);
    assert_eq!(report.skipped, vec![conf.clone()]);
    assert_eq!(fs::read_to_string(&conf)?, "mine\n");
    Ok(())
}

#[test]
fn relinking_is_a_no_op() -> Result<()> {
    let (_temp, ledger, farm) = setup()?;
    install_package(&ledger, &farm, &farm.home, "tmux", &targets(), ConflictPolicy::Backup)?;

    let plan = plan_package(&farm, &farm.home, &targets());
    assert_eq!(plan[0].1, TargetState::Linked);

    let again = install_package(&ledger, &farm, &farm.home, "tmux", &targets(), ConflictPolicy::Backup)?;
    assert!(!again.linked);
    assert_eq!(again.already_linked.len(), 1);
    Ok(())
}

#[test]
fn unknown_package_fails() -> Result<()> {
    let (_temp, ledger, farm) = setup()?;
    let r = install_package(&ledger, &farm, &farm.home, "nope", &targets(), ConflictPolicy::Backup);
    assert!(r.is_err());
    Ok(())
}
