//! Installed-state detection for tools.
//!
//! Host access goes through two small capabilities so detection is
//! deterministic under test: [`SystemProbe`] for path/command existence and
//! [`PackageLookup`] for package-manager inventories. The lookup is a
//! memoizing service owned by the caller, with an explicit `invalidate`
//! after anything gets installed.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    path::Path,
    process::Command,
};
use tracing::{debug, warn};

/// Existence checks against the host.
pub trait SystemProbe {
    fn exists(&self, path: &Path) -> bool;
    fn command_available(&self, name: &str) -> bool;
}

/// The real filesystem and `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProbe;

impl SystemProbe for HostProbe {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn command_available(&self, name: &str) -> bool {
        which::which(name).is_ok()
    }
}

/// Inventory category a package manager reports separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    /// Command-line package
    #[default]
    Package,
    /// Desktop application bundle
    App,
}

/// Installed-package inventory.
pub trait PackageLookup {
    fn installed(&mut self, kind: PackageKind) -> &HashSet<String>;
    /// Forget cached inventories (call after installing anything).
    fn invalidate(&mut self);
}

/// Memoizes one inventory query per kind until invalidated.
pub struct CachedPackageLookup<F>
where
    F: FnMut(PackageKind) -> Result<Vec<String>>,
{
    query: F,
    cache: HashMap<PackageKind, HashSet<String>>,
}

impl<F> CachedPackageLookup<F>
where
    F: FnMut(PackageKind) -> Result<Vec<String>>,
{
    pub fn new(query: F) -> Self {
        Self {
            query,
            cache: HashMap::new(),
        }
    }
}

impl<F> PackageLookup for CachedPackageLookup<F>
where
    F: FnMut(PackageKind) -> Result<Vec<String>>,
{
    fn installed(&mut self, kind: PackageKind) -> &HashSet<String> {
        let query = &mut self.query;
        self.cache.entry(kind).or_insert_with(|| match query(kind) {
            Ok(names) => names.into_iter().collect(),
            Err(e) => {
                // An unavailable package manager just means "nothing installed"
                warn!(?kind, error = %e, "package inventory query failed");
                HashSet::new()
            }
        })
    }

    fn invalidate(&mut self) {
        self.cache.clear();
    }
}

/// Run an inventory command; one package name per non-empty output line.
pub fn run_list_command(argv: &[String]) -> Result<Vec<String>> {
    let Some((program, args)) = argv.split_first() else {
        bail!("empty package list command");
    };
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("spawn {program}"))?;
    if !output.status.success() {
        bail!("{} exited with {}", program, output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// How to recognize one tool. The first configured check wins:
/// `path`, then `command`, then `package`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    pub kind: PackageKind,
    /// Extra packages that must be present for a complete install
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallState {
    Installed,
    /// Main tool present, some dependencies missing
    Partial,
    NotInstalled,
}

pub fn detect_state(
    tool: &ToolSpec,
    probe: &dyn SystemProbe,
    lookup: &mut dyn PackageLookup,
) -> InstallState {
    let present = if let Some(p) = &tool.path {
        probe.exists(Path::new(p))
    } else if let Some(c) = &tool.command {
        probe.command_available(c)
    } else if let Some(pkg) = &tool.package {
        lookup.installed(tool.kind).contains(pkg)
    } else {
        false
    };

    if !present {
        return InstallState::NotInstalled;
    }

    let inventory = lookup.installed(PackageKind::Package);
    let missing: Vec<&String> = tool
        .dependencies
        .iter()
        .filter(|d| !inventory.contains(*d))
        .collect();
    if !missing.is_empty() {
        debug!(tool = %tool.name, ?missing, "dependencies missing");
        return InstallState::Partial;
    }
    InstallState::Installed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::path::PathBuf;

    struct FakeProbe {
        paths: Vec<PathBuf>,
        commands: Vec<&'static str>,
    }

    impl SystemProbe for FakeProbe {
        fn exists(&self, path: &Path) -> bool {
            self.paths.iter().any(|p| p == path)
        }
        fn command_available(&self, name: &str) -> bool {
            self.commands.contains(&name)
        }
    }

    fn probe() -> FakeProbe {
        FakeProbe {
            paths: vec![PathBuf::from("/Applications/Ghostty.app")],
            commands: vec!["claude"],
        }
    }

    fn inventory(kind: PackageKind) -> Result<Vec<String>> {
        Ok(match kind {
            PackageKind::Package => vec!["tmux".into(), "fzf".into()],
            PackageKind::App => vec!["raycast".into()],
        })
    }

    #[test]
    fn path_then_command_then_package() {
        let mut lookup = CachedPackageLookup::new(inventory);
        let by_path = ToolSpec {
            name: "ghostty".into(),
            path: Some("/Applications/Ghostty.app".into()),
            package: Some("not-there".into()),
            ..Default::default()
        };
        assert_eq!(detect_state(&by_path, &probe(), &mut lookup), InstallState::Installed);

        let by_cmd = ToolSpec {
            name: "claude".into(),
            command: Some("claude".into()),
            ..Default::default()
        };
        assert_eq!(detect_state(&by_cmd, &probe(), &mut lookup), InstallState::Installed);

        let app = ToolSpec {
            name: "raycast".into(),
            package: Some("raycast".into()),
            kind: PackageKind::App,
            ..Default::default()
        };
        assert_eq!(detect_state(&app, &probe(), &mut lookup), InstallState::Installed);

        let absent = ToolSpec {
            name: "bat".into(),
            package: Some("bat".into()),
            ..Default::default()
        };
        assert_eq!(detect_state(&absent, &probe(), &mut lookup), InstallState::NotInstalled);
    }

    #[test]
    fn missing_dependency_is_partial() {
        let mut lookup = CachedPackageLookup::new(inventory);
        let tmux = ToolSpec {
            name: "tmux".into(),
            package: Some("tmux".into()),
            dependencies: vec!["sesh".into(), "fzf".into()],
            ..Default::default()
        };
        assert_eq!(detect_state(&tmux, &probe(), &mut lookup), InstallState::Partial);
    }

    #[test]
    fn lookup_memoizes_until_invalidated() {
        let calls = Cell::new(0);
        let mut lookup = CachedPackageLookup::new(|_kind| {
            calls.set(calls.get() + 1);
            Ok(vec!["tmux".to_string()])
        });

        assert!(lookup.installed(PackageKind::Package).contains("tmux"));
        assert!(lookup.installed(PackageKind::Package).contains("tmux"));
        assert_eq!(calls.get(), 1);

        lookup.invalidate();
        lookup.installed(PackageKind::Package);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn failed_query_reads_as_empty() {
        let mut lookup = CachedPackageLookup::new(|_| bail!("no package manager"));
        assert!(lookup.installed(PackageKind::App).is_empty());
    }

    #[test]
    fn empty_list_command_is_rejected() {
        assert!(run_list_command(&[]).is_err());
    }
}
