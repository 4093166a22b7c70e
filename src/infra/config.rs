use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};
use crate::core::detect::{PackageKind, ToolSpec};

pub const DEFAULT_MANIFEST: &str = "~/.config/dotfiles/backup-manifest.json";

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Backup ledger location
    pub manifest_path: String,

    /// Home directory override (defaults to $HOME)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,

    /// Stow packages and their link targets
    pub stow: StowConfig,

    /// Package manager inventory commands
    pub package_list: PackageListConfig,

    /// Tools reported by `status`
    pub tools: Vec<ToolSpec>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StowConfig
{
    pub dir: String,
    /// Package name → home-relative targets
    pub packages: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageListConfig
{
    pub packages: Vec<String>,
    pub apps: Vec<String>,
}

impl Default for StowConfig
{
    fn default() -> Self
    {
        let packages = [
            ("zsh", &[".zshrc", ".config/starship.toml"][..]),
            ("tmux", &[".tmux.conf"][..]),
            ("karabiner", &[".config/karabiner/karabiner.json"][..]),
            ("ghostty", &[".config/ghostty/config"][..]),
            ("mackup", &[".mackup.cfg"][..]),
        ]
        .into_iter()
        .map(|(name, targets)| {
            (name.to_string(), targets.iter().map(|t| t.to_string()).collect())
        })
        .collect();

        Self { dir: "~/dotfiles/stow".to_string(), packages }
    }
}

impl Default for PackageListConfig
{
    fn default() -> Self
    {
        let argv = |args: &[&str]| args.iter().map(|s| s.to_string()).collect();
        Self {
            packages: argv(&["brew", "list", "--formula", "-1"]),
            apps: argv(&["brew", "list", "--cask", "-1"]),
        }
    }
}

impl PackageListConfig
{
    pub fn command_for(
        &self,
        kind: PackageKind,
    ) -> &[String]
    {
        match kind
        {
            PackageKind::Package => &self.packages,
            PackageKind::App => &self.apps,
        }
    }
}

impl Default for Config
{
    fn default() -> Self
    {
        Self {
            manifest_path: DEFAULT_MANIFEST.to_string(),
            home: None,
            stow: StowConfig::default(),
            package_list: PackageListConfig::default(),
            tools: vec![
                ToolSpec {
                    name: "ghostty".to_string(),
                    path: Some("/Applications/Ghostty.app".to_string()),
                    package: Some("ghostty".to_string()),
                    kind: PackageKind::App,
                    description: Some("GPU-accelerated terminal".to_string()),
                    ..Default::default()
                },
                ToolSpec {
                    name: "tmux".to_string(),
                    package: Some("tmux".to_string()),
                    dependencies: vec!["sesh".to_string(), "fzf".to_string()],
                    description: Some("Terminal multiplexer".to_string()),
                    ..Default::default()
                },
                ToolSpec {
                    name: "starship".to_string(),
                    command: Some("starship".to_string()),
                    package: Some("starship".to_string()),
                    description: Some("Shell prompt".to_string()),
                    ..Default::default()
                },
                ToolSpec {
                    name: "karabiner-elements".to_string(),
                    path: Some("/Applications/Karabiner-Elements.app".to_string()),
                    package: Some("karabiner-elements".to_string()),
                    kind: PackageKind::App,
                    description: Some("Keyboard customization".to_string()),
                    ..Default::default()
                },
            ],
        }
    }
}

impl Config
{
    pub fn manifest_path(&self) -> PathBuf
    {
        expand_path(&self.manifest_path)
    }

    pub fn home_dir(&self) -> PathBuf
    {
        match &self.home
        {
            Some(h) => expand_path(h),
            None => expand_path("~"),
        }
    }

    pub fn stow_dir(&self) -> PathBuf
    {
        expand_path(&self.stow.dir)
    }

    /// Declared targets of a stow package, or `None` if unknown.
    pub fn stow_targets(
        &self,
        package: &str,
    ) -> Option<Vec<PathBuf>>
    {
        self.stow
            .packages
            .get(package)
            .map(|ts| ts.iter().map(PathBuf::from).collect())
    }
}

/// Expand `~` and `$VARS`; unresolvable variables leave the input as-is.
pub fn expand_path(raw: &str) -> PathBuf
{
    let expanded = shellexpand::full(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    let path = PathBuf::from(expanded);
    dunce::simplified(&path).to_path_buf()
}

pub fn load_config() -> Result<Config>
{
    let mut builder = config::Config::builder();

    // Load from config files in priority order
    let config_paths = ["dotmerge.toml", "dotmerge.yaml", "dotmerge.json", ".dotmerge.toml"];

    let local = config_paths
        .iter()
        .find(|p| Path::new(p).exists());
    match local
    {
        Some(path) => builder = builder.add_source(config::File::with_name(path)),
        None =>
        {
            let user = expand_path("~/.config/dotmerge/config.toml");
            if user.exists()
            {
                builder = builder.add_source(config::File::from(user));
            }
        }
    }

    // Double underscore so keys like manifest_path survive the split
    builder = builder.add_source(
        config::Environment::with_prefix("DOTMERGE")
            .prefix_separator("_")
            .separator("__"),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join("dotmerge.toml");

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    if ctx.dry_run
    {
        println!("{toml_string}");
        return Ok(());
    }

    std::fs::write(&config_path, toml_string)
        .with_context(|| format!("Failed to write config file {}", config_path.display()))?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}
