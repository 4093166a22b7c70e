use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::install::ConflictPolicy;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
    pub verbose: bool,  // global --verbose
}

#[derive(Parser)]
#[command(name = "dotm")]
#[command(
    about = "Merge reference shell configuration into your dotfiles, with a reversible backup ledger"
)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Show what would be done without executing
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug-level logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the sections of a shell configuration file
    Sections(SectionsArgs),

    /// Compare a shell file against a reference
    Diff(DiffArgs),

    /// Merge selected reference sections into the managed block
    Merge(MergeArgs),

    /// Link stow packages into the home directory
    Link(LinkArgs),

    /// Install a template file
    Install(InstallArgs),

    /// Show installed state of configured tools
    Status(StatusArgs),

    /// Inspect and revert recorded backups
    Backup(BackupArgs),

    /// Initialize a dotmerge.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Parser)]
pub struct SectionsArgs {
    /// Shell file to parse
    pub file: PathBuf,

    /// JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct DiffArgs {
    /// User's shell file
    pub target: PathBuf,

    /// Reference shell file
    #[arg(short, long)]
    pub reference: PathBuf,

    /// Line-by-line comparison instead of section classification
    #[arg(long)]
    pub plain: bool,

    /// JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct MergeArgs {
    /// Shell file to merge into
    pub target: PathBuf,

    /// Reference shell file
    #[arg(short, long)]
    pub reference: PathBuf,

    /// Section names to merge (repeatable)
    #[arg(short, long = "select", value_name = "NAME")]
    pub select: Vec<String>,

    /// Merge every section the target lacks
    #[arg(long)]
    pub all_new: bool,

    /// With --all-new, also take the reference side of conflicts
    #[arg(long, requires = "all_new")]
    pub include_conflicts: bool,

    /// Skip preserving the target before writing
    #[arg(long)]
    pub no_backup: bool,

    /// JSON output
    #[arg(long)]
    pub json: bool,
}

/// CLI form of [`ConflictPolicy`]
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OnConflict {
    Backup,
    Skip,
    Overwrite,
}

impl From<OnConflict> for ConflictPolicy {
    fn from(v: OnConflict) -> Self {
        match v {
            OnConflict::Backup => ConflictPolicy::Backup,
            OnConflict::Skip => ConflictPolicy::Skip,
            OnConflict::Overwrite => ConflictPolicy::Overwrite,
        }
    }
}

#[derive(Debug, Parser)]
pub struct LinkArgs {
    /// Packages to link (default: every configured package)
    pub packages: Vec<String>,

    /// What to do with files already at a target
    #[arg(long, value_enum, default_value = "backup")]
    pub on_conflict: OnConflict,

    /// JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct InstallArgs {
    /// Template to copy
    pub source: PathBuf,

    /// Destination path
    pub target: PathBuf,

    /// What to do if the destination exists
    #[arg(long, value_enum, default_value = "backup")]
    pub on_conflict: OnConflict,
}

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Only these tools (default: all configured)
    pub tools: Vec<String>,

    /// JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct BackupArgs {
    #[command(subcommand)]
    pub command: BackupSubcommand,
}

#[derive(Subcommand)]
pub enum BackupSubcommand {
    /// List recorded backups
    List(BackupListArgs),

    /// Restore originals from their backups
    Revert(BackupRevertArgs),
}

#[derive(Parser, Debug)]
pub struct BackupListArgs {
    /// Include superseded backups, not just the newest per file
    #[arg(long)]
    pub all: bool,

    /// Filter by relative time (e.g., "7d", "24h")
    #[arg(long, value_name = "SPAN")]
    pub since: Option<String>,

    /// JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct BackupRevertArgs {
    /// Original paths to restore from their newest backup
    pub paths: Vec<PathBuf>,

    /// Restore from this exact backup file (repeatable)
    #[arg(long = "backup", value_name = "BACKUP")]
    pub backups: Vec<PathBuf>,

    /// Restore every file that has a backup
    #[arg(long, conflicts_with_all = ["paths", "backups"])]
    pub all: bool,

    /// JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Install into this directory instead of printing to stdout
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,
}
