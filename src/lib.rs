//! **dotmerge** - Shell-configuration merging for a dotfiles bootstrapper
//!
//! Parses shell files into named sections, classifies them against a
//! reference, merges the chosen ones into a marker-delimited managed block,
//! and records every destructive change in a reversible backup ledger.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Command handlers: output formatting around the core operations
pub mod cli_ext {
    pub mod render;

    /// `sections`, `diff`, `merge`
    pub mod shell_cmd;
    pub use shell_cmd::{diff_run, merge_run, sections_run};

    /// `link`, `install`
    pub mod link_cmd;
    pub use link_cmd::{install_run, link_run};

    pub mod status_cmd;
    pub use status_cmd::status_run;

    /// `backup list|revert`
    pub mod backup_cmd;
    pub use backup_cmd::backup_run;
}

/// Core engine - parsing, classification, merging, and the backup ledger
pub mod core {
    /// Shell script → ordered, typed sections (lossless)
    pub mod sections;
    pub use sections::{Section, SectionKind, ShellScript};

    /// New / conflicting / identical classification by name
    pub mod classify;
    pub use classify::{SectionDiff, classify};

    /// Idempotent managed-block rewrite
    pub mod merge;

    /// Manifest of reversible mutations
    pub mod backup;
    pub use backup::{BackupEntry, BackupLedger, BackupMode, Manifest, MutationKind};

    /// Listing and reversal over the ledger
    pub mod backup_ops;
    pub use backup_ops::{RevertFailure, RevertReport, revert};

    /// Stow package linking
    pub mod link;
    pub use link::{LinkManager, StowLinker};

    /// Template installation
    pub mod install;
    pub use install::ConflictPolicy;

    /// Tool installed-state detection
    pub mod detect;
}

/// Infrastructure - Configuration and file I/O
pub mod infra {
    /// Layered configuration (file + DOTMERGE_* env) with TOML init
    pub mod config;
    pub use self::config::{Config, init as config_init, load_config};

    /// Atomic writes and tolerant reads
    pub mod io;
    pub use io::write_atomic;
}

// Re-exports for the binary
pub use cli::{AppContext, Cli, Commands};
pub use cli_ext::{
    backup_run, diff_run, install_run, link_run, merge_run, sections_run, status_run,
};
pub use infra::{Config, load_config};

// Core types for external consumers
pub use crate::core::{BackupEntry, BackupLedger, ConflictPolicy, Section, SectionKind, ShellScript};
