//! `backup list` and `backup revert` handlers.

use anyhow::{Context, Result, bail};
use tabled::{Table, Tabled};

use crate::cli::{AppContext, BackupArgs, BackupListArgs, BackupRevertArgs, BackupSubcommand};
use crate::cli_ext::render::{bad, dim, ok, print_json};
use crate::core::{
    backup::BackupLedger,
    backup_ops::{ListRequest, list_entries, resolve_selection, revert},
    link::StowLinker,
};
use crate::infra::config::{Config, load_config};

/// Backup management subcommands
pub fn backup_run(args: BackupArgs, ctx: &AppContext) -> Result<()> {
    let cfg = load_config()?;
    let ledger = BackupLedger::new(cfg.manifest_path());

    match args.command {
        BackupSubcommand::List(list_args) => backup_list(&ledger, &list_args, ctx),
        BackupSubcommand::Revert(revert_args) => backup_revert(&cfg, &ledger, &revert_args, ctx),
    }
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "Recorded")]
    recorded: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Original")]
    original: String,
    #[tabled(rename = "Backup")]
    backup: String,
    #[tabled(rename = "Versions")]
    versions: usize,
}

fn backup_list(ledger: &BackupLedger, a: &BackupListArgs, ctx: &AppContext) -> Result<()> {
    let req = ListRequest {
        all: a.all,
        since: a.since.clone(),
    };
    let entries = list_entries(ledger, &req)?;

    if a.json {
        return print_json(&entries);
    }

    if entries.is_empty() {
        if !ctx.quiet {
            println!("No backups recorded.");
        }
        return Ok(());
    }

    let rows: Vec<EntryRow> = entries
        .iter()
        .map(|e| {
            let name = e.entry.backup.display().to_string();
            EntryRow {
                recorded: e.recorded.clone(),
                kind: e.entry.kind.label(),
                original: e.entry.original.display().to_string(),
                backup: if e.backup_exists {
                    name
                } else {
                    bad(ctx, &format!("{name} (missing)"))
                },
                versions: e.versions,
            }
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

fn backup_revert(
    cfg: &Config,
    ledger: &BackupLedger,
    a: &BackupRevertArgs,
    ctx: &AppContext,
) -> Result<()> {
    if a.paths.is_empty() && a.backups.is_empty() && !a.all {
        bail!("Nothing selected. Pass paths, --backup, or --all.");
    }

    // Ledger paths are absolute
    let originals = a
        .paths
        .iter()
        .map(|p| std::path::absolute(p).with_context(|| format!("resolve {}", p.display())))
        .collect::<Result<Vec<_>>>()?;
    let backups = a
        .backups
        .iter()
        .map(|p| std::path::absolute(p).with_context(|| format!("resolve {}", p.display())))
        .collect::<Result<Vec<_>>>()?;

    let selected = resolve_selection(ledger, &originals, &backups, a.all)?;
    if selected.is_empty() {
        if !ctx.quiet {
            println!("No backups to revert.");
        }
        return Ok(());
    }

    if ctx.dry_run {
        println!("DRY RUN - would restore:");
        for e in &selected {
            println!("  {} ← {}", e.original.display(), dim(ctx, &e.backup.display().to_string()));
        }
        return Ok(());
    }

    let linker = StowLinker::new(cfg.stow_dir(), cfg.home_dir());
    let report = revert(ledger, &selected, &linker)?;

    if a.json {
        print_json(&report)?;
    } else {
        if !report.restored.is_empty() && !ctx.quiet {
            println!("{} {} file(s):", ok(ctx, "Restored"), report.restored.len());
            for p in &report.restored {
                println!("  - {}", p.display());
            }
        }
        for f in &report.failures {
            eprintln!("{} {}", bad(ctx, "failed:"), f);
        }
    }

    if !report.is_clean() {
        bail!("{} backup(s) could not be restored", report.failures.len());
    }
    Ok(())
}
