//! `link` and `install` handlers.

use anyhow::{Context, Result, bail};
use tracing::error;

use crate::cli::{AppContext, InstallArgs, LinkArgs};
use crate::cli_ext::render::{bad, dim, ok, print_json, warn};
use crate::core::{
    backup::BackupLedger,
    install::{InstallOutcome, install_template},
    link::{LinkReport, StowLinker, TargetState, install_package, plan_package},
};
use crate::infra::config::load_config;

pub fn link_run(args: LinkArgs, ctx: &AppContext) -> Result<()> {
    let cfg = load_config()?;
    let home = cfg.home_dir();
    let linker = StowLinker::new(cfg.stow_dir(), home.clone());
    let ledger = BackupLedger::new(cfg.manifest_path());

    let packages: Vec<String> = if args.packages.is_empty() {
        cfg.stow.packages.keys().cloned().collect()
    } else {
        args.packages.clone()
    };

    let mut reports: Vec<LinkReport> = Vec::new();
    let mut failed = 0usize;
    for package in &packages {
        let Some(targets) = cfg.stow_targets(package) else {
            eprintln!("{} unknown package '{}'", bad(ctx, "error:"), package);
            failed += 1;
            continue;
        };

        if ctx.dry_run {
            println!("{package}:");
            for (path, state) in plan_package(&linker, &home, &targets) {
                let label = match state {
                    TargetState::Missing => ok(ctx, "link"),
                    TargetState::Linked => dim(ctx, "already linked"),
                    TargetState::Occupied => warn(ctx, "occupied"),
                };
                println!("  {:<16} {}", label, path.display());
            }
            continue;
        }

        match install_package(
            &ledger,
            &linker,
            &home,
            package,
            &targets,
            args.on_conflict.into(),
        ) {
            Ok(report) => reports.push(report),
            Err(e) => {
                error!(package = %package, error = %e, "link failed");
                eprintln!("{} {}: {:#}", bad(ctx, "error:"), package, e);
                failed += 1;
            }
        }
    }

    if args.json {
        print_json(&reports)?;
    } else if !ctx.quiet {
        for r in &reports {
            print_link_report(r, ctx);
        }
    }

    if failed > 0 {
        bail!("{failed} package(s) failed to link");
    }
    Ok(())
}

fn print_link_report(r: &LinkReport, ctx: &AppContext) {
    let status = if r.linked {
        ok(ctx, "linked")
    } else if !r.skipped.is_empty() {
        warn(ctx, "skipped")
    } else {
        dim(ctx, "up to date")
    };
    println!("{:<12} {}", r.package, status);
    for b in &r.backed_up {
        println!("  backed up {} → {}", b.original.display(), b.backup.display());
    }
    for p in &r.removed {
        println!("  removed {}", p.display());
    }
    for p in &r.skipped {
        println!("  existing {}", p.display());
    }
}

pub fn install_run(args: InstallArgs, ctx: &AppContext) -> Result<()> {
    let target = std::path::absolute(&args.target)
        .with_context(|| format!("resolve {}", args.target.display()))?;

    if ctx.dry_run {
        let action = if target.exists() {
            format!("{:?}", args.on_conflict).to_lowercase()
        } else {
            "create".to_string()
        };
        println!(
            "DRY RUN - install {} → {} ({})",
            args.source.display(),
            target.display(),
            action
        );
        return Ok(());
    }

    let ledger = BackupLedger::new(load_config()?.manifest_path());
    let outcome = install_template(&ledger, &args.source, &target, args.on_conflict.into())?;

    match outcome {
        InstallOutcome::SourceMissing => {
            bail!("Template not found: {}", args.source.display());
        }
        InstallOutcome::Skipped => {
            if !ctx.quiet {
                println!("{} {} (exists)", warn(ctx, "Skipped"), target.display());
            }
        }
        InstallOutcome::Installed { backup } => {
            if !ctx.quiet {
                println!("{} {}", ok(ctx, "Installed"), target.display());
                if let Some(b) = backup {
                    println!("Backup: {}", dim(ctx, &b.backup.display().to_string()));
                }
            }
        }
    }
    Ok(())
}
