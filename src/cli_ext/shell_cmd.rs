//! `sections`, `diff`, and `merge` handlers.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Serialize;
use tabled::{Table, Tabled};
use tracing::{instrument, warn};

use crate::cli::{AppContext, DiffArgs, MergeArgs, SectionsArgs};
use crate::cli_ext::render::{bad, dim, ok, print_json, warn as yellow};
use crate::core::{
    backup::{BackupEntry, BackupLedger, BackupMode, MutationKind},
    classify::{self, SectionDiff},
    merge,
    sections::{self, Section},
};
use crate::infra::{
    config::load_config,
    io::{read_to_string_or_empty, resolve_write_target},
};

#[derive(Tabled)]
struct SectionRow {
    #[tabled(rename = "Lines")]
    lines: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Description")]
    description: String,
}

pub fn sections_run(args: SectionsArgs, ctx: &AppContext) -> Result<()> {
    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("read {}", args.file.display()))?;
    let script = sections::parse(&text);

    if args.json {
        return print_json(&script.sections);
    }
    if script.is_empty() {
        if !ctx.quiet {
            println!("No sections found.");
        }
        return Ok(());
    }

    let rows: Vec<SectionRow> = script
        .sections
        .iter()
        .map(|s| SectionRow {
            lines: format!("{}-{}", s.line_range.0, s.line_range.1),
            kind: s.kind.to_string(),
            name: s.name.clone(),
            description: s.description.clone(),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

fn read_reference(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read reference {}", path.display()))
}

fn diff_sections(target_text: &str, reference_text: &str) -> (SectionDiff, Vec<Section>) {
    let user = sections::parse(target_text);
    let reference = sections::parse(reference_text);
    let diff = classify::classify(&user.sections, &reference.sections);
    (diff, reference.sections)
}

pub fn diff_run(args: DiffArgs, ctx: &AppContext) -> Result<()> {
    let target_text = read_to_string_or_empty(&args.target)?;
    let reference_text = read_reference(&args.reference)?;

    if args.plain {
        let cmp = classify::compare_text(&target_text, &reference_text);
        if args.json {
            return print_json(&cmp);
        }
        if cmp.identical {
            println!("{}", ok(ctx, "Files are identical"));
            return Ok(());
        }
        for d in &cmp.lines {
            if let Some(u) = &d.user {
                println!("{} {}", bad(ctx, &format!("-{:>4}", d.line)), u);
            }
            if let Some(r) = &d.reference {
                println!("{} {}", ok(ctx, &format!("+{:>4}", d.line)), r);
            }
        }
        return Ok(());
    }

    let (diff, _) = diff_sections(&target_text, &reference_text);
    if args.json {
        return print_json(&diff);
    }

    for s in &diff.new_sections {
        println!("{} {:<24} {}", ok(ctx, "+ new     "), s.name, dim(ctx, &s.description));
    }
    for c in &diff.conflicting {
        println!(
            "{} {:<24} {}",
            yellow(ctx, "~ conflict"),
            c.reference.name,
            dim(
                ctx,
                &format!("yours: lines {}-{}", c.user.line_range.0, c.user.line_range.1)
            )
        );
    }
    if !ctx.quiet {
        for s in &diff.identical {
            println!("{} {}", dim(ctx, "= same    "), dim(ctx, &s.name));
        }
        println!();
        println!("{}", diff.summary());
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct MergeSummary {
    target: PathBuf,
    merged: Vec<String>,
    changed: bool,
    backup: Option<BackupEntry>,
}

#[instrument(skip_all, fields(target = %args.target.display()))]
pub fn merge_run(args: MergeArgs, ctx: &AppContext) -> Result<()> {
    let target = std::path::absolute(&args.target)
        .with_context(|| format!("resolve {}", args.target.display()))?;
    // A stowed rc file is a link; back up and rewrite the file it points at
    let write_target = resolve_write_target(&target);
    let existing = read_to_string_or_empty(&write_target)?;
    let reference_text = read_reference(&args.reference)?;

    let (diff, reference) = diff_sections(&existing, &reference_text);
    warn_unknown_names(&diff, &args.select);

    let selected = classify::select(
        &diff,
        &reference,
        &args.select,
        args.all_new,
        args.include_conflicts,
    );
    if selected.is_empty() {
        if args.json {
            return print_json(&MergeSummary {
                target,
                merged: Vec::new(),
                changed: false,
                backup: None,
            });
        }
        if !ctx.quiet {
            println!("Nothing to merge ({}).", diff.summary());
        }
        return Ok(());
    }

    let names: Vec<String> = selected.iter().map(|s| s.name.clone()).collect();
    let block = merge::accumulate(&existing, &selected)?;
    let rendered = merge::render(&existing, &block)?;
    let changed = rendered != existing;

    if ctx.dry_run {
        if !ctx.quiet {
            println!("DRY RUN - would write {}:", target.display());
        }
        if let Some(block) = merge::extract_block(&rendered)? {
            println!("{block}");
        }
        return Ok(());
    }

    let mut backup = None;
    if changed && !args.no_backup && write_target.exists() {
        let ledger = BackupLedger::new(load_config()?.manifest_path());
        backup = Some(ledger.preserve(&write_target, BackupMode::Copy, MutationKind::File)?);
    }
    if changed {
        merge::apply(&write_target, &block)?;
    }

    if args.json {
        return print_json(&MergeSummary {
            target,
            merged: names,
            changed,
            backup,
        });
    }
    if !ctx.quiet {
        if changed {
            println!(
                "{} {} section(s) into {}",
                ok(ctx, "Merged"),
                names.len(),
                target.display()
            );
            for n in &names {
                println!("  - {n}");
            }
            if let Some(b) = &backup {
                println!("Backup: {}", dim(ctx, &b.backup.display().to_string()));
            }
        } else {
            println!("{} is already up to date.", target.display());
        }
    }
    Ok(())
}

fn warn_unknown_names(diff: &SectionDiff, names: &[String]) {
    let candidates: HashSet<String> = diff
        .new_sections
        .iter()
        .map(Section::key)
        .chain(diff.conflicting.iter().map(|c| c.reference.key()))
        .collect();
    for n in names {
        if !candidates.contains(&n.to_lowercase()) {
            warn!(name = %n, "not a new or conflicting section; ignored");
        }
    }
}
