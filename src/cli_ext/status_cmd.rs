//! `status`: installed state of configured tools.

use anyhow::{Result, bail};
use serde::Serialize;
use tabled::{Table, Tabled};

use crate::cli::{AppContext, StatusArgs};
use crate::cli_ext::render::{bad, ok, print_json, warn};
use crate::core::detect::{
    CachedPackageLookup, HostProbe, InstallState, ToolSpec, detect_state, run_list_command,
};
use crate::infra::config::{expand_path, load_config};

#[derive(Debug, Serialize)]
struct ToolStatus {
    name: String,
    state: InstallState,
    description: Option<String>,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Tool")]
    tool: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Description")]
    description: String,
}

pub fn status_run(args: StatusArgs, ctx: &AppContext) -> Result<()> {
    let cfg = load_config()?;

    let tools: Vec<&ToolSpec> = if args.tools.is_empty() {
        cfg.tools.iter().collect()
    } else {
        let mut picked = Vec::new();
        for name in &args.tools {
            match cfg.tools.iter().find(|t| t.name.eq_ignore_ascii_case(name)) {
                Some(t) => picked.push(t),
                None => bail!("Unknown tool '{name}'"),
            }
        }
        picked
    };

    let probe = HostProbe;
    let mut lookup =
        CachedPackageLookup::new(|kind| run_list_command(cfg.package_list.command_for(kind)));

    let statuses: Vec<ToolStatus> = tools
        .into_iter()
        .map(|t| {
            let mut tool = t.clone();
            tool.path = tool
                .path
                .map(|p| expand_path(&p).to_string_lossy().into_owned());
            ToolStatus {
                name: tool.name.clone(),
                state: detect_state(&tool, &probe, &mut lookup),
                description: tool.description.clone(),
            }
        })
        .collect();

    if args.json {
        return print_json(&statuses);
    }

    let rows: Vec<StatusRow> = statuses
        .iter()
        .map(|s| StatusRow {
            tool: s.name.clone(),
            state: match s.state {
                InstallState::Installed => ok(ctx, "installed"),
                InstallState::Partial => warn(ctx, "partial"),
                InstallState::NotInstalled => bad(ctx, "missing"),
            },
            description: s.description.clone().unwrap_or_default(),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}
