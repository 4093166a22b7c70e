//! `completions`: shell completion scripts for `dotm`.

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Shell as CompletionShell, generate, generate_to};
use std::{fs, io::Write, path::Path};

use crate::cli::{AppContext, Cli, CompletionsArgs, Shell};

const BIN_NAME: &str = "dotm";

impl From<Shell> for CompletionShell {
    fn from(shell: Shell) -> Self {
        match shell {
            Shell::Bash => CompletionShell::Bash,
            Shell::Zsh => CompletionShell::Zsh,
            Shell::Fish => CompletionShell::Fish,
            Shell::PowerShell => CompletionShell::PowerShell,
            Shell::Elvish => CompletionShell::Elvish,
        }
    }
}

/// Print the script, or install it into `--out-dir` under the file name the
/// shell expects (`_dotm` for zsh, `dotm.bash`, ...).
pub fn run(args: CompletionsArgs, ctx: &AppContext) -> Result<()> {
    let shell = CompletionShell::from(args.shell);
    match args.out_dir {
        Some(dir) => {
            let path = install_script(shell, &dir)?;
            if !ctx.quiet {
                eprintln!("Wrote {shell} completion to {}", path.display());
            }
            Ok(())
        }
        None => write_script(shell, &mut std::io::stdout().lock()),
    }
}

fn write_script(shell: CompletionShell, out: &mut dyn Write) -> Result<()> {
    let mut buf = Vec::new();
    generate(shell, &mut Cli::command(), BIN_NAME, &mut buf);
    out.write_all(&buf).context("write completion script")?;
    Ok(())
}

fn install_script(shell: CompletionShell, dir: &Path) -> Result<std::path::PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    generate_to(shell, &mut Cli::command(), BIN_NAME, dir)
        .with_context(|| format!("write {shell} completion into {}", dir.display()))
}
