use anyhow::Result;
use clap::Parser;
use dotmerge::cli::{AppContext, Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        dry_run: cli.dry_run,
        verbose: cli.verbose,
    };
    init_tracing(&ctx);

    match cli.command {
        Commands::Sections(args) => dotmerge::sections_run(args, &ctx),
        Commands::Diff(args) => dotmerge::diff_run(args, &ctx),
        Commands::Merge(args) => dotmerge::merge_run(args, &ctx),
        Commands::Link(args) => dotmerge::link_run(args, &ctx),
        Commands::Install(args) => dotmerge::install_run(args, &ctx),
        Commands::Status(args) => dotmerge::status_run(args, &ctx),
        Commands::Backup(args) => dotmerge::backup_run(args, &ctx),
        Commands::Init(args) => dotmerge::infra::config::init(args, &ctx),
        Commands::Completions(args) => dotmerge::completion::run(args, &ctx),
    }
}

/// Logs go to stderr; `DOTMERGE_LOG` overrides the level.
fn init_tracing(ctx: &AppContext) {
    let default = if ctx.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("DOTMERGE_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!ctx.no_color)
        .with_target(false)
        .init();
}
