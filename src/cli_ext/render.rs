//! Output helpers shared by the command handlers.

use owo_colors::{OwoColorize, Style};
use serde::Serialize;

use crate::cli::AppContext;

/// Style `text` unless `--no-color` is active.
pub fn paint(ctx: &AppContext, text: &str, style: Style) -> String {
    if ctx.no_color {
        text.to_string()
    } else {
        text.style(style).to_string()
    }
}

pub fn ok(ctx: &AppContext, text: &str) -> String {
    paint(ctx, text, Style::new().green())
}

pub fn warn(ctx: &AppContext, text: &str) -> String {
    paint(ctx, text, Style::new().yellow())
}

pub fn bad(ctx: &AppContext, text: &str) -> String {
    paint(ctx, text, Style::new().red().bold())
}

pub fn dim(ctx: &AppContext, text: &str) -> String {
    paint(ctx, text, Style::new().dimmed())
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
