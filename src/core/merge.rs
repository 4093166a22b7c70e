//! Marker-block merge into a target rc file.
//!
//! The applier owns exactly one region of the target, delimited by two
//! literal marker lines. Each apply excises the previous region and appends a
//! fresh one, so reapplying the same selection is a fixed point. Bytes outside
//! the region are never touched. Backups are the caller's job.
//!
//! The block accumulates across runs: [`accumulate`] carries the sections
//! already inside it forward so a later, narrower selection adds to it
//! instead of replacing it.

use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::core::sections::{Section, parse};
use crate::infra::io::{read_to_string_or_empty, write_atomic};

/// Opening marker line (matched as an exact literal).
pub const START_MARKER: &str = "# >>> dotmerge managed block >>>";
/// Closing marker line (matched as an exact literal).
pub const END_MARKER: &str = "# <<< dotmerge managed block <<<";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    /// Start marker with no end marker after it; refusing to guess the extent
    #[error("found '{START_MARKER}' at byte {0} without a matching '{END_MARKER}'")]
    UnterminatedBlock(usize),
}

/// Byte range of the managed block, including a newline after the end marker.
fn find_block(content: &str) -> Result<Option<(usize, usize)>, MergeError> {
    let Some(start) = content.find(START_MARKER) else {
        return Ok(None);
    };
    let after_start = start + START_MARKER.len();
    let Some(rel_end) = content[after_start..].find(END_MARKER) else {
        return Err(MergeError::UnterminatedBlock(start));
    };
    let mut end = after_start + rel_end + END_MARKER.len();
    if content[end..].starts_with("\r\n") {
        end += 2;
    } else if content[end..].starts_with('\n') {
        end += 1;
    }
    Ok(Some((start, end)))
}

/// Text currently inside the managed block (between the markers), if any.
pub fn extract_block(content: &str) -> Result<Option<String>, MergeError> {
    Ok(find_block(content)?.map(|(start, end)| {
        let inner_start = start + START_MARKER.len();
        let block = &content[inner_start..end];
        let inner_end = block.rfind(END_MARKER).unwrap_or(block.len());
        block[..inner_end].trim_matches('\n').to_string()
    }))
}

/// Remove the managed block, leaving everything else byte-identical.
pub fn strip_block(content: &str) -> Result<String, MergeError> {
    Ok(match find_block(content)? {
        Some((start, end)) => {
            let mut out = String::with_capacity(content.len());
            out.push_str(&content[..start]);
            out.push_str(&content[end..]);
            out
        }
        None => content.to_string(),
    })
}

/// Sections already inside the managed block with `selected` folded in.
///
/// A selected section replaces a carried one of the same name and kind in
/// place; anything else is appended in selection order.
pub fn accumulate(existing: &str, selected: &[Section]) -> Result<Vec<Section>, MergeError> {
    let mut sections = match extract_block(existing)? {
        Some(block) => parse(&block).sections,
        None => Vec::new(),
    };
    for s in selected {
        let key = s.key();
        match sections
            .iter_mut()
            .find(|c| c.kind == s.kind && c.key() == key)
        {
            Some(slot) => *slot = s.clone(),
            None => sections.push(s.clone()),
        }
    }
    Ok(sections)
}

/// Pure merge: existing text in, merged text out.
pub fn render(existing: &str, sections: &[Section]) -> Result<String, MergeError> {
    let mut out = strip_block(existing)?;
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }

    out.push_str(START_MARKER);
    out.push('\n');
    for s in sections {
        out.push_str(&s.content);
        out.push_str("\n\n");
    }
    out.push_str(END_MARKER);
    out.push('\n');
    Ok(out)
}

/// Merge `sections` into the file at `target`, replacing it in full.
#[instrument(skip(sections), fields(sections = sections.len()))]
pub fn apply(target: &Path, sections: &[Section]) -> Result<()> {
    let existing = read_to_string_or_empty(target)?;
    let merged = render(&existing, sections)
        .with_context(|| format!("merge into {}", target.display()))?;

    if merged == existing {
        debug!("managed block already up to date");
        return Ok(());
    }

    write_atomic(target, merged.as_bytes())?;
    info!(target = %target.display(), "managed block written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sections::parse;
    use tempfile::tempdir;

    fn picks(src: &str) -> Vec<Section> {
        parse(src).sections
    }

    #[test]
    fn renders_block_after_existing_content() {
        let out = render("export A=1", &picks("alias gs='git status'\n")).unwrap();
        insta::assert_snapshot!(out, @r"
        export A=1
        # >>> dotmerge managed block >>>
        alias gs='git status'

        # <<< dotmerge managed block <<<
        ");
    }

    #[test]
    fn render_is_idempotent() {
        let sections = picks("alias a=b\nf() {\n  echo\n}\n");
        for start in ["", "x=1", "x=1\n", "# header\n\nexport A=1\n"] {
            let once = render(start, &sections).unwrap();
            let twice = render(&once, &sections).unwrap();
            assert_eq!(once, twice, "not a fixed point for {start:?}");
        }
    }

    #[test]
    fn content_outside_block_is_preserved() {
        let before = "top\n";
        let merged = render(before, &picks("alias a=b\n")).unwrap();
        let with_tail = format!("{merged}tail line\n");
        let remerged = render(&with_tail, &picks("alias c=d\n")).unwrap();
        assert!(remerged.starts_with("top\ntail line\n"));
        assert!(remerged.contains("alias c=d"));
        assert!(!remerged.contains("alias a=b"));
    }

    #[test]
    fn empty_selection_leaves_empty_block() {
        let out = render("", &[]).unwrap();
        assert_eq!(out, format!("{START_MARKER}\n{END_MARKER}\n"));
    }

    #[test]
    fn unterminated_block_is_an_error() {
        let text = format!("a\n{START_MARKER}\nalias x=y\n");
        assert_eq!(
            render(&text, &[]),
            Err(MergeError::UnterminatedBlock(2))
        );
    }

    #[test]
    fn later_selection_adds_to_block() {
        let first = render("top\n", &picks("alias a=b\n")).unwrap();
        let combined = accumulate(&first, &picks("mkcd() {\n  mkdir -p \"$1\"\n}\n")).unwrap();
        let names: Vec<_> = combined.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "mkcd"]);

        let second = render(&first, &combined).unwrap();
        assert!(second.starts_with("top\n"));
        assert!(second.contains("alias a=b"));
        assert!(second.contains("mkdir -p"));
        assert_eq!(render(&second, &accumulate(&second, &[]).unwrap()).unwrap(), second);
    }

    #[test]
    fn reselected_section_replaces_in_place() {
        let first = render("", &picks("alias a=b\nexport A=1\n")).unwrap();
        let combined = accumulate(&first, &picks("alias A=z\nexport B=2\n")).unwrap();
        let contents: Vec<_> = combined.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, vec!["alias A=z", "export A=1", "export B=2"]);
    }

    #[test]
    fn accumulate_without_block_is_the_selection() {
        let combined = accumulate("export A=1\n", &picks("alias a=b\n")).unwrap();
        assert_eq!(combined.len(), 1);
        assert_eq!(combined[0].name, "a");

        let broken = format!("{START_MARKER}\nalias x=y\n");
        assert!(accumulate(&broken, &[]).is_err());
    }

    #[test]
    fn extract_returns_inner_text() {
        let merged = render("a\n", &picks("alias a=b\n")).unwrap();
        assert_eq!(extract_block(&merged).unwrap().as_deref(), Some("alias a=b"));
        assert_eq!(extract_block("nothing").unwrap(), None);
    }

    #[test]
    fn apply_twice_on_disk_is_byte_identical() {
        let tmp = tempdir().unwrap();
        let rc = tmp.path().join(".zshrc");
        std::fs::write(&rc, "export PATH=/usr/bin\n").unwrap();
        let sections = picks("alias gs='git status'\nexport EDITOR=nvim\n");

        apply(&rc, &sections).unwrap();
        let first = std::fs::read(&rc).unwrap();
        apply(&rc, &sections).unwrap();
        let second = std::fs::read(&rc).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn apply_creates_missing_target() {
        let tmp = tempdir().unwrap();
        let rc = tmp.path().join(".bashrc");
        apply(&rc, &picks("export A=1\n")).unwrap();
        let body = std::fs::read_to_string(&rc).unwrap();
        assert!(body.starts_with(START_MARKER));
    }
}
