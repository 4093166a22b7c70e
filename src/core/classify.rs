//! Section classification against a reference configuration.
//!
//! Matching policy is name + kind, never content similarity: a section
//! renamed on either side shows up as new rather than modified. Sections
//! that only exist in the user's file are ignored.

use std::collections::HashSet;

use serde::Serialize;

use crate::core::sections::{Section, SectionKind};

/// A user section and the reference section it collides with.
#[derive(Debug, Clone, Serialize)]
pub struct SectionConflict {
    pub user: Section,
    pub reference: Section,
}

/// Outcome of comparing user sections to reference sections.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SectionDiff {
    /// Reference sections whose name is absent from the user file
    pub new_sections: Vec<Section>,
    /// Same name and kind, different bytes
    pub conflicting: Vec<SectionConflict>,
    /// Reference sections already present verbatim
    pub identical: Vec<Section>,
}

impl SectionDiff {
    pub fn is_up_to_date(&self) -> bool {
        self.new_sections.is_empty() && self.conflicting.is_empty()
    }

    /// Short human summary for the display layer.
    pub fn summary(&self) -> String {
        format!(
            "{} new, {} conflicting, {} identical",
            self.new_sections.len(),
            self.conflicting.len(),
            self.identical.len()
        )
    }
}

/// Classify every reference section as new, conflicting, or identical.
pub fn classify(user: &[Section], reference: &[Section]) -> SectionDiff {
    let user_names: HashSet<String> = user.iter().map(Section::key).collect();
    let mut diff = SectionDiff::default();

    for r in reference {
        let key = r.key();
        if !user_names.contains(&key) {
            diff.new_sections.push(r.clone());
            continue;
        }

        // Name exists; only a same-kind counterpart can conflict
        let same_kind: Vec<&Section> = user
            .iter()
            .filter(|u| u.kind == r.kind && u.key() == key)
            .collect();
        if same_kind.is_empty() {
            continue;
        }
        if same_kind.iter().any(|u| u.content == r.content) {
            diff.identical.push(r.clone());
        } else {
            diff.conflicting.push(SectionConflict {
                user: same_kind[0].clone(),
                reference: r.clone(),
            });
        }
    }

    diff
}

/// Resolve a selection to reference sections, in reference order.
///
/// `names` match case-insensitively against new and conflicting sections;
/// `all_new` and `include_conflicts` widen the selection wholesale.
pub fn select(
    diff: &SectionDiff,
    reference: &[Section],
    names: &[String],
    all_new: bool,
    include_conflicts: bool,
) -> Vec<Section> {
    let wanted: HashSet<String> = names.iter().map(|n| n.to_lowercase()).collect();
    let new_keys: HashSet<(String, SectionKind)> =
        diff.new_sections.iter().map(|s| (s.key(), s.kind)).collect();
    let conflict_keys: HashSet<(String, SectionKind)> = diff
        .conflicting
        .iter()
        .map(|c| (c.reference.key(), c.reference.kind))
        .collect();

    reference
        .iter()
        .filter(|r| {
            let id = (r.key(), r.kind);
            let is_new = new_keys.contains(&id);
            let is_conflict = conflict_keys.contains(&id);
            (is_new || is_conflict)
                && (wanted.contains(&id.0)
                    || (all_new && is_new)
                    || (include_conflicts && is_conflict))
        })
        .cloned()
        .collect()
}

/// One index-aligned line difference, for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineDiff {
    /// 1-based line number
    pub line: usize,
    pub user: Option<String>,
    pub reference: Option<String>,
}

/// Coarse whole-file comparison for non-shell files.
#[derive(Debug, Clone, Serialize)]
pub struct FileComparison {
    pub identical: bool,
    pub lines: Vec<LineDiff>,
}

/// Compare two texts: equality plus a positional (not edit-script) line diff.
pub fn compare_text(user: &str, reference: &str) -> FileComparison {
    if user == reference {
        return FileComparison {
            identical: true,
            lines: Vec::new(),
        };
    }

    let a: Vec<&str> = user.lines().collect();
    let b: Vec<&str> = reference.lines().collect();
    let mut lines = Vec::new();
    for idx in 0..a.len().max(b.len()) {
        let ua = a.get(idx).copied();
        let rb = b.get(idx).copied();
        if ua != rb {
            lines.push(LineDiff {
                line: idx + 1,
                user: ua.map(str::to_string),
                reference: rb.map(str::to_string),
            });
        }
    }

    FileComparison {
        identical: false,
        lines,
    }
}
