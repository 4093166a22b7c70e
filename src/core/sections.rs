//! Line-oriented sectioning of shell configuration files.
//!
//! Splits an rc file into independently adoptable units: aliases, functions,
//! exports, standalone comment runs, `if`/`case` blocks and free-form code.
//! - Single forward scan, no backtracking
//! - Never fails: malformed blocks absorb the rest of the input
//! - Lossless: gaps between sections are kept as `leading` trivia so the
//!   original bytes can be rebuilt with [`reconstruct`]

use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Max characters kept from a comment run's first line.
const COMMENT_LABEL_CHARS: usize = 50;
/// Max characters kept from the opening line of code/conditional blocks.
const BLOCK_LABEL_CHARS: usize = 40;

static ALIAS_RE: LazyLock<Regex> = LazyLock::new(|| {
    // `alias gs=...`, `alias -g G=...` (zsh global/suffix flags)
    Regex::new(r"^alias\s+(?:-[A-Za-z]+\s+)*([^\s=]+)=").expect("alias regex")
});

static EXPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^export\s+([A-Za-z_][A-Za-z0-9_]*)=").expect("export regex"));

static FUNCTION_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^function\s+([A-Za-z_][A-Za-z0-9_:.+-]*)").expect("function keyword regex")
});

static FUNCTION_PARENS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_:.+-]*)\s*\(\s*\)").expect("function parens regex")
});

/// Kind of a parsed section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Alias,
    Function,
    Export,
    Comment,
    Conditional,
    Code,
}

impl SectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SectionKind::Alias => "alias",
            SectionKind::Function => "function",
            SectionKind::Export => "export",
            SectionKind::Comment => "comment",
            SectionKind::Conditional => "conditional",
            SectionKind::Code => "code",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contiguous, independently meaningful unit of a shell script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Matching key across files (compared case-insensitively)
    pub name: String,
    pub kind: SectionKind,
    /// Exact source text of the section's lines, without the final newline
    pub content: String,
    pub description: String,
    /// 1-based inclusive line span in the source
    pub line_range: (usize, usize),
    /// Untracked text between the previous section and this one
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub leading: String,
}

impl Section {
    /// Case-folded name used for cross-file matching.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    /// Case-insensitive name comparison.
    pub fn has_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }
}

/// Parsed script: ordered sections plus whatever follows the last one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellScript {
    pub sections: Vec<Section>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trailing: String,
}

impl ShellScript {
    /// Look up a section by name (case-insensitive); first match wins.
    pub fn find(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.has_name(name))
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Rebuild the exact source text from a parsed script.
pub fn reconstruct(script: &ShellScript) -> String {
    let mut out = String::new();
    for s in &script.sections {
        out.push_str(&s.leading);
        out.push_str(&s.content);
    }
    out.push_str(&script.trailing);
    out
}

/// Parse shell text into typed, named sections.
pub fn parse(src: &str) -> ShellScript {
    let lines = split_lines(src);
    let mut builder = Builder {
        src,
        lines: &lines,
        cursor: 0,
        sections: Vec::new(),
    };

    let mut i = 0;
    while i < lines.len() {
        match classify_line(lines[i].text) {
            LineClass::Blank => {
                i += 1;
            }
            LineClass::Comment => {
                let mut j = i;
                while j < lines.len() && classify_line(lines[j].text) == LineClass::Comment {
                    j += 1;
                }

                // A run glued to following code is only a visual lead-in
                let followed_by_code = j < lines.len() && !is_blank(lines[j].text);
                if !followed_by_code {
                    let label = truncate(comment_text(lines[i].text), COMMENT_LABEL_CHARS);
                    builder.push(i, j - 1, SectionKind::Comment, label.clone(), label);
                }
                i = j;
            }
            LineClass::Alias(name) => {
                let description = format!("Alias: {name}");
                builder.push(i, i, SectionKind::Alias, name, description);
                i += 1;
            }
            LineClass::Export(name) => {
                let description = format!("Export: {name}");
                builder.push(i, i, SectionKind::Export, name, description);
                i += 1;
            }
            LineClass::FunctionOpen(name) => {
                let end = scan_braces(&lines, i);
                let description = format!("Function: {name}()");
                builder.push(i, end, SectionKind::Function, name, description);
                i = end + 1;
            }
            LineClass::ConditionalOpen(block) => {
                let end = scan_conditional(&lines, i, block);
                let label = truncate(lines[i].text.trim(), BLOCK_LABEL_CHARS);
                builder.push(i, end, SectionKind::Conditional, label.clone(), label);
                i = end + 1;
            }
            LineClass::Other => {
                // Absorb until a boundary pattern or a blank line
                let mut j = i + 1;
                while j < lines.len() && classify_line(lines[j].text) == LineClass::Other {
                    j += 1;
                }
                let label = truncate(lines[i].text.trim(), BLOCK_LABEL_CHARS);
                let description = format!("Code: {label}");
                builder.push(i, j - 1, SectionKind::Code, label, description);
                i = j;
            }
        }
    }

    let trailing = src[builder.cursor..].to_string();
    ShellScript {
        sections: builder.sections,
        trailing,
    }
}

/// One source line; `end` excludes the `\n` terminator.
#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    text: &'a str,
    start: usize,
    end: usize,
}

fn split_lines(src: &str) -> Vec<Line<'_>> {
    let mut out = Vec::new();
    let mut start = 0usize;
    for piece in src.split_inclusive('\n') {
        let text = piece.strip_suffix('\n').unwrap_or(piece);
        out.push(Line {
            text,
            start,
            end: start + text.len(),
        });
        start += piece.len();
    }
    out
}

struct Builder<'s, 'l> {
    src: &'s str,
    lines: &'l [Line<'s>],
    /// Byte offset just past the previous section's content
    cursor: usize,
    sections: Vec<Section>,
}

impl Builder<'_, '_> {
    fn push(
        &mut self,
        first: usize,
        last: usize,
        kind: SectionKind,
        name: String,
        description: String,
    ) {
        let lo = self.lines[first].start;
        let hi = self.lines[last].end;
        self.sections.push(Section {
            name,
            kind,
            content: self.src[lo..hi].to_string(),
            description,
            line_range: (first + 1, last + 1),
            leading: self.src[self.cursor..lo].to_string(),
        });
        self.cursor = hi;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    If,
    Case,
}

impl BlockKind {
    fn tokens(self) -> (&'static str, &'static str) {
        match self {
            BlockKind::If => ("if", "fi"),
            BlockKind::Case => ("case", "esac"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LineClass {
    Blank,
    Comment,
    Alias(String),
    Export(String),
    FunctionOpen(String),
    ConditionalOpen(BlockKind),
    Other,
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn classify_line(line: &str) -> LineClass {
    let t = line.trim_start();
    if t.trim_end().is_empty() {
        return LineClass::Blank;
    }
    if t.starts_with('#') && !t.starts_with("#!") {
        return LineClass::Comment;
    }
    if let Some(c) = ALIAS_RE.captures(t) {
        return LineClass::Alias(c[1].to_string());
    }
    if let Some(c) = EXPORT_RE.captures(t) {
        return LineClass::Export(c[1].to_string());
    }
    if let Some(c) = FUNCTION_KEYWORD_RE
        .captures(t)
        .or_else(|| FUNCTION_PARENS_RE.captures(t))
    {
        return LineClass::FunctionOpen(c[1].to_string());
    }
    if t.starts_with("if ") {
        return LineClass::ConditionalOpen(BlockKind::If);
    }
    if t.starts_with("case ") {
        return LineClass::ConditionalOpen(BlockKind::Case);
    }
    LineClass::Other
}

/// Last line index of a brace-delimited function body.
fn scan_braces(lines: &[Line<'_>], open: usize) -> usize {
    let mut depth: i64 = 0;
    let mut seen_open = false;
    for (idx, line) in lines.iter().enumerate().skip(open) {
        for ch in line.text.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    seen_open = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if seen_open && depth <= 0 {
            return idx;
        }
    }
    lines.len() - 1
}

/// Last line index of an `if`/`case` block, honoring nesting.
fn scan_conditional(lines: &[Line<'_>], open: usize, block: BlockKind) -> usize {
    let (opener, closer) = block.tokens();
    let mut depth: i64 = 0;
    for (idx, line) in lines.iter().enumerate().skip(open) {
        for tok in shell_words(line.text) {
            if tok == opener {
                depth += 1;
            } else if tok == closer {
                depth -= 1;
            }
        }
        if depth <= 0 {
            return idx;
        }
    }
    lines.len() - 1
}

/// Crude word split on whitespace and shell separators; stops at a comment.
fn shell_words(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| c.is_whitespace() || matches!(c, ';' | '&' | '|' | '(' | ')'))
        .filter(|w| !w.is_empty())
        .take_while(|w| !w.starts_with('#'))
}

fn comment_text(line: &str) -> &str {
    line.trim().trim_start_matches('#').trim()
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect::<String>().trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kinds_and_names(script: &ShellScript) -> Vec<(SectionKind, &str)> {
        script
            .sections
            .iter()
            .map(|s| (s.kind, s.name.as_str()))
            .collect()
    }

    #[test]
    fn alias_and_export_lines() {
        let script = parse("alias gs=git status\nexport FOO=bar\n");
        assert_eq!(
            kinds_and_names(&script),
            vec![(SectionKind::Alias, "gs"), (SectionKind::Export, "FOO")]
        );
        assert_eq!(script.sections[0].content, "alias gs=git status");
        assert_eq!(script.sections[1].description, "Export: FOO");
    }

    #[test]
    fn function_spans_brace_balance() {
        let script = parse("build() {\n  echo hi\n}\n");
        assert_eq!(script.len(), 1);
        let f = &script.sections[0];
        assert_eq!(f.kind, SectionKind::Function);
        assert_eq!(f.name, "build");
        assert_eq!(f.content, "build() {\n  echo hi\n}");
        assert_eq!(f.line_range, (1, 3));
    }

    #[test]
    fn function_keyword_with_brace_on_next_line() {
        let src = "function greet\n{\n  if true; then { echo x; }; fi\n}\nalias a=b\n";
        let script = parse(src);
        assert_eq!(
            kinds_and_names(&script),
            vec![(SectionKind::Function, "greet"), (SectionKind::Alias, "a")]
        );
        assert_eq!(script.sections[0].line_range, (1, 4));
    }

    #[test]
    fn blank_lines_inside_function_do_not_split() {
        let src = "f() {\n  a\n\n  b\n}\n";
        let script = parse(src);
        assert_eq!(script.len(), 1);
        assert_eq!(script.sections[0].content, "f() {\n  a\n\n  b\n}");
    }

    #[test]
    fn nested_if_blocks() {
        let src = "if [ -x a ]; then\n  if [ -x b ]; then\n    echo b\n  fi\nfi\nexport X=1\n";
        let script = parse(src);
        assert_eq!(script.sections[0].kind, SectionKind::Conditional);
        assert_eq!(script.sections[0].line_range, (1, 5));
        assert_eq!(script.sections[0].name, "if [ -x a ]; then");
        assert_eq!(script.sections[1].kind, SectionKind::Export);
    }

    #[test]
    fn case_block_ends_at_esac() {
        let src = "case \"$OSTYPE\" in\n  darwin*) alias ls='ls -G' ;;\n  *) ;;\nesac\n";
        let script = parse(src);
        assert_eq!(script.len(), 1);
        assert_eq!(script.sections[0].kind, SectionKind::Conditional);
        assert_eq!(script.sections[0].line_range, (1, 4));
    }

    #[test]
    fn one_line_if_closes_immediately() {
        let script = parse("if [ -f ~/.local ]; then source ~/.local; fi\nalias x=y\n");
        assert_eq!(script.len(), 2);
        assert_eq!(script.sections[0].line_range, (1, 1));
    }

    #[test]
    fn standalone_comment_becomes_section() {
        let script = parse("# Path setup for local binaries and tools\n\nexport A=1\n");
        assert_eq!(script.sections[0].kind, SectionKind::Comment);
        assert_eq!(script.sections[0].name, "Path setup for local binaries and tools");
        assert_eq!(script.sections[0].description, script.sections[0].name);
    }

    #[test]
    fn comment_name_truncated_to_fifty_chars() {
        let long = format!("# {}", "x".repeat(80));
        let script = parse(&long);
        assert_eq!(script.sections[0].name.chars().count(), 50);
    }

    #[test]
    fn comment_glued_to_code_is_leading_only() {
        let script = parse("# git shortcuts\nalias gs=git status\n");
        assert_eq!(script.len(), 1);
        let alias = &script.sections[0];
        assert_eq!(alias.kind, SectionKind::Alias);
        assert_eq!(alias.content, "alias gs=git status");
        assert_eq!(alias.leading, "# git shortcuts\n");
    }

    #[test]
    fn code_stops_at_boundaries_and_blank_lines() {
        let src = "eval \"$(starship init zsh)\"\nsetopt autocd\nalias l=ls\nbindkey -e\n\nbindkey x\n";
        let script = parse(src);
        assert_eq!(
            kinds_and_names(&script),
            vec![
                (SectionKind::Code, "eval \"$(starship init zsh)\""),
                (SectionKind::Alias, "l"),
                (SectionKind::Code, "bindkey -e"),
                (SectionKind::Code, "bindkey x"),
            ]
        );
        assert_eq!(script.sections[0].content, "eval \"$(starship init zsh)\"\nsetopt autocd");
    }

    #[test]
    fn code_name_truncated_to_forty_chars() {
        let line = format!("echo {}", "y".repeat(60));
        let script = parse(&line);
        assert_eq!(script.sections[0].name.chars().count(), 40);
    }

    #[test]
    fn conditional_label_truncated_to_forty_chars() {
        let src = "if [[ -d \"$HOME/.local/share/very/long/path/here\" ]]; then\n  x\nfi\n";
        let script = parse(src);
        let cond = &script.sections[0];
        assert_eq!(cond.kind, SectionKind::Conditional);
        assert_eq!(cond.name, "if [[ -d \"$HOME/.local/share/very/long/p");
        assert_eq!(cond.description, cond.name);

        // The cut lands on a space, which is trimmed away
        let src = "if [ -n \"$ZSH_VERSION_AND_MORE_STUFF\" ] && [ -t 1 ]; then\n  x\nfi\n";
        let script = parse(src);
        assert_eq!(script.sections[0].name, "if [ -n \"$ZSH_VERSION_AND_MORE_STUFF\" ]");
        assert_eq!(script.sections[0].name.chars().count(), 39);
    }

    #[test]
    fn trailing_comment_without_newline() {
        let src = "alias a=b\n\n# closing note";
        let script = parse(src);
        assert_eq!(
            kinds_and_names(&script),
            vec![(SectionKind::Alias, "a"), (SectionKind::Comment, "closing note")]
        );
        let last = &script.sections[1];
        assert_eq!(last.content, "# closing note");
        assert_eq!(last.leading, "\n\n");
        assert_eq!(last.line_range, (3, 3));
        assert_eq!(script.trailing, "");
        assert_eq!(reconstruct(&script), src);
    }

    #[test]
    fn shebang_is_code_not_comment() {
        let script = parse("#!/bin/zsh\n# tools\n\nalias a=b\n");
        assert_eq!(script.sections[0].kind, SectionKind::Code);
        assert_eq!(script.sections[1].kind, SectionKind::Comment);
    }

    #[test]
    fn multiple_aliases_on_one_line_stay_together() {
        let script = parse("alias a=b; alias c=d\n");
        assert_eq!(script.len(), 1);
        assert_eq!(script.sections[0].name, "a");
    }

    #[test]
    fn zsh_global_alias_flag() {
        let script = parse("alias -g G='| grep'\n");
        assert_eq!(kinds_and_names(&script), vec![(SectionKind::Alias, "G")]);
    }

    #[test]
    fn unterminated_blocks_absorb_remaining_input() {
        let script = parse("f() {\n  echo\nalias a=b\n");
        assert_eq!(script.len(), 1);
        assert_eq!(script.sections[0].line_range, (1, 3));

        let script = parse("if true; then\n  echo\n\nexport A=1");
        assert_eq!(script.len(), 1);
        assert_eq!(script.sections[0].kind, SectionKind::Conditional);
    }

    #[test]
    fn find_is_case_insensitive() {
        let script = parse("export EDITOR=vim\n");
        assert!(script.find("editor").is_some());
        assert!(script.find("VISUAL").is_none());
    }

    #[test]
    fn roundtrip_mixed_script() {
        let src = "#!/bin/bash\n\n# Aliases\n\nalias ll='ls -la'\r\n\n\nmkcd() {\n  mkdir -p \"$1\" && cd \"$1\"\n}\n# trailing note\n";
        assert_eq!(reconstruct(&parse(src)), src);
    }

    #[test]
    fn empty_input() {
        let script = parse("");
        assert!(script.is_empty());
        assert_eq!(reconstruct(&script), "");
    }

    fn shell_line() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            Just("alias gs='git status'".to_string()),
            Just("export PATH=\"$HOME/bin:$PATH\"".to_string()),
            Just("# comment".to_string()),
            Just("f() {".to_string()),
            Just("}".to_string()),
            Just("if [ -n \"$ZSH\" ]; then".to_string()),
            Just("fi".to_string()),
            Just("case $x in".to_string()),
            Just("esac".to_string()),
            "[ a-z{}#;()=\t]{0,24}",
        ]
    }

    proptest! {
        #[test]
        fn reconstruct_is_lossless(lines in prop::collection::vec(shell_line(), 0..24), nl in any::<bool>()) {
            let mut src = lines.join("\n");
            if nl {
                src.push('\n');
            }
            prop_assert_eq!(reconstruct(&parse(&src)), src);
        }

        #[test]
        fn reconstruct_arbitrary_text(src in any::<String>()) {
            prop_assert_eq!(reconstruct(&parse(&src)), src);
        }
    }
}
