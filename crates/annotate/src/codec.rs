use crate::dialect::CommentDialect;
use crate::fields::{
    format_timestamp, AnnotationFields, LABEL_MODIFIED, LABEL_PREVIOUS, LABEL_SIZE,
};
use once_cell::sync::Lazy;
use regex::Regex;

/// How many leading lines are scanned for an existing annotation.
const SCAN_WINDOW_LINES: usize = 20;
/// How far past the anchor line the downward expansion may look.
const DOWNWARD_WINDOW_LINES: usize = 20;
/// How many lines after a bare block opener may hold the first field line.
const OPENER_LOOKAHEAD_LINES: usize = 3;

/// A located annotation region, inclusive zero-indexed line range.
///
/// Computed fresh on every detection pass; never cached across edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampBlock {
    pub start_line: usize,
    pub end_line: usize,
}

/// Field line with a leading comment marker, in any supported dialect.
static MARKER_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)^\s*(?:/\*\*|/\*|<!--|<#|=begin|--\[\[|\{-|%\{|"{3}|//|--|#|%|;|"|\*).*?(?:最后修改时间|上次修改时间|修改时间|last modified|previous modified|modified)"#,
    )
    .expect("marker/label pattern")
});

/// Bare field line, for block interiors that carry no per-line marker.
/// Anchored and colon-terminated so ordinary prose does not match.
static FIELD_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:最后修改时间|上次修改时间|文件大小|last modified|previous modified|size)\s*[:：]",
    )
    .expect("field line pattern")
});

const BLOCK_OPENERS: &[&str] = &[
    "/**", "/*", "<!--", "\"\"\"", "=begin", "<#", "--[[", "{-", "%{",
];
const BLOCK_CLOSERS: &[&str] = &["*/", "-->", "\"\"\"", "%}", "#>", "=end", "]]", "-}"];
const LINE_CONTINUATIONS: &[&str] = &["//", "#", "*", "%", "\"", ";", "--"];

fn starts_with_opener(trimmed: &str) -> bool {
    BLOCK_OPENERS.iter().any(|open| trimmed.starts_with(open))
}

fn contains_closer(trimmed: &str) -> bool {
    BLOCK_CLOSERS.iter().any(|close| trimmed.contains(close))
}

fn is_continuation(trimmed: &str) -> bool {
    LINE_CONTINUATIONS
        .iter()
        .any(|token| trimmed.starts_with(token))
}

/// Synthesize a fresh annotation block for `dialect`.
///
/// Pure text: two calls with equal fields produce byte-identical output,
/// always terminated by exactly one newline. Block form wins over wrap
/// form, wrap over line-only.
pub fn synthesize(
    dialect: &CommentDialect,
    fields: &AnnotationFields,
    timestamp_format: &str,
) -> String {
    let mut body: Vec<String> = Vec::with_capacity(3);
    body.push(format!(
        "{LABEL_MODIFIED}: {}",
        format_timestamp(fields.modified_at, timestamp_format)
    ));
    if let Some(previous) = fields.previous_modified_at {
        body.push(format!(
            "{LABEL_PREVIOUS}: {}",
            format_timestamp(previous, timestamp_format)
        ));
    }
    if let Some(size) = fields.size_bytes {
        body.push(format!("{LABEL_SIZE}: {size} bytes"));
    }

    let mut out = String::new();
    if let Some(block) = dialect.block {
        out.push_str(block.open);
        out.push('\n');
        for line in &body {
            out.push_str(block.line_prefix);
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(block.close);
        out.push('\n');
    } else if let Some(wrap) = dialect.wrap {
        out.push_str(wrap.start);
        out.push('\n');
        for line in &body {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(wrap.end);
        out.push('\n');
    } else if let Some(token) = dialect.line_token {
        for line in &body {
            out.push_str(token);
            out.push(' ');
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Locate the first annotation block in `text`, if any.
pub fn locate(dialect: &CommentDialect, text: &str) -> Option<TimestampBlock> {
    locate_all(dialect, text).into_iter().next()
}

/// Locate every independent annotation block within the scan window,
/// non-overlapping and in ascending line order. Callers must remove all
/// of them before inserting a fresh block, or stale duplicates survive.
pub fn locate_all(dialect: &CommentDialect, text: &str) -> Vec<TimestampBlock> {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut blocks = Vec::new();
    let mut from = 0;
    while let Some(anchor) = find_anchor(dialect, &lines, from) {
        match block_end(&lines, anchor) {
            Some(end) => {
                let start = block_start(&lines, anchor);
                blocks.push(TimestampBlock {
                    start_line: start,
                    end_line: end.max(start),
                });
                from = end.max(start) + 1;
            }
            None => {
                // No closing token inside the window: treat this region as
                // "no block found" and keep scanning past the anchor.
                log::debug!("unterminated annotation candidate at line {anchor}");
                from = anchor + 1;
            }
        }
    }
    blocks
}

/// Remove every located annotation block and prepend a freshly synthesized
/// one, separated from the remaining text by a blank line.
///
/// Idempotent: applying this twice with the same fields yields the same
/// text as applying it once. Block removal consumes the single blank line
/// following each block so repeated separators never accumulate.
pub fn replace(
    text: &str,
    dialect: &CommentDialect,
    fields: &AnnotationFields,
    timestamp_format: &str,
) -> String {
    let blocks = locate_all(dialect, text);
    let mut lines: Vec<&str> = text.split('\n').collect();
    for block in blocks.iter().rev() {
        let mut end = block.end_line;
        if end + 1 < lines.len().saturating_sub(1) && lines[end + 1].trim().is_empty() {
            end += 1;
        }
        let end = end.min(lines.len() - 1);
        lines.drain(block.start_line..=end);
    }
    let remainder = lines.join("\n");

    let mut out = synthesize(dialect, fields, timestamp_format);
    out.push('\n');
    out.push_str(&remainder);
    out
}

/// Find the first line inside the scan window that anchors an annotation:
/// either a marker-plus-label line, or a bare label line shortly after this
/// dialect's own block/wrap opener.
fn find_anchor(dialect: &CommentDialect, lines: &[&str], from: usize) -> Option<usize> {
    let limit = lines.len().min(SCAN_WINDOW_LINES);
    let mut i = from;
    while i < limit {
        if MARKER_LABEL_RE.is_match(lines[i]) {
            return Some(i);
        }
        let trimmed = lines[i].trim_start();
        if opens_dialect_block(dialect, trimmed) {
            let lookahead = lines.len().min(i + 1 + OPENER_LOOKAHEAD_LINES);
            for (offset, line) in lines[i + 1..lookahead].iter().enumerate() {
                if FIELD_LINE_RE.is_match(line) {
                    return Some(i + 1 + offset);
                }
            }
        }
        i += 1;
    }
    None
}

fn opens_dialect_block(dialect: &CommentDialect, trimmed: &str) -> bool {
    if let Some(block) = dialect.block {
        if trimmed.starts_with(block.open) {
            return true;
        }
    }
    if let Some(wrap) = dialect.wrap {
        if trimmed.starts_with(wrap.start) {
            return true;
        }
    }
    false
}

/// Walk upward from the anchor to the block's first line: the block-open
/// line if one exists, otherwise the line just after the first
/// non-comment line (or the top of the file).
fn block_start(lines: &[&str], anchor: usize) -> usize {
    let mut i = anchor as isize;
    while i >= 0 {
        let trimmed = lines[i as usize].trim_start();
        if starts_with_opener(trimmed) {
            return i as usize;
        }
        if i as usize == anchor || is_continuation(trimmed) || trimmed.is_empty() {
            i -= 1;
            continue;
        }
        return (i + 1) as usize;
    }
    0
}

/// Walk downward from the anchor to the block's last line: the line
/// holding a closing token, or the last comment-continuation line.
/// `None` when the window ends before the block does.
fn block_end(lines: &[&str], anchor: usize) -> Option<usize> {
    let last = lines.len().min(anchor + DOWNWARD_WINDOW_LINES);
    for i in anchor..last {
        let trimmed = lines[i].trim();
        if contains_closer(trimmed) {
            return Some(i);
        }
        match lines.get(i + 1) {
            None => return Some(i),
            Some(next) => {
                let next = next.trim();
                if next.is_empty()
                    || (!is_continuation(next)
                        && !contains_closer(next)
                        && !FIELD_LINE_RE.is_match(next))
                {
                    return Some(i);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{CommentDialect, DialectRegistry};
    use crate::fields::DEFAULT_TIMESTAMP_FORMAT;
    use pretty_assertions::assert_eq;
    use std::time::{Duration, UNIX_EPOCH};

    fn fields() -> AnnotationFields {
        AnnotationFields::new(UNIX_EPOCH + Duration::from_secs(1_752_992_000))
            .with_previous(Some(UNIX_EPOCH + Duration::from_secs(1_752_991_000)))
            .with_size(120)
    }

    fn dialect_for(path: &str) -> &'static CommentDialect {
        DialectRegistry::builtin()
            .resolve(path)
            .expect("registered dialect")
    }

    #[test]
    fn synthesize_ends_with_single_newline() {
        for path in ["a.rs", "a.py", "a.md", "a.ini", "a.css", "Makefile"] {
            let out = synthesize(dialect_for(path), &fields(), DEFAULT_TIMESTAMP_FORMAT);
            assert!(out.ends_with('\n'), "{path}: {out:?}");
            assert!(!out.ends_with("\n\n"), "{path}: {out:?}");
        }
    }

    #[test]
    fn synthesize_is_deterministic() {
        let d = dialect_for("a.ts");
        assert_eq!(
            synthesize(d, &fields(), DEFAULT_TIMESTAMP_FORMAT),
            synthesize(d, &fields(), DEFAULT_TIMESTAMP_FORMAT)
        );
    }

    #[test]
    fn hash_dialect_synthesizes_line_comments_only() {
        // Hash style without a block form, as in plain shell scripts.
        let dialect = CommentDialect {
            line_token: Some("#"),
            block: None,
            wrap: None,
        };
        let f = AnnotationFields::new(UNIX_EPOCH + Duration::from_secs(1_752_992_000))
            .with_size(120);
        let out = synthesize(&dialect, &f, DEFAULT_TIMESTAMP_FORMAT);

        let lines: Vec<&str> = out.trim_end().split('\n').collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.starts_with("# ")));
        assert!(!out.contains("\"\"\""));

        // Feeding the synthesized text back finds a block spanning both lines.
        let block = locate(&dialect, &out).expect("block");
        assert_eq!(block, TimestampBlock { start_line: 0, end_line: 1 });
    }

    #[test]
    fn locate_spans_full_synthesized_block_for_every_family() {
        for path in [
            "a.ts", "a.rs", "a.py", "a.rb", "a.ps1", "a.sql", "a.lua", "a.hs", "a.m", "a.sh",
            "a.ini", "a.tex", "a.vim", "a.md", "a.css", "Dockerfile",
        ] {
            let dialect = dialect_for(path);
            let out = synthesize(dialect, &fields(), DEFAULT_TIMESTAMP_FORMAT);
            let line_count = out.trim_end().split('\n').count();
            let block = locate(dialect, &out).unwrap_or_else(|| panic!("no block for {path}"));
            assert_eq!(block.start_line, 0, "{path}");
            assert_eq!(block.end_line, line_count - 1, "{path}: {out:?}");
        }
    }

    #[test]
    fn round_trip_preserves_field_values() {
        for path in ["a.ts", "a.py", "a.md", "a.sh"] {
            let dialect = dialect_for(path);
            let out = synthesize(dialect, &fields(), DEFAULT_TIMESTAMP_FORMAT);
            let block = locate(dialect, &out).expect("block");
            let lines: Vec<&str> = out.split('\n').collect();
            let body = &lines[block.start_line..=block.end_line];

            let expect_modified =
                format_timestamp(fields().modified_at, DEFAULT_TIMESTAMP_FORMAT);
            let expect_previous = format_timestamp(
                fields().previous_modified_at.unwrap(),
                DEFAULT_TIMESTAMP_FORMAT,
            );
            assert!(
                body.iter()
                    .any(|l| l.contains(&format!("{LABEL_MODIFIED}: {expect_modified}"))),
                "{path}"
            );
            assert!(
                body.iter()
                    .any(|l| l.contains(&format!("{LABEL_PREVIOUS}: {expect_previous}"))),
                "{path}"
            );
            assert!(
                body.iter().any(|l| l.contains("Size: 120 bytes")),
                "{path}"
            );
        }
    }

    #[test]
    fn replace_prepends_when_no_block_exists() {
        let dialect = dialect_for("a.rs");
        let source = "fn main() {}\n";
        let out = replace(source, dialect, &fields(), DEFAULT_TIMESTAMP_FORMAT);
        assert!(out.starts_with("/*\n"));
        assert!(out.ends_with("\nfn main() {}\n"));
    }

    #[test]
    fn replace_is_idempotent() {
        for source in [
            "",
            "fn main() {}\n",
            "fn main() {}",
            "// a leading comment\nfn main() {}\n",
            "/*\n * Last modified: 2020-01-01 00:00:00\n */\nfn main() {}\n",
        ] {
            let dialect = dialect_for("a.rs");
            let once = replace(source, dialect, &fields(), DEFAULT_TIMESTAMP_FORMAT);
            let twice = replace(&once, dialect, &fields(), DEFAULT_TIMESTAMP_FORMAT);
            assert_eq!(once, twice, "source: {source:?}");
        }
    }

    #[test]
    fn replace_is_idempotent_for_line_and_wrap_dialects() {
        for (path, source) in [
            ("a.py", "import os\n"),
            ("a.sh", "#!/bin/sh\nset -e\n"),
            ("a.md", "# Title\n\nbody\n"),
            ("a.css", "body { margin: 0; }\n"),
        ] {
            let dialect = dialect_for(path);
            let once = replace(source, dialect, &fields(), DEFAULT_TIMESTAMP_FORMAT);
            let twice = replace(&once, dialect, &fields(), DEFAULT_TIMESTAMP_FORMAT);
            assert_eq!(once, twice, "{path}");
        }
    }

    #[test]
    fn replace_removes_every_stale_block() {
        let dialect = dialect_for("a.ts");
        let stale = "/**\n * Last modified: 2020-01-01 00:00:00\n */\n\
                     /**\n * Last modified: 2021-01-01 00:00:00\n */\n\
                     export const x = 1;\n";
        let out = replace(stale, dialect, &fields(), DEFAULT_TIMESTAMP_FORMAT);

        assert!(!out.contains("2020-01-01"));
        assert!(!out.contains("2021-01-01"));
        assert_eq!(out.matches("/**").count(), 1);
        assert!(out.ends_with("export const x = 1;\n"));

        let fresh = synthesize(dialect, &fields(), DEFAULT_TIMESTAMP_FORMAT);
        assert!(out.starts_with(&fresh));
    }

    #[test]
    fn stale_legacy_labels_are_detected() {
        // Blocks written by older builds carried localized labels.
        let dialect = dialect_for("a.ts");
        let stale = "/**\n * 最后修改时间: 2025-07-20 09:35:30\n * 文件大小: 11054 bytes\n */\nlet x;\n";
        let block = locate(dialect, stale).expect("legacy block");
        assert_eq!(block, TimestampBlock { start_line: 0, end_line: 3 });
    }

    #[test]
    fn unterminated_block_is_treated_as_absent() {
        let dialect = dialect_for("a.ts");
        // An opener plus a label but no closer anywhere in the window.
        let mut source = String::from("/**\n * Last modified: 2020-01-01 00:00:00\n");
        for _ in 0..30 {
            source.push_str(" * filler\n");
        }
        assert_eq!(locate(dialect, &source), None);

        // Replace degenerates to a pure prepend and keeps the malformed text.
        let out = replace(&source, dialect, &fields(), DEFAULT_TIMESTAMP_FORMAT);
        assert!(out.contains("2020-01-01"));
        assert!(out.starts_with("/**\n * Last modified: "));
    }

    #[test]
    fn blocks_outside_scan_window_are_ignored() {
        let dialect = dialect_for("a.rs");
        let mut source = String::new();
        for i in 0..SCAN_WINDOW_LINES + 2 {
            source.push_str(&format!("fn f{i}() {{}}\n"));
        }
        source.push_str("// Last modified: 2020-01-01 00:00:00\n");
        assert_eq!(locate(dialect, &source), None);
    }

    #[test]
    fn ordinary_comments_are_not_blocks() {
        let dialect = dialect_for("a.rs");
        let source = "// Utilities for frobnication.\n//\n// No timestamps here.\nfn f() {}\n";
        assert_eq!(locate(dialect, source), None);
    }

    #[test]
    fn anchor_mid_block_expands_to_block_boundaries() {
        let dialect = dialect_for("a.ts");
        let source = "/**\n * Frobnicator module.\n * Last modified: 2020-01-01 00:00:00\n */\nlet x;\n";
        let block = locate(dialect, source).expect("block");
        assert_eq!(block, TimestampBlock { start_line: 0, end_line: 3 });
    }
}
