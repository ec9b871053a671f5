//! Unified diff hunks
//!
//! Hosting services report a modified file as its post-change content plus
//! the unified hunks. Walking the hunks backwards over the new content
//! recovers the pre-change text without a second content fetch.

use crate::error::{SyncError, SyncResult};
use regex::Regex;
use std::sync::OnceLock;

/// One `@@ -a,b +c,d @@` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<String>,
}

fn hunk_header() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| {
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("valid hunk header regex")
    })
}

/// Parse the hunks of a patch, ignoring any `diff`/`---`/`+++` preamble
pub fn parse_hunks(patch: &str) -> SyncResult<Vec<Hunk>> {
    let mut hunks: Vec<Hunk> = Vec::new();
    for line in patch.lines() {
        if let Some(caps) = hunk_header().captures(line) {
            let number = |i: usize, default: usize| -> SyncResult<usize> {
                match caps.get(i) {
                    Some(m) => m.as_str().parse().map_err(|_| {
                        SyncError::PatchError(format!("Invalid hunk header: {}", line))
                    }),
                    None => Ok(default),
                }
            };
            hunks.push(Hunk {
                old_start: number(1, 0)?,
                old_count: number(2, 1)?,
                new_start: number(3, 0)?,
                new_count: number(4, 1)?,
                lines: Vec::new(),
            });
        } else if let Some(hunk) = hunks.last_mut() {
            hunk.lines.push(line.to_string());
        }
    }
    Ok(hunks)
}

fn strip_newline(line: &str) -> &str {
    line.strip_suffix('\n').unwrap_or(line)
}

/// Reconstruct the pre-change text from the post-change text and its patch
pub fn reverse_apply(after: &str, patch: &str) -> SyncResult<String> {
    let hunks = parse_hunks(patch)?;
    if hunks.is_empty() {
        return Err(SyncError::PatchError("Patch contains no hunks".to_string()));
    }

    let after_lines: Vec<&str> = after.split_inclusive('\n').collect();
    let mut before = String::with_capacity(after.len());
    let mut cursor = 0;

    for hunk in &hunks {
        // A hunk with no new lines names the line it follows
        let begin = if hunk.new_count == 0 {
            hunk.new_start
        } else {
            hunk.new_start.saturating_sub(1)
        };
        if begin < cursor || begin > after_lines.len() {
            return Err(SyncError::PatchError(format!(
                "Hunk at +{} is out of order or past end of file",
                hunk.new_start
            )));
        }
        for line in &after_lines[cursor..begin] {
            before.push_str(line);
        }
        cursor = begin;

        let mut consumed = 0;
        let mut last_was_removal = false;
        for line in &hunk.lines {
            let (marker, content) = match line.chars().next() {
                Some(c) => (c, &line[c.len_utf8()..]),
                None => (' ', ""),
            };
            match marker {
                ' ' | '+' => {
                    let current = after_lines.get(cursor).ok_or_else(|| {
                        SyncError::PatchError("Patch runs past end of file".to_string())
                    })?;
                    if strip_newline(current).trim_end_matches('\r') != content.trim_end_matches('\r') {
                        return Err(SyncError::PatchError(format!(
                            "Patch does not match content at line {}",
                            cursor + 1
                        )));
                    }
                    if marker == ' ' {
                        before.push_str(current);
                    }
                    cursor += 1;
                    consumed += 1;
                    last_was_removal = false;
                }
                '-' => {
                    before.push_str(content);
                    before.push('\n');
                    last_was_removal = true;
                }
                '\\' => {
                    if last_was_removal && before.ends_with('\n') {
                        before.pop();
                    }
                }
                _ => {
                    return Err(SyncError::PatchError(format!(
                        "Unexpected patch line: {}",
                        line
                    )));
                }
            }
        }
        if consumed != hunk.new_count {
            return Err(SyncError::PatchError(format!(
                "Hunk at +{} covers {} lines, expected {}",
                hunk.new_start, consumed, hunk.new_count
            )));
        }
    }

    for line in &after_lines[cursor..] {
        before.push_str(line);
    }
    Ok(before)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hunk_headers() {
        let hunks = parse_hunks("@@ -1,3 +1,4 @@ heading\n a\n+b\n c\n@@ -10 +11 @@\n-x\n+y\n").unwrap();
        assert_eq!(hunks.len(), 2);
        assert_eq!(hunks[0].old_count, 3);
        assert_eq!(hunks[0].new_count, 4);
        assert_eq!(hunks[1].old_count, 1);
        assert_eq!(hunks[1].new_start, 11);
        assert_eq!(hunks[1].lines, vec!["-x", "+y"]);
    }

    #[test]
    fn test_reverse_modification() {
        let after = "# Title\n\nnew line\n\nend\n";
        let patch = "@@ -1,5 +1,5 @@\n # Title\n \n-old line\n+new line\n \n end";
        assert_eq!(reverse_apply(after, patch).unwrap(), "# Title\n\nold line\n\nend\n");
    }

    #[test]
    fn test_reverse_insertion_and_deletion() {
        let after = "a\nb\ninserted\nc\ne\n";
        let patch = "@@ -1,3 +1,4 @@\n a\n b\n+inserted\n c\n@@ -4,2 +5,1 @@\n-d\n e\n";
        assert_eq!(reverse_apply(after, patch).unwrap(), "a\nb\nc\nd\ne\n");
    }

    #[test]
    fn test_reverse_pure_deletion_hunk() {
        let after = "a\nc\n";
        let patch = "@@ -2 +1,0 @@\n-b\n";
        assert_eq!(reverse_apply(after, patch).unwrap(), "a\nb\nc\n");
    }

    #[test]
    fn test_reverse_no_newline_marker() {
        let after = "a\nb\n";
        let patch = "@@ -1,2 +1,2 @@\n a\n-old\n\\ No newline at end of file\n+b\n";
        assert_eq!(reverse_apply(after, patch).unwrap(), "a\nold");
    }

    #[test]
    fn test_reverse_rejects_mismatch() {
        let after = "a\nb\n";
        let patch = "@@ -1,2 +1,2 @@\n a\n-x\n+zzz\n";
        assert!(matches!(reverse_apply(after, patch), Err(SyncError::PatchError(_))));
    }

    #[test]
    fn test_reverse_rejects_empty_patch() {
        assert!(reverse_apply("a\n", "").is_err());
    }
}
