//! Markdown section parsing using tree-sitter-md
//!
//! Only ATX headings (`#` syntax) that sit directly in the document or in a
//! heading section open a new section. Headings inside fenced code, block
//! quotes and list items are ordinary content.

use super::{Heading, SectionParser, SectionTree};
use crate::error::{SyncError, SyncResult};
use tree_sitter::{Node, Parser};

/// Section parser for markdown documents
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownSectionParser;

impl MarkdownSectionParser {
    pub fn new() -> Self {
        Self
    }

    /// Find every section-opening heading in document order
    pub fn headings(&self, text: &str) -> SyncResult<Vec<Heading>> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_md::LANGUAGE.into())
            .map_err(|e| SyncError::ParseError(format!("Failed to load markdown grammar: {}", e)))?;
        let tree = parser
            .parse(text, None)
            .ok_or_else(|| SyncError::ParseError("Markdown parser returned no tree".to_string()))?;

        let mut headings = Vec::new();
        collect_headings(tree.root_node(), text, &mut headings);
        Ok(headings)
    }
}

impl SectionParser for MarkdownSectionParser {
    fn parse(&self, text: &str) -> SyncResult<SectionTree> {
        let headings = self.headings(text)?;
        Ok(SectionTree::from_headings(text.len(), &headings))
    }
}

fn collect_headings(node: Node<'_>, text: &str, out: &mut Vec<Heading>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "atx_heading" => {
                if let Some(heading) = heading_at(text, child.start_byte()) {
                    out.push(heading);
                }
            }
            "section" | "document" => collect_headings(child, text, out),
            _ => {}
        }
    }
}

/// Read level and title from the heading line containing `offset`
fn heading_at(text: &str, offset: usize) -> Option<Heading> {
    let start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line = text[start..].lines().next().unwrap_or("");
    let (level, title) = parse_atx_line(line)?;
    Some(Heading { title, level, start })
}

/// Split an ATX heading line into its level and title
pub fn parse_atx_line(line: &str) -> Option<(usize, String)> {
    let trimmed = line.trim_start();
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let level = trimmed.chars().take_while(|&c| c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }

    let mut title = rest.trim();
    // Optional closing sequence: trailing #s preceded by whitespace
    let without_hashes = title.trim_end_matches('#');
    if without_hashes.len() != title.len()
        && (without_hashes.is_empty() || without_hashes.ends_with([' ', '\t']))
    {
        title = without_hashes.trim_end();
    }
    Some((level, title.to_string()))
}
