//! Hierarchical section model of a document
//!
//! A document is split at its headings. Every heading opens a section whose
//! *body* runs from the heading line to the next heading of any level, and
//! whose *subtree* runs to the next heading of the same or a shallower level.
//! Text before the first heading is the preamble. The document is exactly the
//! concatenation of the preamble and every section body in document order,
//! which is what lets the merge engine rebuild it without touching bytes it
//! does not own.

pub mod markdown;

use crate::error::SyncResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;

pub use markdown::MarkdownSectionParser;

/// Key of the pseudo-section holding text before the first heading
pub const PREAMBLE_KEY: &str = "(preamble)";

/// Separator between titles in a section key
const KEY_SEPARATOR: &str = " > ";

/// A heading found by a parser, before the hierarchy is assembled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub title: String,
    pub level: usize,
    /// Byte offset of the start of the heading line
    pub start: usize,
}

/// One node of a document's section tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionNode {
    /// Identity of the section, unique within the document
    pub key: String,
    pub title: String,
    pub level: usize,
    /// Titles from the outermost ancestor down to this section
    pub heading_path: Vec<String>,
    /// Heading line through the end of the last descendant
    pub byte_range: Range<usize>,
    /// Heading line through the start of the next heading
    pub body_range: Range<usize>,
    pub children: Vec<SectionNode>,
}

/// Ordered section tree of one document
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SectionTree {
    pub preamble: Range<usize>,
    pub roots: Vec<SectionNode>,
    /// Length of the document the tree was built from
    pub text_len: usize,
}

/// A section in document order, detached from the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionEntry {
    pub key: String,
    pub title: String,
    /// 0 for the preamble
    pub level: usize,
    pub heading_path: Vec<String>,
    pub body_range: Range<usize>,
    /// Child indices from the roots down to this node; empty for the preamble
    pub position: Vec<usize>,
}

impl SectionEntry {
    pub fn is_preamble(&self) -> bool {
        self.key == PREAMBLE_KEY
    }

    pub fn body<'t>(&self, text: &'t str) -> &'t str {
        text.get(self.body_range.clone()).unwrap_or("")
    }
}

/// Collaborator that turns full document text into a section tree
///
/// Implementations must be deterministic: identical text yields an
/// identical tree.
pub trait SectionParser: Send + Sync {
    fn parse(&self, text: &str) -> SyncResult<SectionTree>;
}

/// Build the section key for a heading path
pub fn section_key(heading_path: &[String]) -> String {
    heading_path.join(KEY_SEPARATOR)
}

impl SectionTree {
    /// Assemble the hierarchy from headings listed in document order
    pub fn from_headings(text_len: usize, headings: &[Heading]) -> Self {
        let count = headings.len();
        let preamble_end = headings.first().map(|h| h.start).unwrap_or(text_len);

        let mut parents: Vec<Option<usize>> = vec![None; count];
        let mut stack: Vec<usize> = Vec::new();
        for (i, heading) in headings.iter().enumerate() {
            while let Some(&top) = stack.last() {
                if headings[top].level >= heading.level {
                    stack.pop();
                } else {
                    break;
                }
            }
            parents[i] = stack.last().copied();
            stack.push(i);
        }

        let mut paths: Vec<Vec<String>> = Vec::with_capacity(count);
        for (i, heading) in headings.iter().enumerate() {
            let mut path = parents[i].map(|p| paths[p].clone()).unwrap_or_default();
            path.push(heading.title.clone());
            paths.push(path);
        }

        let mut seen: HashMap<String, usize> = HashMap::new();
        let keys: Vec<String> = paths
            .iter()
            .map(|path| {
                let base = section_key(path);
                let n = seen.entry(base.clone()).or_insert(0);
                *n += 1;
                if *n == 1 {
                    base
                } else {
                    format!("{} #{}", base, n)
                }
            })
            .collect();

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut roots = Vec::new();
        for i in 0..count {
            match parents[i] {
                Some(p) => children[p].push(i),
                None => roots.push(i),
            }
        }

        let body_end = |i: usize| headings.get(i + 1).map(|h| h.start).unwrap_or(text_len);
        let subtree_end = |i: usize| {
            headings[i + 1..]
                .iter()
                .find(|h| h.level <= headings[i].level)
                .map(|h| h.start)
                .unwrap_or(text_len)
        };

        fn build(
            i: usize,
            headings: &[Heading],
            keys: &[String],
            paths: &[Vec<String>],
            children: &[Vec<usize>],
            body_end: &dyn Fn(usize) -> usize,
            subtree_end: &dyn Fn(usize) -> usize,
        ) -> SectionNode {
            SectionNode {
                key: keys[i].clone(),
                title: headings[i].title.clone(),
                level: headings[i].level,
                heading_path: paths[i].clone(),
                byte_range: headings[i].start..subtree_end(i),
                body_range: headings[i].start..body_end(i),
                children: children[i]
                    .iter()
                    .map(|&c| build(c, headings, keys, paths, children, body_end, subtree_end))
                    .collect(),
            }
        }

        SectionTree {
            preamble: 0..preamble_end,
            roots: roots
                .into_iter()
                .map(|i| build(i, headings, &keys, &paths, &children, &body_end, &subtree_end))
                .collect(),
            text_len,
        }
    }

    /// Preamble followed by every section in document order
    pub fn entries(&self) -> Vec<SectionEntry> {
        fn walk(nodes: &[SectionNode], prefix: &[usize], out: &mut Vec<SectionEntry>) {
            for (i, node) in nodes.iter().enumerate() {
                let mut position = prefix.to_vec();
                position.push(i);
                out.push(SectionEntry {
                    key: node.key.clone(),
                    title: node.title.clone(),
                    level: node.level,
                    heading_path: node.heading_path.clone(),
                    body_range: node.body_range.clone(),
                    position: position.clone(),
                });
                walk(&node.children, &position, out);
            }
        }

        let mut out = vec![SectionEntry {
            key: PREAMBLE_KEY.to_string(),
            title: String::new(),
            level: 0,
            heading_path: Vec::new(),
            body_range: self.preamble.clone(),
            position: Vec::new(),
        }];
        walk(&self.roots, &[], &mut out);
        out
    }

    /// Number of headed sections
    pub fn len(&self) -> usize {
        fn count(nodes: &[SectionNode]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.children)).sum()
        }
        count(&self.roots)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn find(&self, key: &str) -> Option<&SectionNode> {
        fn search<'a>(nodes: &'a [SectionNode], key: &str) -> Option<&'a SectionNode> {
            nodes
                .iter()
                .find_map(|n| if n.key == key { Some(n) } else { search(&n.children, key) })
        }
        search(&self.roots, key)
    }

    pub fn node_at(&self, position: &[usize]) -> Option<&SectionNode> {
        let (first, rest) = position.split_first()?;
        let mut node = self.roots.get(*first)?;
        for &i in rest {
            node = node.children.get(i)?;
        }
        Some(node)
    }
}
