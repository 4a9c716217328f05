//! Generic source tree produced by a format reader.
//!
//! Ephemeral: a `RawTree` lives for the duration of one file's pipeline run.
//! Node names are compared on their namespace-stripped local name,
//! case-insensitively, because source conventions disagree on casing.

use serde::{Deserialize, Serialize};

/// One named node: attributes, optional text, ordered children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<RawNode>,
}

impl RawNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            text: Some(text.into()),
            children: Vec::new(),
        }
    }

    /// Trimmed text content, `None` when empty or whitespace-only.
    pub fn text_trimmed(&self) -> Option<&str> {
        match self.text.as_deref().map(str::trim) {
            Some("") | None => None,
            Some(t) => Some(t),
        }
    }

    pub fn children_named<'a, 'b>(&'a self, name: &'b str) -> impl Iterator<Item = &'a RawNode> + 'b
    where
        'a: 'b,
    {
        self.children.iter().filter(move |c| name_matches(&c.name, name))
    }

    fn descendant_count(&self) -> usize {
        1 + self.children.iter().map(RawNode::descendant_count).sum::<usize>()
    }
}

/// A parsed source file: root node plus the filename it came from.
/// The filename feeds the detector's filename signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTree {
    pub filename: String,
    pub root: RawNode,
}

impl RawTree {
    pub fn new(filename: impl Into<String>, root: RawNode) -> Self {
        Self {
            filename: filename.into(),
            root,
        }
    }

    /// Resolve a slash-separated path relative to the root element.
    /// Every matching node at every repetition is returned, in document
    /// order, so repeated sections naturally yield multiple results.
    pub fn nodes_at(&self, path: &str) -> Vec<&RawNode> {
        let mut current: Vec<&RawNode> = vec![&self.root];
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let mut next = Vec::new();
            for node in current {
                next.extend(node.children_named(segment));
            }
            if next.is_empty() {
                return Vec::new();
            }
            current = next;
        }
        current
    }

    pub fn has_path(&self, path: &str) -> bool {
        !self.nodes_at(path).is_empty()
    }

    /// Non-empty text of every node at `path`, in document order.
    pub fn texts_at(&self, path: &str) -> Vec<String> {
        self.nodes_at(path)
            .into_iter()
            .filter_map(|n| n.text_trimmed().map(str::to_string))
            .collect()
    }

    pub fn first_text_at(&self, path: &str) -> Option<String> {
        self.texts_at(path).into_iter().next()
    }

    /// All text blocks in the tree, in document order. Used by the keyword
    /// signal, which scans free text without knowing field paths.
    pub fn all_text_blocks(&self) -> Vec<&str> {
        let mut blocks = Vec::new();
        collect_text(&self.root, &mut blocks);
        blocks
    }

    pub fn node_count(&self) -> usize {
        self.root.descendant_count()
    }
}

fn collect_text<'a>(node: &'a RawNode, out: &mut Vec<&'a str>) {
    if let Some(t) = node.text_trimmed() {
        out.push(t);
    }
    for child in &node.children {
        collect_text(child, out);
    }
}

/// Strip an XML namespace prefix: `ns:Name` → `Name`.
pub fn local_name(name: &str) -> &str {
    match name.rsplit_once(':') {
        Some((_, local)) => local,
        None => name,
    }
}

fn name_matches(candidate: &str, wanted: &str) -> bool {
    local_name(candidate).eq_ignore_ascii_case(local_name(wanted))
}
