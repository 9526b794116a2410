//! Mutable markup tree
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Ids stay valid for
//! the lifetime of the document: detaching or replacing a node only rewires
//! parent and child links, it never moves other nodes.

mod codec;
mod xhtml;

pub use codec::MarkupCodec;
pub use xhtml::XhtmlCodec;

/// Stable handle to a node in a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// XML declaration (`<?xml version="1.0" encoding="UTF-8"?>`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDecl {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written, prefix included
    pub name: String,
    /// Attributes in source order, values unescaped
    pub attributes: Vec<(String, String)>,
    /// Written as `<name/>` in the source
    pub self_closing: bool,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            self_closing: false,
        }
    }

    /// Name without namespace prefix
    pub fn local_name(&self) -> &str {
        self.name
            .rsplit_once(':')
            .map(|(_, local)| local)
            .unwrap_or(&self.name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The document node; always the arena root
    Document,
    Element(Element),
    /// Character data, unescaped
    Text(String),
    CData(String),
    /// Raw comment body
    Comment(String),
    /// Raw processing instruction body
    ProcessingInstruction(String),
    Declaration(XmlDecl),
    /// Raw doctype body (`html` for `<!DOCTYPE html>`)
    DocType(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed markup tree
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a document holding only its document node
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Live view of a node's children; copy it before mutating the tree
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.kind(id) {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Allocate a detached node
    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Append a detached node as the last child of `parent`
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Remove a node from its parent; the node and its subtree stay allocated
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }

    /// Splice `replacements` into the position of `target`, detaching `target`
    ///
    /// Returns `false` (and changes nothing) when `target` has no parent.
    pub fn replace_with(&mut self, target: NodeId, replacements: &[NodeId]) -> bool {
        let Some(parent) = self.nodes[target.0].parent else {
            return false;
        };
        for &node in replacements {
            self.detach(node);
        }

        let siblings = &mut self.nodes[parent.0].children;
        let Some(pos) = siblings.iter().position(|&c| c == target) else {
            return false;
        };
        siblings.splice(pos..=pos, replacements.iter().copied());

        for &node in replacements {
            self.nodes[node.0].parent = Some(parent);
        }
        self.nodes[target.0].parent = None;
        true
    }

    /// Deep-copy `source` from another document; the copy is detached
    pub fn import(&mut self, other: &Document, source: NodeId) -> NodeId {
        let copy = self.create(other.kind(source).clone());
        let mut pending = vec![(source, copy)];

        while let Some((from, to)) = pending.pop() {
            for &child in other.children(from) {
                let child_copy = self.create(other.kind(child).clone());
                self.append(to, child_copy);
                pending.push((child, child_copy));
            }
        }

        copy
    }

    /// Deep-copy every child of `source` from another document
    pub fn import_children(&mut self, other: &Document, source: NodeId) -> Vec<NodeId> {
        other
            .children(source)
            .iter()
            .map(|&child| self.import(other, child))
            .collect()
    }

    /// `id` and all nodes below it, in document order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// First element attached to the tree whose local name matches, ASCII case-insensitively
    pub fn find_element(&self, local_name: &str) -> Option<NodeId> {
        self.descendants(self.root()).into_iter().find(|&id| {
            self.element(id)
                .map(|el| el.local_name().eq_ignore_ascii_case(local_name))
                .unwrap_or(false)
        })
    }

    /// First element child of the document node
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .iter()
            .copied()
            .find(|&id| self.element(id).is_some())
    }

    /// Concatenated text and CDATA below `id`
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|node| match self.kind(node) {
                NodeKind::Text(t) | NodeKind::CData(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}
