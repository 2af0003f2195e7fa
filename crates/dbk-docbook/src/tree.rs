//! Document structure tree.
//!
//! The tree is an arena of [`StructureNode`]s addressed by [`NodeId`]
//! handles. Parent links are handles too, so the arena is the single owner of
//! every node and traversal never fights the borrow checker.
//!
//! Each node becomes one wiki page. Its structural path (for example
//! `d:book/d:chapter[2]/d:section[1]`) selects the matching element in the
//! source document when the node's content is transformed.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::TreeError;
use crate::titles::normalize_title;

/// Handle of a node inside a [`DocTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Structural element type. The name equals the DocBook element name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Document root.
    Book,
    /// Chapter.
    Chapter,
    /// Appendix.
    Appendix,
    /// Section at any depth.
    Section,
}

impl NodeType {
    /// DocBook element name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Chapter => "chapter",
            Self::Appendix => "appendix",
            Self::Section => "section",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Element name that is not a structural node type.
#[derive(Debug, thiserror::Error)]
#[error("unknown node type {0:?}")]
pub struct UnknownNodeType(pub String);

impl FromStr for NodeType {
    type Err = UnknownNodeType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "book" => Ok(Self::Book),
            "chapter" => Ok(Self::Chapter),
            "appendix" => Ok(Self::Appendix),
            "section" => Ok(Self::Section),
            other => Err(UnknownNodeType(other.to_owned())),
        }
    }
}

/// One structural unit of the document.
#[derive(Debug, Clone, Default)]
pub struct StructureNode {
    node_type: Option<NodeType>,
    id: Option<String>,
    title: Option<String>,
    title_prefix: Option<String>,
    local_media_refs: Vec<String>,
    external_media_refs: Vec<String>,
    labels: Vec<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl StructureNode {
    /// Create a detached node of the given type.
    #[must_use]
    pub fn new(node_type: NodeType) -> Self {
        Self {
            node_type: Some(node_type),
            ..Self::default()
        }
    }

    pub fn node_type(&self) -> Option<NodeType> {
        self.node_type
    }

    pub fn set_type(&mut self, node_type: NodeType) {
        self.node_type = Some(node_type);
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Set the id; blank input is ignored.
    pub fn set_id(&mut self, id: &str) {
        if !id.trim().is_empty() {
            self.id = Some(id.to_owned());
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Set the title; blank input is ignored.
    pub fn set_title(&mut self, title: &str) {
        if !title.trim().is_empty() {
            self.title = Some(title.to_owned());
        }
    }

    pub fn title_prefix(&self) -> Option<&str> {
        self.title_prefix.as_deref()
    }

    pub fn set_title_prefix(&mut self, prefix: Option<String>) {
        self.title_prefix = prefix;
    }

    /// Title used for the target page.
    ///
    /// The normalized title, prefixed by `prefix-` when a prefix is assigned.
    /// `None` while no title is set.
    pub fn target_title(&self) -> Option<String> {
        let title = normalize_title(self.title.as_deref()?);
        Some(match &self.title_prefix {
            Some(prefix) => format!("{prefix}-{title}"),
            None => title,
        })
    }

    /// Record a media reference, classified as external or local.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::BlankMediaRef`] for blank input.
    pub fn add_media_ref(&mut self, media_ref: &str) -> Result<(), TreeError> {
        if media_ref.trim().is_empty() {
            return Err(TreeError::BlankMediaRef);
        }
        if is_external_ref(media_ref) {
            self.external_media_refs.push(media_ref.to_owned());
        } else {
            self.local_media_refs.push(media_ref.to_owned());
        }
        Ok(())
    }

    /// Media references relative to the document, in document order.
    pub fn local_media_refs(&self) -> &[String] {
        &self.local_media_refs
    }

    /// Absolute media URLs, in document order.
    pub fn external_media_refs(&self) -> &[String] {
        &self.external_media_refs
    }

    /// Add a label unless already present.
    pub fn add_label(&mut self, label: &str) {
        if !label.is_empty() && !self.labels.iter().any(|l| l == label) {
            self.labels.push(label.to_owned());
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether this node has child nodes.
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// A media reference is external when `://` starts within its first ten
/// characters (but not at the very beginning).
pub fn is_external_ref(media_ref: &str) -> bool {
    media_ref
        .find("://")
        .is_some_and(|idx| idx > 0 && idx < 10)
}

/// File name part of a local media reference.
///
/// `None` for blank input.
pub fn filename_from_local_ref(media_ref: &str) -> Option<&str> {
    if media_ref.trim().is_empty() {
        return None;
    }
    media_ref.rsplit('/').next()
}

/// Arena-backed structure tree rooted at the book node.
#[derive(Debug, Clone)]
pub struct DocTree {
    nodes: Vec<StructureNode>,
}

impl DocTree {
    /// Create a tree with `root` as its root node.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::MissingType`] if the root has no type.
    pub fn new(mut root: StructureNode) -> Result<Self, TreeError> {
        if root.node_type.is_none() {
            return Err(TreeError::MissingType);
        }
        root.parent = None;
        root.children.clear();
        Ok(Self { nodes: vec![root] })
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// A tree always holds its root.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Access a node. Handles are only valid for the tree that issued them.
    ///
    /// # Panics
    ///
    /// Panics if `id` was issued by another tree and is out of range here.
    pub fn node(&self, id: NodeId) -> &StructureNode {
        &self.nodes[id.0]
    }

    /// Mutable access to a node.
    ///
    /// # Panics
    ///
    /// Panics if `id` was issued by another tree and is out of range here.
    pub fn node_mut(&mut self, id: NodeId) -> &mut StructureNode {
        &mut self.nodes[id.0]
    }

    /// Append `child` to `parent`'s children.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::MissingType`] if the child has no type; the tree
    /// is left unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `parent` was issued by another tree and is out of range
    /// here. The tree is left unchanged.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        mut child: StructureNode,
    ) -> Result<NodeId, TreeError> {
        if child.node_type.is_none() {
            return Err(TreeError::MissingType);
        }
        let id = NodeId(self.nodes.len());
        self.nodes[parent.0].children.push(id);
        child.parent = Some(parent);
        child.children.clear();
        self.nodes.push(child);
        Ok(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// 0-based index of `child` among `parent`'s children of the same type.
    ///
    /// `None` when `child` is not a child of `parent`.
    pub fn child_type_index(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        let child_type = self.node(child).node_type;
        let mut index = 0;
        for &sibling in self.children(parent) {
            if sibling == child {
                return Some(index);
            }
            if self.node(sibling).node_type == child_type {
                index += 1;
            }
        }
        None
    }

    /// Positional path from the root, e.g. `d:book/d:chapter[2]/d:section[1]`.
    ///
    /// `prefix` is the dialect's namespace prefix. Indexes are 1-based among
    /// same-type siblings; the root segment has none.
    pub fn structural_path(&self, id: NodeId, prefix: &str) -> String {
        let type_name = self.node(id).node_type.map_or("", NodeType::as_str);
        match self.parent(id) {
            None => format!("{prefix}{type_name}"),
            Some(parent) => {
                let index = self.child_type_index(parent, id).map_or(0, |i| i + 1);
                format!(
                    "{}/{prefix}{type_name}[{index}]",
                    self.structural_path(parent, prefix)
                )
            }
        }
    }

    /// All nodes in pre-order (parent before children, document order).
    pub fn pre_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        order
    }

    /// Short human-readable identity of a node for messages.
    pub fn describe(&self, id: NodeId) -> String {
        let node = self.node(id);
        let mut out = self.structural_path(id, "");
        if let Some(node_id) = node.id() {
            out.push_str(&format!(" (id={node_id})"));
        }
        out
    }

    /// Serializable snapshot of the subtree rooted at `id`.
    pub fn outline(&self, id: NodeId) -> NodeOutline {
        let node = self.node(id);
        NodeOutline {
            node_type: node.node_type,
            id: node.id.clone(),
            title: node.title.clone(),
            target_title: node.target_title(),
            local_media_refs: node.local_media_refs.clone(),
            external_media_refs: node.external_media_refs.clone(),
            labels: node.labels.clone(),
            children: self
                .children(id)
                .iter()
                .map(|&child| self.outline(child))
                .collect(),
        }
    }
}

/// Owned, serializable view of a subtree.
#[derive(Debug, Clone, Serialize)]
pub struct NodeOutline {
    #[serde(rename = "type")]
    pub node_type: Option<NodeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_title: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub local_media_refs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub external_media_refs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeOutline>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> DocTree {
        DocTree::new(StructureNode::new(NodeType::Book)).unwrap()
    }

    #[test]
    fn test_add_child_without_type_fails_and_keeps_tree() {
        let mut tree = book();
        let root = tree.root();

        let result = tree.add_child(root, StructureNode::default());

        assert_eq!(result, Err(TreeError::MissingType));
        assert_eq!(tree.len(), 1);
        assert!(tree.children(root).is_empty());
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_foreign_handle_panics() {
        let mut other = book();
        let root = other.root();
        let chapter = other
            .add_child(root, StructureNode::new(NodeType::Chapter))
            .unwrap();

        let mut tree = book();
        let _ = tree.add_child(chapter, StructureNode::new(NodeType::Section));
    }

    #[test]
    fn test_new_tree_requires_root_type() {
        assert!(DocTree::new(StructureNode::default()).is_err());
    }

    #[test]
    fn test_add_child_sets_parent() {
        let mut tree = book();
        let root = tree.root();
        let chapter = tree
            .add_child(root, StructureNode::new(NodeType::Chapter))
            .unwrap();

        assert_eq!(tree.parent(chapter), Some(root));
        assert_eq!(tree.parent(root), None);
        assert_eq!(tree.children(root), &[chapter]);
    }

    #[test]
    fn test_child_type_index_counts_same_type_siblings() {
        let mut tree = book();
        let root = tree.root();
        let c1 = tree.add_child(root, StructureNode::new(NodeType::Chapter)).unwrap();
        let a1 = tree.add_child(root, StructureNode::new(NodeType::Appendix)).unwrap();
        let c2 = tree.add_child(root, StructureNode::new(NodeType::Chapter)).unwrap();
        let c3 = tree.add_child(root, StructureNode::new(NodeType::Chapter)).unwrap();
        let a2 = tree.add_child(root, StructureNode::new(NodeType::Appendix)).unwrap();
        let s1 = tree.add_child(c1, StructureNode::new(NodeType::Section)).unwrap();

        assert_eq!(tree.child_type_index(root, c1), Some(0));
        assert_eq!(tree.child_type_index(root, c2), Some(1));
        assert_eq!(tree.child_type_index(root, c3), Some(2));
        assert_eq!(tree.child_type_index(root, a1), Some(0));
        assert_eq!(tree.child_type_index(root, a2), Some(1));
        assert_eq!(tree.child_type_index(root, s1), None);
        assert_eq!(tree.child_type_index(c1, s1), Some(0));
        assert_eq!(tree.child_type_index(c2, s1), None);
    }

    #[test]
    fn test_structural_path() {
        let mut tree = book();
        let root = tree.root();
        tree.add_child(root, StructureNode::new(NodeType::Chapter)).unwrap();
        let c2 = tree.add_child(root, StructureNode::new(NodeType::Chapter)).unwrap();
        tree.add_child(c2, StructureNode::new(NodeType::Section)).unwrap();
        let s2 = tree.add_child(c2, StructureNode::new(NodeType::Section)).unwrap();

        assert_eq!(tree.structural_path(root, "d:"), "d:book");
        assert_eq!(tree.structural_path(c2, ""), "book/chapter[2]");
        assert_eq!(
            tree.structural_path(s2, "d:"),
            "d:book/d:chapter[2]/d:section[2]"
        );
    }

    #[test]
    fn test_setters_ignore_blank_input() {
        let mut node = StructureNode::new(NodeType::Chapter);
        node.set_id("intro");
        node.set_title("Introduction");

        node.set_id("");
        node.set_id("   ");
        node.set_title(" \n ");

        assert_eq!(node.id(), Some("intro"));
        assert_eq!(node.title(), Some("Introduction"));
    }

    #[test]
    fn test_target_title_normalizes_and_prefixes() {
        let mut node = StructureNode::new(NodeType::Chapter);
        assert_eq!(node.target_title(), None);

        node.set_title("Client/Server: A {quick} look");
        assert_eq!(
            node.target_title().as_deref(),
            Some("Client_Server_ A _quick_ look")
        );

        node.set_title_prefix(Some("PB0".to_owned()));
        assert_eq!(
            node.target_title().as_deref(),
            Some("PB0-Client_Server_ A _quick_ look")
        );

        node.set_title("Other");
        assert_eq!(node.target_title().as_deref(), Some("PB0-Other"));
    }

    #[test]
    fn test_media_refs_classified() {
        let mut node = StructureNode::new(NodeType::Section);
        node.add_media_ref("images/arch.png").unwrap();
        node.add_media_ref("http://example.com/a.png").unwrap();
        node.add_media_ref("verylongscheme://x").unwrap();
        node.add_media_ref("://odd").unwrap();

        assert_eq!(
            node.local_media_refs(),
            &["images/arch.png", "verylongscheme://x", "://odd"]
        );
        assert_eq!(node.external_media_refs(), &["http://example.com/a.png"]);
    }

    #[test]
    fn test_blank_media_ref_rejected() {
        let mut node = StructureNode::new(NodeType::Section);
        assert_eq!(node.add_media_ref(" "), Err(TreeError::BlankMediaRef));
        assert!(node.local_media_refs().is_empty());
    }

    #[test]
    fn test_filename_from_local_ref() {
        assert_eq!(filename_from_local_ref("a/b/file.gif"), Some("file.gif"));
        assert_eq!(filename_from_local_ref("file.gif"), Some("file.gif"));
        assert_eq!(filename_from_local_ref(""), None);
        assert_eq!(filename_from_local_ref("  "), None);
    }

    #[test]
    fn test_labels_deduplicated() {
        let mut node = StructureNode::new(NodeType::Chapter);
        node.add_label("cache");
        node.add_label("cache");
        node.add_label("jboss");
        assert_eq!(node.labels(), &["cache", "jboss"]);
    }

    #[test]
    fn test_pre_order() {
        let mut tree = book();
        let root = tree.root();
        let c1 = tree.add_child(root, StructureNode::new(NodeType::Chapter)).unwrap();
        let s11 = tree.add_child(c1, StructureNode::new(NodeType::Section)).unwrap();
        let c2 = tree.add_child(root, StructureNode::new(NodeType::Chapter)).unwrap();
        let s12 = tree.add_child(c1, StructureNode::new(NodeType::Section)).unwrap();

        assert_eq!(tree.pre_order(), vec![root, c1, s11, s12, c2]);
    }

    #[test]
    fn test_outline_serializes() {
        let mut tree = book();
        let root = tree.root();
        tree.node_mut(root).set_title("Guide");
        let mut chapter = StructureNode::new(NodeType::Chapter);
        chapter.set_id("intro");
        chapter.set_title("Intro");
        tree.add_child(root, chapter).unwrap();

        let json = serde_json::to_value(tree.outline(root)).unwrap();
        assert_eq!(json["type"], "book");
        assert_eq!(json["children"][0]["id"], "intro");
        assert_eq!(json["children"][0]["target_title"], "Intro");
    }
}
