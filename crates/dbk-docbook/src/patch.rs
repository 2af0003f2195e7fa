//! Reference patching of rendered wiki markup.
//!
//! Rendered content still refers to media by their path in the bundle and
//! to other pages by DocBook id. Images become attachments of the page, so
//! `!images/a.png|title=x!` is rewritten to `!a.png|title=x!`; links such as
//! `[id]` or `[label|id]` are rewritten to the target page title.

use std::borrow::Cow;

use regex::{Captures, Regex};
use tracing::warn;

use crate::tree::{DocTree, NodeId, filename_from_local_ref};

/// Patch media and cross references in the rendered content of `node`.
///
/// Media references of `node` are patched first, then links to every node
/// below the root of `tree` that has an id and a title. Content without references is
/// returned unchanged.
pub fn patch_references(content: &str, tree: &DocTree, node: NodeId) -> String {
    let mut content = Cow::Borrowed(content);

    for media_ref in tree.node(node).local_media_refs() {
        let Some(filename) = filename_from_local_ref(media_ref) else {
            continue;
        };
        let pattern = format!(r"!{}(\|[^!\n]*)?!", regex::escape(media_ref));
        content = replace(content, &pattern, |caps| {
            let modifiers = caps.get(1).map_or("", |m| m.as_str());
            format!("!{filename}{modifiers}!")
        });
    }

    // The book node is not a link target.
    for id in tree.pre_order().into_iter().filter(|&id| id != tree.root()) {
        let target = tree.node(id);
        let (Some(node_id), Some(title)) = (target.id(), target.target_title()) else {
            continue;
        };
        let pattern = format!(r"\[([^\[\]\n]*\|)?{}\]", regex::escape(node_id));
        content = replace(content, &pattern, |caps| {
            let label = caps.get(1).map_or("", |m| m.as_str());
            format!("[{label}{title}]")
        });
    }

    content.into_owned()
}

fn replace<'a>(
    content: Cow<'a, str>,
    pattern: &str,
    replacement: impl Fn(&Captures<'_>) -> String,
) -> Cow<'a, str> {
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => {
            warn!("skipping reference pattern {pattern}: {e}");
            return content;
        }
    };
    let patched = match re.replace_all(&content, |caps: &Captures<'_>| replacement(caps)) {
        Cow::Borrowed(_) => None,
        Cow::Owned(patched) => Some(patched),
    };
    patched.map_or(content, Cow::Owned)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tree::{NodeType, StructureNode};

    const CONTENT: &str = "text1\n\n!images/OnlyOneCacheLoader.png|thumbnail,title=figure title!\ntext2\n\
                           !a/images/OnlyOneCacheLoader2.png|thumbnail,title=figure title!\n[Chapter_2][Section_21]";

    fn node(node_type: NodeType, id: &str, title: &str) -> StructureNode {
        let mut node = StructureNode::new(node_type);
        node.set_id(id);
        node.set_title(title);
        node
    }

    #[test]
    fn test_patch_references() {
        let mut tree = DocTree::new(StructureNode::new(NodeType::Book)).unwrap();
        let root = tree.root();
        let ch1 = tree
            .add_child(root, node(NodeType::Chapter, "Chapter_1", "Chapter 1"))
            .unwrap();

        assert_eq!(patch_references(CONTENT, &tree, ch1), CONTENT);

        let ch2 = tree
            .add_child(root, node(NodeType::Chapter, "Chapter_2", "Chapter 2"))
            .unwrap();
        let chapter = tree.node_mut(ch1);
        chapter.add_media_ref("images/OnlyOneCacheLoader.png").unwrap();
        chapter.add_media_ref("a/images/OnlyOneCacheLoader2.png").unwrap();
        assert_eq!(
            patch_references(CONTENT, &tree, ch1),
            "text1\n\n!OnlyOneCacheLoader.png|thumbnail,title=figure title!\ntext2\n\
             !OnlyOneCacheLoader2.png|thumbnail,title=figure title!\n[Chapter 2][Section_21]"
        );

        assert_eq!(
            patch_references("!images/OnlyOneCacheLoader.png! aaa !ertertert|a!", &tree, ch1),
            "!OnlyOneCacheLoader.png! aaa !ertertert|a!"
        );

        tree.add_child(ch2, node(NodeType::Section, "Section_21", "Section 21#"))
            .unwrap();
        assert_eq!(
            patch_references(CONTENT, &tree, ch1),
            "text1\n\n!OnlyOneCacheLoader.png|thumbnail,title=figure title!\ntext2\n\
             !OnlyOneCacheLoader2.png|thumbnail,title=figure title!\n[Chapter 2][Section 21_]"
        );
        assert_eq!(
            patch_references("text1\n[Title of link|Chapter_2][Section_21]", &tree, ch1),
            "text1\n[Title of link|Chapter 2][Section 21_]"
        );
    }

    #[test]
    fn test_nodes_without_id_are_skipped() {
        let mut tree = DocTree::new(StructureNode::new(NodeType::Book)).unwrap();
        let root = tree.root();
        let ch1 = tree
            .add_child(root, node(NodeType::Chapter, "Chapter_1", "Chapter 1"))
            .unwrap();
        let mut blank = StructureNode::new(NodeType::Section);
        blank.set_id(" ");
        blank.set_title("Blank");
        tree.add_child(ch1, blank).unwrap();

        assert_eq!(
            patch_references("[ ] [Chapter_1]", &tree, ch1),
            "[ ] [Chapter 1]"
        );
    }

    #[test]
    fn test_prefixed_title_and_special_ids() {
        let mut tree = DocTree::new(StructureNode::new(NodeType::Book)).unwrap();
        let root = tree.root();
        let ch = tree
            .add_child(root, node(NodeType::Chapter, "a.b+c", "Setup"))
            .unwrap();
        tree.node_mut(ch).set_title_prefix(Some("PB".to_owned()));

        assert_eq!(
            patch_references("[a.b+c] [aXb+c] [see|a.b+c]", &tree, ch),
            "[PB-Setup] [aXb+c] [see|PB-Setup]"
        );
    }

    #[test]
    fn test_book_node_is_not_a_link_target() {
        let mut tree = DocTree::new(node(NodeType::Book, "guide", "Guide")).unwrap();
        let root = tree.root();
        let ch = tree
            .add_child(root, node(NodeType::Chapter, "intro", "Introduction"))
            .unwrap();

        assert_eq!(
            patch_references("[guide] [back|guide] [intro]", &tree, ch),
            "[guide] [back|guide] [Introduction]"
        );
    }
}
