//! Target page title normalization and uniqueness.

use std::collections::HashSet;

use crate::error::{StoreError, TitleError};
use crate::tree::{DocTree, NodeId};

/// Characters not allowed in wiki page titles.
const TITLE_BAD_CHARS: &str = ":@/\\|^#;[]{}<>$~";

/// Replace characters not allowed in page titles by `_`.
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if TITLE_BAD_CHARS.contains(c) { '_' } else { c })
        .collect()
}

/// Assign title prefixes so every node in `tree` has a distinct target title
/// that does not exist in the target store yet.
///
/// Nodes are processed in pre-order. A colliding node tries `base`, then
/// `base0`, `base1`, ... as its prefix. A three-character base allows the
/// counter to reach 9, a two-character base allows 99.
///
/// `exists` reports whether a title is already taken in the target store.
///
/// # Errors
///
/// Returns [`TitleError::PrefixBaseMissing`] on a collision without a base,
/// [`TitleError::PrefixBaseExhausted`] when no candidate prefix is free, and
/// [`TitleError::Store`] when `exists` fails.
pub fn assign_unique_titles<F>(
    tree: &mut DocTree,
    prefix_base: Option<&str>,
    mut exists: F,
) -> Result<(), TitleError>
where
    F: FnMut(&str) -> Result<bool, StoreError>,
{
    let mut taken = HashSet::new();
    for id in tree.pre_order() {
        make_unique(tree, id, prefix_base, &mut taken, &mut exists)?;
    }
    Ok(())
}

fn make_unique<F>(
    tree: &mut DocTree,
    id: NodeId,
    prefix_base: Option<&str>,
    taken: &mut HashSet<String>,
    exists: &mut F,
) -> Result<(), TitleError>
where
    F: FnMut(&str) -> Result<bool, StoreError>,
{
    let mut counter: i32 = -1;
    while let Some(title) = tree.node(id).target_title() {
        if !taken.contains(&title) && !exists(&title)? {
            break;
        }
        let base = prefix_base.ok_or(TitleError::PrefixBaseMissing)?;
        if (counter > 9 && base.len() > 2) || counter > 99 {
            return Err(TitleError::PrefixBaseExhausted);
        }
        let prefix = if counter < 0 {
            base.to_owned()
        } else {
            format!("{base}{counter}")
        };
        counter += 1;
        tree.node_mut(id).set_title_prefix(Some(prefix));
    }

    if let Some(title) = tree.node(id).target_title() {
        tracing::debug!(title = %title, "Assigned page title");
        taken.insert(title);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tree::{NodeType, StructureNode};

    fn tree_with_titles(titles: &[&str]) -> DocTree {
        let mut tree = DocTree::new(StructureNode::new(NodeType::Book)).unwrap();
        let root = tree.root();
        for title in titles {
            let mut chapter = StructureNode::new(NodeType::Chapter);
            chapter.set_title(title);
            tree.add_child(root, chapter).unwrap();
        }
        tree
    }

    fn target_titles(tree: &DocTree) -> Vec<String> {
        tree.children(tree.root())
            .iter()
            .map(|&id| tree.node(id).target_title().unwrap())
            .collect()
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("a:b@c/d\\e|f^g#h;i"), "a_b_c_d_e_f_g_h_i");
        assert_eq!(normalize_title("[x]{y}<z>$w~"), "_x__y__z__w_");
        assert_eq!(normalize_title("Plain title - ok!"), "Plain title - ok!");
    }

    #[test]
    fn test_unique_titles_with_store_collision() {
        let mut tree = tree_with_titles(&["A", "B", "A", "C", "A"]);

        assign_unique_titles(&mut tree, Some("PB"), |title| Ok(title == "C")).unwrap();

        assert_eq!(
            target_titles(&tree),
            vec!["A", "B", "PB-A", "PB-C", "PB0-A"]
        );
    }

    #[test]
    fn test_no_collision_needs_no_base() {
        let mut tree = tree_with_titles(&["A", "B"]);
        assign_unique_titles(&mut tree, None, |_| Ok(false)).unwrap();
        assert_eq!(target_titles(&tree), vec!["A", "B"]);
    }

    #[test]
    fn test_collision_without_base_fails() {
        let mut tree = tree_with_titles(&["A", "A"]);
        let err = assign_unique_titles(&mut tree, None, |_| Ok(false)).unwrap_err();
        assert!(matches!(err, TitleError::PrefixBaseMissing));
        assert!(err.to_string().contains("is not provided"));
    }

    #[test]
    fn test_three_char_base_bound() {
        let titles = vec!["X"; 12];
        let mut tree = tree_with_titles(&titles);
        assign_unique_titles(&mut tree, Some("PRE"), |_| Ok(false)).unwrap();
        let assigned = target_titles(&tree);
        assert_eq!(assigned[1], "PRE-X");
        assert_eq!(assigned[11], "PRE9-X");

        let titles = vec!["X"; 13];
        let mut tree = tree_with_titles(&titles);
        let err = assign_unique_titles(&mut tree, Some("PRE"), |_| Ok(false)).unwrap_err();
        assert!(matches!(err, TitleError::PrefixBaseExhausted));
    }

    #[test]
    fn test_two_char_base_bound() {
        let titles = vec!["X"; 102];
        let mut tree = tree_with_titles(&titles);
        assign_unique_titles(&mut tree, Some("PR"), |_| Ok(false)).unwrap();
        assert_eq!(target_titles(&tree)[101], "PR99-X");

        let titles = vec!["X"; 103];
        let mut tree = tree_with_titles(&titles);
        let err = assign_unique_titles(&mut tree, Some("PR"), |_| Ok(false)).unwrap_err();
        assert!(matches!(err, TitleError::PrefixBaseExhausted));
    }

    #[test]
    fn test_titles_unique_across_nesting() {
        let mut tree = tree_with_titles(&["Overview"]);
        let chapter = tree.children(tree.root())[0];
        let mut section = StructureNode::new(NodeType::Section);
        section.set_title("Overview");
        let section = tree.add_child(chapter, section).unwrap();
        tree.node_mut(tree.root()).set_title("Overview");

        assign_unique_titles(&mut tree, Some("AB"), |_| Ok(false)).unwrap();

        assert_eq!(tree.node(tree.root()).target_title().unwrap(), "Overview");
        assert_eq!(tree.node(chapter).target_title().unwrap(), "AB-Overview");
        assert_eq!(tree.node(section).target_title().unwrap(), "AB0-Overview");
    }

    #[test]
    fn test_store_error_propagates() {
        let mut tree = tree_with_titles(&["A"]);
        let err = assign_unique_titles(&mut tree, Some("AB"), |_| {
            Err(StoreError::Rejected("store offline".to_owned()))
        })
        .unwrap_err();
        assert!(matches!(err, TitleError::Store(_)));
    }
}
