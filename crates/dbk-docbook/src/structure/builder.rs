//! Tree builder over the intermediate structure XML.
//!
//! Recursive descent: every `<node>` becomes a [`StructureNode`], its
//! `<type>`, `<title>`, `<id>`, `<fileref>` and `<label>` children are
//! applied through the node's setters. Nesting depth is checked against the
//! extraction program (book, chapter or appendix, section, sub-section).

use quick_xml::escape::unescape;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::StructureError;
use crate::tree::{DocTree, NodeId, NodeType, StructureNode};

/// Deepest `<node>` nesting accepted without the all-section-levels option.
pub(crate) const MAX_STRUCTURE_DEPTH: usize = 3;

/// Node data read from the intermediate XML.
#[derive(Debug, Default)]
struct PendingNode {
    node_type: Option<String>,
    title: Option<String>,
    id: Option<String>,
    filerefs: Vec<String>,
    labels: Vec<String>,
    children: Vec<PendingNode>,
}

/// Build a tree from intermediate structure XML.
///
/// `max_depth` limits `<node>` nesting below the root; `None` allows any.
///
/// # Errors
///
/// Returns [`StructureError::Builder`] carrying the intermediate XML when it
/// is malformed, nests too deeply, names an unknown node type or contains a
/// blank media reference.
pub(crate) fn build_tree(
    intermediate: &str,
    max_depth: Option<usize>,
) -> Result<DocTree, StructureError> {
    let fail = |message: String| StructureError::Builder {
        message,
        intermediate: intermediate.to_owned(),
    };

    let mut reader = Reader::from_str(intermediate);
    let mut buf = Vec::new();

    let pending = loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"node" => {
                break read_node(&mut reader, 0, max_depth).map_err(fail)?;
            }
            Ok(Event::Eof) => return Err(fail("no root node".to_owned())),
            Ok(Event::Decl(_) | Event::Comment(_) | Event::Text(_)) => {}
            Ok(other) => return Err(fail(format!("unexpected content {other:?}"))),
            Err(e) => return Err(fail(e.to_string())),
        }
        buf.clear();
    };

    let root = make_node(&pending).map_err(fail)?;
    let mut tree = DocTree::new(root).map_err(|e| fail(e.to_string()))?;
    let root_id = tree.root();
    attach_children(&mut tree, root_id, &pending).map_err(fail)?;
    Ok(tree)
}

fn read_node(
    reader: &mut Reader<&[u8]>,
    depth: usize,
    max_depth: Option<usize>,
) -> Result<PendingNode, String> {
    if max_depth.is_some_and(|max| depth > max) {
        return Err(format!(
            "structure nested deeper than {} levels",
            max_depth.unwrap_or_default() + 1
        ));
    }

    let mut node = PendingNode::default();
    let mut buf = Vec::new();
    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| e.to_string())?;
        match event {
            Event::Start(e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                buf.clear();
                match tag.as_str() {
                    "node" => node.children.push(read_node(reader, depth + 1, max_depth)?),
                    "type" => node.node_type = Some(read_text(reader, &tag)?),
                    "title" => node.title = Some(read_text(reader, &tag)?),
                    "id" => node.id = Some(read_text(reader, &tag)?),
                    "fileref" => node.filerefs.push(read_text(reader, &tag)?),
                    "label" => node.labels.push(read_text(reader, &tag)?),
                    other => return Err(format!("unexpected element <{other}>")),
                }
            }
            Event::Empty(e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match tag.as_str() {
                    "fileref" => node.filerefs.push(String::new()),
                    "title" | "id" | "type" | "label" => {}
                    other => return Err(format!("unexpected element <{other}/>")),
                }
            }
            Event::End(_) => return Ok(node),
            Event::Eof => return Err("unexpected end of structure".to_owned()),
            Event::Text(_)
            | Event::GeneralRef(_)
            | Event::CData(_)
            | Event::Comment(_)
            | Event::Decl(_)
            | Event::PI(_)
            | Event::DocType(_) => {}
        }
        buf.clear();
    }
}

/// Read the text content of a field element up to its end tag.
fn read_text(reader: &mut Reader<&[u8]>, tag: &str) -> Result<String, String> {
    let mut text = String::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(|e| e.to_string())? {
            Event::Text(e) => text.push_str(&String::from_utf8_lossy(&e)),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e)),
            Event::GeneralRef(e) => {
                let reference = format!("&{};", String::from_utf8_lossy(&e));
                let decoded = unescape(&reference).map_err(|e| e.to_string())?;
                text.push_str(&decoded);
            }
            Event::End(_) => return Ok(text),
            Event::Eof => return Err(format!("unterminated <{tag}>")),
            _ => return Err(format!("unexpected markup inside <{tag}>")),
        }
        buf.clear();
    }
}

fn make_node(pending: &PendingNode) -> Result<StructureNode, String> {
    let type_name = pending.node_type.as_deref().unwrap_or_default();
    let node_type: NodeType = type_name.trim().parse().map_err(|e| format!("{e}"))?;

    let mut node = StructureNode::new(node_type);
    if let Some(title) = &pending.title {
        node.set_title(title);
    }
    if let Some(id) = &pending.id {
        node.set_id(id);
    }
    for fileref in &pending.filerefs {
        node.add_media_ref(fileref)
            .map_err(|e| format!("{e} in {type_name} {:?}", pending.id))?;
    }
    for label in &pending.labels {
        node.add_label(label);
    }
    Ok(node)
}

fn attach_children(tree: &mut DocTree, parent: NodeId, pending: &PendingNode) -> Result<(), String> {
    for child in &pending.children {
        let node = make_node(child)?;
        let id = tree.add_child(parent, node).map_err(|e| e.to_string())?;
        attach_children(tree, id, child)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_tree() {
        let tree = build_tree(
            "<node><type>book</type><title>Guide</title>\
             <node><type>chapter</type><title>A &amp; B</title><id>a</id>\
             <fileref>img/x.png</fileref><fileref>http://example.com/y.png</fileref>\
             <label>cache</label><label>cache</label>\
             <node><type>section</type><title>S</title><id>s</id></node>\
             </node>\
             <node><type>appendix</type><title>App</title><id>app</id></node>\
             </node>",
            Some(MAX_STRUCTURE_DEPTH),
        )
        .unwrap();

        let root = tree.root();
        assert_eq!(tree.node(root).node_type(), Some(NodeType::Book));
        assert_eq!(tree.node(root).title(), Some("Guide"));
        assert_eq!(tree.children(root).len(), 2);

        let chapter = tree.node(tree.children(root)[0]);
        assert_eq!(chapter.title(), Some("A & B"));
        assert_eq!(chapter.local_media_refs(), &["img/x.png"]);
        assert_eq!(chapter.external_media_refs(), &["http://example.com/y.png"]);
        assert_eq!(chapter.labels(), &["cache"]);
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_build_tree_too_deep() {
        let deep = "<node><type>book</type>\
            <node><type>chapter</type><node><type>section</type>\
            <node><type>section</type><node><type>section</type></node></node>\
            </node></node></node>";

        let err = build_tree(deep, Some(MAX_STRUCTURE_DEPTH)).unwrap_err();
        let StructureError::Builder {
            message,
            intermediate,
        } = err
        else {
            panic!("expected builder error");
        };
        assert!(message.contains("deeper than 4 levels"));
        assert_eq!(intermediate, deep);

        let tree = build_tree(deep, None).unwrap();
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn test_build_tree_unknown_type() {
        let err = build_tree("<node><type>part</type></node>", None).unwrap_err();
        assert!(err.to_string().contains("unknown node type \"part\""));
    }

    #[test]
    fn test_build_tree_blank_fileref() {
        let err = build_tree(
            "<node><type>book</type><node><type>chapter</type><fileref> </fileref></node></node>",
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("media reference must not be blank"));
    }

    #[test]
    fn test_blank_values_do_not_overwrite() {
        let tree = build_tree(
            "<node><type>book</type><node><type>chapter</type>\
             <title>Kept</title><title>  </title><id>c</id><id></id></node></node>",
            None,
        )
        .unwrap();
        let chapter = tree.node(tree.children(tree.root())[0]);
        assert_eq!(chapter.title(), Some("Kept"));
        assert_eq!(chapter.id(), Some("c"));
    }

    #[test]
    fn test_build_tree_malformed() {
        let err = build_tree("<node><type>book</node>", None).unwrap_err();
        assert!(matches!(err, StructureError::Builder { .. }));
    }
}
