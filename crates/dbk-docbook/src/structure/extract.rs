//! Structure extraction program runner.
//!
//! Flattens a loaded document into the intermediate structure XML:
//!
//! ```xml
//! <node>
//!   <type>book</type><title>Guide</title>
//!   <node>
//!     <type>chapter</type><title>Intro</title><id>intro</id>
//!     <fileref>images/arch.png</fileref><label>cache</label>
//!     <node>...</node>
//!   </node>
//! </node>
//! ```

use quick_xml::escape::escape;

use crate::error::StructureError;
use crate::program::StructureProgram;
use crate::xml::{Element, Name};

/// Characters that are not allowed in labels.
const LABEL_BAD_CHARS: &str = ":;,.?&[]()#^*@!";

/// Run `program` over the document rooted at `root`.
///
/// # Errors
///
/// Returns [`StructureError::Extraction`] when the root element does not
/// match the program.
pub(crate) fn extract(root: &Element, program: &StructureProgram) -> Result<String, StructureError> {
    if root.name != program.root {
        return Err(StructureError::Extraction(format!(
            "document root element is {} but {} was expected",
            display_name(&root.name),
            display_name(&program.root)
        )));
    }
    let mut out = String::new();
    write_node(&mut out, root, 0, program);
    Ok(out)
}

fn display_name(name: &Name) -> String {
    match &name.namespace {
        Some(ns) => format!("{{{ns}}}{}", name.local),
        None => name.local.clone(),
    }
}

fn write_node(out: &mut String, element: &Element, depth: usize, program: &StructureProgram) {
    let child_level = program.level(depth + 1).unwrap_or_default();

    out.push_str("<node>");
    push_field(out, "type", &element.name.local);

    let title = program
        .titles
        .iter()
        .flat_map(|path| path.select_all(element))
        .map(|e| collapse_whitespace(&e.text()))
        .find(|t| !t.is_empty());
    if let Some(title) = title {
        push_field(out, "title", &title);
    }

    if let Some(id) = element.attr_ns(program.id.namespace.as_deref(), &program.id.local) {
        push_field(out, "id", id);
    }

    let mut refs = Vec::new();
    collect_media(element, child_level, program, &mut refs);
    for media_ref in refs {
        push_field(out, "fileref", media_ref);
    }

    for path in &program.labels {
        for keyword in path.select_all(element) {
            let label = normalize_label(&keyword.text());
            if !label.is_empty() {
                push_field(out, "label", &label);
            }
        }
    }

    for child in element.child_elements() {
        if child_level.contains(&child.name) {
            write_node(out, child, depth + 1, program);
        }
    }
    out.push_str("</node>");
}

/// Media references of `element`'s own content, skipping child nodes.
fn collect_media<'a>(
    element: &'a Element,
    child_level: &[Name],
    program: &StructureProgram,
    refs: &mut Vec<&'a str>,
) {
    for child in element.child_elements() {
        if child_level.contains(&child.name) {
            continue;
        }
        if program.media.contains(&child.name) {
            let attr = &program.media_attribute;
            if let Some(value) = child.attr_ns(attr.namespace.as_deref(), &attr.local) {
                refs.push(value);
            }
        }
        collect_media(child, &[], program, refs);
    }
}

fn push_field(out: &mut String, tag: &str, value: &str) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
    out.push_str(&escape(value));
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Turn a keyword into a page label: lowercase, whitespace runs become `-`,
/// characters not allowed in labels are dropped.
pub fn normalize_label(keyword: &str) -> String {
    keyword
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| !LABEL_BAD_CHARS.contains(*c))
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dbk_cache::ResourceCache;
    use pretty_assertions::assert_eq;
    use url::Url;

    use super::*;
    use crate::program::{instantiate, template};
    use crate::resolver::CachingResolver;
    use crate::xml::{Diagnostics, LoadOptions, load_document};

    fn load(xml: &str) -> Element {
        let resolver = CachingResolver::new(Arc::new(ResourceCache::default()));
        load_document(
            xml.as_bytes(),
            &Url::parse("file:///doc/book.xml").unwrap(),
            &resolver,
            &LoadOptions::default(),
            &mut Diagnostics::default(),
        )
        .unwrap()
    }

    fn program(name: &str, recurse: bool) -> StructureProgram {
        let text = instantiate(template(name).unwrap(), &[if recurse { "recurse" } else { "" }]);
        StructureProgram::parse(name, &text).unwrap()
    }

    #[test]
    fn test_extract_docbook5() {
        let root = load(
            r#"<book xmlns="http://docbook.org/ns/docbook" xmlns:xl="http://www.w3.org/1999/xlink">
  <info><title>The  Guide</title></info>
  <chapter xml:id="intro">
    <info><keywordset><keyword>Data Grid</keyword><keyword>cache!</keyword></keywordset></info>
    <title>Intro &amp; more</title>
    <para><inlinemediaobject><imageobject><imagedata fileref="images/a.png"/></imageobject></inlinemediaobject></para>
    <section xml:id="s1"><title>S1</title>
      <mediaobject><imageobject><imagedata fileref="images/b.png"/></imageobject></mediaobject>
    </section>
  </chapter>
  <appendix xml:id="app"><title>App</title></appendix>
</book>"#,
        );

        let xml = extract(&root, &program("structure_5_0", false)).unwrap();

        assert_eq!(
            xml,
            "<node><type>book</type><title>The Guide</title>\
             <node><type>chapter</type><title>Intro &amp; more</title><id>intro</id>\
             <fileref>images/a.png</fileref><label>data-grid</label><label>cache</label>\
             <node><type>section</type><title>S1</title><id>s1</id><fileref>images/b.png</fileref></node>\
             </node>\
             <node><type>appendix</type><title>App</title><id>app</id></node>\
             </node>"
        );
    }

    #[test]
    fn test_extract_docbook43_depth_limit() {
        let root = load(
            r#"<book><title>B</title>
<chapter id="c"><title>C</title>
 <section id="s1"><title>S1</title>
  <section id="s2"><title>S2</title>
   <section id="s3"><title>S3</title><graphic fileref="deep.png"/></section>
  </section>
 </section>
</chapter></book>"#,
        );

        let xml = extract(&root, &program("structure_4_3", false)).unwrap();
        assert!(xml.contains("<id>s2</id><fileref>deep.png</fileref></node>"));
        assert!(!xml.contains("<id>s3</id>"));

        let xml = extract(&root, &program("structure_4_3", true)).unwrap();
        assert!(xml.contains("<id>s3</id><fileref>deep.png</fileref></node>"));
    }

    #[test]
    fn test_extract_wrong_root() {
        let root = load("<article><title>A</title></article>");
        let err = extract(&root, &program("structure_4_3", false)).unwrap_err();
        assert!(err.to_string().contains("document root element is article"));
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("  Data   Grid "), "data-grid");
        assert_eq!(normalize_label("JBoss: Cache!"), "jboss-cache");
        assert_eq!(normalize_label("?!"), "");
    }
}
