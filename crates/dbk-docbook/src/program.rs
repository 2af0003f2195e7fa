//! Transform programs.
//!
//! Structure extraction and content rendering are driven by small
//! line-oriented programs stored in `programs/`, one per operation and
//! dialect (`structure_5_0`, `content_4_3`, ...). Programs are templates:
//! `${1}`, `${2}` placeholders are substituted before parsing, which is how
//! a content program is aimed at a single node.
//!
//! ```text
//! namespace d http://docbook.org/ns/docbook
//! select d:book/d:chapter[2]
//! suppress d:book/d:chapter[2]/d:section
//! omit d:title d:info
//! render wiki
//! ```

use std::collections::HashMap;

use crate::error::ProgramError;
use crate::xml::{Element, Name, XML_NS};

const TEMPLATES: &[(&str, &str)] = &[
    (
        "structure_4_3",
        include_str!("../programs/structure_4_3.prog"),
    ),
    (
        "structure_5_0",
        include_str!("../programs/structure_5_0.prog"),
    ),
    ("content_4_3", include_str!("../programs/content_4_3.prog")),
    ("content_5_0", include_str!("../programs/content_5_0.prog")),
];

/// Program template by name.
///
/// # Errors
///
/// Returns [`ProgramError::Unknown`] for names without a template.
pub fn template(name: &str) -> Result<&'static str, ProgramError> {
    TEMPLATES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, text)| *text)
        .ok_or_else(|| ProgramError::Unknown(name.to_owned()))
}

/// Substitute `${1}`, `${2}`, ... with `params` in order.
pub fn instantiate(template: &str, params: &[&str]) -> String {
    params
        .iter()
        .enumerate()
        .fold(template.to_owned(), |text, (i, value)| {
            text.replace(&format!("${{{}}}", i + 1), value)
        })
}

/// One step of a [`Path`]: element name and optional 1-based position among
/// same-name siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: Name,
    pub index: Option<usize>,
}

/// Slash-separated element path such as `d:book/d:chapter[2]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    pub steps: Vec<Step>,
}

impl Path {
    /// Select the single element addressed by this path, starting at the
    /// document root. The first step must name the root element.
    pub fn select_from_root<'a>(&self, root: &'a Element) -> Option<&'a Element> {
        let (first, rest) = self.steps.split_first()?;
        if root.name != first.name || first.index.is_some_and(|i| i != 1) {
            return None;
        }
        rest.iter().try_fold(root, |current, step| {
            current
                .child_elements()
                .filter(|e| e.name == step.name)
                .nth(step.index.unwrap_or(1).checked_sub(1)?)
        })
    }

    /// All elements reachable from `context` along this relative path, in
    /// document order.
    pub fn select_all<'a>(&self, context: &'a Element) -> Vec<&'a Element> {
        let mut current = vec![context];
        for step in &self.steps {
            current = current
                .into_iter()
                .flat_map(|e| {
                    e.child_elements()
                        .filter(|c| c.name == step.name)
                        .enumerate()
                        .filter(|(i, _)| step.index.is_none_or(|n| n == i + 1))
                        .map(|(_, c)| c)
                        .collect::<Vec<_>>()
                })
                .collect();
        }
        current
    }

    /// All elements addressed by this path, starting at the document root.
    /// Steps without a position match every same-name sibling.
    pub fn select_all_from_root<'a>(&self, root: &'a Element) -> Vec<&'a Element> {
        let Some((first, rest)) = self.steps.split_first() else {
            return Vec::new();
        };
        if root.name != first.name || first.index.is_some_and(|i| i != 1) {
            return Vec::new();
        }
        Path {
            steps: rest.to_vec(),
        }
        .select_all(root)
    }
}

/// Prefix to namespace bindings declared by a program.
#[derive(Debug, Clone, Default)]
struct Namespaces(HashMap<String, String>);

impl Namespaces {
    fn name(&self, qname: &str) -> Result<Name, String> {
        match qname.split_once(':') {
            None => Ok(Name::new(None, qname)),
            Some(("xml", local)) => Ok(Name::new(Some(XML_NS), local)),
            Some((prefix, local)) => self
                .0
                .get(prefix)
                .map(|uri| Name::new(Some(uri), local))
                .ok_or_else(|| format!("undeclared prefix {prefix:?}")),
        }
    }

    fn path(&self, text: &str) -> Result<Path, String> {
        let steps = text
            .split('/')
            .map(|segment| {
                let (qname, index) = match segment.split_once('[') {
                    Some((qname, rest)) => {
                        let digits = rest
                            .strip_suffix(']')
                            .ok_or_else(|| format!("unterminated index in {segment:?}"))?;
                        let index = digits
                            .parse::<usize>()
                            .map_err(|_| format!("invalid index in {segment:?}"))?;
                        (qname, Some(index))
                    }
                    None => (segment, None),
                };
                if qname.is_empty() {
                    return Err(format!("empty step in path {text:?}"));
                }
                Ok(Step {
                    name: self.name(qname)?,
                    index,
                })
            })
            .collect::<Result<Vec<_>, String>>()?;
        Ok(Path { steps })
    }
}

/// Parsed program line.
struct Directive<'a> {
    line: usize,
    keyword: &'a str,
    args: Vec<&'a str>,
}

/// Split program text into directives, collecting namespace declarations.
fn directives<'a>(
    program: &str,
    text: &'a str,
) -> Result<(Namespaces, Vec<Directive<'a>>), ProgramError> {
    let mut namespaces = Namespaces::default();
    let mut out = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut words = line.split_whitespace();
        let keyword = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();
        if keyword == "namespace" {
            let [prefix, uri] = args.as_slice() else {
                return Err(syntax(program, idx + 1, "namespace needs a prefix and a URI"));
            };
            namespaces.0.insert((*prefix).to_owned(), (*uri).to_owned());
            continue;
        }
        out.push(Directive {
            line: idx + 1,
            keyword,
            args,
        });
    }
    Ok((namespaces, out))
}

fn syntax(program: &str, line: usize, message: impl Into<String>) -> ProgramError {
    ProgramError::Syntax {
        program: program.to_owned(),
        line,
        message: message.into(),
    }
}

/// Program extracting the document structure.
#[derive(Debug, Clone)]
pub struct StructureProgram {
    /// Root element name.
    pub root: Name,
    /// Element names forming each nesting level below the root.
    pub levels: Vec<Vec<Name>>,
    /// Repeat the last level for deeper nesting.
    pub recurse: bool,
    /// Candidate title locations, relative to the node element.
    pub titles: Vec<Path>,
    /// Attribute holding the node id.
    pub id: Name,
    /// Attribute holding media references.
    pub media_attribute: Name,
    /// Elements carrying media references.
    pub media: Vec<Name>,
    /// Label (keyword) locations, relative to the node element.
    pub labels: Vec<Path>,
}

impl StructureProgram {
    /// Parse an instantiated structure program.
    ///
    /// # Errors
    ///
    /// Returns [`ProgramError::Syntax`] for unknown directives, bad paths and
    /// missing required directives.
    pub fn parse(program: &str, text: &str) -> Result<Self, ProgramError> {
        let (ns, directives) = directives(program, text)?;
        let mut root = None;
        let mut levels = Vec::new();
        let mut recurse = false;
        let mut titles = Vec::new();
        let mut id = None;
        let mut media = None;
        let mut labels = Vec::new();

        for d in directives {
            let err = |message: String| syntax(program, d.line, message);
            match (d.keyword, d.args.as_slice()) {
                ("root", [name]) => root = Some(ns.name(name).map_err(err)?),
                ("level", names) if !names.is_empty() => levels.push(
                    names
                        .iter()
                        .map(|n| ns.name(n))
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(err)?,
                ),
                ("recurse", []) => recurse = true,
                ("title", paths) => {
                    for p in paths {
                        titles.push(ns.path(p).map_err(err)?);
                    }
                }
                ("id", [name]) => id = Some(ns.name(name).map_err(err)?),
                ("media", [attribute, names @ ..]) if !names.is_empty() => {
                    let attribute = ns.name(attribute).map_err(&err)?;
                    let names = names
                        .iter()
                        .map(|n| ns.name(n))
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(&err)?;
                    media = Some((attribute, names));
                }
                ("labels", paths) => {
                    for p in paths {
                        labels.push(ns.path(p).map_err(err)?);
                    }
                }
                (keyword, _) => {
                    return Err(syntax(
                        program,
                        d.line,
                        format!("invalid directive {keyword:?}"),
                    ));
                }
            }
        }

        let missing = |what: &str| syntax(program, 0, format!("missing {what} directive"));
        let (media_attribute, media) = media.ok_or_else(|| missing("media"))?;
        if levels.is_empty() {
            return Err(missing("level"));
        }
        Ok(Self {
            root: root.ok_or_else(|| missing("root"))?,
            levels,
            recurse,
            titles,
            id: id.ok_or_else(|| missing("id"))?,
            media_attribute,
            media,
            labels,
        })
    }

    /// Element names forming nesting level `depth` (1 = below the root).
    pub fn level(&self, depth: usize) -> Option<&[Name]> {
        let idx = depth.checked_sub(1)?;
        match self.levels.get(idx) {
            Some(names) => Some(names.as_slice()),
            None if self.recurse => self.levels.last().map(Vec::as_slice),
            None => None,
        }
    }
}

/// Program rendering one node's content.
#[derive(Debug, Clone)]
pub struct ContentProgram {
    /// Element to render.
    pub select: Path,
    /// Subtrees left out of the output.
    pub suppress: Vec<Path>,
    /// Direct children of the selected element left out of the output.
    pub omit: Vec<Name>,
    /// Output renderer name.
    pub renderer: String,
}

impl ContentProgram {
    /// Parse an instantiated content program.
    ///
    /// # Errors
    ///
    /// Returns [`ProgramError::Syntax`] for unknown directives, bad paths and
    /// missing required directives.
    pub fn parse(program: &str, text: &str) -> Result<Self, ProgramError> {
        let (ns, directives) = directives(program, text)?;
        let mut select = None;
        let mut suppress = Vec::new();
        let mut omit = Vec::new();
        let mut renderer = None;

        for d in directives {
            let err = |message: String| syntax(program, d.line, message);
            match (d.keyword, d.args.as_slice()) {
                ("select", [path]) => select = Some(ns.path(path).map_err(err)?),
                ("suppress", [path]) => suppress.push(ns.path(path).map_err(err)?),
                ("omit", names) => {
                    for n in names {
                        omit.push(ns.name(n).map_err(err)?);
                    }
                }
                ("render", [name]) => renderer = Some((*name).to_owned()),
                (keyword, _) => {
                    return Err(syntax(
                        program,
                        d.line,
                        format!("invalid directive {keyword:?}"),
                    ));
                }
            }
        }

        Ok(Self {
            select: select.ok_or_else(|| syntax(program, 0, "missing select directive"))?,
            suppress,
            omit,
            renderer: renderer.unwrap_or_else(|| "wiki".to_owned()),
        })
    }

    /// Namespace of the document vocabulary (the selected element's namespace).
    pub fn vocabulary(&self) -> Option<&str> {
        self.select
            .steps
            .last()
            .and_then(|step| step.name.namespace.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::xml::Node;

    const DB: &str = "http://docbook.org/ns/docbook";

    fn el(local: &str, children: Vec<Element>) -> Element {
        let mut e = Element::new(Name::new(Some(DB), local));
        e.children = children.into_iter().map(Node::Element).collect();
        e
    }

    #[test]
    fn test_templates_exist_for_both_dialects() {
        for name in ["structure_4_3", "structure_5_0", "content_4_3", "content_5_0"] {
            assert!(template(name).is_ok(), "{name}");
        }
        assert!(matches!(template("content_6_0"), Err(ProgramError::Unknown(_))));
    }

    #[test]
    fn test_instantiate_replaces_placeholders() {
        let text = instantiate("select ${1}\n${2}\nx ${1}", &["d:book", ""]);
        assert_eq!(text, "select d:book\n\nx d:book");
    }

    #[test]
    fn test_content_program_parse() {
        let text = instantiate(
            template("content_5_0").unwrap(),
            &["d:book/d:chapter[2]", "suppress d:book/d:chapter[2]/d:section"],
        );
        let program = ContentProgram::parse("content_5_0", &text).unwrap();

        assert_eq!(program.select.steps.len(), 2);
        assert_eq!(program.select.steps[1].index, Some(2));
        assert_eq!(program.suppress.len(), 1);
        assert_eq!(program.vocabulary(), Some(DB));
        assert!(program.omit.contains(&Name::new(Some(DB), "title")));
        assert_eq!(program.renderer, "wiki");
    }

    #[test]
    fn test_content_program_4_3_has_no_namespace() {
        let text = instantiate(template("content_4_3").unwrap(), &["book/chapter[1]", ""]);
        let program = ContentProgram::parse("content_4_3", &text).unwrap();
        assert_eq!(program.vocabulary(), None);
        assert!(program.suppress.is_empty());
    }

    #[test]
    fn test_structure_program_parse() {
        let text = instantiate(template("structure_5_0").unwrap(), &[""]);
        let program = StructureProgram::parse("structure_5_0", &text).unwrap();

        assert_eq!(program.root, Name::new(Some(DB), "book"));
        assert_eq!(program.levels.len(), 3);
        assert!(!program.recurse);
        assert_eq!(program.id, Name::new(Some(XML_NS), "id"));
        assert_eq!(program.media_attribute, Name::new(None, "fileref"));
        assert!(program.level(4).is_none());

        let text = instantiate(template("structure_5_0").unwrap(), &["recurse"]);
        let program = StructureProgram::parse("structure_5_0", &text).unwrap();
        assert_eq!(
            program.level(7).unwrap(),
            &[Name::new(Some(DB), "section")]
        );
    }

    #[test]
    fn test_syntax_errors_name_line() {
        let err = ContentProgram::parse("p", "select x:book").unwrap_err();
        assert_eq!(
            err.to_string(),
            "program p, line 1: undeclared prefix \"x\""
        );

        let err = ContentProgram::parse("p", "\nselect book\nfrobnicate").unwrap_err();
        assert!(err.to_string().contains("line 3"));

        let err = ContentProgram::parse("p", "select book/chapter[x]").unwrap_err();
        assert!(err.to_string().contains("invalid index"));
    }

    #[test]
    fn test_select_from_root() {
        let doc = el(
            "book",
            vec![
                el("chapter", vec![el("section", vec![])]),
                el("appendix", vec![]),
                el("chapter", vec![el("section", vec![]), el("section", vec![el("para", vec![])])]),
            ],
        );
        let ns = Namespaces(HashMap::from([("d".to_owned(), DB.to_owned())]));

        let path = ns.path("d:book/d:chapter[2]/d:section[2]").unwrap();
        let found = path.select_from_root(&doc).unwrap();
        assert_eq!(found.child_elements().count(), 1);

        assert!(ns.path("d:book/d:chapter[3]").unwrap().select_from_root(&doc).is_none());
        assert!(ns.path("d:article").unwrap().select_from_root(&doc).is_none());
        assert!(ns.path("d:book/d:chapter[0]").unwrap().select_from_root(&doc).is_none());
        assert_eq!(
            ns.path("d:book").unwrap().select_from_root(&doc),
            Some(&doc)
        );

        let sections = ns.path("d:book/d:chapter[2]/d:section").unwrap();
        assert_eq!(sections.select_all_from_root(&doc).len(), 2);
        let all = ns.path("d:book/d:chapter/d:section").unwrap();
        assert_eq!(all.select_all_from_root(&doc).len(), 3);
        assert!(ns.path("d:article/d:section").unwrap().select_all_from_root(&doc).is_empty());
    }

    #[test]
    fn test_select_all_relative() {
        let doc = el(
            "chapter",
            vec![el(
                "info",
                vec![el(
                    "keywordset",
                    vec![el("keyword", vec![]), el("keyword", vec![])],
                )],
            )],
        );
        let ns = Namespaces(HashMap::from([("d".to_owned(), DB.to_owned())]));

        let path = ns.path("d:info/d:keywordset/d:keyword").unwrap();
        assert_eq!(path.select_all(&doc).len(), 2);
        let path = ns.path("d:info/d:keywordset/d:keyword[2]").unwrap();
        assert_eq!(path.select_all(&doc).len(), 1);
        assert!(ns.path("d:title").unwrap().select_all(&doc).is_empty());
    }
}
