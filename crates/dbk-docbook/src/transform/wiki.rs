//! Confluence wiki markup renderer.
//!
//! Block elements (paragraphs, lists, tables, admonitions, listings) start
//! on their own line; inline elements are rendered into the surrounding text
//! line. Text is escaped so it cannot start wiki markup, except inside
//! `{code}` and `{noformat}` blocks.

use std::fmt::Write;

use crate::escape::{
    escape_wiki_chars_in_content, prepare_monospaced_wiki_text, section_title_prefix_remove,
    surround_wiki_content_text, trim_leading_break, trim_trailing_break, trim_wiki_text,
};
use crate::xml::{Element, Name, Node};

const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

const SECTIONS: &[&str] = &[
    "section",
    "simplesect",
    "sect1",
    "sect2",
    "sect3",
    "sect4",
    "sect5",
    "refsection",
];

const MONOSPACED: &[&str] = &[
    "classname",
    "code",
    "command",
    "computeroutput",
    "constant",
    "envar",
    "exceptionname",
    "filename",
    "function",
    "interfacename",
    "literal",
    "markup",
    "methodname",
    "option",
    "package",
    "parameter",
    "prompt",
    "property",
    "systemitem",
    "tag",
    "type",
    "userinput",
    "varname",
];

/// Elements that produce no output where they appear.
const SKIPPED: &[&str] = &[
    "title",
    "titleabbrev",
    "subtitle",
    "indexterm",
    "remark",
    "anchor",
];

/// Image elements carrying a `fileref`.
const IMAGES: &[&str] = &["imagedata", "graphic", "inlinegraphic"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Block,
    Inline,
    Skip,
}

#[derive(Debug, Clone, Default)]
struct Context {
    /// Nesting of sections below the rendered element.
    section_depth: usize,
    /// Markers of the enclosing lists, e.g. `*#`.
    list_prefix: String,
    /// Paragraphs end with one line break instead of a blank line.
    compact: bool,
}

impl Context {
    /// Context for content of a macro or cell: lists restart at the top level.
    fn nested(&self, compact: bool) -> Self {
        Self {
            section_depth: self.section_depth,
            list_prefix: String::new(),
            compact,
        }
    }
}

/// Renders one selected element of a DocBook document.
pub(crate) struct WikiRenderer<'a> {
    vocabulary: Option<&'a str>,
    omit: &'a [Name],
    suppressed: Vec<&'a Element>,
}

impl<'a> WikiRenderer<'a> {
    /// `vocabulary` is the DocBook namespace (`None` for DocBook 4.x).
    /// Direct children named in `omit` and every element in `suppressed`
    /// are left out.
    pub(crate) fn new(
        vocabulary: Option<&'a str>,
        omit: &'a [Name],
        suppressed: Vec<&'a Element>,
    ) -> Self {
        Self {
            vocabulary,
            omit,
            suppressed,
        }
    }

    pub(crate) fn render(&self, selected: &Element) -> String {
        let ctx = Context::default();
        let mut out = String::new();
        let mut line = String::new();
        for (node, next) in siblings(&selected.children) {
            if let Node::Element(e) = node
                && self.omit.contains(&e.name)
            {
                continue;
            }
            self.node(node, next, &ctx, &mut out, &mut line);
        }
        flush(&mut out, &mut line);
        out.trim_start_matches('\n').to_owned()
    }

    /// Local name of a DocBook element, `None` for foreign elements.
    fn docbook<'e>(&self, e: &'e Element) -> Option<&'e str> {
        (e.name.namespace.as_deref() == self.vocabulary).then_some(e.name.local.as_str())
    }

    fn is_suppressed(&self, e: &Element) -> bool {
        self.suppressed.iter().any(|s| std::ptr::eq(*s, e))
    }

    fn kind(&self, e: &Element) -> Kind {
        if self.is_suppressed(e) {
            return Kind::Skip;
        }
        let Some(local) = self.docbook(e) else {
            return Kind::Inline;
        };
        if SKIPPED.contains(&local) || local.ends_with("info") {
            return Kind::Skip;
        }
        match local {
            "para" | "simpara" | "formalpara" | "programlisting" | "screen" | "literallayout"
            | "synopsis" | "blockquote" | "warning" | "caution" | "important" | "note" | "tip"
            | "itemizedlist" | "orderedlist" | "procedure" | "substeps" | "variablelist"
            | "table" | "informaltable" | "figure" | "informalfigure" | "mediaobject"
            | "example" | "informalexample" | "sidebar" | "abstract" | "partintro"
            | "bridgehead" => Kind::Block,
            _ if SECTIONS.contains(&local) => Kind::Block,
            _ => Kind::Inline,
        }
    }

    /// Render mixed content of `e` into `out`.
    fn contents(&self, e: &Element, ctx: &Context, out: &mut String) {
        let mut line = String::new();
        for (node, next) in siblings(&e.children) {
            self.node(node, next, ctx, out, &mut line);
        }
        flush(out, &mut line);
    }

    fn body(&self, e: &Element, ctx: &Context) -> String {
        let mut out = String::new();
        self.contents(e, ctx, &mut out);
        out
    }

    /// Render one child into the pending `line`. `next` is its following
    /// sibling, which decides whether a text node ends the line.
    fn node(
        &self,
        node: &Node,
        next: Option<&Node>,
        ctx: &Context,
        out: &mut String,
        line: &mut String,
    ) {
        match node {
            Node::Text(text) => {
                let starts_line = line.trim().is_empty();
                let ends_line = next.is_none_or(|n| self.breaks_line(n));
                let text = match (starts_line, ends_line) {
                    (true, true) => trim_wiki_text(text),
                    (true, false) => trim_leading_break(text).to_owned(),
                    (false, true) => trim_trailing_break(text).to_owned(),
                    (false, false) => text.clone(),
                };
                line.push_str(&escape_wiki_chars_in_content(&text));
            }
            Node::Element(e) => match self.kind(e) {
                Kind::Block => {
                    flush(out, line);
                    self.block(e, ctx, out);
                }
                Kind::Inline => line.push_str(&self.inline(e)),
                Kind::Skip => {}
            },
        }
    }

    fn breaks_line(&self, node: &Node) -> bool {
        matches!(node, Node::Element(e) if self.kind(e) == Kind::Block)
    }

    fn block(&self, e: &Element, ctx: &Context, out: &mut String) {
        let local = e.name.local.as_str();
        match local {
            "para" | "simpara" => {
                let start = out.len();
                self.contents(e, ctx, out);
                if !ctx.compact && out.len() > start {
                    out.push('\n');
                }
            }
            "programlisting" => code(e, None, out),
            "screen" | "literallayout" | "synopsis" => {
                let _ = writeln!(out, "{{noformat}}{}{{noformat}}", e.text());
            }
            "blockquote" => {
                let body = self.body(e, &ctx.nested(true));
                let _ = writeln!(out, "{{quote}}{}{{quote}}", body.trim());
            }
            "warning" | "caution" => self.admonition(e, "warning", ctx, out),
            "important" => self.admonition(e, "info", ctx, out),
            "note" => self.admonition(e, "note", ctx, out),
            "tip" => self.admonition(e, "tip", ctx, out),
            "itemizedlist" => self.list(e, '*', ctx, out),
            "orderedlist" | "procedure" | "substeps" => self.list(e, '#', ctx, out),
            "variablelist" => self.variable_list(e, ctx, out),
            "table" | "informaltable" => self.table(e, ctx, out),
            "figure" | "informalfigure" | "mediaobject" => {
                if let Some(image) = self.image(e, self.title(e).as_deref()) {
                    ensure_newline(out);
                    out.push_str(&image);
                    out.push('\n');
                }
            }
            "example" | "informalexample" => self.example(e, ctx, out),
            "bridgehead" => {
                ensure_newline(out);
                let _ = writeln!(out, "h6. {}", collapse_whitespace(&e.text()));
            }
            _ if SECTIONS.contains(&local) => self.section(e, ctx, out),
            _ => {
                self.formal_title(e, ctx, out);
                self.contents(e, ctx, out);
            }
        }
    }

    /// Title of a block, from its `title` child or its info block.
    fn title(&self, e: &Element) -> Option<String> {
        let is_title = |c: &&Element| self.docbook(c) == Some("title");
        e.child_elements()
            .find(is_title)
            .or_else(|| {
                e.child_elements()
                    .filter(|c| self.docbook(c).is_some_and(|l| l.ends_with("info")))
                    .find_map(|info| info.child_elements().find(is_title))
            })
            .map(|t| collapse_whitespace(&t.text()))
            .filter(|t| !t.is_empty())
    }

    /// Title line of a formal block: `h6.` heading, or bold inside lists.
    fn formal_title(&self, e: &Element, ctx: &Context, out: &mut String) {
        let Some(title) = self.title(e) else {
            return;
        };
        ensure_newline(out);
        if ctx.compact {
            out.push_str(&surround_wiki_content_text(&title, "*", "*"));
            out.push('\n');
        } else {
            let _ = writeln!(out, "h6. {title}");
        }
    }

    fn section(&self, e: &Element, ctx: &Context, out: &mut String) {
        let depth = ctx.section_depth + 1;
        if let Some(title) = self.title(e) {
            ensure_newline(out);
            let _ = writeln!(out, "h{}. {}", depth.min(6), section_title_prefix_remove(&title));
        }
        let inner = Context {
            section_depth: depth,
            ..ctx.clone()
        };
        self.contents(e, &inner, out);
    }

    fn admonition(&self, e: &Element, name: &str, ctx: &Context, out: &mut String) {
        let body = self.body(e, &ctx.nested(false));
        ensure_newline(out);
        match self.title(e) {
            Some(title) => {
                let _ = write!(out, "{{{name}:title={title}}}");
            }
            None => {
                let _ = write!(out, "{{{name}}}");
            }
        }
        let _ = writeln!(out, "{}{{{name}}}", body.trim_start());
    }

    fn example(&self, e: &Element, ctx: &Context, out: &mut String) {
        let mut title = self.title(e);
        let has_listing = e
            .child_elements()
            .any(|c| self.docbook(c) == Some("programlisting"));
        if !has_listing {
            self.formal_title(e, ctx, out);
        }
        let mut line = String::new();
        for (node, next) in siblings(&e.children) {
            match node {
                Node::Element(c)
                    if self.docbook(c) == Some("programlisting") && !self.is_suppressed(c) =>
                {
                    flush(out, &mut line);
                    code(c, title.take().as_deref(), out);
                }
                _ => self.node(node, next, ctx, out, &mut line),
            }
        }
        flush(out, &mut line);
    }

    fn list(&self, e: &Element, marker: char, ctx: &Context, out: &mut String) {
        self.formal_title(e, ctx, out);
        let prefix = format!("{}{marker}", ctx.list_prefix);
        let inner = Context {
            section_depth: ctx.section_depth,
            list_prefix: prefix.clone(),
            compact: true,
        };
        ensure_newline(out);
        let items = e.child_elements().filter(|c| {
            matches!(self.docbook(c), Some("listitem" | "step")) && !self.is_suppressed(c)
        });
        for item in items {
            let mut body = String::new();
            self.formal_title(item, &inner, &mut body);
            self.contents(item, &inner, &mut body);
            let _ = writeln!(out, "{prefix} {}", body.trim());
        }
    }

    fn variable_list(&self, e: &Element, ctx: &Context, out: &mut String) {
        self.formal_title(e, ctx, out);
        ensure_newline(out);
        let entries = e
            .child_elements()
            .filter(|c| self.docbook(c) == Some("varlistentry"));
        for entry in entries {
            let terms: Vec<String> = entry
                .child_elements()
                .filter(|c| self.docbook(c) == Some("term"))
                .map(|t| self.inline_children(t).trim().to_owned())
                .filter(|t| !t.is_empty())
                .collect();
            let _ = writeln!(out, "{}* {}", ctx.list_prefix, terms.join(", "));

            let item = entry
                .child_elements()
                .find(|c| self.docbook(c) == Some("listitem"));
            if let Some(item) = item {
                let body = self.body(item, &ctx.nested(true));
                if !body.trim().is_empty() {
                    let _ = writeln!(out, "{{quote}}{}{{quote}}", body.trim_start());
                }
            }
        }
    }

    fn table(&self, e: &Element, ctx: &Context, out: &mut String) {
        self.formal_title(e, ctx, out);
        ensure_newline(out);
        let groups: Vec<&Element> = {
            let tgroups: Vec<&Element> = e
                .child_elements()
                .filter(|c| self.docbook(c) == Some("tgroup"))
                .collect();
            if tgroups.is_empty() { vec![e] } else { tgroups }
        };
        for group in groups {
            for part in group.child_elements() {
                let header = match self.docbook(part) {
                    Some("thead") => true,
                    Some("tbody" | "tfoot") => false,
                    Some("tr") => {
                        self.table_row(part, false, ctx, out);
                        continue;
                    }
                    _ => continue,
                };
                let rows = part
                    .child_elements()
                    .filter(|r| matches!(self.docbook(r), Some("row" | "tr")));
                for row in rows {
                    self.table_row(row, header, ctx, out);
                }
            }
        }
    }

    fn table_row(&self, row: &Element, header: bool, ctx: &Context, out: &mut String) {
        let cells: Vec<&Element> = row
            .child_elements()
            .filter(|c| matches!(self.docbook(c), Some("entry" | "td" | "th")))
            .collect();
        let header = header || cells.iter().any(|c| self.docbook(c) == Some("th"));
        let separator = if header { "||" } else { "|" };

        out.push_str(separator);
        for cell in cells {
            let body = self.body(cell, &ctx.nested(true));
            out.push_str(&body.trim().replace('\n', " "));
            out.push_str(separator);
        }
        out.push('\n');
    }

    /// Image markup for the first image below `e` (or `e` itself).
    fn image(&self, e: &Element, title: Option<&str>) -> Option<String> {
        let fileref = self.find_fileref(e)?;
        Some(match title {
            Some(title) => format!("!{fileref}|title={title}!"),
            None => format!("!{fileref}!"),
        })
    }

    fn find_fileref<'e>(&self, e: &'e Element) -> Option<&'e str> {
        if self.docbook(e).is_some_and(|l| IMAGES.contains(&l)) {
            let fileref = e.attr("fileref").map(str::trim).filter(|f| !f.is_empty());
            if fileref.is_some() {
                return fileref;
            }
        }
        e.child_elements().find_map(|c| self.find_fileref(c))
    }

    fn inline(&self, e: &Element) -> String {
        let Some(local) = self.docbook(e) else {
            return self.inline_children(e);
        };
        match local {
            "emphasis" => {
                let marker = match e.attr("role") {
                    Some("bold" | "strong") => "*",
                    Some("underline") => "+",
                    Some("strikethrough" | "strike") => "-",
                    _ => "_",
                };
                surround_wiki_content_text(&e.text(), marker, marker)
            }
            "strong" => surround_wiki_content_text(&e.text(), "*", "*"),
            "citetitle" | "firstterm" | "foreignphrase" | "glossterm" | "replaceable" => {
                surround_wiki_content_text(&e.text(), "_", "_")
            }
            "superscript" => surround_wiki_content_text(&e.text(), "^", "^"),
            "subscript" => surround_wiki_content_text(&e.text(), "~", "~"),
            "quote" => surround_wiki_content_text(&e.text(), "??", "??"),
            "link" | "ulink" => self.link(e),
            "xref" => e
                .attr("linkend")
                .map(|id| format!("[{id}]"))
                .unwrap_or_default(),
            "inlinemediaobject" | "inlinegraphic" => self.image(e, None).unwrap_or_default(),
            "footnote" => {
                let text = self.inline_children(e);
                let text = text.trim();
                if text.is_empty() {
                    String::new()
                } else {
                    format!(" ({text})")
                }
            }
            _ if MONOSPACED.contains(&local) => prepare_monospaced_wiki_text(&e.text()),
            _ => self.inline_children(e),
        }
    }

    fn inline_children(&self, e: &Element) -> String {
        let mut out = String::new();
        for node in &e.children {
            match node {
                Node::Text(text) => out.push_str(&escape_wiki_chars_in_content(text)),
                Node::Element(c) if self.kind(c) != Kind::Skip => out.push_str(&self.inline(c)),
                Node::Element(_) => {}
            }
        }
        out
    }

    /// `[label|target]`, or `[target]` without a label. External targets come
    /// from `xlink:href` or `url`, internal ones from `linkend`.
    fn link(&self, e: &Element) -> String {
        let label = self.inline_children(e);
        let label = label.trim();
        let target = e
            .attr_ns(Some(XLINK_NS), "href")
            .or_else(|| e.attr("url"))
            .or_else(|| e.attr("linkend"))
            .map(str::trim)
            .filter(|t| !t.is_empty());
        match target {
            Some(target) if label.is_empty() => format!("[{target}]"),
            Some(target) => format!("[{label}|{target}]"),
            None => label.to_owned(),
        }
    }
}

fn code(e: &Element, title: Option<&str>, out: &mut String) {
    let mut params = Vec::new();
    if let Some(lang) = e.attr("language").map(str::trim).filter(|l| !l.is_empty()) {
        params.push(format!("lang={lang}"));
    }
    if let Some(title) = title {
        params.push(format!("title={title}"));
    }
    ensure_newline(out);
    if params.is_empty() {
        out.push_str("{code}");
    } else {
        let _ = write!(out, "{{code:{}}}", params.join("|"));
    }
    out.push_str(&e.text());
    out.push_str("{code}\n");
}

/// Each node paired with its following sibling.
fn siblings(nodes: &[Node]) -> impl Iterator<Item = (&Node, Option<&Node>)> {
    nodes
        .iter()
        .zip(nodes.iter().skip(1).map(Some).chain(std::iter::once(None)))
}

/// Write the pending text line, if any.
fn flush(out: &mut String, line: &mut String) {
    if !line.trim().is_empty() {
        ensure_newline(out);
        out.push_str(line.trim_end());
        out.push('\n');
    }
    line.clear();
}

fn ensure_newline(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
