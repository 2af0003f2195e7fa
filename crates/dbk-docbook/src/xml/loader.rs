//! XML loading with XInclude and entity expansion.
//!
//! Documents are read with `quick-xml` into [`Element`] trees. During
//! loading:
//!
//! - namespaces are resolved against in-scope declarations
//! - `<!ENTITY>` declarations of the internal DTD subset are collected,
//!   including parameter entities pointing to `.ent` files
//! - entity references are replaced by their replacement text; text that
//!   contains markup is parsed in place
//! - `xi:include` elements are replaced by the included document or text,
//!   or by their `xi:fallback` content when the target cannot be loaded
//!
//! Every external resource is obtained through an [`EntityResolver`].

use std::collections::HashMap;
use std::sync::LazyLock;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use regex::Regex;
use url::Url;

use super::entities::{REFERENCE_PATTERN, char_reference, expand_char_references, html_entity};
use super::{Attribute, Diagnostics, Element, Name, Node, XINCLUDE_NS, XML_NS};
use crate::error::XmlError;
use crate::resolver::EntityResolver;

/// Options controlling document loading.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Read entity declarations from the external DTD subset.
    pub load_external_dtd: bool,
    /// Maximum nesting of includes and entity expansions.
    pub max_depth: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            load_external_dtd: true,
            max_depth: 32,
        }
    }
}

/// Load a document and expand all includes and entity references.
///
/// `url` is the document's own location; relative references are resolved
/// against it.
///
/// # Errors
///
/// Returns [`XmlError`] when the document or any included resource is not
/// well-formed, cannot be resolved, or nests too deeply.
pub fn load_document(
    bytes: &[u8],
    url: &Url,
    resolver: &dyn EntityResolver,
    options: &LoadOptions,
    diagnostics: &mut Diagnostics,
) -> Result<Element, XmlError> {
    let mut loader = Loader {
        resolver,
        options,
        diagnostics,
    };
    loader.load(bytes, url, 0)
}

static DOCTYPE_EXTERNAL_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*[^\s\[]+\s+(?:SYSTEM|PUBLIC\s+(?:"[^"]*"|'[^']*'))\s+(?:"([^"]*)"|'([^']*)')"#)
        .unwrap()
});

static DTD_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?s)<!--.*?-->",
        r#"|<!ENTITY\s+(%\s+)?([^\s%;]+)\s+(?:"([^"]*)"|'([^']*)'"#,
        r#"|(?:SYSTEM|PUBLIC\s+(?:"[^"]*"|'[^']*'))\s+(?:"([^"]*)"|'([^']*)')(\s+NDATA\s+[^\s>]+)?)\s*>"#,
        r"|%([^\s%;]+);",
    ))
    .unwrap()
});

static PARAMETER_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%([^\s%;]+);").unwrap());

static TEXT_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*<\?xml\s[^?]*\?>").unwrap());

/// Declared entity.
#[derive(Debug, Clone)]
enum Entity {
    Internal(String),
    External { url: Url, text: Option<String> },
    Unparsed,
}

/// Element under construction.
struct Frame {
    element: Element,
    namespaces: Vec<(String, String)>,
}

/// Tree state of one document.
struct TreeBuilder {
    url: Url,
    depth: usize,
    entities: HashMap<String, Entity>,
    parameters: HashMap<String, Entity>,
    stack: Vec<Frame>,
    bases: Vec<Url>,
    expanding: Vec<String>,
    root: Option<Element>,
}

impl TreeBuilder {
    fn new(url: &Url, depth: usize) -> Self {
        Self {
            url: url.clone(),
            depth,
            entities: HashMap::new(),
            parameters: HashMap::new(),
            stack: Vec::new(),
            bases: vec![url.clone()],
            expanding: Vec::new(),
            root: None,
        }
    }

    fn base(&self) -> &Url {
        self.bases.last().unwrap_or(&self.url)
    }

    fn malformed(&self, message: impl Into<String>) -> XmlError {
        XmlError::Malformed {
            url: self.url.to_string(),
            message: message.into(),
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(frame) = self.stack.last_mut() {
            frame.element.push_text(text);
        }
    }

    fn attach(&mut self, node: Node) -> Result<(), XmlError> {
        match (self.stack.last_mut(), node) {
            (Some(frame), Node::Text(text)) => frame.element.push_text(&text),
            (Some(frame), node @ Node::Element(_)) => frame.element.children.push(node),
            (None, Node::Element(element)) => {
                if self.root.is_some() {
                    return Err(self.malformed("multiple root elements"));
                }
                self.root = Some(element);
            }
            (None, Node::Text(_)) => {}
        }
        Ok(())
    }

    fn namespace(&self, prefix: &str, declared: &[(String, String)]) -> Option<Option<String>> {
        if prefix == "xml" {
            return Some(Some(XML_NS.to_owned()));
        }
        let scopes = std::iter::once(declared).chain(
            self.stack
                .iter()
                .rev()
                .map(|frame| frame.namespaces.as_slice()),
        );
        for scope in scopes {
            if let Some((_, uri)) = scope.iter().rev().find(|(p, _)| p == prefix) {
                return Some((!uri.is_empty()).then(|| uri.clone()));
            }
        }
        prefix.is_empty().then_some(None)
    }

    fn resolve_name(
        &self,
        qname: &str,
        declared: &[(String, String)],
        is_attribute: bool,
    ) -> Result<Name, XmlError> {
        let (prefix, local) = qname.split_once(':').unwrap_or(("", qname));
        if is_attribute && prefix.is_empty() {
            return Ok(Name::new(None, local));
        }
        let namespace = self
            .namespace(prefix, declared)
            .ok_or_else(|| self.malformed(format!("unbound namespace prefix {prefix:?}")))?;
        Ok(Name {
            namespace,
            local: local.to_owned(),
        })
    }

    /// Expand references in an attribute value that the XML reader could not
    /// unescape on its own.
    fn expand_attribute(&self, raw: &str, level: usize) -> String {
        REFERENCE_PATTERN
            .replace_all(raw, |caps: &regex::Captures<'_>| {
                let name = &caps[1];
                if let Some(c) = char_reference(name) {
                    return c.to_string();
                }
                match self.entities.get(name) {
                    Some(Entity::Internal(value)) if level < 8 => {
                        self.expand_attribute(value, level + 1)
                    }
                    _ => html_entity(name).map_or_else(|| caps[0].to_owned(), String::from),
                }
            })
            .into_owned()
    }

    fn finish(self) -> Result<Element, XmlError> {
        if let Some(frame) = self.stack.last() {
            let name = frame.element.name.local.clone();
            return Err(self.malformed(format!("element {name} is not closed")));
        }
        match self.root {
            Some(root) => Ok(root),
            None => Err(XmlError::Malformed {
                url: self.url.to_string(),
                message: "no root element".to_owned(),
            }),
        }
    }
}

struct Loader<'a> {
    resolver: &'a dyn EntityResolver,
    options: &'a LoadOptions,
    diagnostics: &'a mut Diagnostics,
}

impl Loader<'_> {
    fn load(&mut self, bytes: &[u8], url: &Url, depth: usize) -> Result<Element, XmlError> {
        if depth > self.options.max_depth {
            return Err(XmlError::TooDeep(url.to_string()));
        }
        let text = decode_bytes(bytes, url)?;
        let mut builder = TreeBuilder::new(url, depth);
        self.feed(&mut builder, &text)?;
        builder.finish()
    }

    fn fetch(&self, url: &Url) -> Result<Vec<u8>, XmlError> {
        self.resolver
            .resolve(url.as_str())?
            .ok_or_else(|| XmlError::NotFound(url.to_string()))
    }

    fn join(base: &Url, reference: &str) -> Result<Url, XmlError> {
        base.join(reference.trim())
            .map_err(|_| XmlError::InvalidReference {
                reference: reference.to_owned(),
                base: base.to_string(),
            })
    }

    /// Parse `text` and append its content to the builder's open element.
    fn feed(&mut self, builder: &mut TreeBuilder, text: &str) -> Result<(), XmlError> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(false);
        let decoder = reader.decoder();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let frame = start_frame(builder, &decoder, &e)?;
                    builder.stack.push(frame);
                }
                Event::Empty(e) => {
                    let frame = start_frame(builder, &decoder, &e)?;
                    builder.stack.push(frame);
                    self.close(builder)?;
                }
                Event::End(_) => self.close(builder)?,
                Event::Text(e) => {
                    let text = decoder.decode(&e)?;
                    builder.text(&text);
                }
                Event::CData(e) => {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    builder.text(&text);
                }
                Event::GeneralRef(e) => {
                    let name = decoder.decode(&e)?.into_owned();
                    if !builder.stack.is_empty() {
                        self.reference(builder, &name)?;
                    }
                }
                Event::DocType(e) => {
                    let declaration = decoder.decode(&e)?.into_owned();
                    self.doctype(builder, &declaration)?;
                }
                Event::Eof => break,
                Event::Comment(_) | Event::Decl(_) | Event::PI(_) => {}
            }
            buf.clear();
        }
        Ok(())
    }

    fn close(&mut self, builder: &mut TreeBuilder) -> Result<(), XmlError> {
        let Some(frame) = builder.stack.pop() else {
            return Err(builder.malformed("unexpected end tag"));
        };
        let element = frame.element;
        if element.name.is(Some(XINCLUDE_NS), "include") {
            self.xinclude(builder, element)
        } else {
            builder.attach(Node::Element(element))
        }
    }

    fn reference(&mut self, builder: &mut TreeBuilder, name: &str) -> Result<(), XmlError> {
        if name.starts_with('#') {
            let c = char_reference(name)
                .ok_or_else(|| builder.malformed(format!("invalid character reference &{name};")))?;
            builder.text(&c.to_string());
            return Ok(());
        }
        let predefined = match name {
            "lt" => Some("<"),
            "gt" => Some(">"),
            "amp" => Some("&"),
            "apos" => Some("'"),
            "quot" => Some("\""),
            _ => None,
        };
        if let Some(text) = predefined {
            builder.text(text);
            return Ok(());
        }

        match builder.entities.get(name).cloned() {
            Some(Entity::Internal(value)) => self.expand_entity(builder, name, &value, None),
            Some(Entity::External { url, text }) => {
                let text = match text {
                    Some(text) => text,
                    None => {
                        let bytes = self.fetch(&url)?;
                        let text = decode_bytes(&bytes, &url)?;
                        let text = TEXT_DECLARATION.replace(&text, "").into_owned();
                        builder.entities.insert(
                            name.to_owned(),
                            Entity::External {
                                url: url.clone(),
                                text: Some(text.clone()),
                            },
                        );
                        text
                    }
                };
                self.expand_entity(builder, name, &text, Some(url))
            }
            Some(Entity::Unparsed) => {
                self.diagnostics
                    .warn(format!("Reference to unparsed entity &{name}; ignored"));
                Ok(())
            }
            None => {
                if let Some(text) = html_entity(name) {
                    builder.text(text);
                } else {
                    self.diagnostics.warn(format!(
                        "Undeclared entity &{name}; in {} kept as text",
                        builder.url
                    ));
                    builder.text(&format!("&{name};"));
                }
                Ok(())
            }
        }
    }

    fn expand_entity(
        &mut self,
        builder: &mut TreeBuilder,
        name: &str,
        value: &str,
        base: Option<Url>,
    ) -> Result<(), XmlError> {
        if !value.contains(['<', '&']) {
            builder.text(value);
            return Ok(());
        }
        if builder.expanding.iter().any(|n| n == name)
            || builder.depth + builder.expanding.len() >= self.options.max_depth
        {
            return Err(XmlError::TooDeep(format!("&{name};")));
        }

        let open = builder.stack.len();
        builder.expanding.push(name.to_owned());
        let pushed_base = base.is_some();
        if let Some(base) = base {
            builder.bases.push(base);
        }
        let result = self.feed(builder, value);
        if pushed_base {
            builder.bases.pop();
        }
        builder.expanding.pop();
        result?;

        if builder.stack.len() != open {
            return Err(builder.malformed(format!("entity &{name}; is not well-formed")));
        }
        Ok(())
    }

    fn doctype(&mut self, builder: &mut TreeBuilder, declaration: &str) -> Result<(), XmlError> {
        let external = DOCTYPE_EXTERNAL_ID.captures(declaration);
        let rest_start = external.as_ref().map_or(0, |caps| caps.get(0).map_or(0, |m| m.end()));
        let system_id = external
            .as_ref()
            .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str().to_owned());

        let rest = &declaration[rest_start..];
        if let (Some(open), Some(close)) = (rest.find('['), rest.rfind(']')) {
            if open < close {
                let base = builder.base().clone();
                self.parse_dtd(builder, &rest[open + 1..close], &base, 0)?;
            }
        }

        if self.options.load_external_dtd {
            if let Some(system_id) = system_id {
                let url = Self::join(builder.base(), &system_id)?;
                tracing::debug!(dtd = %url, "Loading external DTD subset");
                let bytes = self.fetch(&url)?;
                let text = decode_bytes(&bytes, &url)?;
                self.parse_dtd(builder, &text, &url, 0)?;
            }
        }
        Ok(())
    }

    /// Collect entity declarations from DTD text.
    ///
    /// Earlier declarations win; parameter entity references load their
    /// declarations in place.
    fn parse_dtd(
        &mut self,
        builder: &mut TreeBuilder,
        dtd: &str,
        base: &Url,
        level: usize,
    ) -> Result<(), XmlError> {
        if level > self.options.max_depth {
            return Err(XmlError::TooDeep(base.to_string()));
        }

        for caps in DTD_TOKEN.captures_iter(dtd) {
            if let Some(name) = caps.get(8) {
                self.parameter_reference(builder, name.as_str(), base, level)?;
                continue;
            }
            let Some(name) = caps.get(2).map(|m| m.as_str().to_owned()) else {
                continue;
            };
            let is_parameter = caps.get(1).is_some();

            let entity = if let Some(literal) = caps.get(3).or_else(|| caps.get(4)) {
                let value = expand_char_references(literal.as_str());
                Entity::Internal(expand_parameters(&builder.parameters, &value))
            } else if caps.get(7).is_some() {
                Entity::Unparsed
            } else if let Some(system) = caps.get(5).or_else(|| caps.get(6)) {
                Entity::External {
                    url: Self::join(base, system.as_str())?,
                    text: None,
                }
            } else {
                continue;
            };

            let table = if is_parameter {
                &mut builder.parameters
            } else {
                &mut builder.entities
            };
            table.entry(name).or_insert(entity);
        }
        Ok(())
    }

    fn parameter_reference(
        &mut self,
        builder: &mut TreeBuilder,
        name: &str,
        base: &Url,
        level: usize,
    ) -> Result<(), XmlError> {
        match builder.parameters.get(name).cloned() {
            Some(Entity::Internal(value)) => self.parse_dtd(builder, &value, base, level + 1),
            Some(Entity::External { url, .. }) => {
                tracing::debug!(entities = %url, "Loading parameter entity");
                let bytes = self.fetch(&url)?;
                let text = decode_bytes(&bytes, &url)?;
                let text = TEXT_DECLARATION.replace(&text, "");
                self.parse_dtd(builder, &text, &url, level + 1)
            }
            Some(Entity::Unparsed) => Ok(()),
            None => {
                self.diagnostics
                    .warn(format!("Undeclared parameter entity %{name}; ignored"));
                Ok(())
            }
        }
    }

    fn xinclude(&mut self, builder: &mut TreeBuilder, include: Element) -> Result<(), XmlError> {
        let href = include.attr("href").unwrap_or_default().to_owned();
        let parse = include.attr("parse").unwrap_or("xml").to_owned();
        if include.attr("xpointer").is_some() {
            self.diagnostics.warn(format!(
                "xpointer on include of {href} is not supported, including the whole document"
            ));
        }
        if href.trim().is_empty() {
            self.diagnostics
                .error("xi:include without href is not supported".to_owned());
            return Err(builder.malformed("xi:include without href"));
        }

        let url = Self::join(builder.base(), &href)?;
        let included = match parse.as_str() {
            "xml" => self
                .fetch(&url)
                .and_then(|bytes| self.load(&bytes, &url, builder.depth + 1))
                .map(Node::Element),
            "text" => self
                .fetch(&url)
                .map(|bytes| Node::Text(String::from_utf8_lossy(&bytes).into_owned())),
            other => {
                self.diagnostics
                    .error(format!("xi:include of {href} has invalid parse=\"{other}\""));
                return Err(builder.malformed(format!("invalid xi:include parse value {other:?}")));
            }
        };

        match included {
            Ok(node) => builder.attach(node),
            Err(err @ XmlError::TooDeep(_)) => Err(err),
            Err(err) => {
                let Some(fallback) = include.child(Some(XINCLUDE_NS), "fallback") else {
                    return Err(err);
                };
                self.diagnostics
                    .warn(format!("Using xi:fallback for {url}: {err}"));
                for child in fallback.children.clone() {
                    builder.attach(child)?;
                }
                Ok(())
            }
        }
    }
}

fn start_frame(
    builder: &TreeBuilder,
    decoder: &quick_xml::encoding::Decoder,
    e: &BytesStart<'_>,
) -> Result<Frame, XmlError> {
    let qname = decoder.decode(e.name().as_ref())?.into_owned();
    let mut namespaces = Vec::new();
    let mut raw_attributes = Vec::new();

    for attr in e.attributes() {
        let attr = attr?;
        let key = decoder.decode(attr.key.as_ref())?.into_owned();
        let value = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => builder.expand_attribute(&decoder.decode(&attr.value)?, 0),
        };
        if key == "xmlns" {
            namespaces.push((String::new(), value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            namespaces.push((prefix.to_owned(), value));
        } else {
            raw_attributes.push((key, value));
        }
    }

    let mut element = Element::new(builder.resolve_name(&qname, &namespaces, false)?);
    for (key, value) in raw_attributes {
        element.attributes.push(Attribute {
            name: builder.resolve_name(&key, &namespaces, true)?,
            value,
        });
    }
    Ok(Frame {
        element,
        namespaces,
    })
}

fn expand_parameters(parameters: &HashMap<String, Entity>, value: &str) -> String {
    if !value.contains('%') {
        return value.to_owned();
    }
    PARAMETER_REFERENCE
        .replace_all(value, |caps: &regex::Captures<'_>| match parameters.get(&caps[1]) {
            Some(Entity::Internal(text)) => text.clone(),
            _ => caps[0].to_owned(),
        })
        .into_owned()
}

fn decode_bytes(bytes: &[u8], url: &Url) -> Result<String, XmlError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8(bytes.to_vec()).map_err(|_| XmlError::Malformed {
        url: url.to_string(),
        message: "document is not valid UTF-8".to_owned(),
    })
}
