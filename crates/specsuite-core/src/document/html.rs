//! Lenient HTML tree building.
//!
//! Tokenizes with quick-xml in its permissive mode and applies the parts of
//! the HTML tree construction rules that matter for test metadata: implied
//! `html`/`head`/`body`, void elements, raw-text `script`/`style`, implied
//! paragraph and list item closing, and foreign `svg`/`math` subtrees.
//! Names of HTML elements and attributes are lower-cased; every HTML
//! element lands in the XHTML namespace.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::xml::{split_qname, unescape_text, LineCounter};
use super::{
    Attribute, Document, Element, NodeData, NodeId, ParseFailure, Syntax, MATHML_NS, SVG_NS,
    XHTML_NS,
};

pub(super) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "basefont", "bgsound", "br", "col", "embed", "frame", "hr", "img", "input",
    "keygen", "link", "meta", "param", "source", "track", "wbr",
];

pub(super) const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

const ESCAPABLE_RAW_TEXT_ELEMENTS: &[&str] = &["title", "textarea"];

const HEAD_ELEMENTS: &[&str] = &[
    "base", "basefont", "bgsound", "link", "meta", "script", "style", "title",
];

const CLOSES_P: &[&str] = &[
    "address", "article", "aside", "blockquote", "center", "details", "dialog", "dir", "div",
    "dl", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5",
    "h6", "header", "hgroup", "hr", "li", "main", "menu", "nav", "ol", "p", "pre", "section",
    "summary", "table", "ul",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Mode {
    BeforeHtml,
    BeforeHead,
    InHead,
    AfterHead,
    InBody,
}

/// Parse an HTML document. Only tokenizer-level breakage (for example an
/// unterminated comment) fails; tree construction always recovers.
pub fn parse_html(text: &str) -> Result<Document, ParseFailure> {
    let mut builder = TreeBuilder::new();
    let mut lines = LineCounter::new(text);
    let mut base = 0usize;
    let mut reader = permissive_reader(text);

    loop {
        let offset = base + reader.buffer_position() as usize;
        let line = lines.line_at(offset);
        let event = reader.read_event().map_err(|e| ParseFailure {
            message: e.to_string(),
            line,
        })?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let reclaimed = if matches!(event, Event::Empty(_)) {
                    unquoted_trailing_slash(e)
                } else {
                    None
                };
                let self_closing = matches!(event, Event::Empty(_)) && reclaimed.is_none();
                let start: &BytesStart<'_> = match &reclaimed {
                    Some(fixed) => fixed,
                    None => e,
                };
                let Some(name) = tag_name(start) else {
                    builder.text(&format!("<{}>", String::from_utf8_lossy(start)));
                    continue;
                };
                let raw_kind = builder.start_tag(&name, start, line, self_closing);

                if let Some(escapable) = raw_kind {
                    let after = base + reader.buffer_position() as usize;
                    let (content, resume) = raw_text_until(text, after, &name);
                    let content = if escapable {
                        unescape_text(content).into_owned()
                    } else {
                        content.to_string()
                    };
                    builder.raw_text(&content);
                    builder.end_tag(&name);
                    base = resume;
                    reader = permissive_reader(&text[resume..]);
                }
            }
            Event::End(ref e) => {
                let raw = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let name = raw.trim().to_string();
                if name.is_empty() {
                    builder.text("</>");
                } else {
                    builder.end_tag(&name);
                }
            }
            Event::Text(ref e) => {
                let raw = String::from_utf8_lossy(e);
                builder.text(&unescape_text(&raw));
            }
            Event::CData(ref e) => {
                builder.text(&String::from_utf8_lossy(e));
            }
            Event::Comment(ref e) => {
                builder.comment(&String::from_utf8_lossy(e));
            }
            Event::PI(ref e) => {
                builder.comment(&format!("?{}?", String::from_utf8_lossy(e)));
            }
            Event::DocType(ref e) => {
                builder.doctype(String::from_utf8_lossy(e).trim());
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(builder.finish())
}

fn permissive_reader(text: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(text);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    config.check_comments = false;
    reader
}

/// Tag name of a start tag, or `None` when the `<` did not begin a tag.
fn tag_name(start: &BytesStart<'_>) -> Option<String> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    name.chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        .then_some(name)
}

/// quick-xml reads `<a href=x/>` as a self-closing tag, but in HTML the
/// slash belongs to the unquoted value. Returns the tag with the slash put
/// back when the last attribute is unquoted and runs into it.
fn unquoted_trailing_slash(start: &BytesStart<'_>) -> Option<BytesStart<'static>> {
    let content = std::str::from_utf8(start).ok()?;
    let last = content.rsplit(|c: char| c.is_ascii_whitespace()).next()?;
    let unquoted = last
        .split_once('=')
        .is_some_and(|(_, value)| !value.is_empty() && !value.ends_with(['"', '\'']));
    if !unquoted {
        return None;
    }
    let name_len = start.name().as_ref().len();
    Some(BytesStart::from_content(format!("{}/", content), name_len))
}

/// Find the end tag closing a raw text element that starts at `from`.
/// Returns the content and the offset just past the end tag.
fn raw_text_until<'t>(text: &'t str, from: usize, name: &str) -> (&'t str, usize) {
    let lower = text[from..].to_ascii_lowercase();
    let needle = format!("</{}", name.to_ascii_lowercase());
    let mut search = 0;

    while let Some(found) = lower[search..].find(&needle) {
        let start = search + found;
        let after = start + needle.len();
        let boundary = lower[after..]
            .chars()
            .next()
            .map_or(true, |c| c == '>' || c == '/' || c.is_ascii_whitespace());
        if boundary {
            let close = lower[after..]
                .find('>')
                .map(|i| after + i + 1)
                .unwrap_or(lower.len());
            return (&text[from..from + start], from + close);
        }
        search = after;
    }
    (&text[from..], text.len())
}

struct TreeBuilder {
    doc: Document,
    mode: Mode,
    html: Option<NodeId>,
    head: Option<NodeId>,
    body: Option<NodeId>,
    stack: Vec<NodeId>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            doc: Document::new(Syntax::Html),
            mode: Mode::BeforeHtml,
            html: None,
            head: None,
            body: None,
            stack: Vec::new(),
        }
    }

    fn current(&self) -> NodeId {
        self.stack.last().copied().unwrap_or(self.doc.root())
    }

    fn current_namespace(&self) -> Option<&str> {
        self.stack
            .last()
            .and_then(|id| self.doc.element(*id))
            .and_then(|el| el.namespace.as_deref())
    }

    fn in_foreign_content(&self) -> bool {
        matches!(self.current_namespace(), Some(SVG_NS) | Some(MATHML_NS))
    }

    fn ensure_html(&mut self, attributes: Vec<Attribute>, line: Option<usize>) -> NodeId {
        if let Some(html) = self.html {
            return html;
        }
        let mut element = Element::new(Some(XHTML_NS), "html");
        element.attributes = attributes;
        element.line = line;
        let root = self.doc.root();
        let html = self.doc.append_element(root, element);
        self.html = Some(html);
        self.stack = vec![html];
        self.mode = Mode::BeforeHead;
        html
    }

    fn ensure_head(&mut self, attributes: Vec<Attribute>, line: Option<usize>) -> NodeId {
        if let Some(head) = self.head {
            return head;
        }
        let html = self.ensure_html(Vec::new(), None);
        let mut element = Element::new(Some(XHTML_NS), "head");
        element.attributes = attributes;
        element.line = line;
        let head = self.doc.append_element(html, element);
        self.head = Some(head);
        self.stack.push(head);
        self.mode = Mode::InHead;
        head
    }

    fn leave_head(&mut self) {
        if self.mode == Mode::InHead {
            if let Some(pos) = self.stack.iter().position(|id| Some(*id) == self.head) {
                self.stack.truncate(pos);
            }
            self.mode = Mode::AfterHead;
        }
    }

    fn ensure_body(&mut self, attributes: Vec<Attribute>, line: Option<usize>) -> NodeId {
        if let Some(body) = self.body {
            return body;
        }
        self.ensure_head(Vec::new(), None);
        self.leave_head();
        let html = self.ensure_html(Vec::new(), None);
        let mut element = Element::new(Some(XHTML_NS), "body");
        element.attributes = attributes;
        element.line = line;
        let body = self.doc.append_element(html, element);
        self.body = Some(body);
        self.stack = vec![html, body];
        self.mode = Mode::InBody;
        body
    }

    fn doctype(&mut self, content: &str) {
        if self.mode == Mode::BeforeHtml {
            let node = self.doc.create(NodeData::Doctype(content.to_string()));
            let root = self.doc.root();
            self.doc.append(root, node);
        }
    }

    fn comment(&mut self, content: &str) {
        let node = self.doc.create(NodeData::Comment(content.to_string()));
        let parent = self.current();
        self.doc.append(parent, node);
    }

    fn text(&mut self, content: &str) {
        if content.is_empty() {
            return;
        }
        if self.mode < Mode::InBody && !content.chars().all(char::is_whitespace) {
            self.ensure_body(Vec::new(), None);
        }
        if self.mode == Mode::BeforeHtml {
            return;
        }
        let parent = self.current();
        self.doc.append_text(parent, content);
    }

    fn raw_text(&mut self, content: &str) {
        if !content.is_empty() {
            let parent = self.current();
            self.doc.append_text(parent, content);
        }
    }

    /// Handle a start tag. Returns `Some(escapable)` when the caller must
    /// consume the element's raw text content.
    fn start_tag(
        &mut self,
        raw_name: &str,
        start: &BytesStart<'_>,
        line: usize,
        self_closing: bool,
    ) -> Option<bool> {
        if self.in_foreign_content() {
            let namespace = self.current_namespace().map(str::to_string);
            let element = self.make_element(raw_name, namespace.as_deref(), start, line, false);
            let parent = self.current();
            let node = self.doc.append_element(parent, element);
            if !self_closing {
                self.stack.push(node);
            }
            return None;
        }

        let name = raw_name.to_ascii_lowercase();
        match name.as_str() {
            "html" => {
                let attributes = html_attributes(start, true);
                self.ensure_html(attributes, Some(line));
                None
            }
            "head" if self.mode <= Mode::BeforeHead => {
                let attributes = html_attributes(start, true);
                self.ensure_head(attributes, Some(line));
                None
            }
            "head" => None,
            "body" => {
                let attributes = html_attributes(start, true);
                self.ensure_body(attributes, Some(line));
                None
            }
            _ if self.mode < Mode::InBody && HEAD_ELEMENTS.contains(&name.as_str()) => {
                let head = self.ensure_head(Vec::new(), None);
                let element = self.make_element(&name, Some(XHTML_NS), start, line, true);
                let node = self.doc.append_element(head, element);
                self.open_unless_void(&name, node, self_closing)
            }
            _ => {
                self.ensure_body(Vec::new(), None);
                if CLOSES_P.contains(&name.as_str()) {
                    self.close_open_p();
                }
                if name == "li" {
                    self.close_in_scope("li");
                }
                let namespace = match name.as_str() {
                    "svg" => SVG_NS,
                    "math" => MATHML_NS,
                    _ => XHTML_NS,
                };
                let element = if namespace == XHTML_NS {
                    self.make_element(&name, Some(namespace), start, line, true)
                } else {
                    self.make_element(raw_name, Some(namespace), start, line, false)
                };
                let parent = self.current();
                let node = self.doc.append_element(parent, element);
                if namespace != XHTML_NS {
                    if !self_closing {
                        self.stack.push(node);
                    }
                    return None;
                }
                self.open_unless_void(&name, node, self_closing)
            }
        }
    }

    fn open_unless_void(&mut self, name: &str, node: NodeId, self_closing: bool) -> Option<bool> {
        if VOID_ELEMENTS.contains(&name) {
            return None;
        }
        let raw = RAW_TEXT_ELEMENTS.contains(&name);
        let escapable = ESCAPABLE_RAW_TEXT_ELEMENTS.contains(&name);
        if self_closing && (raw || escapable) {
            return None;
        }
        self.stack.push(node);
        if raw {
            Some(false)
        } else if escapable {
            Some(true)
        } else {
            None
        }
    }

    fn end_tag(&mut self, raw_name: &str) {
        let name = raw_name.to_ascii_lowercase();
        match name.as_str() {
            "head" => self.leave_head(),
            "html" | "body" => {}
            _ => {
                let floor = if self.body.is_some() { 2 } else { 1 };
                let found = (floor..self.stack.len()).rev().find(|&i| {
                    self.doc.element(self.stack[i]).is_some_and(|el| {
                        if el.namespace.as_deref() == Some(XHTML_NS) {
                            el.local_name == name
                        } else {
                            el.qualified_name() == raw_name
                                || el.qualified_name().eq_ignore_ascii_case(raw_name)
                        }
                    })
                });
                if let Some(index) = found {
                    self.stack.truncate(index);
                }
            }
        }
    }

    fn close_open_p(&mut self) {
        self.close_in_scope("p");
    }

    fn close_in_scope(&mut self, name: &str) {
        let found = self.stack.iter().rposition(|id| {
            self.doc
                .element(*id)
                .is_some_and(|el| el.is(XHTML_NS, name))
        });
        if let Some(index) = found {
            self.stack.truncate(index);
        }
    }

    fn make_element(
        &self,
        name: &str,
        namespace: Option<&str>,
        start: &BytesStart<'_>,
        line: usize,
        lowercase_attrs: bool,
    ) -> Element {
        let (prefix, local_name) = split_qname(name);
        Element {
            prefix: prefix.map(str::to_string),
            local_name: local_name.to_string(),
            namespace: namespace.map(str::to_string),
            attributes: html_attributes(start, lowercase_attrs),
            line: Some(line),
        }
    }

    fn finish(mut self) -> Document {
        self.ensure_body(Vec::new(), None);
        self.doc
    }
}

/// Attributes of an HTML start tag. Unquoted and valueless attributes are
/// accepted; later duplicates are dropped.
fn html_attributes(start: &BytesStart<'_>, lowercase: bool) -> Vec<Attribute> {
    let mut attributes: Vec<Attribute> = Vec::new();
    for attr in start.html_attributes().with_checks(false) {
        let Ok(attr) = attr else {
            break;
        };
        let mut name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if lowercase {
            name.make_ascii_lowercase();
        }
        if attributes.iter().any(|a| a.name == name) {
            continue;
        }
        let raw = String::from_utf8_lossy(&attr.value);
        attributes.push(Attribute {
            name,
            value: unescape_text(&raw).into_owned(),
        });
    }
    attributes
}
