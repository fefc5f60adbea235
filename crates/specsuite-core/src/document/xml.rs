//! Strict XML tree building on top of quick-xml.

use std::borrow::Cow;

use quick_xml::escape::{resolve_html5_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{Attribute, Document, Element, NodeData, NodeId, ParseFailure, Syntax, XML_NS};

/// Parse well-formed XML into a [`Document`].
///
/// Fails on the first well-formedness error: mismatched or unclosed tags,
/// duplicate attributes, content outside the root element, or a missing
/// root element.
pub fn parse_xml(text: &str) -> Result<Document, ParseFailure> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().check_end_names = true;

    let mut lines = LineCounter::new(text);
    let mut doc = Document::new(Syntax::Xml);
    let mut stack: Vec<NodeId> = vec![doc.root()];
    let mut scopes = NamespaceScopes::default();
    let mut seen_root = false;

    loop {
        let line = lines.line_at(reader.buffer_position() as usize);
        let event = reader.read_event().map_err(|e| ParseFailure {
            message: e.to_string(),
            line: lines.line_at(reader.buffer_position() as usize),
        })?;
        let current = *stack.last().unwrap_or(&doc.root());
        let at_top = stack.len() == 1;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                if at_top {
                    if seen_root {
                        return Err(failure("Extra content at the end of the document", line));
                    }
                    seen_root = true;
                }
                let element = build_element(e, line, &mut scopes)?;
                let node = doc.append_element(current, element);
                if matches!(event, Event::Start(_)) {
                    stack.push(node);
                } else {
                    scopes.pop();
                }
            }
            Event::End(_) => {
                stack.pop();
                scopes.pop();
            }
            Event::Text(ref e) => {
                let raw = std::str::from_utf8(e).map_err(|err| failure(&err.to_string(), line))?;
                if at_top {
                    if !raw.trim().is_empty() {
                        let message = if seen_root {
                            "Extra content at the end of the document"
                        } else {
                            "Start tag expected, '<' not found"
                        };
                        return Err(failure(message, line));
                    }
                } else {
                    doc.append_text(current, &unescape_text(raw));
                }
            }
            Event::CData(ref e) => {
                if at_top {
                    return Err(failure("CDATA section outside the root element", line));
                }
                let node = doc.create(NodeData::CData(String::from_utf8_lossy(e).into_owned()));
                doc.append(current, node);
            }
            Event::Comment(ref e) => {
                let node = doc.create(NodeData::Comment(String::from_utf8_lossy(e).into_owned()));
                doc.append(current, node);
            }
            Event::PI(ref e) => {
                let node = doc.create(NodeData::ProcessingInstruction(
                    String::from_utf8_lossy(e).into_owned(),
                ));
                doc.append(current, node);
            }
            Event::DocType(ref e) => {
                if seen_root {
                    return Err(failure("DOCTYPE after the root element", line));
                }
                let node = doc.create(NodeData::Doctype(
                    String::from_utf8_lossy(e).trim().to_string(),
                ));
                doc.append(current, node);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.get(1) {
        let (name, open_line) = doc
            .element(*open)
            .map(|el| (el.qualified_name(), el.line.unwrap_or(1)))
            .unwrap_or_default();
        return Err(failure(
            &format!("Premature end of data in tag {} line {}", name, open_line),
            lines.line_at(text.len()),
        ));
    }
    if !seen_root {
        return Err(failure("Document is empty", lines.line_at(text.len())));
    }

    Ok(doc)
}

fn failure(message: &str, line: usize) -> ParseFailure {
    ParseFailure {
        message: message.to_string(),
        line,
    }
}

fn build_element(
    start: &BytesStart<'_>,
    line: usize,
    scopes: &mut NamespaceScopes,
) -> Result<Element, ParseFailure> {
    let qname = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| failure(&e.to_string(), line))?
        .to_string();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| failure(&e.to_string(), line))?;
        let name = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| failure(&e.to_string(), line))?
            .to_string();
        let raw = std::str::from_utf8(&attr.value).map_err(|e| failure(&e.to_string(), line))?;
        attributes.push(Attribute {
            name,
            value: unescape_text(raw).into_owned(),
        });
    }

    scopes.push(&attributes);
    let (prefix, local_name) = split_qname(&qname);
    let namespace = scopes.resolve(prefix.unwrap_or(""));

    Ok(Element {
        prefix: prefix.map(str::to_string),
        local_name: local_name.to_string(),
        namespace,
        attributes,
        line: Some(line),
    })
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Split `prefix:local` into its parts.
pub(super) fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() => (Some(prefix), local),
        _ => (None, qname),
    }
}

/// Resolve character and entity references, keeping the raw text when a
/// reference is malformed or unknown.
pub(super) fn unescape_text(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }
    unescape_with(raw, resolve_html5_entity).unwrap_or(Cow::Borrowed(raw))
}

/// Maps byte offsets to 1-based line numbers, scanning forward only.
pub(super) struct LineCounter<'a> {
    bytes: &'a [u8],
    offset: usize,
    line: usize,
}

impl<'a> LineCounter<'a> {
    pub(super) fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            offset: 0,
            line: 1,
        }
    }

    pub(super) fn line_at(&mut self, offset: usize) -> usize {
        let offset = offset.min(self.bytes.len());
        if offset < self.offset {
            self.offset = 0;
            self.line = 1;
        }
        self.line += self.bytes[self.offset..offset]
            .iter()
            .filter(|&&b| b == b'\n')
            .count();
        self.offset = offset;
        self.line
    }
}

/// Stack of in-scope namespace declarations, one frame per open element.
#[derive(Default)]
struct NamespaceScopes {
    frames: Vec<Vec<(String, String)>>,
}

impl NamespaceScopes {
    fn push(&mut self, attributes: &[Attribute]) {
        let frame = attributes
            .iter()
            .filter_map(|attr| {
                if attr.name == "xmlns" {
                    Some((String::new(), attr.value.clone()))
                } else {
                    attr.name
                        .strip_prefix("xmlns:")
                        .map(|prefix| (prefix.to_string(), attr.value.clone()))
                }
            })
            .collect();
        self.frames.push(frame);
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    fn resolve(&self, prefix: &str) -> Option<String> {
        if prefix == "xml" {
            return Some(XML_NS.to_string());
        }
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter())
            .find(|(p, _)| p == prefix)
            .and_then(|(_, uri)| (!uri.is_empty()).then(|| uri.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{SVG_NS, XHTML_NS};

    #[test]
    fn test_parse_xhtml_with_namespaces_and_lines() {
        let doc = parse_xml(
            "<html xmlns=\"http://www.w3.org/1999/xhtml\">\n<head>\n<title>T &amp; &nbsp;x</title>\n</head>\n</html>",
        )
        .unwrap();
        let html = doc.document_element().unwrap();
        let head = doc.find_child(html, XHTML_NS, "head").unwrap();
        let title = doc.find_child(head, XHTML_NS, "title").unwrap();

        assert_eq!(doc.element(head).unwrap().line, Some(2));
        assert_eq!(doc.element(title).unwrap().line, Some(3));
        assert_eq!(doc.leading_text(title).as_deref(), Some("T & \u{A0}x"));
    }

    #[test]
    fn test_prefixed_namespace() {
        let doc = parse_xml(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:h=\"http://www.w3.org/1999/xhtml\"><g id=\"testmeta\"><h:link rel=\"help\"/></g></svg>",
        )
        .unwrap();
        let svg = doc.document_element().unwrap();
        let g = doc.find_child(svg, SVG_NS, "g").unwrap();
        let link = doc.find_child(g, XHTML_NS, "link").unwrap();
        let el = doc.element(link).unwrap();
        assert_eq!(el.prefix.as_deref(), Some("h"));
        assert_eq!(el.attr("rel"), Some("help"));
    }

    #[test]
    fn test_mismatched_end_tag_fails() {
        let err = parse_xml("<a>\n<b></a>").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_unclosed_element_fails() {
        assert!(parse_xml("<a><b></b>").is_err());
        assert!(parse_xml("<a>\n<b>").is_err());
    }

    #[test]
    fn test_empty_and_extra_roots_fail() {
        assert!(parse_xml("<!-- nothing -->").is_err());
        assert!(parse_xml("<a/><b/>").is_err());
        assert!(parse_xml("text<a/>").is_err());
    }

    #[test]
    fn test_duplicate_attribute_fails() {
        assert!(parse_xml("<a x=\"1\" x=\"2\"/>").is_err());
    }
}
