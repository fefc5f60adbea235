//! Render a [`Document`] back to markup.

use quick_xml::escape::{escape, partial_escape};

use super::html::{RAW_TEXT_ELEMENTS, VOID_ELEMENTS};
use super::{Document, Element, NodeData, NodeId, XHTML_NS};

/// Serialize with XML syntax. Unprefixed elements whose namespace differs
/// from the one in scope get an `xmlns` declaration.
pub fn to_xml(doc: &Document) -> String {
    let mut out = String::new();
    for child in doc.children(doc.root()) {
        write_xml_node(doc, *child, None, &mut out);
        if !matches!(doc.data(*child), NodeData::Text(_)) {
            out.push('\n');
        }
    }
    out
}

fn write_xml_node(doc: &Document, id: NodeId, default_ns: Option<&str>, out: &mut String) {
    match doc.data(id) {
        NodeData::Document => {}
        NodeData::Doctype(content) => {
            out.push_str("<!DOCTYPE ");
            out.push_str(content);
            out.push('>');
        }
        NodeData::Text(text) => out.push_str(&partial_escape(text.as_str())),
        NodeData::CData(text) => {
            out.push_str("<![CDATA[");
            out.push_str(text);
            out.push_str("]]>");
        }
        NodeData::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        NodeData::ProcessingInstruction(text) => {
            out.push_str("<?");
            out.push_str(text);
            out.push_str("?>");
        }
        NodeData::Element(el) => {
            let declared = el.attr("xmlns");
            let needs_decl = el.prefix.is_none()
                && declared.is_none()
                && el.namespace.as_deref() != default_ns;
            let scope = if el.prefix.is_none() {
                el.namespace.as_deref()
            } else {
                declared.or(default_ns)
            };

            out.push('<');
            out.push_str(&el.qualified_name());
            if needs_decl {
                out.push_str(" xmlns=\"");
                out.push_str(&escape(el.namespace.as_deref().unwrap_or("")));
                out.push('"');
            }
            write_attributes(el, out);

            let children = doc.children(id);
            if children.is_empty() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for child in children {
                write_xml_node(doc, *child, scope, out);
            }
            out.push_str("</");
            out.push_str(&el.qualified_name());
            out.push('>');
        }
    }
}

/// Serialize with HTML syntax: void elements without end tags, raw
/// `script`/`style` text, and self-closing empty foreign elements.
pub fn to_html(doc: &Document) -> String {
    let mut out = String::new();
    for child in doc.children(doc.root()) {
        write_html_node(doc, *child, false, &mut out);
        if matches!(doc.data(*child), NodeData::Doctype(_)) {
            out.push('\n');
        }
    }
    out
}

fn write_html_node(doc: &Document, id: NodeId, raw: bool, out: &mut String) {
    match doc.data(id) {
        NodeData::Document => {}
        NodeData::Doctype(content) => {
            out.push_str("<!DOCTYPE ");
            out.push_str(content);
            out.push('>');
        }
        NodeData::Text(text) | NodeData::CData(text) => {
            if raw {
                out.push_str(text);
            } else {
                out.push_str(&partial_escape(text.as_str()));
            }
        }
        NodeData::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        NodeData::ProcessingInstruction(text) => {
            out.push_str("<?");
            out.push_str(text);
            out.push('>');
        }
        NodeData::Element(el) => {
            let name = el.qualified_name();
            let is_html = el.namespace.as_deref() == Some(XHTML_NS);
            let children = doc.children(id);

            out.push('<');
            out.push_str(&name);
            write_attributes(el, out);

            if is_html && VOID_ELEMENTS.contains(&el.local_name.as_str()) {
                out.push('>');
                return;
            }
            if !is_html && children.is_empty() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            let raw = is_html && RAW_TEXT_ELEMENTS.contains(&el.local_name.as_str());
            for child in children {
                write_html_node(doc, *child, raw, out);
            }
            out.push_str("</");
            out.push_str(&name);
            out.push('>');
        }
    }
}

fn write_attributes(el: &Element, out: &mut String) {
    for attr in &el.attributes {
        out.push(' ');
        out.push_str(&attr.name);
        out.push_str("=\"");
        out.push_str(&escape(attr.value.as_str()));
        out.push('"');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{parse_html, parse_xml, SVG_NS};

    #[test]
    fn test_xml_round_trip_keeps_structure() {
        let source = "<html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>a &lt; b</title></head><body><p class=\"x\"/></body></html>";
        let doc = parse_xml(source).unwrap();
        assert_eq!(to_xml(&doc).trim_end(), source);
    }

    #[test]
    fn test_xml_declares_foreign_default_namespace() {
        let mut doc = parse_xml(
            "<svg xmlns=\"http://www.w3.org/2000/svg\"><g id=\"testmeta\"></g></svg>",
        )
        .unwrap();
        let svg = doc.document_element().unwrap();
        let g = doc.find_child(svg, SVG_NS, "g").unwrap();
        let mut link = Element::new(Some(XHTML_NS), "link");
        link.set_attr("rel", "match");
        doc.append_element(g, link);

        let out = to_xml(&doc);
        assert!(out.contains("<link xmlns=\"http://www.w3.org/1999/xhtml\" rel=\"match\"/>"));
    }

    #[test]
    fn test_html_void_and_raw_text() {
        let doc = parse_html(
            "<!DOCTYPE html><title>T</title><meta name=flags content=ahem><script>if (a < b) {}</script><p>x &amp; y",
        )
        .unwrap();
        let out = to_html(&doc);
        assert!(out.starts_with("<!DOCTYPE html>\n<html>"));
        assert!(out.contains("<meta name=\"flags\" content=\"ahem\">"));
        assert!(!out.contains("</meta>"));
        assert!(out.contains("<script>if (a < b) {}</script>"));
        assert!(out.contains("<p>x &amp; y</p>"));
    }
}
