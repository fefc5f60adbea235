//! Parsing and metadata extraction for markup assets.

use std::path::Path;
use std::rc::Rc;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use tracing::{debug, warn};

use super::{reference_name, AssetError};
use crate::document::{
    parse_html, parse_xml, syntax_error_document, Document, Element, NodeId, Syntax, SVG_NS,
    XHTML_NS,
};
use crate::encoding::{self, Encoding};
use crate::metadata::{Diagnostic, MetadataFields, UserData};
use crate::mime;
use crate::reference::{RawReference, ReferenceKind};

/// Markup dialect of an asset, fixed when the asset is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Xhtml,
    Html,
    Svg,
    Xml,
}

impl DocumentKind {
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        match mime_type {
            mime::XHTML => Some(DocumentKind::Xhtml),
            mime::HTML => Some(DocumentKind::Html),
            mime::SVG => Some(DocumentKind::Svg),
            mime::XML => Some(DocumentKind::Xml),
            _ => None,
        }
    }

    pub fn syntax(&self) -> Syntax {
        match self {
            DocumentKind::Html => Syntax::Html,
            _ => Syntax::Xml,
        }
    }

    fn detect_encoding(&self, bytes: &[u8]) -> Encoding {
        match self {
            DocumentKind::Html => encoding::detect_html(bytes),
            _ => encoding::detect_xml(bytes),
        }
    }

    fn missing_container_message(&self) -> &'static str {
        match self {
            DocumentKind::Svg => "Missing <g id='testmeta'> element",
            _ => "Missing <head> element",
        }
    }
}

/// Everything a markup asset learns from parsing.
#[derive(Debug, Default)]
pub(crate) struct MarkupState {
    pub parsed: bool,
    pub document: Option<Document>,
    pub encoding: Option<Encoding>,
    pub errors: Option<Vec<Diagnostic>>,
    pub fields: Option<MetadataFields>,
    pub references: IndexMap<String, RawReference>,
    pub scripts: IndexMap<String, NodeId>,
    /// Injected nodes and the tag they were injected under
    pub injected: Vec<(NodeId, String)>,
}

/// Parse `bytes` and extract metadata.
pub(crate) fn load(
    kind: DocumentKind,
    bytes: Result<Rc<[u8]>, AssetError>,
    source_path: &Path,
    rel_path: &Path,
) -> MarkupState {
    let mut state = MarkupState {
        parsed: true,
        ..MarkupState::default()
    };
    let file_name = source_path.display().to_string();

    let bytes = match bytes {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(path = %file_name, error = %err, "Unreadable source file");
            state.document = Some(syntax_error_document(&file_name, &err.to_string()));
            state.errors = Some(vec![Diagnostic::new(err.to_string())]);
            return state;
        }
    };
    if bytes.is_empty() {
        state.errors = Some(vec![Diagnostic::new("Empty source file")]);
        return state;
    }

    let encoding = kind.detect_encoding(&bytes);
    let text = encoding.decode(&bytes);
    let parsed = match kind.syntax() {
        Syntax::Xml => parse_xml(&text),
        Syntax::Html => parse_html(&text),
    };

    match parsed {
        Ok(doc) => {
            debug!(path = %file_name, encoding = %encoding, "Parsed document");
            let extraction = extract(&doc, kind, rel_path);
            state.encoding = Some(encoding);
            state.errors = Some(extraction.errors);
            state.fields = (!extraction.fields.is_empty()).then_some(extraction.fields);
            state.references = extraction.references;
            state.scripts = extraction.scripts;
            state.document = Some(doc);
        }
        Err(failure) => {
            warn!(path = %file_name, error = %failure, "PARSE ERROR");
            state.encoding = Some(Encoding::Utf8);
            state.document = Some(syntax_error_document(&file_name, &failure.to_string()));
            state.errors = Some(vec![Diagnostic::new(failure.to_string())]);
        }
    }
    state
}

/// The element holding test metadata: `<head>` for the XHTML family,
/// `<g id="testmeta">` for SVG.
pub(crate) fn container(doc: &Document, kind: DocumentKind) -> Option<NodeId> {
    let root = doc.document_element()?;
    match kind {
        DocumentKind::Svg => doc.child_elements(root).find(|id| {
            doc.element(*id)
                .is_some_and(|el| el.is(SVG_NS, "g") && el.attr("id") == Some("testmeta"))
        }),
        _ => doc.find_child(root, XHTML_NS, "head"),
    }
}

// ============================================================================
// Extraction
// ============================================================================

#[derive(Debug, Default)]
struct Extraction {
    fields: MetadataFields,
    references: IndexMap<String, RawReference>,
    scripts: IndexMap<String, NodeId>,
    errors: Vec<Diagnostic>,
}

fn title_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)^[^:]*test[^:]*:(.*)").expect("valid title regex"))
}

/// Whether the whitespace-separated `value` contains `token`.
fn token_match(token: &str, value: Option<&str>) -> bool {
    value.is_some_and(|v| v.split_whitespace().any(|t| t == token))
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn extract(doc: &Document, kind: DocumentKind, rel_path: &Path) -> Extraction {
    let mut out = Extraction::default();
    let mut read_flags = false;

    let nodes: Vec<NodeId> = container(doc, kind)
        .map(|c| doc.child_elements(c).collect())
        .unwrap_or_default();
    if nodes.is_empty() {
        out.errors
            .push(Diagnostic::new(kind.missing_container_message()));
        return out;
    }

    let svg = kind == DocumentKind::Svg;
    let meta_ns = if svg { SVG_NS } else { XHTML_NS };

    for node in nodes {
        let Some(el) = doc.element(node) else {
            continue;
        };
        let line = el.line;

        if el.is(XHTML_NS, "link") {
            read_link(&mut out, node, el.attr("rel"), el, rel_path, line);
        } else if !svg && el.is(XHTML_NS, "meta") {
            match el.attr("name").map(str::trim) {
                Some("flags") => {
                    if read_flags {
                        out.errors.push(Diagnostic::at_line(
                            "Flags must only be specified once.",
                            line,
                        ));
                    } else {
                        read_flags = true;
                        match el.attr("content") {
                            Some(content) => out.fields.flags = sorted_tokens(content),
                            None => out.errors.push(Diagnostic::at_line(
                                "Flags meta missing content attribute.",
                                line,
                            )),
                        }
                    }
                }
                Some("assert") => match el.attr("content") {
                    Some(content) => out.fields.asserts.push(clean_assert(content)),
                    None => out.errors.push(Diagnostic::at_line(
                        "Assert meta missing content attribute.",
                        line,
                    )),
                },
                _ => {}
            }
        } else if svg && el.is(SVG_NS, "metadata") {
            if el.attr("class").map(str::trim) == Some("flags") {
                if read_flags {
                    out.errors.push(Diagnostic::at_line(
                        "Flags must only be specified once.",
                        line,
                    ));
                } else {
                    read_flags = true;
                    let text = doc
                        .find_child(node, SVG_NS, "text")
                        .and_then(|t| doc.leading_text(t))
                        .or_else(|| doc.leading_text(node));
                    if let Some(text) = text {
                        out.fields.flags = sorted_tokens(&text);
                    }
                }
            }
        } else if svg && el.is(SVG_NS, "desc") {
            if el.attr("class").map(str::trim) == Some("assert") {
                match doc.leading_text(node).filter(|t| !t.trim().is_empty()) {
                    Some(text) => out.fields.asserts.push(clean_assert(&text)),
                    None => out.errors.push(Diagnostic::at_line(
                        "Assert meta missing content attribute.",
                        line,
                    )),
                }
            }
        } else if el.is(meta_ns, "title") {
            out.fields.title = clean_title(&doc.leading_text(node).unwrap_or_default());
        } else if el.is(meta_ns, "script") {
            if let Some(src) = trimmed(el.attr("src")) {
                out.scripts.insert(src.to_string(), node);
            }
        }
    }
    out
}

fn read_link(
    out: &mut Extraction,
    node: NodeId,
    rel: Option<&str>,
    el: &Element,
    rel_path: &Path,
    line: Option<usize>,
) {
    let href = trimmed(el.attr("href"));

    if token_match("help", rel) {
        match href {
            None => out
                .errors
                .push(Diagnostic::at_line("Help link missing href value.", line)),
            Some(link) if !(link.starts_with("http://") || link.starts_with("https://")) => {
                out.errors.push(Diagnostic::at_line(
                    format!("Help link {} must be absolute URL.", link),
                    line,
                ))
            }
            Some(link) if out.fields.links.iter().any(|l| l == link) => {
                out.errors.push(Diagnostic::at_line(
                    format!("Duplicate help link {}.", link),
                    line,
                ))
            }
            Some(link) => out.fields.links.push(link.to_string()),
        }
        return;
    }

    let kind = if token_match("match", rel) || token_match("reference", rel) {
        Some(ReferenceKind::Match)
    } else if token_match("mismatch", rel) || token_match("not-reference", rel) {
        Some(ReferenceKind::Mismatch)
    } else {
        None
    };
    if let Some(kind) = kind {
        match href {
            None => out.errors.push(Diagnostic::at_line(
                "Reference link missing href value.",
                line,
            )),
            Some(href) => {
                let name = reference_name(rel_path, href);
                if out.references.contains_key(&name) {
                    out.errors.push(Diagnostic::at_line(
                        format!("Reference {} already specified.", name),
                        line,
                    ));
                } else {
                    out.references
                        .insert(name, RawReference::new(kind, href, Some(node)));
                }
            }
        }
        return;
    }

    for (token, label, list) in [
        ("author", "Author", &mut out.fields.credits),
        ("reviewer", "Reviewer", &mut out.fields.reviewers),
    ] {
        if !token_match(token, rel) {
            continue;
        }
        match trimmed(el.attr("title")) {
            None => out.errors.push(Diagnostic::at_line(
                format!("{} link missing name (title attribute).", label),
                line,
            )),
            Some(name) => match href {
                None => out.errors.push(Diagnostic::at_line(
                    format!(
                        "{} link for \"{}\" missing contact URL (http or mailto).",
                        label, name
                    ),
                    line,
                )),
                Some(link) => list.push(UserData::new(name, link)),
            },
        }
    }
}

fn sorted_tokens(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = text.split_whitespace().map(str::to_string).collect();
    tokens.sort();
    tokens
}

fn clean_assert(text: &str) -> String {
    text.trim().replace('\t', " ")
}

/// Trim a title and drop a leading `... test ...:` label.
fn clean_title(raw: &str) -> String {
    let title = raw.trim();
    let title = title_prefix_re()
        .captures(title)
        .and_then(|c| c.get(1))
        .map_or(title, |m| m.as_str());
    title.trim().to_string()
}
