//! Arena-backed document trees.
//!
//! A [`Document`] owns every node in a flat `Vec`; nodes refer to each other
//! by [`NodeId`]. Detached nodes stay in the arena but are unreachable from
//! the root, so ids handed out earlier never dangle.

mod html;
mod serialize;
mod xml;

pub use html::parse_html;
pub use serialize::{to_html, to_xml};
pub use xml::parse_xml;

use std::fmt;

pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";
pub const SVG_NS: &str = "http://www.w3.org/2000/svg";
pub const MATHML_NS: &str = "http://www.w3.org/1998/Math/MathML";
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Index of a node inside its [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Markup syntax a document was read from and is written back as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Xml,
    Html,
}

/// A parse failure with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub message: String,
    pub line: usize,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, line {}", self.message, self.line)
    }
}

impl std::error::Error for ParseFailure {}

/// A single attribute, keyed by its qualified name as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Element payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub prefix: Option<String>,
    pub local_name: String,
    pub namespace: Option<String>,
    pub attributes: Vec<Attribute>,
    /// 1-based source line of the start tag; `None` for synthesized nodes
    pub line: Option<usize>,
}

impl Element {
    pub fn new(namespace: Option<&str>, local_name: &str) -> Self {
        Self {
            prefix: None,
            local_name: local_name.to_string(),
            namespace: namespace.map(str::to_string),
            attributes: Vec::new(),
            line: None,
        }
    }

    /// Qualified name as written in the source.
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.local_name),
            None => self.local_name.clone(),
        }
    }

    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.namespace.as_deref() == Some(namespace) && self.local_name == local_name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(attr) => attr.value = value.to_string(),
            None => self.attributes.push(Attribute {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Document,
    Doctype(String),
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An owned document tree.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    syntax: Syntax,
}

impl Document {
    pub fn new(syntax: Syntax) -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
            syntax,
        }
    }

    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    /// The document node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The first element child of the document node.
    pub fn document_element(&self) -> Option<NodeId> {
        self.child_elements(self.root()).next()
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0].data
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(|child| matches!(self.nodes[child.0].data, NodeData::Element(_)))
    }

    /// First child element with the given namespace and local name.
    pub fn find_child(&self, id: NodeId, namespace: &str, local_name: &str) -> Option<NodeId> {
        self.child_elements(id)
            .find(|child| self.element(*child).is_some_and(|el| el.is(namespace, local_name)))
    }

    /// Text and CDATA directly inside `id`, up to its first child element.
    pub fn leading_text(&self, id: NodeId) -> Option<String> {
        let mut text = String::new();
        let mut found = false;
        for child in &self.nodes[id.0].children {
            match &self.nodes[child.0].data {
                NodeData::Text(t) | NodeData::CData(t) => {
                    text.push_str(t);
                    found = true;
                }
                NodeData::Element(_) => break,
                _ => {}
            }
        }
        found.then_some(text)
    }

    /// Whether `id` is still reachable from the document node.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root() {
                return true;
            }
            match self.nodes[current.0].parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Allocate a detached node.
    pub fn create(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        NodeId(self.nodes.len() - 1)
    }

    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Insert `child` at `index` among the children of `parent`, clamped to
    /// the end.
    pub fn insert(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.detach(child);
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
    }

    /// Remove `id` from its parent. The node and its subtree stay in the
    /// arena.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    /// Append text to `parent`, merging with a trailing text node.
    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        if let Some(last) = self.nodes[parent.0].children.last().copied() {
            if let NodeData::Text(existing) = &mut self.nodes[last.0].data {
                existing.push_str(text);
                return;
            }
        }
        let node = self.create(NodeData::Text(text.to_string()));
        self.append(parent, node);
    }

    /// Build an element node under `parent` and return it.
    pub fn append_element(&mut self, parent: NodeId, element: Element) -> NodeId {
        let node = self.create(NodeData::Element(element));
        self.append(parent, node);
        node
    }
}

/// Synthetic XHTML page standing in for a document that failed to parse.
pub fn syntax_error_document(file_name: &str, diagnostic: &str) -> Document {
    let mut doc = Document::new(Syntax::Xml);
    let root = doc.root();

    let doctype = doc.create(NodeData::Doctype(
        "html PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\" \"http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd\"".to_string(),
    ));
    doc.append(root, doctype);

    let mut html_el = Element::new(Some(XHTML_NS), "html");
    html_el.set_attr("xmlns", XHTML_NS);
    let html = doc.append_element(root, html_el);

    let head = doc.append_element(html, Element::new(Some(XHTML_NS), "head"));
    let title = doc.append_element(head, Element::new(Some(XHTML_NS), "title"));
    doc.append_text(title, "Syntax Error");

    let body = doc.append_element(html, Element::new(Some(XHTML_NS), "body"));
    let p = doc.append_element(body, Element::new(Some(XHTML_NS), "p"));
    doc.append_text(
        p,
        &format!(
            "The XML file {} contains a syntax error and could not be parsed. Please correct it and try again.",
            file_name
        ),
    );
    let p = doc.append_element(body, Element::new(Some(XHTML_NS), "p"));
    doc.append_text(p, "The parser's error report was:");
    let pre = doc.append_element(body, Element::new(Some(XHTML_NS), "pre"));
    doc.append_text(pre, diagnostic);

    doc
}
