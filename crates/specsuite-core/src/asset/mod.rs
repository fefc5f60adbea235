//! Assets: one file (or one merged configuration file) in the suite.
//!
//! An [`Asset`] is created by an [`AssetStore`](crate::AssetStore) and
//! shared as `Rc<Asset>`. Bytes are read on first use; markup assets parse
//! on first validation or metadata access and keep their document tree so
//! links can be injected and rewritten before output.

mod config;
mod markup;

pub use markup::DocumentKind;

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::classify;
use crate::document::{to_html, to_xml, Element, NodeData, NodeId, Syntax, XHTML_NS};
use crate::encoding::{self, Encoding};
use crate::layout::OutputLayout;
use crate::metadata::{Diagnostic, Metadata};
use crate::paths;
use crate::reference::{self, RawReference, ReferenceKind};
use crate::revision::{self, RevisionId};
use crate::store::StoreContext;

use markup::MarkupState;

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by asset byte access and fragment merging.
#[derive(Debug, Error)]
pub enum AssetError {
    /// Source file could not be read
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fragments can only be appended under the same relative path
    #[error("cannot append '{other}' to '{target}': relative paths differ")]
    FragmentPathMismatch { target: PathBuf, other: PathBuf },

    /// Append called on an asset that is not a configuration fragment
    #[error("'{0}' is not a configuration fragment")]
    NotAFragment(PathBuf),
}

impl AssetError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }
}

// ============================================================================
// Asset
// ============================================================================

/// What an asset is, chosen once when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// Opaque support file
    File,
    /// Parsed document
    Markup(DocumentKind),
    /// Mergeable configuration fragment
    Config,
    /// Reftest manifest (also mergeable)
    Manifest,
}

/// Links injected by [`Asset::augment_metadata`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InjectedLinks {
    pub next: Option<NodeId>,
    pub prev: Option<NodeId>,
    pub reference: Option<NodeId>,
    pub not_reference: Option<NodeId>,
}

/// One physical file backing an asset.
#[derive(Debug, Clone)]
pub(crate) struct SourceFile {
    pub path: PathBuf,
    pub canonical: PathBuf,
    pub inline: Option<Rc<[u8]>>,
}

impl SourceFile {
    fn read(&self) -> Result<Rc<[u8]>, AssetError> {
        match &self.inline {
            Some(data) => Ok(Rc::clone(data)),
            None => fs::read(&self.path)
                .map(Rc::from)
                .map_err(|e| AssetError::read(&self.path, e)),
        }
    }
}

pub struct Asset {
    context: Rc<StoreContext>,
    kind: AssetKind,
    mime: &'static str,
    rel_path: PathBuf,
    canonical_path: PathBuf,
    sources: RefCell<Vec<SourceFile>>,
    bytes: RefCell<Option<Rc<[u8]>>>,
    markup: RefCell<MarkupState>,
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("kind", &self.kind)
            .field("mime", &self.mime)
            .field("rel_path", &self.rel_path)
            .field("canonical_path", &self.canonical_path)
            .finish()
    }
}

/// Name a link target would get: the asset name of `href` resolved against
/// the directory of `rel_path`.
pub(crate) fn reference_name(rel_path: &Path, href: &str) -> String {
    let joined = paths::normalize(&paths::basepath(rel_path).join(href));
    classify::asset_name_for(&paths::to_url(&joined))
}

impl Asset {
    pub(crate) fn new(
        context: Rc<StoreContext>,
        kind: AssetKind,
        mime: &'static str,
        source: SourceFile,
        rel_path: PathBuf,
    ) -> Self {
        Self {
            context,
            kind,
            mime,
            rel_path,
            canonical_path: source.canonical.clone(),
            sources: RefCell::new(vec![source]),
            bytes: RefCell::new(None),
            markup: RefCell::new(MarkupState::default()),
        }
    }

    // ------------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------------

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    pub fn document_kind(&self) -> Option<DocumentKind> {
        match self.kind {
            AssetKind::Markup(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn rel_path(&self) -> &Path {
        &self.rel_path
    }

    /// Canonical absolute path of the first physical file.
    pub fn canonical_path(&self) -> &Path {
        &self.canonical_path
    }

    /// Path of the first physical file, as given to the store.
    pub fn physical_path(&self) -> PathBuf {
        self.sources
            .borrow()
            .first()
            .map(|s| s.path.clone())
            .unwrap_or_default()
    }

    /// Every physical file, in append order.
    pub fn physical_paths(&self) -> Vec<PathBuf> {
        self.sources.borrow().iter().map(|s| s.path.clone()).collect()
    }

    pub fn is_inline(&self) -> bool {
        self.sources.borrow().iter().any(|s| s.inline.is_some())
    }

    pub(crate) fn store_id(&self) -> u64 {
        self.context.id
    }

    pub fn name(&self) -> String {
        match self.kind {
            AssetKind::Config | AssetKind::Manifest => self
                .rel_path
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default(),
            _ => classify::asset_name_for(&paths::to_url(&self.rel_path)),
        }
    }

    /// Category string used to key asset sets.
    pub fn asset_type(&self) -> &'static str {
        match self.kind {
            AssetKind::Config | AssetKind::Manifest => classify::FileCategory::Support.as_str(),
            _ => classify::asset_type_for(&paths::to_url(&self.rel_path)),
        }
    }

    /// URL of `other` relative to this asset's output location.
    pub fn relative_url(&self, other: &Asset) -> String {
        paths::relative_url(&self.rel_path, &other.rel_path)
    }

    // ------------------------------------------------------------------------
    // Content
    // ------------------------------------------------------------------------

    /// Raw source bytes. Configuration fragments are concatenated, each
    /// followed by a newline.
    pub fn bytes(&self) -> Result<Rc<[u8]>, AssetError> {
        if let Some(bytes) = self.bytes.borrow().as_ref() {
            return Ok(Rc::clone(bytes));
        }
        let data: Rc<[u8]> = if self.is_fragment_list() {
            let mut data = Vec::new();
            for source in self.sources.borrow().iter() {
                data.extend_from_slice(&source.read()?);
                data.push(b'\n');
            }
            data.into()
        } else {
            match self.sources.borrow().first() {
                Some(source) => source.read()?,
                None => Rc::from(Vec::new()),
            }
        };
        *self.bytes.borrow_mut() = Some(Rc::clone(&data));
        Ok(data)
    }

    /// Byte encoding of the source.
    pub fn encoding(&self) -> Encoding {
        if let Some(encoding) = self.markup.borrow().encoding {
            return encoding;
        }
        let Ok(bytes) = self.bytes() else {
            return Encoding::Utf8;
        };
        match self.kind {
            AssetKind::Markup(DocumentKind::Html) => encoding::detect_html(&bytes),
            AssetKind::Markup(_) => encoding::detect_xml(&bytes),
            _ => encoding::sniff_bom(&bytes).unwrap_or_default(),
        }
    }

    /// Decoded source text.
    pub fn text(&self) -> Result<String, AssetError> {
        let bytes = self.bytes()?;
        Ok(self.encoding().decode(&bytes))
    }

    /// Current document rendered back to markup, including injected links.
    pub fn serialize(&self) -> Option<String> {
        self.validate();
        let state = self.markup.borrow();
        let doc = state.document.as_ref()?;
        Some(match doc.syntax() {
            Syntax::Xml => to_xml(doc),
            Syntax::Html => to_html(doc),
        })
    }

    /// Bytes to write out: the serialized document in its source encoding
    /// for parsed markup, the raw bytes otherwise.
    pub fn output_bytes(&self) -> Result<Vec<u8>, AssetError> {
        match self.serialize() {
            Some(text) => Ok(self.encoding().encode(&text)),
            None => Ok(self.bytes()?.to_vec()),
        }
    }

    /// Whether both assets hold byte-identical content. The same physical
    /// files always compare equal.
    pub fn content_equals(&self, other: &Asset) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if self.is_fragment_list() != other.is_fragment_list() {
            return false;
        }
        let mine = self.sources.borrow();
        let theirs = other.sources.borrow();
        if mine.len() != theirs.len() {
            return false;
        }
        mine.iter().zip(theirs.iter()).all(|(a, b)| {
            if a.inline.is_none() && b.inline.is_none() && a.canonical == b.canonical {
                return true;
            }
            match (a.read(), b.read()) {
                (Ok(x), Ok(y)) => x == y,
                _ => false,
            }
        })
    }

    /// SHA-256 over this asset's bytes and those of every asset it
    /// references, transitively.
    pub fn fingerprint(&self) -> Result<String, AssetError> {
        let mut hasher = Sha256::new();
        hasher.update(&*self.bytes()?);
        let mut seen = HashSet::from([self.canonical_path.clone()]);
        self.hash_references(&mut hasher, &mut seen)?;
        Ok(format!("{:x}", hasher.finalize()))
    }

    fn hash_references(
        &self,
        hasher: &mut Sha256,
        seen: &mut HashSet<PathBuf>,
    ) -> Result<(), AssetError> {
        for (_, reference) in self.raw_references() {
            if let Some(target) = reference.target() {
                if seen.insert(target.canonical_path.clone()) {
                    hasher.update(&*target.bytes()?);
                    target.hash_references(hasher, seen)?;
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Parsing
    // ------------------------------------------------------------------------

    /// Parse the document if that has not happened yet. Does nothing for
    /// non-markup assets.
    pub fn validate(&self) {
        let AssetKind::Markup(kind) = self.kind else {
            return;
        };
        if self.markup.borrow().parsed {
            return;
        }
        debug!(path = %self.rel_path.display(), "Parsing asset");
        let state = markup::load(kind, self.bytes(), &self.physical_path(), &self.rel_path);
        *self.markup.borrow_mut() = state;
    }

    /// Diagnostics collected so far; `None` until the asset has been parsed.
    pub fn errors(&self) -> Option<Vec<Diagnostic>> {
        self.markup.borrow().errors.clone()
    }

    /// Run `f` against the parsed document.
    pub fn with_document<R>(&self, f: impl FnOnce(&crate::document::Document) -> R) -> Option<R> {
        self.validate();
        self.markup.borrow().document.as_ref().map(f)
    }

    // ------------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------------

    /// Test metadata, with references resolved. `None` when the document
    /// carries no metadata or could not be parsed.
    ///
    /// Extracted fields come from the single parse. Reference groups and the
    /// revision are resolved on every call, so changes anywhere along a
    /// reference chain show up here.
    pub fn metadata(&self) -> Option<Metadata> {
        self.validate();
        let fields = self.markup.borrow().fields.clone()?;
        Some(Metadata {
            name: self.name(),
            title: fields.title,
            asserts: fields.asserts,
            credits: fields.credits,
            reviewers: fields.reviewers,
            flags: fields.flags,
            links: fields.links,
            references: reference::resolve(self),
            revision: self.revision(),
            selftest: self.is_selftest(),
            scripttest: self.is_scripttest(),
        })
    }

    pub fn is_test(&self) -> bool {
        self.validate();
        self.markup
            .borrow()
            .fields
            .as_ref()
            .is_some_and(|f| !f.links.is_empty())
    }

    pub fn is_reftest(&self) -> bool {
        self.is_test() && self.has_references()
    }

    pub fn is_selftest(&self) -> bool {
        self.is_test() && !self.has_references()
    }

    /// A test that loads the harness script.
    pub fn is_scripttest(&self) -> bool {
        let suffix = &self.context.options.harness_script_suffix;
        self.is_test()
            && self
                .markup
                .borrow()
                .scripts
                .keys()
                .any(|src| src.ends_with(suffix.as_str()))
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.validate();
        self.markup
            .borrow()
            .fields
            .as_ref()
            .is_some_and(|f| f.flags.iter().any(|f| f == flag))
    }

    /// Script `src` values found in the metadata container.
    pub fn scripts(&self) -> Vec<String> {
        self.validate();
        self.markup.borrow().scripts.keys().cloned().collect()
    }

    /// Newest revision among this asset's files and every file it
    /// references, transitively.
    pub fn revision(&self) -> Option<RevisionId> {
        let mut paths = self.physical_paths();
        let mut seen = HashSet::from([self.canonical_path.clone()]);
        self.collect_reference_paths(&mut seen, &mut paths);
        revision::newest(
            self.context.revisions.as_ref(),
            paths.iter().map(PathBuf::as_path),
        )
    }

    fn collect_reference_paths(&self, seen: &mut HashSet<PathBuf>, paths: &mut Vec<PathBuf>) {
        for (_, reference) in self.raw_references() {
            match reference.target() {
                Some(target) => {
                    if seen.insert(target.canonical_path.clone()) {
                        paths.extend(target.physical_paths());
                        target.collect_reference_paths(seen, paths);
                    }
                }
                None => {
                    let path = self.unresolved_target_path(&reference.href);
                    if seen.insert(path.clone()) {
                        paths.push(path);
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // References
    // ------------------------------------------------------------------------

    /// Raw relations keyed by target name, in document order.
    pub fn raw_references(&self) -> Vec<(String, RawReference)> {
        self.validate();
        self.markup
            .borrow()
            .references
            .iter()
            .map(|(name, r)| (name.clone(), r.clone()))
            .collect()
    }

    pub fn has_references(&self) -> bool {
        self.validate();
        !self.markup.borrow().references.is_empty()
    }

    /// `(physical path, relative path, kind)` of every relation.
    pub fn reference_paths(&self) -> Vec<(PathBuf, PathBuf, ReferenceKind)> {
        let physical = self.physical_path();
        self.raw_references()
            .into_iter()
            .map(|(_, r)| {
                (
                    paths::basepath(&physical).join(&r.href),
                    paths::basepath(&self.rel_path).join(&r.href),
                    r.kind,
                )
            })
            .collect()
    }

    /// Canonical path an unresolved `href` points at.
    pub(crate) fn unresolved_target_path(&self, href: &str) -> PathBuf {
        paths::normalize(&paths::basepath(&self.canonical_path).join(href))
    }

    pub(crate) fn reference_name(&self, href: &str) -> String {
        reference_name(&self.rel_path, href)
    }

    pub(crate) fn set_reference_target(&self, name: &str, target: &Rc<Asset>) {
        if let Some(reference) = self.markup.borrow_mut().references.get_mut(name) {
            reference.target = Some(Rc::downgrade(target));
        }
    }

    /// Register `target` as a reference, or update the existing relation
    /// with the same name. New relations get a link injected into the
    /// metadata container; existing ones have their link rewritten. A new
    /// relation without an explicit kind is a match.
    pub fn add_reference(&self, target: &Rc<Asset>, kind: Option<ReferenceKind>) {
        if !matches!(self.kind, AssetKind::Markup(_)) {
            return;
        }
        self.validate();
        let name = target.name();
        let href = self.relative_url(target);
        let existing = self.markup.borrow().references.get(&name).cloned();

        let reference = match existing {
            None => {
                let kind = kind.unwrap_or(ReferenceKind::Match);
                let node = match kind {
                    ReferenceKind::Match => self.augment_metadata(None, None, Some(target), None).reference,
                    ReferenceKind::Mismatch => {
                        self.augment_metadata(None, None, None, Some(target)).not_reference
                    }
                };
                RawReference {
                    kind,
                    href,
                    node,
                    target: Some(Rc::downgrade(target)),
                }
            }
            Some(existing) => {
                if let Some(node) = existing.node {
                    self.set_node_attr(node, "href", &href);
                    if let Some(kind) = kind {
                        self.set_node_attr(node, "rel", kind.rel());
                    }
                }
                RawReference {
                    kind: kind.unwrap_or(existing.kind),
                    href,
                    node: existing.node,
                    target: Some(Rc::downgrade(target)),
                }
            }
        };
        self.markup
            .borrow_mut()
            .references
            .insert(name, reference);
    }

    // ------------------------------------------------------------------------
    // Injection
    // ------------------------------------------------------------------------

    /// Prepend `<link rel href>` to the metadata container, recording it
    /// under `tag`. Returns `None` when there is no non-empty container.
    pub fn inject_metadata_link(&self, rel: &str, href: &str, tag: &str) -> Option<NodeId> {
        let AssetKind::Markup(kind) = self.kind else {
            return None;
        };
        self.validate();

        let mut guard = self.markup.borrow_mut();
        let state = &mut *guard;
        let doc = state.document.as_mut()?;
        let container = markup::container(doc, kind)?;
        doc.child_elements(container).next()?;

        let leading: Vec<NodeId> = doc
            .children(container)
            .iter()
            .copied()
            .take_while(|c| matches!(doc.data(*c), NodeData::Text(_)))
            .collect();
        let text: String = leading
            .iter()
            .filter_map(|c| match doc.data(*c) {
                NodeData::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();

        let mut link = Element::new(Some(XHTML_NS), "link");
        link.set_attr("rel", rel);
        link.set_attr("href", href);
        let node = doc.create(NodeData::Element(link));
        doc.insert(container, leading.len(), node);
        state.injected.push((node, tag.to_string()));

        if !text.is_empty() {
            let tail = doc.create(NodeData::Text(text));
            doc.insert(container, leading.len() + 1, tail);
            state.injected.push((tail, tag.to_string()));
        }
        Some(node)
    }

    /// Inject `next`, `prev`, `match` and `mismatch` links pointing at the
    /// given assets. Each argument is optional.
    pub fn augment_metadata(
        &self,
        next: Option<&Asset>,
        prev: Option<&Asset>,
        reference: Option<&Asset>,
        not_reference: Option<&Asset>,
    ) -> InjectedLinks {
        self.validate();
        let inject = |target: Option<&Asset>, rel: &str, tag: &str| {
            target.and_then(|t| self.inject_metadata_link(rel, &self.relative_url(t), tag))
        };
        InjectedLinks {
            next: inject(next, "next", "next"),
            prev: inject(prev, "prev", "prev"),
            reference: inject(reference, "match", "ref"),
            not_reference: inject(not_reference, "mismatch", "not-ref"),
        }
    }

    /// Detach injected nodes: those recorded under `tag`, or all of them.
    /// Parsed nodes are never touched.
    pub fn clear_injected_tags(&self, tag: Option<&str>) {
        let mut guard = self.markup.borrow_mut();
        let state = &mut *guard;
        let Some(doc) = state.document.as_mut() else {
            return;
        };
        state.injected.retain(|(node, node_tag)| {
            let hit = tag.is_none_or(|t| t == node_tag);
            if hit {
                doc.detach(*node);
            }
            !hit
        });
    }

    /// Injected nodes and their tags, in injection order.
    pub fn injected_tags(&self) -> Vec<(NodeId, String)> {
        self.markup.borrow().injected.clone()
    }

    fn set_node_attr(&self, node: NodeId, name: &str, value: &str) {
        let mut state = self.markup.borrow_mut();
        if let Some(el) = state
            .document
            .as_mut()
            .and_then(|doc| doc.element_mut(node))
        {
            if el.attr(name) != Some(value) {
                el.set_attr(name, value);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Output paths
    // ------------------------------------------------------------------------

    /// Rewrite reference hrefs for the output `layout` and pin harness
    /// script sources to their absolute locations.
    pub fn adjust_content_paths(&self, layout: &dyn OutputLayout) {
        self.validate();
        if self.has_references() {
            let mut seen = HashSet::from([self.canonical_path.clone()]);
            self.adjust_references(layout, &mut seen);
        }

        let options = &self.context.options;
        let scripts: Vec<(String, NodeId)> = self
            .markup
            .borrow()
            .scripts
            .iter()
            .map(|(src, node)| (src.clone(), *node))
            .collect();
        for (src, node) in scripts {
            if src.ends_with(options.harness_script_suffix.as_str()) {
                self.set_node_attr(node, "src", &options.harness_script_suffix);
            } else if src.ends_with(options.harness_report_suffix.as_str()) {
                self.set_node_attr(node, "src", &options.harness_report_suffix);
            }
        }
    }

    /// Rewrite this asset's hrefs relative to its own destination, then
    /// recurse into resolved targets not yet visited.
    fn adjust_references(&self, layout: &dyn OutputLayout, seen: &mut HashSet<PathBuf>) {
        let own_dest = layout.dest(&self.rel_path);
        for (name, reference) in self.raw_references() {
            let href = match reference.target() {
                Some(target) => {
                    let href = paths::relative_url(&own_dest, &layout.dest(target.rel_path()));
                    if seen.insert(target.canonical_path.clone()) {
                        target.adjust_references(layout, seen);
                    }
                    href
                }
                None => {
                    let rel =
                        paths::normalize(&paths::basepath(&self.rel_path).join(&reference.href));
                    paths::relative_url(&own_dest, &layout.dest(&rel))
                }
            };
            if let Some(node) = reference.node {
                self.set_node_attr(node, "href", &href);
            }
            if let Some(entry) = self.markup.borrow_mut().references.get_mut(&name) {
                entry.href = href;
            }
        }
    }
}
