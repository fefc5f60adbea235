//! The asset store: one canonical [`Asset`] per (physical, relative) path.
//!
//! Paths are canonicalized once, when an asset is first requested. Every
//! later request for the same pair hands back the same `Rc`. Asking for a
//! physical file under a second relative path is a caller bug.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use specsuite_config::AssetsConfig;
use thiserror::Error;
use tracing::{debug, info};

use crate::asset::{Asset, AssetKind, DocumentKind, SourceFile};
use crate::mime;
use crate::paths;
use crate::revision::{NoRevisions, RevisionProvider};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Errors raised by the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The physical file is already known under another relative path
    #[error("'{physical}' is already registered as '{existing}', not '{requested}'")]
    RelativePathConflict {
        physical: PathBuf,
        existing: PathBuf,
        requested: PathBuf,
    },
}

/// Settings that shape how files become assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub config_fragment_name: String,
    pub manifest_file_name: String,
    pub harness_script_suffix: String,
    pub harness_report_suffix: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from_config(&AssetsConfig::default())
    }
}

impl StoreOptions {
    pub fn from_config(config: &AssetsConfig) -> Self {
        Self {
            config_fragment_name: config.config_fragment_name.clone(),
            manifest_file_name: config.manifest_file_name.clone(),
            harness_script_suffix: config.harness_script_suffix.clone(),
            harness_report_suffix: config.harness_report_suffix.clone(),
        }
    }
}

/// State every asset of a store shares.
pub(crate) struct StoreContext {
    pub id: u64,
    pub options: StoreOptions,
    pub revisions: Box<dyn RevisionProvider>,
}

type CacheKey = (PathBuf, PathBuf);

pub struct AssetStore {
    context: Rc<StoreContext>,
    entries: RefCell<IndexMap<CacheKey, Rc<Asset>>>,
    /// canonical physical path -> relative path it was registered under
    registered: RefCell<HashMap<PathBuf, PathBuf>>,
}

impl Default for AssetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetStore {
    pub fn new() -> Self {
        Self::with_options(StoreOptions::default(), NoRevisions)
    }

    pub fn with_options(options: StoreOptions, revisions: impl RevisionProvider + 'static) -> Self {
        let id = NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            context: Rc::new(StoreContext {
                id,
                options,
                revisions: Box::new(revisions),
            }),
            entries: RefCell::new(IndexMap::new()),
            registered: RefCell::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.context.id
    }

    pub fn options(&self) -> &StoreOptions {
        &self.context.options
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Every cached asset, in creation order.
    pub fn assets(&self) -> Vec<Rc<Asset>> {
        self.entries.borrow().values().cloned().collect()
    }

    /// Return the asset for `physical` under `relative`.
    ///
    /// Inline data and fragment lists (configuration files, manifests) are
    /// never cached: every call builds a fresh asset, since sets append
    /// fragments to the instance they hold.
    ///
    /// # Panics
    ///
    /// When `physical` is already cached under a different relative path.
    pub fn generate_source(
        &self,
        physical: impl AsRef<Path>,
        relative: impl AsRef<Path>,
        inline: Option<Vec<u8>>,
    ) -> Rc<Asset> {
        match self.try_generate_source(physical, relative, inline) {
            Ok(asset) => asset,
            Err(err) => panic!("{}", err),
        }
    }

    /// Fallible form of [`generate_source`](Self::generate_source).
    pub fn try_generate_source(
        &self,
        physical: impl AsRef<Path>,
        relative: impl AsRef<Path>,
        inline: Option<Vec<u8>>,
    ) -> Result<Rc<Asset>, StoreError> {
        let physical = physical.as_ref();
        let relative = relative.as_ref().to_path_buf();
        let canonical = paths::canonicalize_lenient(physical);
        let (kind, mime_type) = self.select_kind(physical);

        if inline.is_some() || matches!(kind, AssetKind::Config | AssetKind::Manifest) {
            debug!(path = %physical.display(), ?kind, "Building uncached asset");
            let source = SourceFile {
                path: physical.to_path_buf(),
                canonical,
                inline: inline.map(Rc::from),
            };
            return Ok(Rc::new(self.build(kind, mime_type, source, relative)));
        }

        let key = (canonical.clone(), relative.clone());
        if let Some(asset) = self.entries.borrow().get(&key) {
            debug!(path = %physical.display(), "Asset cache hit");
            return Ok(Rc::clone(asset));
        }
        if let Some(existing) = self.registered.borrow().get(&canonical) {
            return Err(StoreError::RelativePathConflict {
                physical: canonical,
                existing: existing.clone(),
                requested: relative,
            });
        }

        debug!(path = %physical.display(), rel_path = %relative.display(), "Asset cache miss");
        let source = SourceFile {
            path: physical.to_path_buf(),
            canonical: canonical.clone(),
            inline: None,
        };
        let asset = Rc::new(self.build(kind, mime_type, source, relative.clone()));
        self.registered.borrow_mut().insert(canonical, relative);
        self.entries.borrow_mut().insert(key, Rc::clone(&asset));
        Ok(asset)
    }

    /// Configuration fragments and manifests by file name, everything else
    /// by MIME type.
    fn select_kind(&self, physical: &Path) -> (AssetKind, &'static str) {
        let options = &self.context.options;
        let file_name = physical
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if file_name == options.config_fragment_name {
            (AssetKind::Config, mime::CONFIG_HTACCESS)
        } else if file_name == options.manifest_file_name {
            (AssetKind::Manifest, mime::CONFIG_REFTEST)
        } else {
            let mime_type = mime::from_path(physical);
            let kind = DocumentKind::from_mime(mime_type)
                .map(AssetKind::Markup)
                .unwrap_or(AssetKind::File);
            (kind, mime_type)
        }
    }

    fn build(
        &self,
        kind: AssetKind,
        mime_type: &'static str,
        source: SourceFile,
        relative: PathBuf,
    ) -> Asset {
        Asset::new(Rc::clone(&self.context), kind, mime_type, source, relative)
    }

    /// Cached asset for `physical`, under whatever relative path it was
    /// registered with.
    pub fn find_by_path(&self, physical: impl AsRef<Path>) -> Option<Rc<Asset>> {
        let canonical = paths::canonicalize_lenient(physical.as_ref());
        self.find_canonical(&canonical)
    }

    fn find_canonical(&self, canonical: &Path) -> Option<Rc<Asset>> {
        let relative = self.registered.borrow().get(canonical).cloned()?;
        self.entries
            .borrow()
            .get(&(canonical.to_path_buf(), relative))
            .cloned()
    }

    /// Point unresolved relations of `asset` at cached assets, following
    /// resolved targets transitively. Returns how many relations were
    /// newly resolved.
    pub fn link_references(&self, asset: &Rc<Asset>) -> usize {
        let mut linked = 0;
        let mut seen = HashSet::new();
        let mut pending = vec![Rc::clone(asset)];

        while let Some(current) = pending.pop() {
            if !seen.insert(current.canonical_path().to_path_buf()) {
                continue;
            }
            for (name, reference) in current.raw_references() {
                let target = match reference.target() {
                    Some(target) => Some(target),
                    None => {
                        let path = paths::canonicalize_lenient(
                            &current.unresolved_target_path(&reference.href),
                        );
                        let found = self.find_canonical(&path);
                        if let Some(target) = &found {
                            current.set_reference_target(&name, target);
                            linked += 1;
                        }
                        found
                    }
                };
                pending.extend(target);
            }
        }
        linked
    }

    /// Link every cached asset.
    pub fn link_all(&self) -> usize {
        let assets = self.assets();
        let linked: usize = assets.iter().map(|a| self.link_references(a)).sum();
        info!(assets = assets.len(), linked, "Linked references");
        linked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_same_instance() {
        let store = AssetStore::new();
        let a = store.generate_source("/suite/a/test.xht", "a/test.xht", None);
        let b = store.generate_source("/suite/a/test.xht", "a/test.xht", None);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_inline_bypasses_cache() {
        let store = AssetStore::new();
        let a = store.generate_source("/suite/a/t.xht", "a/t.xht", Some(b"<x/>".to_vec()));
        let b = store.generate_source("/suite/a/t.xht", "a/t.xht", Some(b"<x/>".to_vec()));
        assert!(!Rc::ptr_eq(&a, &b));
        assert!(store.is_empty());
    }

    #[test]
    fn test_relative_path_conflict() {
        let store = AssetStore::new();
        store.generate_source("/suite/a/test.xht", "a/test.xht", None);
        let err = store
            .try_generate_source("/suite/a/test.xht", "b/test.xht", None)
            .unwrap_err();
        assert!(matches!(err, StoreError::RelativePathConflict { .. }));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_generate_source_panics_on_conflict() {
        let store = AssetStore::new();
        store.generate_source("/suite/a/test.xht", "a/test.xht", None);
        store.generate_source("/suite/a/test.xht", "other/test.xht", None);
    }

    #[test]
    fn test_kind_selection() {
        let store = AssetStore::new();
        let kind = |p: &str| store.generate_source(p, p.trim_start_matches('/'), None).kind();
        assert_eq!(kind("/s/a/t.xht"), AssetKind::Markup(DocumentKind::Xhtml));
        assert_eq!(kind("/s/a/t.html"), AssetKind::Markup(DocumentKind::Html));
        assert_eq!(kind("/s/a/t.svg"), AssetKind::Markup(DocumentKind::Svg));
        assert_eq!(kind("/s/a/t.xml"), AssetKind::Markup(DocumentKind::Xml));
        assert_eq!(kind("/s/a/t.png"), AssetKind::File);
        assert_eq!(kind("/s/a/.htaccess"), AssetKind::Config);
        assert_eq!(kind("/s/a/reftest.list"), AssetKind::Manifest);
    }

    #[test]
    fn test_fragment_lists_are_not_cached() {
        let store = AssetStore::new();
        let a = store.generate_source("/s/a/.htaccess", "a/.htaccess", None);
        let b = store.generate_source("/s/a/.htaccess", "a/.htaccess", None);
        assert!(!Rc::ptr_eq(&a, &b));
        store.generate_source("/s/a/reftest.list", "a/reftest.list", None);
        store.generate_source("/s/a/reftest.list", "b/reftest.list", None);
        assert!(store.is_empty());
        assert!(store.find_by_path("/s/a/.htaccess").is_none());
    }

    #[test]
    fn test_options_from_config() {
        let mut config = AssetsConfig::default();
        config.manifest_file_name = "reftests.txt".to_string();
        let store = AssetStore::with_options(StoreOptions::from_config(&config), NoRevisions);
        let asset = store.generate_source("/s/a/reftests.txt", "a/reftests.txt", None);
        assert_eq!(asset.kind(), AssetKind::Manifest);
        assert_eq!(asset.mime(), mime::CONFIG_REFTEST);
    }
}
