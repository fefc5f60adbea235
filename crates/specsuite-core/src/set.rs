//! Named asset collections.
//!
//! An [`AssetSet`] holds at most one asset per `(type, name)`. Adding a
//! second asset under a taken key keeps the first one, except that
//! configuration fragments are appended to each other. Content that
//! differs under the same key is a merge conflict: it is logged and
//! reported back, and the newcomer is dropped.

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::warn;

use crate::asset::Asset;
use crate::layout::OutputLayout;
use crate::store::AssetStore;

/// Key of an entry: asset type plus asset name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetKey {
    pub asset_type: String,
    pub name: String,
}

impl AssetKey {
    pub fn of(asset: &Asset) -> Self {
        Self {
            asset_type: asset.asset_type().to_string(),
            name: asset.name(),
        }
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.asset_type, self.name)
    }
}

/// Two different files competing for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub key: AssetKey,
    pub kept: Vec<PathBuf>,
    pub rejected: Vec<PathBuf>,
    pub reason: String,
}

impl fmt::Display for MergeConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "File merge mismatch {:?} vs {:?} for {}: {}",
            self.kept, self.rejected, self.key.name, self.reason
        )
    }
}

/// What happened to an asset handed to [`AssetSet::add_source`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First asset under its key
    Inserted,
    /// Same content already present
    Unchanged,
    /// Fragments appended to the existing configuration asset
    Appended,
    /// Different content under a taken key; the existing asset was kept
    Mismatch(MergeConflict),
}

/// Errors raised when combining sets.
#[derive(Debug, Error)]
pub enum SetError {
    /// Sets backed by different stores cannot be merged
    #[error("cannot merge asset sets from different stores ({ours} vs {theirs})")]
    StoreMismatch { ours: u64, theirs: u64 },
}

pub struct AssetSet<'s> {
    store: &'s AssetStore,
    entries: IndexMap<AssetKey, Rc<Asset>>,
}

impl<'s> AssetSet<'s> {
    pub fn new(store: &'s AssetStore) -> Self {
        Self {
            store,
            entries: IndexMap::new(),
        }
    }

    pub fn store(&self) -> &'s AssetStore {
        self.store
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, asset: &Asset) -> bool {
        self.entries.contains_key(&AssetKey::of(asset))
    }

    pub fn get(&self, key: &AssetKey) -> Option<&Rc<Asset>> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AssetKey, &Rc<Asset>)> {
        self.entries.iter()
    }

    /// Insert `asset`, or reconcile it with the asset already under its key.
    pub fn add_source(&mut self, asset: Rc<Asset>) -> MergeOutcome {
        let key = AssetKey::of(&asset);
        let Some(existing) = self.entries.get(&key) else {
            self.entries.insert(key, asset);
            return MergeOutcome::Inserted;
        };

        if existing.content_equals(&asset) {
            return MergeOutcome::Unchanged;
        }
        if existing.is_fragment_list() && asset.is_fragment_list() {
            if let Err(err) = existing.append(&asset) {
                return self.conflict(key, &asset, err.to_string());
            }
            return MergeOutcome::Appended;
        }
        self.conflict(key, &asset, "content differs".to_string())
    }

    fn conflict(&self, key: AssetKey, rejected: &Asset, reason: String) -> MergeOutcome {
        let kept = self
            .entries
            .get(&key)
            .map(|a| a.physical_paths())
            .unwrap_or_default();
        let conflict = MergeConflict {
            key,
            kept,
            rejected: rejected.physical_paths(),
            reason,
        };
        warn!("{}", conflict);
        MergeOutcome::Mismatch(conflict)
    }

    /// Generate an asset through the backing store and add it.
    pub fn add(
        &mut self,
        physical: impl AsRef<Path>,
        relative: impl AsRef<Path>,
    ) -> (Rc<Asset>, MergeOutcome) {
        let asset = self.store.generate_source(physical, relative, None);
        let outcome = self.add_source(Rc::clone(&asset));
        (asset, outcome)
    }

    /// Fold `other` into this set entry by entry. Returns the conflicts
    /// encountered.
    pub fn merge(&mut self, other: &AssetSet<'_>) -> Result<Vec<MergeConflict>, SetError> {
        if self.store.id() != other.store.id() {
            return Err(SetError::StoreMismatch {
                ours: self.store.id(),
                theirs: other.store.id(),
            });
        }
        let mut conflicts = Vec::new();
        for asset in other.entries.values() {
            if let MergeOutcome::Mismatch(conflict) = self.add_source(Rc::clone(asset)) {
                conflicts.push(conflict);
            }
        }
        Ok(conflicts)
    }

    /// Merge the smaller set into the larger one. Either side may be
    /// missing.
    pub fn combine(
        a: Option<AssetSet<'s>>,
        b: Option<AssetSet<'s>>,
    ) -> Result<Option<AssetSet<'s>>, SetError> {
        match (a, b) {
            (Some(a), Some(b)) => {
                let (mut larger, smaller) = if a.len() < b.len() { (b, a) } else { (a, b) };
                larger.merge(&smaller)?;
                Ok(Some(larger))
            }
            (a, b) => Ok(a.or(b)),
        }
    }

    /// Rewrite content paths of every asset for `layout`.
    pub fn adjust_content_paths(&self, layout: &dyn OutputLayout) {
        for asset in self.entries.values() {
            asset.adjust_content_paths(layout);
        }
    }
}

impl fmt::Debug for AssetSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetSet")
            .field("store", &self.store.id())
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
