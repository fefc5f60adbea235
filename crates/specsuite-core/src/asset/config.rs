//! Configuration fragments: assets backed by an ordered list of files.

use std::path::PathBuf;
use std::rc::Rc;

use tracing::debug;

use super::{Asset, AssetError, AssetKind};

impl Asset {
    /// Whether this asset concatenates several physical files.
    pub fn is_fragment_list(&self) -> bool {
        matches!(self.kind, AssetKind::Config | AssetKind::Manifest)
    }

    /// Append the fragments of `other` after this asset's own.
    pub fn append(&self, other: &Asset) -> Result<(), AssetError> {
        if !self.is_fragment_list() {
            return Err(AssetError::NotAFragment(self.rel_path.clone()));
        }
        if !other.is_fragment_list() {
            return Err(AssetError::NotAFragment(other.rel_path.clone()));
        }
        if self.rel_path != other.rel_path {
            return Err(AssetError::FragmentPathMismatch {
                target: self.rel_path.clone(),
                other: other.rel_path.clone(),
            });
        }

        let fragments = other.sources.borrow().clone();
        debug!(
            rel_path = %self.rel_path.display(),
            added = fragments.len(),
            "Appending configuration fragments"
        );
        self.sources.borrow_mut().extend(fragments);
        self.bytes.borrow_mut().take();
        Ok(())
    }

    /// Each fragment's physical path with its bytes, in append order.
    pub fn fragments(&self) -> Result<Vec<(PathBuf, Rc<[u8]>)>, AssetError> {
        self.sources
            .borrow()
            .iter()
            .map(|source| Ok((source.path.clone(), source.read()?)))
            .collect()
    }
}
