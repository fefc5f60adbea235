//! Revision lookup for source files.
//!
//! The store never asks version control itself; callers plug in a
//! [`RevisionProvider`] (any `Fn(&Path) -> Option<RevisionId>` works).

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Opaque, totally ordered revision number. Higher is newer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RevisionId(pub u64);

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Answers "which revision last touched this file".
pub trait RevisionProvider {
    fn revision_of(&self, path: &Path) -> Option<RevisionId>;
}

impl<F> RevisionProvider for F
where
    F: Fn(&Path) -> Option<RevisionId>,
{
    fn revision_of(&self, path: &Path) -> Option<RevisionId> {
        self(path)
    }
}

/// Provider for trees without revision history.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRevisions;

impl RevisionProvider for NoRevisions {
    fn revision_of(&self, _path: &Path) -> Option<RevisionId> {
        None
    }
}

/// Fixed path → revision table.
#[derive(Debug, Clone, Default)]
pub struct RevisionTable {
    revisions: HashMap<PathBuf, RevisionId>,
}

impl RevisionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, revision: RevisionId) {
        self.revisions.insert(path.into(), revision);
    }
}

impl RevisionProvider for RevisionTable {
    fn revision_of(&self, path: &Path) -> Option<RevisionId> {
        self.revisions.get(path).copied()
    }
}

/// Newest revision among `paths`.
pub fn newest<'a>(
    provider: &dyn RevisionProvider,
    paths: impl IntoIterator<Item = &'a Path>,
) -> Option<RevisionId> {
    paths
        .into_iter()
        .filter_map(|path| provider.revision_of(path))
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_provider() {
        let provider = |path: &Path| {
            (path.extension().and_then(|e| e.to_str()) == Some("xht")).then_some(RevisionId(7))
        };
        assert_eq!(provider.revision_of(Path::new("a/t.xht")), Some(RevisionId(7)));
        assert_eq!(provider.revision_of(Path::new("a/t.png")), None);
    }

    #[test]
    fn test_newest_picks_max() {
        let mut table = RevisionTable::new();
        table.insert("/a", RevisionId(3));
        table.insert("/b", RevisionId(9));
        let paths = [Path::new("/a"), Path::new("/b"), Path::new("/c")];
        assert_eq!(newest(&table, paths), Some(RevisionId(9)));
        assert_eq!(newest(&NoRevisions, paths), None);
    }
}
