//! Output layout collaborator.

use std::path::{Path, PathBuf};

/// Maps a relative output path to its destination.
pub trait OutputLayout {
    fn dest(&self, rel_path: &Path) -> PathBuf;
}

impl<F> OutputLayout for F
where
    F: Fn(&Path) -> PathBuf,
{
    fn dest(&self, rel_path: &Path) -> PathBuf {
        self(rel_path)
    }
}

/// Places every file under a single output directory, keeping its
/// relative path.
#[derive(Debug, Clone)]
pub struct RootedLayout {
    root: PathBuf,
}

impl RootedLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl OutputLayout for RootedLayout {
    fn dest(&self, rel_path: &Path) -> PathBuf {
        self.root.join(rel_path)
    }
}
