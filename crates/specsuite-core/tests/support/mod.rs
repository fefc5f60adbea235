//! Shared fixtures for integration tests.
//!
//! A [`Suite`] is a temporary source tree; documents are written into it
//! with their repository-relative paths and then loaded through a store.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use specsuite_core::{Asset, AssetStore};
use tempfile::TempDir;

pub struct Suite {
    dir: TempDir,
}

impl Suite {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write `content` at `rel` (creating directories) and return the
    /// physical path.
    pub fn write(&self, rel: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create fixture dir");
        }
        fs::write(&path, content).expect("Failed to write fixture");
        path
    }

    /// Load `rel` through `store`.
    pub fn load(&self, store: &AssetStore, rel: &str) -> Rc<Asset> {
        store.generate_source(self.root().join(rel), rel, None)
    }

    /// Write and load in one step.
    pub fn add(&self, store: &AssetStore, rel: &str, content: impl AsRef<[u8]>) -> Rc<Asset> {
        self.write(rel, content);
        self.load(store, rel)
    }
}

/// An XHTML document with `head` as the content of its `<head>`.
pub fn xhtml(head: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html xmlns=\"http://www.w3.org/1999/xhtml\">\n<head>\n{}\n</head>\n<body><p>Test passes if there is no red.</p></body>\n</html>\n",
        head
    )
}

/// An HTML document with `head` as the content of its `<head>`.
pub fn html(head: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n{}\n</head>\n<body><p>Test passes if there is no red.</p></body>\n</html>\n",
        head
    )
}

/// A test document with a help link and the given reference links.
pub fn reftest(links: &[(&str, &str)]) -> String {
    let mut head = String::from(
        "<title>CSS Test: Reference chain</title>\n<link rel=\"help\" href=\"http://www.w3.org/TR/CSS21/visuren.html\"/>",
    );
    for (rel, href) in links {
        head.push_str(&format!("\n<link rel=\"{}\" href=\"{}\"/>", rel, href));
    }
    xhtml(&head)
}

/// A reference document with its own reference links.
pub fn reference(links: &[(&str, &str)]) -> String {
    let mut head = String::from("<title>CSS Reference</title>");
    for (rel, href) in links {
        head.push_str(&format!("\n<link rel=\"{}\" href=\"{}\"/>", rel, href));
    }
    xhtml(&head)
}

/// Names and kinds of each group, for compact comparisons.
pub fn group_names(asset: &Asset) -> Vec<Vec<(String, &'static str)>> {
    asset
        .metadata()
        .and_then(|m| m.references)
        .unwrap_or_default()
        .into_iter()
        .map(|group| {
            group
                .into_iter()
                .map(|r| (r.name, r.kind.symbol()))
                .collect()
        })
        .collect()
}
