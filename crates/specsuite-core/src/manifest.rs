//! Reftest manifests.
//!
//! A manifest lists reftest pairs, one per line:
//!
//! ```text
//! # relstrip css21/
//! == test-001.xht test-001-ref.xht
//! != test-002.xht test-002-notref.xht   # trailing comments are ignored
//! ```
//!
//! Paths are relative to the manifest file. `relstrip` directives are
//! collected but not applied.

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::asset::{Asset, AssetError, AssetKind};
use crate::paths;
use crate::reference::ReferenceKind;

/// Errors raised while reading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Manifest Error in {manifest}: Reftest test file {path} does not exist.")]
    MissingTest { manifest: String, path: String },

    #[error("Manifest Error in {manifest}: Reftest reference file {path} does not exist.")]
    MissingReference { manifest: String, path: String },

    #[error("Manifest Error in {manifest}: Reftest test relpath {path} not within relpath root.")]
    TestOutsideRoot { manifest: String, path: String },

    #[error(
        "Manifest Error in {manifest}: Reftest reference relpath {path} not within relpath root."
    )]
    ReferenceOutsideRoot { manifest: String, path: String },

    /// Manifest file could not be read
    #[error(transparent)]
    Asset(#[from] AssetError),
}

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReftestRecord {
    pub test_source: PathBuf,
    pub ref_source: PathBuf,
    pub test_rel: PathBuf,
    pub ref_rel: PathBuf,
    pub kind: ReferenceKind,
}

/// Everything read from a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestContents {
    pub records: Vec<ReftestRecord>,
    /// `relstrip` tokens, in order of appearance
    pub relstrip: Vec<String>,
}

fn relstrip_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#\s*relstrip\s+(\S+)\s*").expect("valid relstrip regex"))
}

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#.*").expect("valid comment regex"))
}

fn line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([=!]=)\s*(\S+)\s+(\S+)").expect("valid record regex"))
}

/// A manifest asset.
#[derive(Debug, Clone)]
pub struct ReftestManifest {
    asset: Rc<Asset>,
}

impl ReftestManifest {
    /// Wrap `asset` if it is a manifest.
    pub fn new(asset: Rc<Asset>) -> Option<Self> {
        (asset.kind() == AssetKind::Manifest).then_some(Self { asset })
    }

    pub fn asset(&self) -> &Rc<Asset> {
        &self.asset
    }

    /// Relative directory the manifest lives in.
    pub fn base_path(&self) -> &Path {
        paths::basepath(self.asset.rel_path())
    }

    /// Parse every fragment of the manifest, checking that each listed
    /// file exists and that relative paths stay inside the output root.
    pub fn read(&self) -> Result<ManifestContents, ManifestError> {
        let rel_base = self.base_path();
        let mut contents = ManifestContents::default();

        for (source, data) in self.asset.fragments()? {
            let src_base = paths::basepath(&source);
            let manifest = source.display().to_string();
            let text = String::from_utf8_lossy(&data);

            for line in text.lines() {
                if let Some(caps) = relstrip_re().captures(line) {
                    contents.relstrip.push(caps[1].to_string());
                }
                let line = comment_re().replace(line, "");
                let Some(caps) = line_re().captures(&line) else {
                    continue;
                };
                let Some(kind) = ReferenceKind::from_symbol(&caps[1]) else {
                    continue;
                };
                let record = ReftestRecord {
                    test_source: src_base.join(&caps[2]),
                    ref_source: src_base.join(&caps[3]),
                    test_rel: rel_base.join(&caps[2]),
                    ref_rel: rel_base.join(&caps[3]),
                    kind,
                };
                check_record(&manifest, &record)?;
                contents.records.push(record);
            }
        }

        debug!(
            manifest = %self.asset.rel_path().display(),
            records = contents.records.len(),
            "Read reftest manifest"
        );
        Ok(contents)
    }
}

fn check_record(manifest: &str, record: &ReftestRecord) -> Result<(), ManifestError> {
    let show = |p: &Path| p.display().to_string();
    if !record.test_source.exists() {
        return Err(ManifestError::MissingTest {
            manifest: manifest.to_string(),
            path: show(&record.test_source),
        });
    }
    if !record.ref_source.exists() {
        return Err(ManifestError::MissingReference {
            manifest: manifest.to_string(),
            path: show(&record.ref_source),
        });
    }
    if !paths::is_path_inside_base(&record.test_rel, None) {
        return Err(ManifestError::TestOutsideRoot {
            manifest: manifest.to_string(),
            path: show(&record.test_rel),
        });
    }
    if !paths::is_path_inside_base(&record.ref_rel, None) {
        return Err(ManifestError::ReferenceOutsideRoot {
            manifest: manifest.to_string(),
            path: show(&record.ref_rel),
        });
    }
    Ok(())
}
