//! SpecSuite Core - conformance test asset model
//!
//! This crate manages the files of a conformance test suite:
//! - Path classification into tests, references, support files and tools
//! - Assets with lazy parsing and line-annotated diagnostics
//! - Metadata extraction from XHTML, HTML, SVG and XML test documents
//! - Reference resolution into ordered comparison groups
//! - A store that keeps one asset per file, and mergeable asset sets
//! - Reftest manifest reading

pub mod asset;
pub mod classify;
pub mod document;
pub mod encoding;
pub mod layout;
pub mod manifest;
pub mod metadata;
pub mod mime;
pub mod paths;
pub mod reference;
pub mod revision;
pub mod set;
pub mod store;

// Classification re-exports
pub use classify::{asset_name_for, asset_type_for, classify, FileCategory, FileInfo};

// Asset re-exports
pub use asset::{Asset, AssetError, AssetKind, DocumentKind, InjectedLinks};
pub use metadata::{Diagnostic, Metadata, MetadataFields, UserData};
pub use reference::{RawReference, ReferenceData, ReferenceKind};

// Store and set re-exports
pub use set::{AssetKey, AssetSet, MergeConflict, MergeOutcome, SetError};
pub use store::{AssetStore, StoreError, StoreOptions};

// Collaborator re-exports
pub use layout::{OutputLayout, RootedLayout};
pub use revision::{NoRevisions, RevisionId, RevisionProvider, RevisionTable};

// Manifest re-exports
pub use manifest::{ManifestContents, ManifestError, ReftestManifest, ReftestRecord};
