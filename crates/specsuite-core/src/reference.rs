//! Reference relations and their resolution into comparison groups.
//!
//! Every markup asset records the `match` / `mismatch` links found in its
//! metadata container as [`RawReference`]s. [`resolve`] walks those links
//! transitively and produces the grouped structure exposed through
//! [`crate::Metadata::references`]:
//!
//! - each chain of `match` targets becomes one group, in link order;
//! - `mismatch` targets reachable from the asset (and everything they
//!   reference in turn) are appended to every group that does not already
//!   name them, or form a group of their own when there is no chain.
//!
//! Chains are explored with a copy of the visited set per branch so that
//! siblings can share a target; mismatches share a single visited set.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::trace;

use crate::asset::Asset;
use crate::document::NodeId;
use crate::paths;

/// Kind of a reference relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Match,
    Mismatch,
}

impl ReferenceKind {
    /// Manifest notation: `==` or `!=`.
    pub fn symbol(&self) -> &'static str {
        match self {
            ReferenceKind::Match => "==",
            ReferenceKind::Mismatch => "!=",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "==" => Some(ReferenceKind::Match),
            "!=" => Some(ReferenceKind::Mismatch),
            _ => None,
        }
    }

    /// Value of the `rel` attribute on a link of this kind.
    pub fn rel(&self) -> &'static str {
        match self {
            ReferenceKind::Match => "match",
            ReferenceKind::Mismatch => "mismatch",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One entry of a comparison group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceData {
    pub name: String,
    pub kind: ReferenceKind,
    /// Path as it should be written relative to the requesting document
    pub rel_path: String,
    pub canonical_path: PathBuf,
}

/// A link from a document to a reference file.
#[derive(Debug, Clone)]
pub struct RawReference {
    pub kind: ReferenceKind,
    /// Link target as currently written
    pub href: String,
    /// The `link` element carrying the relation, if any
    pub node: Option<NodeId>,
    pub(crate) target: Option<Weak<Asset>>,
}

impl RawReference {
    pub fn new(kind: ReferenceKind, href: impl Into<String>, node: Option<NodeId>) -> Self {
        Self {
            kind,
            href: href.into(),
            node,
            target: None,
        }
    }

    /// The resolved target, while its store is alive.
    pub fn target(&self) -> Option<Rc<Asset>> {
        self.target.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_resolved(&self) -> bool {
        self.target().is_some()
    }
}

/// Build the comparison groups for `asset`, or `None` when it declares no
/// references.
pub fn resolve(asset: &Asset) -> Option<Vec<Vec<ReferenceData>>> {
    if !asset.has_references() {
        return None;
    }
    let mut seen = HashSet::from([asset.canonical_path().to_path_buf()]);
    Some(list_references(asset, asset, &mut seen))
}

fn list_references(
    root: &Asset,
    source: &Asset,
    seen: &mut HashSet<PathBuf>,
) -> Vec<Vec<ReferenceData>> {
    let references = source.raw_references();
    trace!(
        source = %source.rel_path().display(),
        count = references.len(),
        "Listing references"
    );

    let mut groups: Vec<Vec<ReferenceData>> = Vec::new();
    for (_, reference) in references
        .iter()
        .filter(|(_, r)| r.kind == ReferenceKind::Match)
    {
        let target = reference.target();
        let data = reference_data(root, source, reference, target.as_deref());
        if !seen.insert(data.canonical_path.clone()) {
            continue;
        }
        match target {
            Some(target) if target.has_references() => {
                let chains = list_references(root, &target, &mut seen.clone());
                if chains.is_empty() {
                    groups.push(vec![data]);
                } else {
                    for chain in chains {
                        let mut group = Vec::with_capacity(chain.len() + 1);
                        group.push(data.clone());
                        group.extend(chain);
                        groups.push(group);
                    }
                }
            }
            _ => groups.push(vec![data]),
        }
    }

    let mut not_refs: IndexMap<String, ReferenceData> = IndexMap::new();
    for (_, reference) in references
        .iter()
        .filter(|(_, r)| r.kind == ReferenceKind::Mismatch)
    {
        let target = reference.target();
        let data = reference_data(root, source, reference, target.as_deref());
        if !seen.insert(data.canonical_path.clone()) {
            continue;
        }
        not_refs.entry(data.name.clone()).or_insert(data);
        if let Some(target) = target.filter(|t| t.has_references()) {
            for nested in list_references(root, &target, seen).into_iter().flatten() {
                not_refs.entry(nested.name.clone()).or_insert(nested);
            }
        }
    }

    if not_refs.is_empty() {
        return groups;
    }
    for entry in not_refs.values_mut() {
        entry.kind = ReferenceKind::Mismatch;
    }
    if groups.is_empty() {
        groups.push(not_refs.into_values().collect());
    } else {
        for group in &mut groups {
            for not_ref in not_refs.values() {
                if !group.iter().any(|r| r.name == not_ref.name) {
                    group.push(not_ref.clone());
                }
            }
        }
    }
    groups
}

fn reference_data(
    root: &Asset,
    source: &Asset,
    reference: &RawReference,
    target: Option<&Asset>,
) -> ReferenceData {
    match target {
        Some(target) => ReferenceData {
            name: target.name(),
            kind: reference.kind,
            rel_path: reference.href.clone(),
            canonical_path: target.canonical_path().to_path_buf(),
        },
        None => {
            let canonical_path = source.unresolved_target_path(&reference.href);
            ReferenceData {
                name: source.reference_name(&reference.href),
                kind: reference.kind,
                rel_path: paths::relative_url(root.canonical_path(), &canonical_path),
                canonical_path,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_notation() {
        assert_eq!(ReferenceKind::Match.symbol(), "==");
        assert_eq!(ReferenceKind::Mismatch.rel(), "mismatch");
        assert_eq!(ReferenceKind::from_symbol("!="), Some(ReferenceKind::Mismatch));
        assert_eq!(ReferenceKind::from_symbol("=~"), None);
    }

    #[test]
    fn test_unlinked_reference_has_no_target() {
        let reference = RawReference::new(ReferenceKind::Match, "ref.html", None);
        assert!(!reference.is_resolved());
        assert!(reference.target().is_none());
    }
}
