//! Path classification for test suite source trees.
//!
//! Maps a repository-relative path to a [`FileInfo`]: whether the file is
//! tracked at all, whether it sits in an approved location, and which
//! [`FileCategory`] it belongs to. Classification is pure and total; it never
//! touches the filesystem.
//!
//! Decision order (first match wins):
//! 1. ignored: root-level files, anything under a top-level `tools/`, any
//!    path through a version-control or staging directory, and a handful of
//!    reserved file names
//! 2. approved: under `approved/support/` or `approved/**/src/`
//! 3. category: tool, support, reference (by directory or naming pattern),
//!    test case (by extension), support otherwise

use std::fmt;
use std::path::MAIN_SEPARATOR;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::paths::split_ext;

// ============================================================================
// Rule Tables
// ============================================================================

const IGNORED_DIRS: &[&str] = &[
    ".hg",
    ".git",
    ".svn",
    "cvs",
    "incoming",
    "work-in-progress",
    "data",
    "archive",
    "reports",
    "test-plan",
    "test-plans",
];

const IGNORED_FILES: &[&str] = &["lock", "LOCK", ".DS_Store", "sections.dat", "get-spec-sections.pl"];

const IGNORED_FILE_PREFIXES: &[&str] = &[".directory", ".hg", ".git"];

const TEST_EXTENSIONS: &[&str] = &[".xht", ".html", ".xhtml", ".htm", ".xml", ".svg"];

const REFERENCE_DIRS: &[&str] = &["reftest", "reference"];

const TOOLS_DIR: &str = "tools";
const SUPPORT_DIR: &str = "support";
const APPROVED_DIR: &str = "approved";
const APPROVED_SOURCE_DIR: &str = "src";

static REFERENCE_FILE_RE: OnceLock<Regex> = OnceLock::new();

fn reference_file_re() -> &'static Regex {
    REFERENCE_FILE_RE.get_or_init(|| {
        Regex::new(r"(^|-)(not)?ref[0-9]*(-|\.[^.]+$)").expect("reference file pattern is valid")
    })
}

fn is_reference_extension(ext: &str) -> bool {
    ext == ".png" || TEST_EXTENSIONS.contains(&ext)
}

// ============================================================================
// Classification Types
// ============================================================================

/// Role of a file within the suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    /// Build and maintenance tooling
    Tool,
    /// Reference rendering for reftests
    Reference,
    /// Images, scripts, fonts and anything else tests load
    Support,
    /// A test document
    TestCase,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Tool => "tool",
            FileCategory::Reference => "reference",
            FileCategory::Support => "support",
            FileCategory::TestCase => "testcase",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of classifying a path.
///
/// `ignored` and `approved` are never both set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FileInfo {
    pub ignored: bool,
    pub approved: bool,
    pub category: FileCategory,
}

// ============================================================================
// Classification
// ============================================================================

/// Split a path into directory segments and file name.
///
/// Splits on `/` when present, otherwise on the platform separator.
pub fn split_path(path: &str) -> (Vec<&str>, &str) {
    let separator = if path.contains('/') { '/' } else { MAIN_SEPARATOR };
    let mut segments: Vec<&str> = path.split(separator).collect();
    let file_name = segments.pop().unwrap_or_default();
    (segments, file_name)
}

/// Classify a repository-relative path.
pub fn classify(path: &str) -> FileInfo {
    let (dirs, file_name) = split_path(path);
    let (_, ext) = split_ext(file_name);
    let has_dir = |name: &str| dirs.iter().any(|d| *d == name);

    let ignored = dirs.is_empty()
        || dirs[0] == TOOLS_DIR
        || dirs.iter().any(|d| IGNORED_DIRS.contains(d))
        || IGNORED_FILES.contains(&file_name)
        || IGNORED_FILE_PREFIXES
            .iter()
            .any(|prefix| file_name.starts_with(prefix));

    let approved = !ignored
        && dirs.len() > 1
        && dirs[0] == APPROVED_DIR
        && (dirs[1] == SUPPORT_DIR || has_dir(APPROVED_SOURCE_DIR));

    let category = if has_dir(TOOLS_DIR) {
        FileCategory::Tool
    } else if has_dir(SUPPORT_DIR) {
        FileCategory::Support
    } else if is_reference_extension(ext)
        && (REFERENCE_DIRS.iter().any(|d| has_dir(*d)) || reference_file_re().is_match(file_name))
    {
        FileCategory::Reference
    } else if TEST_EXTENSIONS.contains(&ext) {
        FileCategory::TestCase
    } else {
        FileCategory::Support
    };

    FileInfo {
        ignored,
        approved,
        category,
    }
}

/// Canonical asset name for a path.
///
/// Tests and references are named by their lower-cased stem; everything else
/// keeps its full lower-cased file name.
pub fn asset_name_for(path: &str) -> String {
    let info = classify(path);
    let (_, file_name) = split_path(path);
    match info.category {
        FileCategory::TestCase | FileCategory::Reference => split_ext(file_name).0.to_lowercase(),
        _ => file_name.to_lowercase(),
    }
}

/// Asset type string for a path (`tool`, `reference`, `support`, `testcase`).
pub fn asset_type_for(path: &str) -> &'static str {
    classify(path).category.as_str()
}

// ============================================================================
// Predicates
// ============================================================================

pub fn is_tracked(path: &str) -> bool {
    !classify(path).ignored
}

pub fn is_approved_path(path: &str) -> bool {
    let info = classify(path);
    !info.ignored && info.approved
}

pub fn is_ignored(path: &str) -> bool {
    classify(path).ignored
}

/// Whether files directly inside `dir` would be ignored.
pub fn is_ignored_dir(dir: &str) -> bool {
    let probe = if dir.contains('/') {
        format!("{}/foo", dir)
    } else {
        format!("{}{}foo", dir, MAIN_SEPARATOR)
    };
    classify(&probe).ignored
}

pub fn is_tool(path: &str) -> bool {
    is_tracked_as(path, FileCategory::Tool)
}

pub fn is_support(path: &str) -> bool {
    is_tracked_as(path, FileCategory::Support)
}

pub fn is_reference(path: &str) -> bool {
    is_tracked_as(path, FileCategory::Reference)
}

/// Reference category check that also accepts ignored paths.
pub fn is_reference_anywhere(path: &str) -> bool {
    classify(path).category == FileCategory::Reference
}

pub fn is_test_case(path: &str) -> bool {
    is_tracked_as(path, FileCategory::TestCase)
}

fn is_tracked_as(path: &str, category: FileCategory) -> bool {
    let info = classify(path);
    !info.ignored && info.category == category
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_literal_classifications() {
        assert_eq!(
            classify("approved/support/foo.html"),
            FileInfo {
                ignored: false,
                approved: true,
                category: FileCategory::Support
            }
        );
        assert_eq!(
            classify("reftest/foo-ref.html"),
            FileInfo {
                ignored: false,
                approved: false,
                category: FileCategory::Reference
            }
        );
        assert_eq!(classify("tools/x/foo.html").category, FileCategory::Tool);
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("foo"), (vec![], "foo"));
        assert_eq!(split_path("foo/bar"), (vec!["foo"], "bar"));
        assert_eq!(split_path("foo/bar/xxx"), (vec!["foo", "bar"], "xxx"));
        if MAIN_SEPARATOR == '/' {
            assert_eq!(split_path("foo\\bar"), (vec![], "foo\\bar"));
            assert_eq!(split_path("foo\\bar/xxx"), (vec!["foo\\bar"], "xxx"));
        }
    }

    #[test]
    fn test_tracked() {
        assert!(!is_tracked("foo"));
        assert!(is_tracked("dir/foo"));
        assert!(is_tracked("dir/foo.html"));
        assert!(is_tracked("dir/foo-ref.html"));
        assert!(is_tracked("dir/foo.png"));

        for d in IGNORED_DIRS {
            assert!(!is_tracked(&format!("{}/bar", d)), "{}", d);
            assert!(!is_tracked(&format!("dir/{}/bar", d)), "{}", d);
            assert!(is_tracked(&format!("{}x/bar", d)), "{}", d);
            assert!(is_tracked(&format!("dir/{}x/bar", d)), "{}", d);
        }

        assert!(!is_tracked("tools/bar"));
        assert!(is_tracked("dir/tools/bar"));

        for f in IGNORED_FILE_PREFIXES {
            assert!(!is_tracked(&format!("dir/{}", f)));
            assert!(!is_tracked(&format!("dir/{}x", f)));
        }
        for f in IGNORED_FILES {
            assert!(!is_tracked(&format!("dir/{}", f)));
            assert!(is_tracked(&format!("dir/{}x", f)));
        }
    }

    #[test]
    fn test_approved_path() {
        assert!(!is_approved_path("approved"));
        assert!(!is_approved_path("approved/foo"));
        assert!(!is_approved_path("approved/foo/bar"));
        assert!(!is_approved_path("approved/support"));
        assert!(is_approved_path("approved/support/foo"));
        assert!(is_approved_path("approved/support/foo/bar"));
        assert!(!is_approved_path("approved/support/.hg/bar"));
        assert!(!is_approved_path("approved/src"));
        assert!(is_approved_path("approved/src/foo"));
        assert!(is_approved_path("approved/src/foo/bar"));
        assert!(is_approved_path("approved/foo/src/bar"));
        assert!(!is_approved_path("approved/src/.hg/bar"));
    }

    #[test]
    fn test_tool() {
        assert!(!is_tool("tools"));
        assert!(!is_tool("tools/foo"));
        assert!(!is_tool("tools/foo/bar"));
        assert!(is_tool("foo/tools/bar"));
        assert!(is_tool("foo/tools/bar/xxx"));
    }

    #[test]
    fn test_support() {
        assert!(!is_support("foo"));
        assert!(is_support("support/foo"));
        assert!(is_support("foo/bar"));
        assert!(!is_support("tools/foo"));
        assert!(!is_support("reftest/foo.html"));
        assert!(!is_support("reference/foo.html"));
        assert!(!is_support("foo/ref-bar.html"));
        assert!(!is_support("foo/notref-bar.html"));
        assert!(!is_support("foo/bar-ref012-xxx.html"));
        assert!(!is_support("foo/bar.html"));
        assert!(!is_support("foo/bar.svg"));
    }

    #[test]
    fn test_reference() {
        assert!(!is_reference("foo"));
        assert!(!is_reference("foo/bar"));
        assert!(!is_reference("support/foo"));
        assert!(!is_reference("tools/foo"));
        assert!(is_reference("reftest/foo.html"));
        assert!(is_reference("reference/foo.html"));
        assert!(is_reference("foo/ref-bar.html"));
        assert!(is_reference("foo/notref-bar.html"));
        assert!(is_reference("foo/bar-ref-xxx.html"));
        assert!(is_reference("foo/bar-notref-xxx.html"));
        assert!(is_reference("foo/bar-ref012.html"));
        assert!(is_reference("foo/bar-notref012.html"));
        assert!(is_reference("foo/bar-ref.png"));
        assert!(!is_reference("foo/bar-ref.txt"));
        assert!(!is_reference("foo/preference.html"));
    }

    #[test]
    fn test_reference_anywhere_ignores_tracking() {
        assert!(!is_reference("ref-root.html"));
        assert!(is_reference_anywhere("ref-root.html"));
    }

    #[test]
    fn test_ignored_dir() {
        assert!(is_ignored_dir("dir/.hg"));
        assert!(is_ignored_dir("tools"));
        assert!(!is_ignored_dir("dir/tools"));
        assert!(!is_ignored_dir("css21/backgrounds"));
    }

    #[test]
    fn test_asset_names() {
        assert_eq!(asset_name_for("css21/Foo-001.XHT"), "foo-001.xht");
        assert_eq!(asset_name_for("css21/Foo-001.xht"), "foo-001");
        assert_eq!(asset_name_for("reftest/Foo-Ref.html"), "foo-ref");
        assert_eq!(asset_name_for("support/Image.PNG"), "image.png");
        assert_eq!(asset_name_for("css21/.htaccess"), ".htaccess");
        assert_eq!(asset_type_for("css21/foo.xht"), "testcase");
        assert_eq!(asset_type_for("css21/support/a.css"), "support");
    }
}
