//! Test metadata records and diagnostics.

use std::fmt;

use serde::Serialize;

use crate::reference::ReferenceData;
use crate::revision::RevisionId;

/// A credited person: display name plus contact URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserData {
    pub name: String,
    pub link: String,
}

impl UserData {
    pub fn new(name: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            link: link.into(),
        }
    }
}

/// A problem found while parsing or validating a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub message: String,
    /// 1-based source line, when the problem is tied to an element
    pub line: Option<usize>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "Line {}: {}", line, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Fields read directly out of a document's metadata container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFields {
    pub title: String,
    pub asserts: Vec<String>,
    pub credits: Vec<UserData>,
    pub reviewers: Vec<UserData>,
    /// Requirement flags, sorted
    pub flags: Vec<String>,
    /// Help links, in document order
    pub links: Vec<String>,
}

impl MetadataFields {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
            && self.asserts.is_empty()
            && self.credits.is_empty()
            && self.reviewers.is_empty()
            && self.flags.is_empty()
            && self.links.is_empty()
    }
}

/// Complete metadata for one test document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub name: String,
    pub title: String,
    pub asserts: Vec<String>,
    pub credits: Vec<UserData>,
    pub reviewers: Vec<UserData>,
    pub flags: Vec<String>,
    pub links: Vec<String>,
    /// Comparison groups; `None` when the document declares no references
    pub references: Option<Vec<Vec<ReferenceData>>>,
    pub revision: Option<RevisionId>,
    pub selftest: bool,
    pub scripttest: bool,
}

impl Metadata {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        assert_eq!(
            Diagnostic::at_line("Duplicate help link http://a/.", Some(4)).to_string(),
            "Line 4: Duplicate help link http://a/."
        );
        assert_eq!(Diagnostic::new("Empty source file").to_string(), "Empty source file");
    }

    #[test]
    fn test_fields_emptiness() {
        let mut fields = MetadataFields::default();
        assert!(fields.is_empty());
        fields.title = "Foo".to_string();
        assert!(!fields.is_empty());
    }
}
