//! MIME types by file extension.

use std::path::Path;

use crate::paths::split_ext;

pub const XHTML: &str = "application/xhtml+xml";
pub const XML: &str = "application/xml";
pub const HTML: &str = "text/html";
pub const SVG: &str = "image/svg+xml";
pub const TEXT: &str = "text/plain";
pub const JPEG: &str = "image/jpeg";
pub const PNG: &str = "image/png";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Server configuration fragments (`.htaccess`).
pub const CONFIG_HTACCESS: &str = "config/htaccess";
/// Reftest manifests (`reftest.list`).
pub const CONFIG_REFTEST: &str = "config/reftest";

/// Guess the MIME type of `path` from its extension.
///
/// Paths ending in `.htaccess` are configuration fragments regardless of
/// extension rules. Unknown extensions map to `application/octet-stream`.
pub fn from_path(path: &Path) -> &'static str {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    if file_name.ends_with(".htaccess") {
        return CONFIG_HTACCESS;
    }
    match split_ext(&file_name).1 {
        ".xht" | ".xhtml" => XHTML,
        ".xml" => XML,
        ".htm" | ".html" => HTML,
        ".txt" => TEXT,
        ".jpg" => JPEG,
        ".png" => PNG,
        ".svg" => SVG,
        _ => OCTET_STREAM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_map() {
        assert_eq!(from_path(Path::new("a/test.xht")), XHTML);
        assert_eq!(from_path(Path::new("a/test.xhtml")), XHTML);
        assert_eq!(from_path(Path::new("a/test.htm")), HTML);
        assert_eq!(from_path(Path::new("a/test.svg")), SVG);
        assert_eq!(from_path(Path::new("a/data.xml")), XML);
        assert_eq!(from_path(Path::new("a/ref.png")), PNG);
        assert_eq!(from_path(Path::new("a/notes.txt")), TEXT);
        assert_eq!(from_path(Path::new("a/font.woff")), OCTET_STREAM);
        assert_eq!(from_path(Path::new("a/README")), OCTET_STREAM);
    }

    #[test]
    fn test_htaccess_is_config() {
        assert_eq!(from_path(Path::new("support/.htaccess")), CONFIG_HTACCESS);
    }

    #[test]
    fn test_extension_is_case_sensitive() {
        assert_eq!(from_path(Path::new("a/TEST.HTML")), OCTET_STREAM);
    }
}
