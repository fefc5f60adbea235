//! Lexical path helpers.
//!
//! Everything here works on path text only; nothing touches the filesystem
//! except [`canonicalize_lenient`], which falls back to lexical
//! normalization for files that do not exist (inline assets, unresolved
//! references).

use std::path::{Component, Path, PathBuf};

/// Collapse `.` and `..` components without consulting the filesystem.
///
/// Leading `..` components of a relative path are kept; `..` above the root
/// of an absolute path is dropped. An empty result becomes `.`.
pub fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().collect()
}

/// Canonical absolute form of `path`.
///
/// Resolves symlinks when the file exists, otherwise makes the path
/// absolute against the current directory and normalizes it lexically.
pub fn canonicalize_lenient(path: &Path) -> PathBuf {
    if let Ok(real) = std::fs::canonicalize(path) {
        return real;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    normalize(&absolute)
}

/// Directory part of `path`, or an empty path for bare file names.
pub fn basepath(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new(""))
}

/// Split a file name into stem and extension.
///
/// Leading dots do not start an extension, so `.htaccess` has none and
/// `foo.tar.gz` splits into `foo.tar` and `.gz`.
pub fn split_ext(file_name: &str) -> (&str, &str) {
    if let Some(dot) = file_name.rfind('.') {
        if file_name[..dot].chars().any(|c| c != '.') {
            return (&file_name[..dot], &file_name[dot..]);
        }
    }
    (file_name, "")
}

/// Relative path from directory `start` to `path`, both taken lexically.
pub fn relative_path(path: &Path, start: &Path) -> PathBuf {
    let path = normalize(path);
    let start = normalize(start);

    let path_parts: Vec<Component<'_>> = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    let start_parts: Vec<Component<'_>> = start
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();

    let common = path_parts
        .iter()
        .zip(start_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..start_parts.len() {
        result.push("..");
    }
    for part in &path_parts[common..] {
        result.push(part.as_os_str());
    }

    if result.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        result
    }
}

/// Relative URL from the file `start` to the file `end`.
///
/// Always uses `/` separators.
pub fn relative_url(start: &Path, end: &Path) -> String {
    to_url(&relative_path(end, basepath(start)))
}

/// Render a path with `/` separators.
pub fn to_url(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether `path` stays inside `base` (or inside the current root when no
/// base is given) after normalization.
pub fn is_path_inside_base(path: &Path, base: Option<&Path>) -> bool {
    let path = normalize(path);
    let mut remaining = path.components();

    if let Some(base) = base {
        let base = normalize(base);
        for base_part in base.components() {
            if matches!(base_part, Component::CurDir) {
                continue;
            }
            match remaining.next() {
                Some(part) if part == base_part => {}
                _ => return false,
            }
        }
    }

    !matches!(remaining.next(), Some(Component::ParentDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("a/../b/c.xht")), PathBuf::from("b/c.xht"));
        assert_eq!(
            normalize(Path::new("a/x/../../b/c.xht")),
            PathBuf::from("b/c.xht")
        );
        assert_eq!(normalize(Path::new("../a/./b")), PathBuf::from("../a/b"));
        assert_eq!(normalize(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(normalize(Path::new("a/..")), PathBuf::from("."));
    }

    #[test]
    fn test_split_ext() {
        assert_eq!(split_ext("foo.html"), ("foo", ".html"));
        assert_eq!(split_ext("foo.tar.gz"), ("foo.tar", ".gz"));
        assert_eq!(split_ext(".htaccess"), (".htaccess", ""));
        assert_eq!(split_ext("..x"), ("..x", ""));
        assert_eq!(split_ext("README"), ("README", ""));
    }

    #[test]
    fn test_relative_url() {
        assert_eq!(relative_url(Path::new("a/test.html"), Path::new("a/ref.html")), "ref.html");
        assert_eq!(
            relative_url(Path::new("a/x/test.html"), Path::new("b/c.xht")),
            "../../b/c.xht"
        );
        assert_eq!(relative_url(Path::new("test.html"), Path::new("b/c.xht")), "b/c.xht");
        assert_eq!(
            relative_url(Path::new("/out/a/t.html"), Path::new("/out/r.html")),
            "../r.html"
        );
    }

    #[test]
    fn test_is_path_inside_base() {
        assert!(is_path_inside_base(Path::new("a/b.html"), None));
        assert!(!is_path_inside_base(Path::new("../b.html"), None));
        assert!(is_path_inside_base(Path::new("a/../b.html"), None));
        assert!(is_path_inside_base(Path::new("base/x.html"), Some(Path::new("base"))));
        assert!(!is_path_inside_base(Path::new("other/x.html"), Some(Path::new("base"))));
        assert!(!is_path_inside_base(
            Path::new("base/../../x.html"),
            Some(Path::new("base"))
        ));
    }
}
