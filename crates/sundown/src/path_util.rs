//! Path normalization utilities for cross-platform file keys.

use std::path::Path;

/// Normalizes a path to a UTF-8 key with forward slashes.
///
/// Keys are used as `HashMap` lookups and as the `file` field on declarations
/// and modified nodes. On Windows the `\\?\` prefix is stripped by the caller
/// via `dunce::canonicalize` before this runs.
pub fn normalize_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Lexically joins a relative module specifier onto a directory key.
///
/// Resolves `.` and `..` segments without touching the filesystem, so it works
/// for in-memory projects as well as disk-loaded ones. Returns `None` when
/// `..` would escape past the root of the key.
pub fn join_specifier(dir: &str, spec: &str) -> Option<String> {
    let mut parts: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    let absolute = dir.starts_with('/');

    for seg in spec.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    Some(if absolute {
        format!("/{}", joined)
    } else {
        joined
    })
}

/// Returns the directory portion of a normalized file key.
pub fn parent_dir(key: &str) -> &str {
    match key.rfind('/') {
        Some(idx) => &key[..idx],
        None => "",
    }
}
