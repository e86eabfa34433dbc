//! Path confinement and stable short identifiers (spec.md §4.A).
//!
//! Never touches the filesystem beyond `std::fs::canonicalize`, which is
//! required to resolve `..`/symlinks against the real workspace root.

use crate::error::CoreError;
use crate::error::Result;
use sha1::Digest;
use sha1::Sha1;
use std::path::Path;
use std::path::PathBuf;

/// Normalize `input` to a workspace-relative POSIX path, rejecting any
/// input whose resolved absolute form escapes `workspace_root`
/// (spec.md §4.A, testable property 4).
pub fn normalize(workspace_root: &Path, input: &str) -> Result<String> {
    let root = canonical_root(workspace_root)?;
    let candidate = root.join(input);

    // The workspace root itself, and any ancestor directories the path
    // touches along the way, may not exist yet — only the final
    // component's existence is optional. We resolve lexically first
    // (purely textual `..`/`.` collapsing) and only then canonicalize
    // whatever prefix of the path does exist, so a reservation on a file
    // that hasn't been created yet still gets validated.
    let lexical = lexically_normalize(&candidate);
    if !lexical.starts_with(&root) {
        return Err(CoreError::PathEscape(input.to_string()));
    }

    let resolved = canonicalize_existing_prefix(&lexical)?;
    if !resolved.starts_with(&root) {
        return Err(CoreError::PathEscape(input.to_string()));
    }

    let relative = lexical
        .strip_prefix(&root)
        .map_err(|_| CoreError::PathEscape(input.to_string()))?;
    Ok(to_posix(relative))
}

fn canonical_root(workspace_root: &Path) -> Result<PathBuf> {
    match std::fs::canonicalize(workspace_root) {
        Ok(p) => Ok(p),
        // The workspace may not exist on disk yet (e.g. a fresh `init`);
        // fall back to a lexical normalization of the root itself.
        Err(_) => Ok(lexically_normalize(workspace_root)),
    }
}

fn lexically_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the longest existing prefix of `path`, then re-append the
/// (not-yet-existing) suffix. Used so `reserve` can validate a path for a
/// file that doesn't exist yet without erroring on `canonicalize`.
fn canonicalize_existing_prefix(path: &Path) -> Result<PathBuf> {
    let mut existing = path;
    let mut suffix: Vec<&std::ffi::OsStr> = Vec::new();
    loop {
        match std::fs::canonicalize(existing) {
            Ok(mut resolved) => {
                for part in suffix.iter().rev() {
                    resolved.push(part);
                }
                return Ok(resolved);
            }
            Err(_) => match existing.parent() {
                Some(parent) => {
                    if let Some(name) = existing.file_name() {
                        suffix.push(name);
                    }
                    existing = parent;
                }
                None => return Ok(lexically_normalize(path)),
            },
        }
    }
}

fn to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// First 12 hex digits of the SHA-1 of `normalized_path`, used as the
/// filename for reservation records (spec.md §4.C, §6).
pub fn short_hash(normalized_path: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(normalized_path.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(12);
    for byte in digest.iter().take(6) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn normalize_accepts_nested_relative_path() {
        let dir = tempdir().unwrap();
        let rel = normalize(dir.path(), "x/y.txt").unwrap();
        assert_eq!(rel, "x/y.txt");
    }

    #[test]
    fn normalize_rejects_parent_traversal() {
        let dir = tempdir().unwrap();
        let err = normalize(dir.path(), "../../etc/passwd").unwrap_err();
        assert!(matches!(err, CoreError::PathEscape(_)));
    }

    #[test]
    fn normalize_rejects_traversal_that_returns_inside_after_leaving() {
        // lexical collapse must not be fooled by a path that dips outside
        // and back in textually.
        let dir = tempdir().unwrap();
        let leaf = dir.path().file_name().unwrap().to_string_lossy().into_owned();
        let input = format!("../{leaf}/ok.txt");
        let rel = normalize(dir.path(), &input).unwrap();
        assert_eq!(rel, "ok.txt");
    }

    #[test]
    fn short_hash_is_12_hex_digits_and_stable() {
        let h1 = short_hash("x/y.txt");
        let h2 = short_hash("x/y.txt");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 12);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn short_hash_differs_for_different_paths() {
        assert_ne!(short_hash("a"), short_hash("b"));
    }
}
