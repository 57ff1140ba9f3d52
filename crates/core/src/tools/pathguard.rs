//! Shared path resolution for every retrieval tool (spec.md §4.6): every
//! path-accepting tool must reject a resolved path outside the project
//! root, including one reached by a symlink.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

pub fn resolve_within_root(input: &str, cwd: &Path, project_root: &Path) -> Result<PathBuf> {
    let candidate = Path::new(input);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        cwd.join(candidate)
    };

    let canonical_root = project_root
        .canonicalize()
        .unwrap_or_else(|_| project_root.to_path_buf());
    let resolved = canonicalize_best_effort(&joined);

    if !resolved.starts_with(&canonical_root) {
        bail!(
            "path escapes project root: {} (resolved to {})",
            joined.display(),
            resolved.display()
        );
    }

    Ok(resolved)
}

/// Canonicalizes the deepest existing ancestor so a not-yet-existing path
/// (or one whose parent is a symlink) still resolves its real location.
fn canonicalize_best_effort(path: &Path) -> PathBuf {
    if let Ok(canon) = path.canonicalize() {
        return canon;
    }
    let mut ancestor = path.parent();
    let mut tail = Vec::new();
    if let Some(name) = path.file_name() {
        tail.push(name.to_os_string());
    }
    while let Some(dir) = ancestor {
        if let Ok(canon_dir) = dir.canonicalize() {
            let mut result = canon_dir;
            for part in tail.iter().rev() {
                result.push(part);
            }
            return result;
        }
        if let Some(name) = dir.file_name() {
            tail.push(name.to_os_string());
        }
        ancestor = dir.parent();
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal_outside_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("project");
        std::fs::create_dir_all(&root).unwrap();
        let err = resolve_within_root("../../etc/passwd", &root, &root).unwrap_err();
        assert!(err.to_string().contains("escapes project root"));
    }

    #[test]
    fn allows_path_inside_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("project");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.txt"), "hi").unwrap();
        let resolved = resolve_within_root("a.txt", &root, &root).unwrap();
        assert!(resolved.starts_with(root.canonicalize().unwrap()));
    }
}
