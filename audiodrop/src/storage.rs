//! Layout of the storage root: one workspace directory per job, plus
//! archives at the top level. The same tree is served for download.

use std::path::{Component, Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Create the workspace for job `id` under `root`.
///
/// The workspace directory itself must not exist yet, so no two jobs share one.
pub fn create_workspace(root: &Path, id: Uuid) -> Result<PathBuf> {
    let path = root.join(id.to_string());
    std::fs::create_dir_all(root)
        .and_then(|()| std::fs::create_dir(&path))
        .map_err(|source| Error::Workspace {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

/// Removes a job workspace when dropped, unless [`WorkspaceGuard::keep`] was called.
pub struct WorkspaceGuard {
    path: PathBuf,
    armed: bool,
}

impl WorkspaceGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The workspace now backs a published artifact.
    pub fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        if self.armed && self.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to clean up workspace");
            }
        }
    }
}

/// Normalize a path by resolving `.` and `..` components without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                parts.pop();
            }
            Component::CurDir => {}
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

/// Resolve `relative` against `root`, refusing anything that lands outside it.
///
/// Symlinks are followed when the target exists, so a link pointing out of
/// the root is rejected too.
pub fn resolve_under(root: &Path, relative: &str) -> Result<PathBuf> {
    let canonical_root = root
        .canonicalize()
        .unwrap_or_else(|_| normalize_path(root));
    let joined = canonical_root.join(relative.trim_start_matches('/'));
    let resolved = joined
        .canonicalize()
        .unwrap_or_else(|_| normalize_path(&joined));

    if resolved.starts_with(&canonical_root) {
        Ok(resolved)
    } else {
        warn!(
            path = %relative,
            root = %root.display(),
            "requested path outside storage root"
        );
        Err(Error::InvalidPath(format!(
            "{relative} is outside the storage root"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_create_workspace_is_exclusive() {
        let root = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();

        let path = create_workspace(root.path(), id).unwrap();
        assert!(path.is_dir());
        assert_eq!(path, root.path().join(id.to_string()));

        let err = create_workspace(root.path(), id).unwrap_err();
        assert!(matches!(err, Error::Workspace { .. }));
    }

    #[test]
    fn test_create_workspace_creates_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("public");
        let path = create_workspace(&root, Uuid::new_v4()).unwrap();
        assert!(path.is_dir());
    }

    #[test]
    fn test_guard_removes_unless_kept() {
        let root = tempfile::tempdir().unwrap();

        let dropped = create_workspace(root.path(), Uuid::new_v4()).unwrap();
        fs::write(dropped.join("song.mp3"), b"x").unwrap();
        drop(WorkspaceGuard::new(dropped.clone()));
        assert!(!dropped.exists());

        let kept = create_workspace(root.path(), Uuid::new_v4()).unwrap();
        WorkspaceGuard::new(kept.clone()).keep();
        assert!(kept.exists());
    }

    #[test]
    fn test_resolve_under_valid() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("job")).unwrap();
        fs::write(root.path().join("job").join("song.mp3"), b"x").unwrap();

        let resolved = resolve_under(root.path(), "job/song.mp3").unwrap();
        assert_eq!(
            resolved,
            root.path().canonicalize().unwrap().join("job").join("song.mp3")
        );
    }

    #[test]
    fn test_resolve_under_parent_traversal() {
        let root = tempfile::tempdir().unwrap();
        assert!(resolve_under(root.path(), "../../etc/passwd").is_err());
        assert!(resolve_under(root.path(), "job/../../secret").is_err());
    }

    #[test]
    fn test_resolve_under_absolute_is_rooted() {
        let root = tempfile::tempdir().unwrap();
        let resolved = resolve_under(root.path(), "/etc/passwd").unwrap();
        assert!(resolved.starts_with(root.path().canonicalize().unwrap()));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_under_rejects_escaping_symlink() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret"), b"x").unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret"), root.path().join("link")).unwrap();

        assert!(resolve_under(root.path(), "link").is_err());
    }
}
