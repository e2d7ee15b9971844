//! Path-safe resolution of document-relative assets.
//!
//! A requested path is joined onto the document's base directory and
//! normalised lexically. The result must be the base itself or live
//! below it; anything else is forbidden, whether or not it exists. Only
//! after that check does existence matter. Existing targets are then
//! canonicalised and checked again so a symlink cannot lead outside.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("path escapes the base directory")]
    Forbidden,
    #[error("file not found")]
    NotFound,
}

/// Lexically resolve `requested` against `base`. `base` must be absolute.
///
/// An absolute `requested` replaces `base` entirely, and `..` never climbs
/// above the filesystem root.
pub fn normalize(base: &Path, requested: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in base.join(requested).components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                out.push(component.as_os_str())
            }
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
        }
    }
    out
}

/// True if `candidate` is `base` or a descendant of it.
///
/// `Path::starts_with` compares whole components, which is the same as
/// requiring the base followed by a separator.
pub fn is_within(base: &Path, candidate: &Path) -> bool {
    candidate.starts_with(base)
}

/// Validate `requested` against `base` without touching the filesystem.
pub fn check(base: &Path, requested: &str) -> Result<PathBuf, ResolveError> {
    let resolved = normalize(base, Path::new(requested));
    if is_within(base, &resolved) {
        Ok(resolved)
    } else {
        Err(ResolveError::Forbidden)
    }
}

/// Resolve `requested` to an existing regular file inside `base`.
pub async fn resolve(base: &Path, requested: &str) -> Result<PathBuf, ResolveError> {
    let resolved = check(base, requested)?;

    let canonical = match tokio::fs::canonicalize(&resolved).await {
        Ok(path) => path,
        Err(_) => return Err(ResolveError::NotFound),
    };
    if !is_within(base, &canonical) {
        return Err(ResolveError::Forbidden);
    }

    match tokio::fs::metadata(&canonical).await {
        Ok(meta) if meta.is_file() => Ok(canonical),
        _ => Err(ResolveError::NotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> PathBuf {
        PathBuf::from("/srv/docs")
    }

    #[test]
    fn plain_relative_path_is_accepted() {
        assert_eq!(
            check(&base(), "images/a.png"),
            Ok(PathBuf::from("/srv/docs/images/a.png"))
        );
    }

    #[test]
    fn base_itself_is_accepted() {
        assert_eq!(check(&base(), "."), Ok(base()));
        assert_eq!(check(&base(), "sub/.."), Ok(base()));
    }

    #[test]
    fn inner_parent_segments_that_stay_inside_are_accepted() {
        assert_eq!(
            check(&base(), "a/../b/./c.png"),
            Ok(PathBuf::from("/srv/docs/b/c.png"))
        );
    }

    #[test]
    fn traversal_is_forbidden() {
        assert_eq!(check(&base(), "../secret"), Err(ResolveError::Forbidden));
        assert_eq!(
            check(&base(), "../../etc/passwd"),
            Err(ResolveError::Forbidden)
        );
        assert_eq!(
            check(&base(), "a/../../../etc/passwd"),
            Err(ResolveError::Forbidden)
        );
    }

    #[test]
    fn sibling_with_shared_prefix_is_forbidden() {
        assert_eq!(
            check(&base(), "../docs-private/x.md"),
            Err(ResolveError::Forbidden)
        );
    }

    #[test]
    fn absolute_request_is_forbidden() {
        assert_eq!(check(&base(), "/etc/passwd"), Err(ResolveError::Forbidden));
    }

    #[test]
    fn parent_segments_stop_at_root() {
        assert_eq!(
            normalize(Path::new("/a"), Path::new("../../../b")),
            PathBuf::from("/b")
        );
    }

    #[tokio::test]
    async fn missing_file_inside_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        assert_eq!(
            resolve(&base, "nope.png").await,
            Err(ResolveError::NotFound)
        );
    }

    #[tokio::test]
    async fn missing_file_outside_is_forbidden() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        assert_eq!(
            resolve(&base, "../definitely-not-here.png").await,
            Err(ResolveError::Forbidden)
        );
    }

    #[tokio::test]
    async fn existing_file_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        std::fs::write(base.join("image.png"), b"png").unwrap();
        assert_eq!(
            resolve(&base, "image.png").await,
            Ok(base.join("image.png"))
        );
    }

    #[tokio::test]
    async fn directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        std::fs::create_dir(base.join("sub")).unwrap();
        assert_eq!(resolve(&base, "sub").await, Err(ResolveError::NotFound));
        assert_eq!(resolve(&base, ".").await, Err(ResolveError::NotFound));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_escape_is_forbidden() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), b"s").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), base.join("link.txt"))
            .unwrap();
        assert_eq!(
            resolve(&base, "link.txt").await,
            Err(ResolveError::Forbidden)
        );
    }
}
