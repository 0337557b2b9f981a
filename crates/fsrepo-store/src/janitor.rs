//! Removal of emptied repository directories.
//!
//! The repository root itself is never removed: empty or root-resolving
//! relative paths are a no-op, and paths that would leave the root are
//! rejected.

use crate::StoreError;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Delete `repository_root/relative_path` if it is a directory with no
/// files and no subdirectories. Returns whether a directory was removed.
pub fn delete_if_empty(
    relative_path: Option<&str>,
    repository_root: &Path,
) -> Result<bool, StoreError> {
    let Some(relative) = relative_path.filter(|p| !p.is_empty()) else {
        return Ok(false);
    };
    let Some(dir) = resolve_within(repository_root, relative)? else {
        return Ok(false);
    };
    if !dir.is_dir() || !is_empty_dir(&dir)? {
        return Ok(false);
    }
    delete_directory(&dir, false)
}

/// Delete a directory. A failure caused by the directory not being empty is
/// reported as `Ok(false)`; every other failure is returned.
pub fn delete_directory(path: &Path, recursive: bool) -> Result<bool, StoreError> {
    let result = if recursive {
        fs::remove_dir_all(path)
    } else {
        fs::remove_dir(path)
    };
    match result {
        Ok(()) => {
            debug!("removed directory {}", path.display());
            Ok(true)
        }
        Err(e) if is_not_empty_error(&e) => {
            debug!("directory {} not empty, kept", path.display());
            Ok(false)
        }
        Err(e) => Err(StoreError::Io(e)),
    }
}

/// Remove `relative_path` and then each parent that became empty, stopping
/// at the first non-empty directory or at the root. Returns how many
/// directories were removed.
pub fn prune_empty_parents(relative_path: &str, repository_root: &Path) -> Result<usize, StoreError> {
    check_root(repository_root)?;
    let Some(mut current) = resolve_within(repository_root, relative_path)? else {
        return Ok(0);
    };
    let mut removed = 0;
    while current != repository_root && current.starts_with(repository_root) {
        if !current.is_dir() || !is_empty_dir(&current)? || !delete_directory(&current, false)? {
            break;
        }
        removed += 1;
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
    Ok(removed)
}

fn check_root(repository_root: &Path) -> Result<(), StoreError> {
    if repository_root.as_os_str().is_empty() {
        return Err(StoreError::InvalidPath(
            "repository root must not be empty".to_owned(),
        ));
    }
    Ok(())
}

/// Join `relative` onto the root. Leading separators are ignored and `..`
/// is refused. `None` means the path resolves to the root itself.
fn resolve_within(repository_root: &Path, relative: &str) -> Result<Option<PathBuf>, StoreError> {
    check_root(repository_root)?;
    let mut resolved = repository_root.to_path_buf();
    let mut depth = 0usize;
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::ParentDir => {
                return Err(StoreError::InvalidPath(format!(
                    "'{relative}' escapes the repository root"
                )));
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    Ok((depth > 0).then_some(resolved))
}

fn is_empty_dir(dir: &Path) -> Result<bool, StoreError> {
    Ok(fs::read_dir(dir)?.next().is_none())
}

fn is_not_empty_error(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::DirectoryNotEmpty || is_not_empty_os_error(e)
}

// POSIX allows rmdir(2) to report a non-empty directory as EEXIST.
#[cfg(unix)]
fn is_not_empty_os_error(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(code) if code == libc::ENOTEMPTY || code == libc::EEXIST)
}

#[cfg(not(unix))]
fn is_not_empty_os_error(_e: &io::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("repo");
        fs::create_dir_all(&root).unwrap();
        (dir, root)
    }

    #[test]
    fn empty_relative_path_is_noop() {
        let (_dir, root) = setup();
        assert!(!delete_if_empty(None, &root).unwrap());
        assert!(!delete_if_empty(Some(""), &root).unwrap());
        assert!(root.is_dir());
    }

    #[test]
    fn root_resolving_paths_are_noop() {
        let (_dir, root) = setup();
        assert!(!delete_if_empty(Some("."), &root).unwrap());
        assert!(!delete_if_empty(Some("/"), &root).unwrap());
        assert!(root.is_dir());
    }

    #[test]
    fn empty_root_is_invalid_argument() {
        let err = delete_if_empty(Some("a"), Path::new("")).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn parent_traversal_rejected() {
        let (_dir, root) = setup();
        let err = delete_if_empty(Some("../outside"), &root).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)));
    }

    #[test]
    fn deletes_empty_directory() {
        let (_dir, root) = setup();
        fs::create_dir_all(root.join("cms.user")).unwrap();
        assert!(delete_if_empty(Some("cms.user"), &root).unwrap());
        assert!(!root.join("cms.user").exists());
        assert!(root.is_dir());
    }

    #[test]
    fn keeps_directory_with_file() {
        let (_dir, root) = setup();
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("docs").join("article"), b"{}").unwrap();
        assert!(!delete_if_empty(Some("docs"), &root).unwrap());
        assert!(root.join("docs").join("article").exists());
    }

    #[test]
    fn keeps_directory_with_subdirectory() {
        let (_dir, root) = setup();
        fs::create_dir_all(root.join("docs").join("nested")).unwrap();
        assert!(!delete_if_empty(Some("docs"), &root).unwrap());
        assert!(root.join("docs").join("nested").is_dir());
    }

    #[test]
    fn missing_directory_is_noop() {
        let (_dir, root) = setup();
        assert!(!delete_if_empty(Some("absent"), &root).unwrap());
    }

    #[test]
    fn delete_directory_swallows_not_empty() {
        let (_dir, root) = setup();
        let docs = root.join("docs");
        fs::create_dir_all(&docs).unwrap();
        fs::write(docs.join("a"), b"x").unwrap();
        assert!(!delete_directory(&docs, false).unwrap());
        assert!(docs.is_dir());
    }

    #[test]
    fn delete_directory_recursive_removes_tree() {
        let (_dir, root) = setup();
        let docs = root.join("docs");
        fs::create_dir_all(docs.join("nested")).unwrap();
        fs::write(docs.join("nested").join("a"), b"x").unwrap();
        assert!(delete_directory(&docs, true).unwrap());
        assert!(!docs.exists());
    }

    #[test]
    fn delete_directory_propagates_other_errors() {
        let (_dir, root) = setup();
        let err = delete_directory(&root.join("absent"), false).unwrap_err();
        assert!(matches!(err, StoreError::Io(ref e) if e.kind() == io::ErrorKind::NotFound));
    }

    #[test]
    fn prune_stops_at_root() {
        let (_dir, root) = setup();
        fs::create_dir_all(root.join("a").join("b").join("c")).unwrap();
        let removed = prune_empty_parents("a/b/c", &root).unwrap();
        assert_eq!(removed, 3);
        assert!(root.is_dir());
        assert!(!root.join("a").exists());
    }

    #[test]
    fn prune_stops_at_non_empty_parent() {
        let (_dir, root) = setup();
        fs::create_dir_all(root.join("a").join("b")).unwrap();
        fs::write(root.join("a").join("keep"), b"x").unwrap();
        let removed = prune_empty_parents("a/b", &root).unwrap();
        assert_eq!(removed, 1);
        assert!(root.join("a").join("keep").exists());
    }
}
