use crate::janitor::prune_empty_parents;
use crate::layout::RepositoryLayout;
use crate::{fsync_dir, StoreError};
use fsrepo_schema::{Record, TypedRecord};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// JSON record files laid out by [`RepositoryLayout`].
///
/// Writes go to a temporary file in the target directory and are renamed
/// into place, so a reader or a crash never observes a half-written record.
pub struct RecordStore {
    layout: RepositoryLayout,
}

impl RecordStore {
    pub fn new(layout: RepositoryLayout) -> Self {
        Self { layout }
    }

    #[inline]
    pub fn layout(&self) -> &RepositoryLayout {
        &self.layout
    }

    pub fn path_for(&self, folder: &str, record: &dyn TypedRecord) -> Result<PathBuf, StoreError> {
        if record.name().is_blank() {
            return Err(StoreError::InvalidName(
                "record name must not be empty".to_owned(),
            ));
        }
        self.layout
            .record_path(folder, record.name().as_str(), record.full_name())
    }

    /// Write `record` under `folder`, replacing any previous version.
    pub fn put(&self, folder: &str, record: &dyn TypedRecord) -> Result<PathBuf, StoreError> {
        let dest = self.path_for(folder, record)?;
        let dir = dest
            .parent()
            .ok_or_else(|| StoreError::InvalidPath(dest.display().to_string()))?;
        fs::create_dir_all(dir)?;

        let content = serde_json::to_string_pretty(&record.to_record())?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(dir)?;

        debug!("wrote record {}", dest.display());
        Ok(dest)
    }

    pub fn get(&self, path: &Path) -> Result<Record, StoreError> {
        if !path.is_file() {
            return Err(StoreError::RecordNotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn exists(&self, folder: &str, record: &dyn TypedRecord) -> Result<bool, StoreError> {
        Ok(self.path_for(folder, record)?.is_file())
    }

    /// Remove the file of `record` and prune the folders it leaves empty.
    /// Returns whether a file was removed.
    pub fn remove(&self, folder: &str, record: &dyn TypedRecord) -> Result<bool, StoreError> {
        let path = self.path_for(folder, record)?;
        self.remove_path(&path)
    }

    pub fn remove_path(&self, path: &Path) -> Result<bool, StoreError> {
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        debug!("removed record {}", path.display());
        if let Some(parent) = path.parent().and_then(|p| self.layout.relative_path(p)) {
            if let Some(relative) = parent.to_str() {
                prune_empty_parents(relative, self.layout.root())?;
            }
        }
        Ok(true)
    }

    /// Every record file in the repository, sorted.
    pub fn list(&self) -> Result<Vec<PathBuf>, StoreError> {
        list_files(self.layout.root())
    }

    /// Record files of one type folder, sorted.
    pub fn list_folder(&self, folder: &str) -> Result<Vec<PathBuf>, StoreError> {
        list_files(&self.layout.root().join(self.layout.type_dir(folder)?))
    }
}

/// Regular files below `dir`, skipping dot-entries (temporary files).
fn list_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}
