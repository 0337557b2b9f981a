use crate::naming::make_safe_name;
use crate::StoreError;
use fsrepo_schema::RepositoryConfiguration;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory layout of a repository:
/// `root/<sanitized type folder>/<sanitized object name>[@hash]`.
///
/// Type folders may be nested with `/`; every component is sanitized on its
/// own so the hierarchy survives.
#[derive(Debug, Clone)]
pub struct RepositoryLayout {
    root: PathBuf,
    max_name_length: usize,
    hash_length: usize,
}

impl RepositoryLayout {
    pub fn new(root: impl Into<PathBuf>, max_name_length: usize, hash_length: usize) -> Self {
        Self {
            root: root.into(),
            max_name_length,
            hash_length,
        }
    }

    pub fn from_config(config: &RepositoryConfiguration) -> Self {
        Self::new(
            config.root_path(),
            config.max_name_length(),
            config.hash_length(),
        )
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative directory for a type folder such as `cms.document` or
    /// `content/pages`.
    pub fn type_dir(&self, folder: &str) -> Result<PathBuf, StoreError> {
        let mut dir = PathBuf::new();
        for part in folder.split('/').filter(|p| !p.is_empty()) {
            dir.push(make_safe_name(
                part,
                None,
                self.max_name_length,
                self.hash_length,
            )?);
        }
        if dir.as_os_str().is_empty() {
            return Err(StoreError::InvalidName(format!(
                "type folder '{folder}' has no path components"
            )));
        }
        Ok(dir)
    }

    pub fn record_file_name(&self, name: &str, full_name: Option<&str>) -> Result<String, StoreError> {
        make_safe_name(name, full_name, self.max_name_length, self.hash_length)
    }

    /// Absolute path of the file holding one record.
    pub fn record_path(
        &self,
        folder: &str,
        name: &str,
        full_name: Option<&str>,
    ) -> Result<PathBuf, StoreError> {
        Ok(self
            .root
            .join(self.type_dir(folder)?)
            .join(self.record_file_name(name, full_name)?))
    }

    /// `path` relative to the root, if it lies inside it.
    pub fn relative_path<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        path.strip_prefix(&self.root).ok()
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }
}
