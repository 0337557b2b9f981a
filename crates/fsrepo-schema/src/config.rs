use crate::manifest::{parse_manifest_file, RepositoryManifest};
use crate::types::ObjectTypeId;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_MAX_NAME_LENGTH: usize = 60;
pub const DEFAULT_HASH_LENGTH: usize = 10;
/// Upper bound accepted for `max_name_length`; common file systems cap a
/// single path component at 255 bytes.
pub const MAX_COMPONENT_LENGTH: usize = 255;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read repository manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse repository manifest: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported manifest_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("repository root must not be empty")]
    EmptyRoot,
    #[error("invalid name limits: max_name_length={max_name_length}, hash_length={hash_length}")]
    InvalidNameLimits {
        max_name_length: usize,
        hash_length: usize,
    },
    #[error("object type id must not be empty")]
    EmptyTypeId,
}

/// Inclusion rule for one object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRule {
    pub included: bool,
    /// Folder under the repository root; defaults to the type id.
    pub folder: Option<String>,
}

/// Immutable snapshot of the repository settings.
///
/// A snapshot is taken at the start of every public repository call and used
/// unchanged for the rest of that call, so a configuration rebuild never
/// changes the rules halfway through a bulk run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfiguration {
    root_path: PathBuf,
    lock_dir: PathBuf,
    restore_all_enabled: bool,
    include_unlisted_types: bool,
    max_name_length: usize,
    hash_length: usize,
    types: BTreeMap<ObjectTypeId, TypeRule>,
}

impl RepositoryConfiguration {
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            lock_dir: default_lock_dir(),
            restore_all_enabled: true,
            include_unlisted_types: false,
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
            hash_length: DEFAULT_HASH_LENGTH,
            types: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_type(mut self, type_id: impl Into<ObjectTypeId>, rule: TypeRule) -> Self {
        self.types.insert(type_id.into(), rule);
        self
    }

    /// Shorthand for an included type stored in its default folder.
    #[must_use]
    pub fn include(self, type_id: impl Into<ObjectTypeId>) -> Self {
        self.with_type(
            type_id,
            TypeRule {
                included: true,
                folder: None,
            },
        )
    }

    #[must_use]
    pub fn with_lock_dir(mut self, lock_dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = lock_dir.into();
        self
    }

    #[must_use]
    pub fn with_restore_all_enabled(mut self, enabled: bool) -> Self {
        self.restore_all_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_include_unlisted_types(mut self, include: bool) -> Self {
        self.include_unlisted_types = include;
        self
    }

    #[must_use]
    pub fn with_name_limits(mut self, max_name_length: usize, hash_length: usize) -> Self {
        self.max_name_length = max_name_length;
        self.hash_length = hash_length;
        self
    }

    #[inline]
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    #[inline]
    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    #[inline]
    pub fn restore_all_enabled(&self) -> bool {
        self.restore_all_enabled
    }

    #[inline]
    pub fn max_name_length(&self) -> usize {
        self.max_name_length
    }

    #[inline]
    pub fn hash_length(&self) -> usize {
        self.hash_length
    }

    pub fn is_object_type_included(&self, type_id: &ObjectTypeId) -> bool {
        self.types
            .get(type_id)
            .map_or(self.include_unlisted_types, |rule| rule.included)
    }

    /// Unsanitized folder name for a type: the configured folder or the id.
    pub fn type_folder<'a>(&'a self, type_id: &'a ObjectTypeId) -> &'a str {
        self.types
            .get(type_id)
            .and_then(|rule| rule.folder.as_deref())
            .unwrap_or(type_id.as_str())
    }

    /// Explicitly listed types that are included, in id order.
    pub fn included_types(&self) -> impl Iterator<Item = &ObjectTypeId> {
        self.types
            .iter()
            .filter(|(_, rule)| rule.included)
            .map(|(id, _)| id)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRoot);
        }
        if self.hash_length == 0
            || self.max_name_length <= self.hash_length + 1
            || self.max_name_length > MAX_COMPONENT_LENGTH
        {
            return Err(ConfigError::InvalidNameLimits {
                max_name_length: self.max_name_length,
                hash_length: self.hash_length,
            });
        }
        if self.types.keys().any(ObjectTypeId::is_blank) {
            return Err(ConfigError::EmptyTypeId);
        }
        Ok(())
    }

    /// Build a snapshot from a parsed manifest. Relative paths are resolved
    /// against `base_dir`.
    pub fn from_manifest(
        manifest: &RepositoryManifest,
        base_dir: &Path,
    ) -> Result<Self, ConfigError> {
        if manifest.manifest_version != 1 {
            return Err(ConfigError::UnsupportedVersion(manifest.manifest_version));
        }
        let repo = &manifest.repository;
        if repo.root.trim().is_empty() {
            return Err(ConfigError::EmptyRoot);
        }

        let mut config = Self::new(base_dir.join(&repo.root))
            .with_restore_all_enabled(repo.restore_all_enabled)
            .with_include_unlisted_types(repo.include_unlisted_types)
            .with_name_limits(repo.max_name_length, repo.hash_length);
        if let Some(ref lock_dir) = repo.lock_dir {
            config = config.with_lock_dir(base_dir.join(lock_dir));
        }
        for (id, section) in &manifest.types {
            config = config.with_type(
                id.as_str(),
                TypeRule {
                    included: section.included,
                    folder: section.folder.clone(),
                },
            );
        }
        config.validate()?;
        Ok(config)
    }
}

/// Default directory for cross-process lock files.
pub fn default_lock_dir() -> PathBuf {
    std::env::temp_dir().join("fsrepo-locks")
}

/// Produces fresh configuration snapshots.
///
/// Called whenever the cached snapshot has been invalidated because the
/// underlying object-type metadata changed.
pub trait ConfigurationSource: Send + Sync {
    fn build(&self) -> Result<RepositoryConfiguration, ConfigError>;
}

impl<F> ConfigurationSource for F
where
    F: Fn() -> Result<RepositoryConfiguration, ConfigError> + Send + Sync,
{
    fn build(&self) -> Result<RepositoryConfiguration, ConfigError> {
        self()
    }
}

/// Configuration read from a TOML manifest on disk, re-read on every build.
#[derive(Debug, Clone)]
pub struct ManifestFile {
    path: PathBuf,
}

impl ManifestFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigurationSource for ManifestFile {
    fn build(&self) -> Result<RepositoryConfiguration, ConfigError> {
        let manifest = parse_manifest_file(&self.path)?;
        let base_dir = self.path.parent().unwrap_or(Path::new("."));
        RepositoryConfiguration::from_manifest(&manifest, base_dir)
    }
}
