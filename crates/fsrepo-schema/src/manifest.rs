use crate::config::{ConfigError, DEFAULT_HASH_LENGTH, DEFAULT_MAX_NAME_LENGTH};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RepositoryManifest {
    pub manifest_version: u32,
    pub repository: RepositorySection,
    #[serde(default)]
    pub types: BTreeMap<String, TypeSection>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RepositorySection {
    pub root: String,
    #[serde(default)]
    pub lock_dir: Option<String>,
    #[serde(default = "default_true")]
    pub restore_all_enabled: bool,
    #[serde(default)]
    pub include_unlisted_types: bool,
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
    #[serde(default = "default_hash_length")]
    pub hash_length: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TypeSection {
    #[serde(default = "default_true")]
    pub included: bool,
    #[serde(default)]
    pub folder: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_max_name_length() -> usize {
    DEFAULT_MAX_NAME_LENGTH
}

fn default_hash_length() -> usize {
    DEFAULT_HASH_LENGTH
}

pub fn parse_manifest_str(input: &str) -> Result<RepositoryManifest, ConfigError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<RepositoryManifest, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_manifest() {
        let input = r#"
manifest_version = 1

[repository]
root = "/srv/repository"
lock_dir = "/run/fsrepo"
restore_all_enabled = false
include_unlisted_types = true
max_name_length = 80
hash_length = 12

[types."cms.document"]
folder = "documents"

[types."cms.eventlog"]
included = false
"#;
        let manifest = parse_manifest_str(input).unwrap();
        assert_eq!(manifest.repository.root, "/srv/repository");
        assert_eq!(manifest.repository.lock_dir.as_deref(), Some("/run/fsrepo"));
        assert!(!manifest.repository.restore_all_enabled);
        assert!(manifest.repository.include_unlisted_types);
        assert_eq!(manifest.repository.max_name_length, 80);
        assert_eq!(manifest.repository.hash_length, 12);

        let doc = &manifest.types["cms.document"];
        assert!(doc.included);
        assert_eq!(doc.folder.as_deref(), Some("documents"));
        assert!(!manifest.types["cms.eventlog"].included);
    }

    #[test]
    fn minimal_manifest_uses_defaults() {
        let manifest = parse_manifest_str(
            r#"
manifest_version = 1
[repository]
root = "repo"
"#,
        )
        .unwrap();
        assert!(manifest.repository.restore_all_enabled);
        assert!(!manifest.repository.include_unlisted_types);
        assert_eq!(manifest.repository.max_name_length, DEFAULT_MAX_NAME_LENGTH);
        assert_eq!(manifest.repository.hash_length, DEFAULT_HASH_LENGTH);
        assert!(manifest.types.is_empty());
    }

    #[test]
    fn rejects_unknown_fields() {
        let result = parse_manifest_str(
            r#"
manifest_version = 1
[repository]
root = "repo"
compression = "zstd"
"#,
        );
        assert!(matches!(result, Err(ConfigError::ParseToml(_))));
    }

    #[test]
    fn rejects_missing_repository_section() {
        assert!(parse_manifest_str("manifest_version = 1\n").is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = parse_manifest_file(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
