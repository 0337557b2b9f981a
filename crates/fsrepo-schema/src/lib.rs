//! Object-model seam and repository configuration for fsrepo.
//!
//! This crate defines what the repository consumes from the surrounding
//! application: the `TypedRecord` interface and its serializable `Record`
//! form, identifier newtypes, and the `RepositoryConfiguration` snapshot
//! (built from a TOML `RepositoryManifest` or any `ConfigurationSource`)
//! that decides which object types are persisted and where.

pub mod config;
pub mod manifest;
pub mod record;
pub mod types;

pub use config::{
    default_lock_dir, ConfigError, ConfigurationSource, ManifestFile, RepositoryConfiguration,
    TypeRule, DEFAULT_HASH_LENGTH, DEFAULT_MAX_NAME_LENGTH, MAX_COMPONENT_LENGTH,
};
pub use manifest::{
    parse_manifest_file, parse_manifest_str, RepositoryManifest, RepositorySection, TypeSection,
};
pub use record::{Record, TypedRecord};
pub use types::{ObjectName, ObjectTypeId};
