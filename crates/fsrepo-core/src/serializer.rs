use crate::CoreError;
use fsrepo_schema::{RepositoryConfiguration, TypedRecord};
use fsrepo_store::{RecordStore, RepositoryLayout, StoreError};
use std::path::PathBuf;

/// Writes and removes the on-disk representation of one object.
///
/// Callers have already checked that the object's type is included in
/// `config`, which is the snapshot taken for the current operation.
pub trait ObjectSerializer: Send + Sync {
    fn store(
        &self,
        record: &dyn TypedRecord,
        config: &RepositoryConfiguration,
    ) -> Result<PathBuf, CoreError>;

    /// Returns whether a file was removed.
    fn delete(
        &self,
        record: &dyn TypedRecord,
        config: &RepositoryConfiguration,
    ) -> Result<bool, CoreError>;
}

/// Default serializer: one JSON file per object through [`RecordStore`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSystemSerializer;

impl FileSystemSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl ObjectSerializer for FileSystemSerializer {
    fn store(
        &self,
        record: &dyn TypedRecord,
        config: &RepositoryConfiguration,
    ) -> Result<PathBuf, CoreError> {
        let store = RecordStore::new(RepositoryLayout::from_config(config));
        store
            .put(config.type_folder(record.object_type()), record)
            .map_err(|e| write_error(record, e))
    }

    fn delete(
        &self,
        record: &dyn TypedRecord,
        config: &RepositoryConfiguration,
    ) -> Result<bool, CoreError> {
        let store = RecordStore::new(RepositoryLayout::from_config(config));
        store
            .remove(config.type_folder(record.object_type()), record)
            .map_err(|e| write_error(record, e))
    }
}

/// `type/logical-name`, as used in log messages and errors.
pub(crate) fn describe(record: &dyn TypedRecord) -> String {
    format!(
        "{}/{}",
        record.object_type(),
        record.full_name().unwrap_or(record.name().as_str())
    )
}

fn write_error(record: &dyn TypedRecord, err: StoreError) -> CoreError {
    if err.is_invalid_argument() {
        return CoreError::Store(err);
    }
    CoreError::ObjectWrite {
        object: describe(record),
        reason: err.to_string(),
    }
}
