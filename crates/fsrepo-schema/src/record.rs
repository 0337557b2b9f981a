//! The object-model seam: what the repository needs to know about an object.
//!
//! The application's own object model stays outside this workspace. It only
//! has to expose a type identifier, a code name, an optional full (logical)
//! name and a field map, through [`TypedRecord`].

use crate::types::{ObjectName, ObjectTypeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A persistable application object.
pub trait TypedRecord {
    fn object_type(&self) -> &ObjectTypeId;

    /// Short code name, used as the basis of the on-disk file name.
    fn name(&self) -> &ObjectName;

    /// Fully qualified logical name (for example a tree path). When present
    /// and different from [`name`](Self::name), the file name is
    /// disambiguated with a hash of this value.
    fn full_name(&self) -> Option<&str> {
        None
    }

    /// Snapshot of the object as a plain record for serialization.
    fn to_record(&self) -> Record;
}

/// Serializable form of a [`TypedRecord`], as written to and read from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Record {
    pub object_type: ObjectTypeId,
    pub name: ObjectName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(object_type: impl Into<ObjectTypeId>, name: impl Into<ObjectName>) -> Self {
        Self {
            object_type: object_type.into(),
            name: name.into(),
            full_name: None,
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = Some(full_name.into());
        self
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// The name that identifies this record: the full name when set,
    /// otherwise the code name.
    pub fn logical_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(self.name.as_str())
    }
}

impl TypedRecord for Record {
    fn object_type(&self) -> &ObjectTypeId {
        &self.object_type
    }

    fn name(&self) -> &ObjectName {
        &self.name
    }

    fn full_name(&self) -> Option<&str> {
        self.full_name.as_deref()
    }

    fn to_record(&self) -> Record {
        self.clone()
    }
}
