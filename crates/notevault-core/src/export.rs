//! Versioned export document.
//!
//! `{version, exportedAt, notes, trash}`. Importing a document is a
//! full-snapshot restore: the identity's records are cleared first, then
//! the document's records are bulk-inserted.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, ValidationError};
use crate::record::Record;
use crate::types::IdentityId;
use crate::validation::validate_record;

/// Current export document version.
pub const EXPORT_VERSION: u32 = 1;

/// A full snapshot of one identity's records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: u32,
    pub exported_at: i64,
    pub notes: Vec<Record>,
    pub trash: Vec<Record>,
}

impl ExportDocument {
    /// Build a document from a mixed record list, splitting live records
    /// from tombstones.
    pub fn from_records(records: Vec<Record>, exported_at: i64) -> Self {
        let (trash, notes): (Vec<_>, Vec<_>) = records.into_iter().partition(|r| r.deleted);
        Self {
            version: EXPORT_VERSION,
            exported_at,
            notes,
            trash,
        }
    }

    /// All records in the document, live first.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.notes.iter().chain(self.trash.iter())
    }

    /// Check the version and that every record is valid and owned by `identity`.
    pub fn validate(&self, identity: &IdentityId) -> Result<(), ValidationError> {
        if self.version != EXPORT_VERSION {
            return Err(ValidationError::UnsupportedExportVersion(self.version));
        }
        self.records()
            .try_for_each(|record| validate_record(record, Some(identity)))
    }

    /// Records prepared for import: nothing imported is considered synced,
    /// so the next cycle reconciles them against the relay.
    pub fn into_import_records(self) -> Vec<Record> {
        self.notes
            .into_iter()
            .chain(self.trash)
            .map(|mut record| {
                record.synced = false;
                record
            })
            .collect()
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string_pretty(self).map_err(|e| CoreError::EncodingError(e.to_string()))
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        serde_json::from_str(json).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}
