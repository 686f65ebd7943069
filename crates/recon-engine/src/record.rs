//! Canonical asset records and input normalization.
//!
//! Raw provider output is validated and normalized here before any other
//! component sees it. Records are immutable once normalized.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use recon_connector::{FieldMap, RawRecord, Source};

use crate::error::ValidationError;

/// A validated, normalized asset record from one source system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Which system of record this came from.
    pub source: Source,
    /// Asset identifier, non-empty and unique within its source.
    pub asset_id: String,
    /// Flat field map, insertion-ordered.
    pub fields: FieldMap,
}

impl AssetRecord {
    /// Create a record directly. Callers outside tests should prefer
    /// [`normalize_records`], which enforces the input invariants.
    #[must_use]
    pub fn new(source: Source, asset_id: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            source,
            asset_id: asset_id.into(),
            fields,
        }
    }
}

/// Normalize a string value: trim and collapse internal whitespace runs.
#[must_use]
pub fn normalize_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Validate and normalize raw records from one source.
///
/// Trims asset ids and field names, collapses whitespace inside field
/// values (case is preserved), and rejects empty asset ids, empty field
/// names, and duplicate asset ids within the source. Any rejection is
/// fatal to the run; matching never sees a corrupted input set.
pub fn normalize_records(
    source: Source,
    raw: Vec<RawRecord>,
) -> Result<Vec<AssetRecord>, ValidationError> {
    let mut seen: HashSet<String> = HashSet::with_capacity(raw.len());
    let mut records = Vec::with_capacity(raw.len());

    for (index, record) in raw.into_iter().enumerate() {
        let asset_id = record.asset_id.trim().to_string();
        if asset_id.is_empty() {
            return Err(ValidationError::EmptyAssetId {
                system: source,
                index,
            });
        }
        if !seen.insert(asset_id.clone()) {
            return Err(ValidationError::DuplicateAssetId {
                system: source,
                asset_id,
            });
        }

        let mut fields = FieldMap::new();
        for (name, value) in record.fields.iter() {
            let name = name.trim();
            if name.is_empty() {
                return Err(ValidationError::EmptyFieldName {
                    system: source,
                    asset_id,
                });
            }
            fields.insert(name, value.map(normalize_value));
        }

        records.push(AssetRecord {
            source,
            asset_id,
            fields,
        });
    }

    tracing::debug!(
        source = %source,
        count = records.len(),
        "Normalized source records"
    );

    Ok(records)
}
