//! Raw record shapes exchanged with source systems.

use serde::{Deserialize, Serialize};

/// An insertion-ordered mapping of field name to value.
///
/// Field order is significant for diff output, so a plain `HashMap` does
/// not fit; lookups distinguish an absent field from a present-but-null
/// one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMap {
    entries: Vec<(String, Option<String>)>,
}

impl FieldMap {
    /// Create an empty field map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert a field value, replacing any existing value for the name.
    ///
    /// A replaced field keeps its original position; a new field appends.
    pub fn insert(&mut self, name: impl Into<String>, value: Option<String>) {
        let name = name.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Look up a field value. `None` means the field is absent entirely;
    /// `Some(None)` means present but null.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Option<String>> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Check whether a field is present (even with a null value).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Remove a field, returning its value if it was present.
    pub fn remove(&mut self, name: &str) -> Option<Option<String>> {
        let idx = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(idx).1)
    }

    /// Iterate over fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_deref()))
    }

    /// Field names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Option<String>)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (String, Option<String>)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

/// A record as returned by a source provider, before normalization.
///
/// The engine validates and normalizes raw records into its canonical
/// shape; providers are only responsible for a faithful field dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    /// Identifier of the asset within its source system.
    pub asset_id: String,
    /// Flat field map as reported by the source.
    pub fields: FieldMap,
}

impl RawRecord {
    /// Create a raw record.
    #[must_use]
    pub fn new(asset_id: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            asset_id: asset_id.into(),
            fields,
        }
    }
}
