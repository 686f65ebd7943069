//! Changeset construction from accumulated selections.
//!
//! Selections arrive from an external front-end and are folded into
//! change operations here. The accumulator is explicit and owned by the
//! builder; there is no ambient session state. Duplicate selections for
//! the same `(asset_id, field_name)` resolve by **last arrival wins** —
//! this is the documented default for the engine and is enforced
//! uniformly, so a later `skip` retracts an earlier choice and a later
//! choice overrides an earlier `skip`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use recon_connector::{FieldMap, Selection};

use crate::differ::AssetDiff;
use crate::matcher::Presence;
use crate::sorter::assign_sequence;

/// What an operation does to the target system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Create the asset in the service desk.
    Create,
    /// Update fields on an existing asset.
    Update,
    /// Delete the asset. Never inferred from selections; only an explicit
    /// external directive produces one.
    Delete,
}

impl ChangeKind {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One change to apply to the target system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeOperation {
    /// Asset the change applies to.
    pub asset_id: String,
    /// Create, update, or delete.
    pub kind: ChangeKind,
    /// Final field values to write.
    pub fields: FieldMap,
    /// Replay rank assigned by the sorter; deterministic for a given
    /// input set.
    pub sequence: u64,
}

/// Folds selections into a sorted, sequence-assigned changeset.
///
/// Building is pure over the accumulated selections: calling
/// [`ChangesetBuilder::build`] twice yields identical operations,
/// sequences included.
#[derive(Debug, Clone, Default)]
pub struct ChangesetBuilder {
    selections: Vec<Selection>,
}

impl ChangesetBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one selection in arrival order.
    pub fn push(&mut self, selection: Selection) {
        self.selections.push(selection);
    }

    /// Append many selections in arrival order.
    pub fn extend(&mut self, selections: impl IntoIterator<Item = Selection>) {
        self.selections.extend(selections);
    }

    /// Selections accumulated so far, in arrival order.
    #[must_use]
    pub fn selections(&self) -> &[Selection] {
        &self.selections
    }

    /// Fold the accumulated selections into change operations.
    ///
    /// `diffs` supplies presence information: an asset absent from the
    /// service desk gets a `Create`, anything else an `Update`. Assets
    /// whose selections were all skips produce no operation. The output
    /// is sorted and sequence-assigned.
    #[must_use]
    pub fn build(&self, diffs: &[AssetDiff]) -> Vec<ChangeOperation> {
        let presence: BTreeMap<&str, Presence> = diffs
            .iter()
            .map(|d| (d.asset_id.as_str(), d.pair.presence))
            .collect();

        // Arrival order drives last-write-wins; FieldMap::insert replaces
        // in place, so replays over the same list are stable.
        let mut grouped: BTreeMap<String, FieldMap> = BTreeMap::new();
        for selection in &self.selections {
            let fields = grouped.entry(selection.asset_id.clone()).or_default();
            if selection.is_skip() {
                fields.remove(&selection.field_name);
            } else {
                fields.insert(&selection.field_name, selection.value.clone());
            }
        }

        let mut operations = Vec::new();
        for (asset_id, fields) in grouped {
            if fields.is_empty() {
                continue;
            }

            let kind = match presence.get(asset_id.as_str()) {
                // Absent from the target system: the selections create it.
                Some(Presence::LeftOnly) => ChangeKind::Create,
                Some(Presence::Both | Presence::RightOnly) => ChangeKind::Update,
                None => {
                    tracing::warn!(
                        asset_id = %asset_id,
                        "Selection references an asset outside the diff set; treating as update"
                    );
                    ChangeKind::Update
                }
            };

            operations.push(ChangeOperation {
                asset_id,
                kind,
                fields,
                sequence: 0,
            });
        }

        assign_sequence(&mut operations);

        tracing::debug!(
            operations = operations.len(),
            selections = self.selections.len(),
            "Built changeset"
        );

        operations
    }
}
