//! Deterministic ordering for diffs and change operations.
//!
//! Natural ordering: identifiers are split into alternating runs of digits
//! and non-digits; numeric runs compare by magnitude, non-digit runs
//! case-insensitively. All sorts are stable, so equal keys keep their
//! relative input order, and replays are byte-for-byte reproducible.

use std::cmp::Ordering;

use crate::changeset::ChangeOperation;
use crate::differ::AssetDiff;

/// One run of a natural sort key.
///
/// A numeric run sorts before a textual run at the same position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NaturalPart {
    /// A digit run. Leading zeros are stripped; magnitude comparison is
    /// digit-count first, then lexical, so arbitrarily long numbers work.
    Number { digits: String },
    /// A non-digit run, case-folded.
    Text(String),
}

impl NaturalPart {
    fn number(run: &str) -> Self {
        let stripped = run.trim_start_matches('0');
        Self::Number {
            digits: if stripped.is_empty() {
                "0".to_string()
            } else {
                stripped.to_string()
            },
        }
    }
}

impl PartialOrd for NaturalPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NaturalPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (NaturalPart::Number { digits: a }, NaturalPart::Number { digits: b }) => {
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
            }
            (NaturalPart::Number { .. }, NaturalPart::Text(_)) => Ordering::Less,
            (NaturalPart::Text(_), NaturalPart::Number { .. }) => Ordering::Greater,
            (NaturalPart::Text(a), NaturalPart::Text(b)) => a.cmp(b),
        }
    }
}

/// Split an identifier into its natural sort key.
#[must_use]
pub fn natural_key(id: &str) -> Vec<NaturalPart> {
    let id = id.trim();
    let mut parts = Vec::new();
    let mut run = String::new();
    let mut run_is_digit: Option<bool> = None;

    for c in id.chars() {
        let is_digit = c.is_ascii_digit();
        if run_is_digit == Some(is_digit) {
            run.push(c);
        } else {
            flush_run(&mut parts, &mut run, run_is_digit);
            run.push(c);
            run_is_digit = Some(is_digit);
        }
    }
    flush_run(&mut parts, &mut run, run_is_digit);

    parts
}

fn flush_run(parts: &mut Vec<NaturalPart>, run: &mut String, is_digit: Option<bool>) {
    if run.is_empty() {
        return;
    }
    let part = match is_digit {
        Some(true) => NaturalPart::number(run),
        _ => NaturalPart::Text(run.to_lowercase()),
    };
    parts.push(part);
    run.clear();
}

/// Compare two optional asset identifiers under natural ordering.
///
/// Missing identifiers sort last.
#[must_use]
pub fn compare_asset_ids(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => natural_key(a).cmp(&natural_key(b)),
    }
}

/// Stably sort diffs by asset identifier.
pub fn sort_diffs(diffs: &mut [AssetDiff]) {
    diffs.sort_by(|a, b| compare_asset_ids(Some(&a.asset_id), Some(&b.asset_id)));
}

/// Stably sort change operations by asset identifier.
pub fn sort_operations(operations: &mut [ChangeOperation]) {
    operations.sort_by(|a, b| compare_asset_ids(Some(&a.asset_id), Some(&b.asset_id)));
}

/// Sort operations and assign each its 0-based rank as the replay
/// sequence number.
pub fn assign_sequence(operations: &mut [ChangeOperation]) {
    sort_operations(operations);
    for (rank, operation) in operations.iter_mut().enumerate() {
        operation.sequence = rank as u64;
    }
}

/// Check that a slice of identifiers is in natural order.
#[must_use]
pub fn is_sorted(ids: &[Option<&str>]) -> bool {
    ids.windows(2)
        .all(|w| compare_asset_ids(w[0], w[1]) != Ordering::Greater)
}
