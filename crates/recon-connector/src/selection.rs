//! Selection values exchanged with selection front-ends.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side (or neither) a selection takes for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionOrigin {
    /// Keep the monitoring-system value.
    Left,
    /// Keep the service-desk value.
    Right,
    /// Use an operator-supplied value.
    Custom,
    /// Leave the field untouched.
    Skip,
}

impl SelectionOrigin {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionOrigin::Left => "left",
            SelectionOrigin::Right => "right",
            SelectionOrigin::Custom => "custom",
            SelectionOrigin::Skip => "skip",
        }
    }
}

impl fmt::Display for SelectionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SelectionOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "left" => Ok(SelectionOrigin::Left),
            "right" => Ok(SelectionOrigin::Right),
            "custom" => Ok(SelectionOrigin::Custom),
            "skip" => Ok(SelectionOrigin::Skip),
            _ => Err(format!("Unknown selection origin: {s}")),
        }
    }
}

/// One field-level decision made by a selection front-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Asset the selection applies to.
    pub asset_id: String,
    /// Field the selection applies to.
    pub field_name: String,
    /// The value to keep (`None` clears the field). Ignored for `Skip`.
    pub value: Option<String>,
    /// Where the value came from.
    pub origin: SelectionOrigin,
}

impl Selection {
    /// Create a selection.
    #[must_use]
    pub fn new(
        asset_id: impl Into<String>,
        field_name: impl Into<String>,
        value: Option<String>,
        origin: SelectionOrigin,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            field_name: field_name.into(),
            value,
            origin,
        }
    }

    /// Check whether this selection carries a value to apply.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        self.origin == SelectionOrigin::Skip
    }
}
