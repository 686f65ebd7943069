//! Common types shared across connector implementations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two systems of record being reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// The monitoring system (left side of every comparison).
    Monitoring,
    /// The IT service-management system (right side, and the write target).
    ServiceDesk,
}

impl Source {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Monitoring => "monitoring",
            Source::ServiceDesk => "service_desk",
        }
    }

    /// The other system of record.
    #[must_use]
    pub fn opposite(&self) -> Source {
        match self {
            Source::Monitoring => Source::ServiceDesk,
            Source::ServiceDesk => Source::Monitoring,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "monitoring" => Ok(Source::Monitoring),
            "service_desk" => Ok(Source::ServiceDesk),
            _ => Err(format!("Unknown source: {s}")),
        }
    }
}
