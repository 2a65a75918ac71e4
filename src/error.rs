//! Error types shared by the engine and cycle driver.

use thiserror::Error;

/// Construction-time validation and lookup failures.
///
/// The engine never starts with invalid state: every configuration problem is
/// reported before the first cycle runs. Lookup variants cover allocation or
/// drain calls referencing terminals unknown to the engine; callers are
/// guaranteed no partial mutation happened before the check fired.
#[derive(Debug, Error, PartialEq)]
pub enum DbaError {
    #[error("ONU {id} has invalid capacity {capacity}")]
    InvalidCapacity { id: String, capacity: f64 },

    #[error("ONU {id} has a zero history window")]
    InvalidHistoryWindow { id: String },

    #[error("duplicate ONU id {0}")]
    DuplicateOnu(String),

    #[error("group {0} is empty")]
    EmptyGroup(usize),

    #[error("group {index} references unknown ONU {id}")]
    UnknownGroupMember { index: usize, id: String },

    #[error("ONU {0} appears in more than one group")]
    OverlappingGroups(String),

    #[error("unknown ONU {0}")]
    UnknownOnu(String),
}
