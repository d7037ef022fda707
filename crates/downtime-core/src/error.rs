//! The error shape that crosses the engine boundary.
//!
//! Module-level errors (`CatalogError`, `LedgerError`, ...) are converted into
//! an [`ActionError`] before they reach a caller. Callers match on
//! [`ErrorKind`]; the message is for people.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InsufficientFunds,
    IneligibleTarget,
    UnmetRequirement,
    DuplicateSubmission,
    InvalidPayload,
    ConcurrentModification,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::IneligibleTarget => "ineligible_target",
            ErrorKind::UnmetRequirement => "unmet_requirement",
            ErrorKind::DuplicateSubmission => "duplicate_submission",
            ErrorKind::InvalidPayload => "invalid_payload",
            ErrorKind::ConcurrentModification => "concurrent_modification",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One problem with a submission.
///
/// `slot` is the declaration index of the offending action, or `None` for
/// batch-level problems (aggregate funds, duplicate key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{}{kind}: {message}", slot.map(|s| format!("slot {s}: ")).unwrap_or_default())]
pub struct ActionError {
    pub slot: Option<usize>,
    pub kind: ErrorKind,
    pub message: String,
}

impl ActionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            slot: None,
            kind,
            message: message.into(),
        }
    }

    pub fn at(slot: usize, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            slot: Some(slot),
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_payload(slot: usize, message: impl Into<String>) -> Self {
        Self::at(slot, ErrorKind::InvalidPayload, message)
    }

    pub fn not_found(slot: usize, message: impl Into<String>) -> Self {
        Self::at(slot, ErrorKind::NotFound, message)
    }

    /// Attach a slot index to an error raised without one.
    pub fn in_slot(mut self, slot: usize) -> Self {
        self.slot = Some(slot);
        self
    }
}
