//! Boundary parse errors.

use crate::entity::EntityKind;
use thiserror::Error;

/// Rejection of a raw input at the system boundary.
///
/// Internal interfaces only ever see validated enums; anything that fails
/// to parse stops here.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unknown {kind} status: {value}")]
    UnknownStatus { kind: EntityKind, value: String },

    #[error("unknown entity kind: {0}")]
    UnknownEntityKind(String),

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("unknown impact level: {0}")]
    UnknownImpact(String),

    #[error("unknown uncertainty level: {0}")]
    UnknownUncertainty(String),

    #[error("unknown decision: {0}")]
    UnknownDecision(String),

    #[error("invalid patch: {0}")]
    InvalidPatch(String),
}
