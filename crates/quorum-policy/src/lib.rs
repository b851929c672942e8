//! Quorum policy tables and the patch validator.
//!
//! Everything in this crate is deterministic and rule-based — no model
//! calls, no I/O. The three policy tables are immutable value objects
//! built once at process start and injected into the validator:
//!
//! - [`TransitionRegistry`] — the legal status-transition graphs
//! - [`ApprovalMatrix`] — action → required roles
//! - [`RiskMatrix`] — (impact, uncertainty) → decision category
//!
//! [`PatchValidator`] composes the three into a single allow/deny +
//! approval-requirement verdict for a proposed change.

#![deny(unsafe_code)]

mod approvals;
mod risk_matrix;
mod transitions;
mod validator;

pub use approvals::{ApprovalMatrix, ApprovalRule};
pub use risk_matrix::{RiskCell, RiskMatrix};
pub use transitions::{Transition, TransitionRegistry};
pub use validator::{PatchValidator, PolicySet, Reason, ReasonClass, ValidationResult};
