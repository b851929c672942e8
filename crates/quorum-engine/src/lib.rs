//! Quorum write engine.
//!
//! The [`WriteCoordinator`] is the single entry point for governed state
//! changes: it validates patches against the policy tables, routes
//! approval-requiring changes through the propose/decide workflow, and
//! commits every mutation together with its audit events and idempotency
//! receipt as one atomic unit.

#![deny(unsafe_code)]

mod coordinator;
mod error;

pub use coordinator::{
    Actor, DecisionReceipt, PatchReceipt, PatchRequest, ProposalReceipt, TaskReceipt,
    WriteCoordinator,
};
pub use error::{WriteError, WriteResult};
