//! Quorum storage abstractions.
//!
//! This crate defines the storage contract for the governance core:
//! - governed entity rows (packages, tasks)
//! - approval records with a conditional decide transition
//! - an append-only audit event log
//! - idempotency records for exactly-once writes under retries
//!
//! Design stance:
//! - A transactional backend is the source of truth; each composite
//!   commit operation maps to exactly one transaction there.
//! - The in-memory adapter is a deterministic, test-friendly reference
//!   that holds one lock across all tables to get the same atomicity.

#![deny(unsafe_code)]

mod error;
pub mod memory;
mod model;
mod traits;

pub use error::{StorageError, StorageResult};
pub use model::{
    CommitOutcome, DecisionCommit, DirectPatchCommit, EventAppend, IdempotencyRecord,
    PatchApplication, ProposalCommit, TaskCreateCommit,
};
pub use traits::{
    ApprovalStore, CommitStore, EntityStore, EventStore, GovernanceStore, IdempotencyStore,
    QueryWindow,
};
