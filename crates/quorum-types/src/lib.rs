//! Quorum domain types.
//!
//! Shared vocabulary for the governance core:
//! - entity kinds and their closed status enumerations
//! - caller roles and the risk classification axes
//! - patches, approvals, events, and the ids that tie them together
//!
//! All enum-typed inputs are parsed exactly once at the system boundary
//! (`FromStr` / `EntityStatus::parse` / `Patch::from_json`); internal
//! interfaces accept only the validated types, never raw strings.

#![deny(unsafe_code)]

mod approval;
mod entity;
mod error;
mod event;
mod patch;
mod risk;
mod role;

pub use approval::{Approval, ApprovalId, ApprovalStatus, Decision};
pub use entity::{
    EntityId, EntityKind, EntityRecord, EntityStatus, PackageStatus, TaskSpec, TaskStatus,
};
pub use error::ParseError;
pub use event::{Event, EventId, EventSubject, EventType};
pub use patch::Patch;
pub use risk::{DecisionType, ImpactLevel, RiskLevel, UncertaintyLevel};
pub use role::Role;
