//! Storage write models.
//!
//! The engine builds these fully before calling the store, so a commit
//! carries everything one transaction needs: the row changes, the audit
//! events, and the idempotency record that makes the write replayable.

use chrono::{DateTime, Utc};
use quorum_types::{
    Approval, ApprovalId, Decision, EntityId, EntityKind, EntityRecord, EntityStatus, Event,
    EventId, EventSubject, EventType,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Event Append ─────────────────────────────────────────────────────

/// An audit event to be appended. Ids are generated by the caller so the
/// result it caches for idempotent replay is complete before the commit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventAppend {
    pub id: EventId,
    pub event_type: EventType,
    pub subject: EventSubject,
    pub subject_id: String,
    pub payload: serde_json::Value,
    pub triggered_by: String,
    pub correlation_id: String,
    pub idempotency_key: Option<String>,
}

impl EventAppend {
    pub fn into_event(self, created_at: DateTime<Utc>) -> Event {
        Event {
            id: self.id,
            event_type: self.event_type,
            subject: self.subject,
            subject_id: self.subject_id,
            payload: self.payload,
            triggered_by: self.triggered_by,
            correlation_id: self.correlation_id,
            idempotency_key: self.idempotency_key,
            created_at,
        }
    }
}

// ── Idempotency Record ───────────────────────────────────────────────

/// A cached write result keyed by (idempotency key, operation).
///
/// Stored at most once per pair; replays return the stored result
/// verbatim instead of re-executing the write.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub operation: String,
    pub result: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn new(
        key: impl Into<String>,
        operation: impl Into<String>,
        result: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            operation: operation.into(),
            result,
            created_at,
        }
    }
}

// ── Patch Application ────────────────────────────────────────────────

/// The entity-row half of applying a patch: an optional status write and
/// a shallow merge into the attribute map, last write wins per key.
#[derive(Clone, Debug)]
pub struct PatchApplication {
    pub entity_kind: EntityKind,
    pub entity_id: EntityId,
    /// When set, the commit only succeeds if the entity still has this
    /// status — the guard behind decide-time re-validation.
    pub expected_status: Option<EntityStatus>,
    pub new_status: Option<EntityStatus>,
    pub fields: BTreeMap<String, serde_json::Value>,
}

// ── Composite Commits ────────────────────────────────────────────────

/// Create a task row plus its creation event, gated by an idempotency
/// record, as one atomic unit.
#[derive(Clone, Debug)]
pub struct TaskCreateCommit {
    pub task: EntityRecord,
    pub event: EventAppend,
    pub idempotency: IdempotencyRecord,
}

/// Create a pending approval plus its creation event, gated by an
/// idempotency record, as one atomic unit.
#[derive(Clone, Debug)]
pub struct ProposalCommit {
    pub approval: Approval,
    pub event: EventAppend,
    pub idempotency: IdempotencyRecord,
}

/// Decide a pending approval: conditional PENDING → decided update, the
/// optional entity patch, all events, and the idempotency record, as one
/// atomic unit. Partial application is a correctness violation.
#[derive(Clone, Debug)]
pub struct DecisionCommit {
    pub approval_id: ApprovalId,
    pub decision: Decision,
    pub decided_by: String,
    pub decision_reason: Option<String>,
    /// Present only for approved decisions.
    pub patch: Option<PatchApplication>,
    pub events: Vec<EventAppend>,
    pub idempotency: IdempotencyRecord,
}

/// Apply an auto-approved patch directly: entity merge, patched event,
/// idempotency record, one atomic unit.
#[derive(Clone, Debug)]
pub struct DirectPatchCommit {
    pub patch: PatchApplication,
    pub event: EventAppend,
    pub idempotency: IdempotencyRecord,
}

// ── Commit Outcome ───────────────────────────────────────────────────

/// Result of a composite commit.
///
/// `Replayed` is how a lost idempotency race resolves: the loser discards
/// its own write and receives the winner's stored record, never an error.
#[derive(Clone, Debug)]
pub enum CommitOutcome {
    Committed(Vec<Event>),
    Replayed(IdempotencyRecord),
}
