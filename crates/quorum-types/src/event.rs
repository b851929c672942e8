//! Audit events.
//!
//! Events are append-only and never updated or deleted; the event log is
//! the sole source of audit truth for every state change.

use crate::entity::EntityKind;
use serde::{Deserialize, Serialize};

// ── Event Identifier ─────────────────────────────────────────────────

/// Unique identifier for an audit event.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Event Type ───────────────────────────────────────────────────────

/// What happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PackagePatched,
    TaskCreated,
    TaskPatched,
    TaskCompleted,
    ApprovalCreated,
    ApprovalDecided,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PackagePatched => "package_patched",
            EventType::TaskCreated => "task_created",
            EventType::TaskPatched => "task_patched",
            EventType::TaskCompleted => "task_completed",
            EventType::ApprovalCreated => "approval_created",
            EventType::ApprovalDecided => "approval_decided",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Event Subject ────────────────────────────────────────────────────

/// What kind of record an event is about. Approvals are auditable
/// subjects even though they are not governed entities themselves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSubject {
    Package,
    Task,
    Approval,
}

impl EventSubject {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSubject::Package => "package",
            EventSubject::Task => "task",
            EventSubject::Approval => "approval",
        }
    }
}

impl From<EntityKind> for EventSubject {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Package => EventSubject::Package,
            EntityKind::Task => EventSubject::Task,
        }
    }
}

impl std::fmt::Display for EventSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Event Record ─────────────────────────────────────────────────────

/// One immutable audit record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub event_type: EventType,
    pub subject: EventSubject,
    pub subject_id: String,
    pub payload: serde_json::Value,
    /// User id or system name that triggered the event.
    pub triggered_by: String,
    pub correlation_id: String,
    /// Unique when present; ties the event to a gated write operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
