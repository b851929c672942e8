//! Governed entities: packages and tasks.
//!
//! Each entity kind carries a closed status enumeration. The transition
//! registries in `quorum-policy` are the authority on which status edges
//! exist; the `is_terminal` helpers here are informational shortcuts.

use crate::error::ParseError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

// ── Entity Kind ──────────────────────────────────────────────────────

/// The kind of a governed entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Package,
    Task,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Package => "package",
            EntityKind::Task => "task",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "package" => Ok(EntityKind::Package),
            "task" => Ok(EntityKind::Task),
            other => Err(ParseError::UnknownEntityKind(other.to_string())),
        }
    }
}

// ── Package Status ───────────────────────────────────────────────────

/// Package lifecycle statuses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    /// Initial state, editable
    Draft,
    /// Submitted for review
    Submitted,
    /// Under evaluation
    InReview,
    /// Approved by governance
    Approved,
    /// Contract awarded
    Awarded,
    /// Executing tasks
    Active,
    /// Paused execution
    OnHold,
    /// All tasks done
    Completed,
    /// Cancelled
    Cancelled,
    /// Archived (terminal)
    Archived,
}

impl PackageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageStatus::Draft => "draft",
            PackageStatus::Submitted => "submitted",
            PackageStatus::InReview => "in_review",
            PackageStatus::Approved => "approved",
            PackageStatus::Awarded => "awarded",
            PackageStatus::Active => "active",
            PackageStatus::OnHold => "on_hold",
            PackageStatus::Completed => "completed",
            PackageStatus::Cancelled => "cancelled",
            PackageStatus::Archived => "archived",
        }
    }

    /// Terminal statuses. Completed and cancelled packages still admit
    /// the archival edge; archived admits nothing.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PackageStatus::Completed | PackageStatus::Cancelled | PackageStatus::Archived
        )
    }
}

impl std::fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PackageStatus::Draft),
            "submitted" => Ok(PackageStatus::Submitted),
            "in_review" => Ok(PackageStatus::InReview),
            "approved" => Ok(PackageStatus::Approved),
            "awarded" => Ok(PackageStatus::Awarded),
            "active" => Ok(PackageStatus::Active),
            "on_hold" => Ok(PackageStatus::OnHold),
            "completed" => Ok(PackageStatus::Completed),
            "cancelled" => Ok(PackageStatus::Cancelled),
            "archived" => Ok(PackageStatus::Archived),
            other => Err(ParseError::UnknownStatus {
                kind: EntityKind::Package,
                value: other.to_string(),
            }),
        }
    }
}

// ── Task Status ──────────────────────────────────────────────────────

/// Task lifecycle statuses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started
    Pending,
    /// Being worked on
    InProgress,
    /// Cannot proceed
    Blocked,
    /// Awaiting review
    ReviewNeeded,
    /// Done (terminal)
    Completed,
    /// Cancelled (terminal)
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::ReviewNeeded => "review_needed",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "blocked" => Ok(TaskStatus::Blocked),
            "review_needed" => Ok(TaskStatus::ReviewNeeded),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(ParseError::UnknownStatus {
                kind: EntityKind::Task,
                value: other.to_string(),
            }),
        }
    }
}

// ── Entity Status ────────────────────────────────────────────────────

/// A status value tagged with the entity kind it belongs to.
///
/// Some status names ("completed", "cancelled") exist for both kinds, so a
/// bare string is ambiguous; parsing always happens against a known kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum EntityStatus {
    Package(PackageStatus),
    Task(TaskStatus),
}

impl EntityStatus {
    /// Parse a raw status string against a known entity kind.
    pub fn parse(kind: EntityKind, value: &str) -> Result<Self, ParseError> {
        match kind {
            EntityKind::Package => value.parse().map(EntityStatus::Package),
            EntityKind::Task => value.parse().map(EntityStatus::Task),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityStatus::Package(_) => EntityKind::Package,
            EntityStatus::Task(_) => EntityKind::Task,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Package(s) => s.as_str(),
            EntityStatus::Task(s) => s.as_str(),
        }
    }
}

impl std::fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PackageStatus> for EntityStatus {
    fn from(status: PackageStatus) -> Self {
        EntityStatus::Package(status)
    }
}

impl From<TaskStatus> for EntityStatus {
    fn from(status: TaskStatus) -> Self {
        EntityStatus::Task(status)
    }
}

// ── Entity Identifier ────────────────────────────────────────────────

/// Unique identifier for a governed entity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Entity Record ────────────────────────────────────────────────────

/// A governed entity row: status plus a mutable attribute map.
///
/// The persistence layer owns these records; approvals and events
/// reference them by id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub kind: EntityKind,
    pub status: EntityStatus,
    /// Owning package, for tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<EntityId>,
    /// Mutable attributes (metadata, budget, scope, ...). Patch fields
    /// shallow-merge into this map, last write wins per key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityRecord {
    /// Create a new package in its initial status.
    pub fn new_package(id: EntityId) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind: EntityKind::Package,
            status: EntityStatus::Package(PackageStatus::Draft),
            parent_id: None,
            attributes: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a new task under a package, in its initial status.
    pub fn new_task(id: EntityId, package_id: EntityId) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind: EntityKind::Task,
            status: EntityStatus::Task(TaskStatus::Pending),
            parent_id: Some(package_id),
            attributes: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: EntityStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

// ── Task Specification ───────────────────────────────────────────────

/// Input for direct task creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskSpec {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    /// Upstream source (e.g. an ingested message) that motivated the task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl TaskSpec {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            due_date: None,
            assignee_id: None,
            source_id: None,
        }
    }

    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_assignee(mut self, assignee_id: impl Into<String>) -> Self {
        self.assignee_id = Some(assignee_id.into());
        self
    }

    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Attribute map for the created task record.
    pub fn into_attributes(self) -> BTreeMap<String, serde_json::Value> {
        let mut attributes = BTreeMap::new();
        attributes.insert("title".to_string(), serde_json::Value::from(self.title));
        if let Some(due_date) = self.due_date {
            attributes.insert(
                "due_date".to_string(),
                serde_json::Value::from(due_date.to_rfc3339()),
            );
        }
        if let Some(assignee_id) = self.assignee_id {
            attributes.insert("assignee_id".to_string(), serde_json::Value::from(assignee_id));
        }
        if let Some(source_id) = self.source_id {
            attributes.insert("source_id".to_string(), serde_json::Value::from(source_id));
        }
        attributes
    }
}
