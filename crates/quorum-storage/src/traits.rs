use crate::model::{
    CommitOutcome, DecisionCommit, DirectPatchCommit, EventAppend, IdempotencyRecord,
    ProposalCommit, TaskCreateCommit,
};
use crate::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quorum_types::{
    Approval, ApprovalId, ApprovalStatus, EntityId, EntityKind, EntityRecord, Event, EventSubject,
};

/// Generic query window for paged reads.
#[derive(Debug, Clone, Copy)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl Default for QueryWindow {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// Storage interface for governed entity rows.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Insert a new entity row. Conflict if the id already exists.
    async fn insert_entity(&self, record: EntityRecord) -> StorageResult<()>;

    /// Get one entity by kind and id.
    async fn get_entity(
        &self,
        kind: EntityKind,
        id: &EntityId,
    ) -> StorageResult<Option<EntityRecord>>;
}

/// Storage interface for the append-only audit log.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one event outside a composite commit.
    ///
    /// If the append carries an idempotency key already used by an event
    /// for the same subject and type, the stored event is returned (replay);
    /// a key reused by a conflicting operation is a Conflict.
    async fn append_event(&self, append: EventAppend, now: DateTime<Utc>) -> StorageResult<Event>;

    /// Read a subject's events, most-recent-first, bounded by `limit`.
    async fn timeline(
        &self,
        subject: EventSubject,
        subject_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<Event>>;
}

/// Storage interface for approval records.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn get_approval(&self, id: &ApprovalId) -> StorageResult<Option<Approval>>;

    /// List approvals newest-first, optionally filtered by status.
    async fn list_approvals(
        &self,
        status: Option<ApprovalStatus>,
        window: QueryWindow,
    ) -> StorageResult<Vec<Approval>>;
}

/// Storage interface for cached idempotent write results.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Look up a previously stored result for (key, operation).
    async fn find_idempotent(
        &self,
        key: &str,
        operation: &str,
    ) -> StorageResult<Option<IdempotencyRecord>>;
}

/// Composite write operations. Each call is one atomic unit: a SQL
/// backend wraps it in a transaction, the in-memory adapter holds one
/// write lock across all tables.
///
/// Every commit is gated by its idempotency record: if the (key,
/// operation) pair is already stored, the commit writes nothing and
/// returns the stored record (`CommitOutcome::Replayed`).
#[async_trait]
pub trait CommitStore: Send + Sync {
    async fn commit_task_create(
        &self,
        commit: TaskCreateCommit,
        now: DateTime<Utc>,
    ) -> StorageResult<CommitOutcome>;

    async fn commit_proposal(
        &self,
        commit: ProposalCommit,
        now: DateTime<Utc>,
    ) -> StorageResult<CommitOutcome>;

    /// Conditional decide: fails with Conflict unless the approval is
    /// still PENDING, so exactly one of two racing decisions wins.
    async fn commit_decision(
        &self,
        commit: DecisionCommit,
        now: DateTime<Utc>,
    ) -> StorageResult<CommitOutcome>;

    async fn commit_direct_patch(
        &self,
        commit: DirectPatchCommit,
        now: DateTime<Utc>,
    ) -> StorageResult<CommitOutcome>;
}

/// Unified storage bundle used by the write coordinator.
pub trait GovernanceStore:
    EntityStore + EventStore + ApprovalStore + IdempotencyStore + CommitStore + Send + Sync
{
}

impl<T> GovernanceStore for T where
    T: EntityStore + EventStore + ApprovalStore + IdempotencyStore + CommitStore + Send + Sync
{
}
