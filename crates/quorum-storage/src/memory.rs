//! In-memory reference implementation of the governance storage traits.
//!
//! Deterministic and test-friendly. One `RwLock` guards all tables so the
//! composite commits get the same all-or-nothing behavior a transactional
//! backend provides. Production deployments should use such a backend for
//! source-of-truth data.

use crate::model::{
    CommitOutcome, DecisionCommit, DirectPatchCommit, EventAppend, IdempotencyRecord,
    PatchApplication, ProposalCommit, TaskCreateCommit,
};
use crate::traits::{
    ApprovalStore, CommitStore, EntityStore, EventStore, IdempotencyStore, QueryWindow,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quorum_types::{
    Approval, ApprovalId, ApprovalStatus, EntityId, EntityKind, EntityRecord, Event, EventSubject,
};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[derive(Default)]
struct State {
    entities: HashMap<(EntityKind, EntityId), EntityRecord>,
    events: Vec<Event>,
    approvals: HashMap<ApprovalId, Approval>,
    idempotency: HashMap<(String, String), IdempotencyRecord>,
}

impl State {
    fn replay_of(&self, record: &IdempotencyRecord) -> Option<IdempotencyRecord> {
        self.idempotency
            .get(&(record.key.clone(), record.operation.clone()))
            .cloned()
    }

    /// Event idempotency keys are unique when present, both against the
    /// stored log and within the batch itself.
    fn check_event_keys<'a>(
        &self,
        appends: impl IntoIterator<Item = &'a EventAppend>,
    ) -> StorageResult<()> {
        let mut batch_keys = HashSet::new();
        for append in appends {
            if let Some(key) = &append.idempotency_key {
                if !batch_keys.insert(key.clone())
                    || self
                        .events
                        .iter()
                        .any(|e| e.idempotency_key.as_ref() == Some(key))
                {
                    return Err(StorageError::Conflict(format!(
                        "idempotency key {key} already used by another event"
                    )));
                }
            }
        }
        Ok(())
    }

    fn apply_patch(&mut self, patch: &PatchApplication, now: DateTime<Utc>) -> StorageResult<()> {
        let entity = self
            .entities
            .get_mut(&(patch.entity_kind, patch.entity_id.clone()))
            .ok_or_else(|| {
                StorageError::NotFound(format!(
                    "{} {} not found",
                    patch.entity_kind, patch.entity_id
                ))
            })?;

        if let Some(expected) = patch.expected_status {
            if entity.status != expected {
                return Err(StorageError::Conflict(format!(
                    "{} {} is {}, expected {expected}",
                    patch.entity_kind, patch.entity_id, entity.status
                )));
            }
        }

        if let Some(new_status) = patch.new_status {
            entity.status = new_status;
        }
        for (key, value) in &patch.fields {
            entity.attributes.insert(key.clone(), value.clone());
        }
        entity.updated_at = now;
        Ok(())
    }

    fn store(&mut self, record: IdempotencyRecord, appends: Vec<EventAppend>, now: DateTime<Utc>) {
        for append in appends {
            self.events.push(append.into_event(now));
        }
        self.idempotency
            .insert((record.key.clone(), record.operation.clone()), record);
    }
}

/// In-memory governance storage adapter.
#[derive(Default)]
pub struct InMemoryGovernanceStore {
    state: RwLock<State>,
}

impl InMemoryGovernanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StorageError::Backend("state lock poisoned".to_string()))
    }

    fn write(&self) -> StorageResult<std::sync::RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StorageError::Backend("state lock poisoned".to_string()))
    }
}

#[async_trait]
impl EntityStore for InMemoryGovernanceStore {
    async fn insert_entity(&self, record: EntityRecord) -> StorageResult<()> {
        let mut state = self.write()?;
        let key = (record.kind, record.id.clone());
        if state.entities.contains_key(&key) {
            return Err(StorageError::Conflict(format!(
                "{} {} already exists",
                record.kind, record.id
            )));
        }
        state.entities.insert(key, record);
        Ok(())
    }

    async fn get_entity(
        &self,
        kind: EntityKind,
        id: &EntityId,
    ) -> StorageResult<Option<EntityRecord>> {
        let state = self.read()?;
        Ok(state.entities.get(&(kind, id.clone())).cloned())
    }
}

#[async_trait]
impl EventStore for InMemoryGovernanceStore {
    async fn append_event(&self, append: EventAppend, now: DateTime<Utc>) -> StorageResult<Event> {
        let mut state = self.write()?;
        if let Some(key) = &append.idempotency_key {
            if let Some(existing) = state
                .events
                .iter()
                .find(|e| e.idempotency_key.as_ref() == Some(key))
            {
                // Same resolution rule as the idempotency table: a replay
                // of the same operation returns the stored record, a
                // conflicting reuse is an error.
                if existing.event_type == append.event_type
                    && existing.subject == append.subject
                    && existing.subject_id == append.subject_id
                {
                    return Ok(existing.clone());
                }
                return Err(StorageError::Conflict(format!(
                    "idempotency key {key} already used by another event"
                )));
            }
        }
        let event = append.into_event(now);
        state.events.push(event.clone());
        Ok(event)
    }

    async fn timeline(
        &self,
        subject: EventSubject,
        subject_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<Event>> {
        let state = self.read()?;
        Ok(state
            .events
            .iter()
            .rev()
            .filter(|e| e.subject == subject && e.subject_id == subject_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ApprovalStore for InMemoryGovernanceStore {
    async fn get_approval(&self, id: &ApprovalId) -> StorageResult<Option<Approval>> {
        let state = self.read()?;
        Ok(state.approvals.get(id).cloned())
    }

    async fn list_approvals(
        &self,
        status: Option<ApprovalStatus>,
        window: QueryWindow,
    ) -> StorageResult<Vec<Approval>> {
        let state = self.read()?;
        let mut approvals: Vec<Approval> = state
            .approvals
            .values()
            .filter(|a| status.map_or(true, |s| a.status == s))
            .cloned()
            .collect();
        approvals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(approvals
            .into_iter()
            .skip(window.offset)
            .take(window.limit)
            .collect())
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryGovernanceStore {
    async fn find_idempotent(
        &self,
        key: &str,
        operation: &str,
    ) -> StorageResult<Option<IdempotencyRecord>> {
        let state = self.read()?;
        Ok(state
            .idempotency
            .get(&(key.to_string(), operation.to_string()))
            .cloned())
    }
}

#[async_trait]
impl CommitStore for InMemoryGovernanceStore {
    async fn commit_task_create(
        &self,
        commit: TaskCreateCommit,
        now: DateTime<Utc>,
    ) -> StorageResult<CommitOutcome> {
        let mut state = self.write()?;
        if let Some(existing) = state.replay_of(&commit.idempotency) {
            return Ok(CommitOutcome::Replayed(existing));
        }
        let key = (commit.task.kind, commit.task.id.clone());
        if state.entities.contains_key(&key) {
            return Err(StorageError::Conflict(format!(
                "task {} already exists",
                commit.task.id
            )));
        }
        state.check_event_keys([&commit.event])?;

        state.entities.insert(key, commit.task);
        let event = commit.event.clone().into_event(now);
        state.store(commit.idempotency, vec![commit.event], now);
        Ok(CommitOutcome::Committed(vec![event]))
    }

    async fn commit_proposal(
        &self,
        commit: ProposalCommit,
        now: DateTime<Utc>,
    ) -> StorageResult<CommitOutcome> {
        let mut state = self.write()?;
        if let Some(existing) = state.replay_of(&commit.idempotency) {
            return Ok(CommitOutcome::Replayed(existing));
        }
        if state.approvals.contains_key(&commit.approval.id) {
            return Err(StorageError::Conflict(format!(
                "approval {} already exists",
                commit.approval.id
            )));
        }
        state.check_event_keys([&commit.event])?;

        state
            .approvals
            .insert(commit.approval.id.clone(), commit.approval);
        let event = commit.event.clone().into_event(now);
        state.store(commit.idempotency, vec![commit.event], now);
        Ok(CommitOutcome::Committed(vec![event]))
    }

    async fn commit_decision(
        &self,
        commit: DecisionCommit,
        now: DateTime<Utc>,
    ) -> StorageResult<CommitOutcome> {
        let mut state = self.write()?;
        if let Some(existing) = state.replay_of(&commit.idempotency) {
            return Ok(CommitOutcome::Replayed(existing));
        }

        let approval = state.approvals.get(&commit.approval_id).ok_or_else(|| {
            StorageError::NotFound(format!("approval {} not found", commit.approval_id))
        })?;
        // Conditional update: only a still-pending approval can be decided,
        // so exactly one of two racing deciders wins.
        if approval.status != ApprovalStatus::Pending {
            return Err(StorageError::Conflict(format!(
                "approval {} already {}",
                commit.approval_id, approval.status
            )));
        }
        state.check_event_keys(commit.events.iter())?;

        if let Some(patch) = &commit.patch {
            state.apply_patch(patch, now)?;
        }

        let approval = state
            .approvals
            .get_mut(&commit.approval_id)
            .ok_or_else(|| StorageError::Backend("approval vanished mid-commit".to_string()))?;
        approval.status = commit.decision.into();
        approval.decided_by = Some(commit.decided_by);
        approval.decision_reason = commit.decision_reason;
        approval.decided_at = Some(now);

        let events: Vec<Event> = commit
            .events
            .iter()
            .cloned()
            .map(|append| append.into_event(now))
            .collect();
        state.store(commit.idempotency, commit.events, now);
        Ok(CommitOutcome::Committed(events))
    }

    async fn commit_direct_patch(
        &self,
        commit: DirectPatchCommit,
        now: DateTime<Utc>,
    ) -> StorageResult<CommitOutcome> {
        let mut state = self.write()?;
        if let Some(existing) = state.replay_of(&commit.idempotency) {
            return Ok(CommitOutcome::Replayed(existing));
        }
        state.check_event_keys([&commit.event])?;
        state.apply_patch(&commit.patch, now)?;

        let event = commit.event.clone().into_event(now);
        state.store(commit.idempotency, vec![commit.event], now);
        Ok(CommitOutcome::Committed(vec![event]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_types::{Decision, EventId, EventType, Patch, PackageStatus, TaskStatus};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn append(key: Option<&str>) -> EventAppend {
        EventAppend {
            id: EventId::generate(),
            event_type: EventType::ApprovalDecided,
            subject: EventSubject::Approval,
            subject_id: "a-1".to_string(),
            payload: json!({}),
            triggered_by: "tester".to_string(),
            correlation_id: "c-1".to_string(),
            idempotency_key: key.map(str::to_string),
        }
    }

    fn seeded_store() -> (InMemoryGovernanceStore, EntityId, Approval) {
        let store = InMemoryGovernanceStore::new();
        let package_id = EntityId::new("pkg-1");
        let approval = Approval::new(
            EntityKind::Package,
            package_id.clone(),
            Patch::status_change(PackageStatus::Submitted),
            "submit for review",
            "analyst-1",
        );
        {
            let mut state = store.state.write().unwrap();
            state.entities.insert(
                (EntityKind::Package, package_id.clone()),
                EntityRecord::new_package(package_id.clone()),
            );
            state
                .approvals
                .insert(approval.id.clone(), approval.clone());
        }
        (store, package_id, approval)
    }

    fn decision_commit(approval: &Approval, key: &str) -> DecisionCommit {
        DecisionCommit {
            approval_id: approval.id.clone(),
            decision: Decision::Approved,
            decided_by: "admin-1".to_string(),
            decision_reason: None,
            patch: Some(PatchApplication {
                entity_kind: EntityKind::Package,
                entity_id: approval.entity_id.clone(),
                expected_status: Some(PackageStatus::Draft.into()),
                new_status: Some(PackageStatus::Submitted.into()),
                fields: BTreeMap::new(),
            }),
            events: vec![EventAppend {
                subject_id: approval.id.0.clone(),
                ..append(Some(key))
            }],
            idempotency: IdempotencyRecord::new(key, "decide_approval", json!({"ok": true}), Utc::now()),
        }
    }

    #[tokio::test]
    async fn racing_decides_resolve_to_one_winner() {
        let (store, package_id, approval) = seeded_store();

        let first = store
            .commit_decision(decision_commit(&approval, "k-1"), Utc::now())
            .await
            .unwrap();
        assert!(matches!(first, CommitOutcome::Committed(_)));

        let second = store
            .commit_decision(decision_commit(&approval, "k-2"), Utc::now())
            .await;
        assert!(matches!(second, Err(StorageError::Conflict(_))));

        // the loser caused no second mutation
        let entity = store
            .get_entity(EntityKind::Package, &package_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entity.status, PackageStatus::Submitted.into());
    }

    #[tokio::test]
    async fn replayed_commit_returns_stored_record_and_writes_nothing() {
        let (store, _package_id, approval) = seeded_store();

        store
            .commit_decision(decision_commit(&approval, "k-1"), Utc::now())
            .await
            .unwrap();
        let replay = store
            .commit_decision(decision_commit(&approval, "k-1"), Utc::now())
            .await
            .unwrap();
        let CommitOutcome::Replayed(record) = replay else {
            panic!("expected a replay");
        };
        assert_eq!(record.result, json!({"ok": true}));

        let events = store
            .timeline(EventSubject::Approval, &approval.id.0, 10)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_keys_within_one_commit_are_rejected() {
        let (store, package_id, approval) = seeded_store();
        let mut commit = decision_commit(&approval, "k-1");
        commit.events.push(EventAppend {
            subject_id: approval.id.0.clone(),
            ..append(Some("k-1"))
        });

        let result = store.commit_decision(commit, Utc::now()).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));

        // the commit was rejected whole
        let approval = store.get_approval(&approval.id).await.unwrap().unwrap();
        assert!(approval.is_pending());
        let entity = store
            .get_entity(EntityKind::Package, &package_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entity.status, PackageStatus::Draft.into());
    }

    #[tokio::test]
    async fn stale_expected_status_conflicts() {
        let (store, package_id, approval) = seeded_store();
        let mut commit = decision_commit(&approval, "k-1");
        if let Some(patch) = &mut commit.patch {
            patch.expected_status = Some(PackageStatus::Active.into());
        }
        let result = store.commit_decision(commit, Utc::now()).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));

        // approval stayed pending, entity untouched
        let approval = store.get_approval(&approval.id).await.unwrap().unwrap();
        assert!(approval.is_pending());
        let entity = store
            .get_entity(EntityKind::Package, &package_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entity.status, PackageStatus::Draft.into());
    }

    #[tokio::test]
    async fn timeline_is_newest_first_and_bounded() {
        let store = InMemoryGovernanceStore::new();
        for index in 0..5 {
            let mut event = append(None);
            event.payload = json!({ "index": index });
            store.append_event(event, Utc::now()).await.unwrap();
        }
        let events = store
            .timeline(EventSubject::Approval, "a-1", 3)
            .await
            .unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].payload["index"], 4);
        assert_eq!(events[2].payload["index"], 2);
    }

    #[tokio::test]
    async fn append_event_replays_same_operation_and_rejects_conflicts() {
        let store = InMemoryGovernanceStore::new();
        let first = store.append_event(append(Some("k-9")), Utc::now()).await.unwrap();
        let replay = store.append_event(append(Some("k-9")), Utc::now()).await.unwrap();
        assert_eq!(first.id, replay.id);

        let mut conflicting = append(Some("k-9"));
        conflicting.event_type = EventType::PackagePatched;
        conflicting.subject = EventSubject::Package;
        conflicting.subject_id = "pkg-1".to_string();
        let result = store.append_event(conflicting, Utc::now()).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn direct_patch_merges_fields_last_write_wins() {
        let (store, package_id, _approval) = seeded_store();
        let commit = DirectPatchCommit {
            patch: PatchApplication {
                entity_kind: EntityKind::Package,
                entity_id: package_id.clone(),
                expected_status: None,
                new_status: None,
                fields: BTreeMap::from([
                    ("metadata".to_string(), json!({"note": "updated"})),
                ]),
            },
            event: append(Some("k-3")),
            idempotency: IdempotencyRecord::new("k-3", "submit_patch", json!({}), Utc::now()),
        };
        store.commit_direct_patch(commit, Utc::now()).await.unwrap();

        let entity = store
            .get_entity(EntityKind::Package, &package_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entity.attributes["metadata"], json!({"note": "updated"}));
    }

    #[tokio::test]
    async fn task_creation_is_idempotent() {
        let store = InMemoryGovernanceStore::new();
        let task = EntityRecord::new_task(EntityId::new("t-1"), EntityId::new("pkg-1"));
        let commit = TaskCreateCommit {
            task: task.clone(),
            event: EventAppend {
                event_type: EventType::TaskCreated,
                subject: EventSubject::Task,
                subject_id: "t-1".to_string(),
                ..append(Some("k-4"))
            },
            idempotency: IdempotencyRecord::new(
                "k-4",
                "create_task",
                json!({"task_id": "t-1"}),
                Utc::now(),
            ),
        };
        let first = store.commit_task_create(commit.clone(), Utc::now()).await.unwrap();
        assert!(matches!(first, CommitOutcome::Committed(_)));
        let replay = store.commit_task_create(commit, Utc::now()).await.unwrap();
        let CommitOutcome::Replayed(record) = replay else {
            panic!("expected a replay");
        };
        assert_eq!(record.result["task_id"], "t-1");

        let created = store
            .get_entity(EntityKind::Task, &EntityId::new("t-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.status, TaskStatus::Pending.into());
    }
}
