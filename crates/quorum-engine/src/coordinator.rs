//! The write coordinator: every governed state change enters here.
//!
//! Each write follows the same shape: idempotency check, validation
//! against current state, then one composite commit that carries the row
//! changes, the audit events, and the cached receipt together. Replays
//! and lost idempotency races both resolve to the stored receipt, so a
//! retried call is indistinguishable from the first.

use crate::error::{WriteError, WriteResult};
use chrono::Utc;
use quorum_policy::PatchValidator;
use quorum_storage::{
    ApprovalStore, CommitOutcome, CommitStore, DecisionCommit, DirectPatchCommit, EntityStore,
    EventAppend, EventStore, GovernanceStore, IdempotencyRecord, IdempotencyStore,
    PatchApplication, ProposalCommit, QueryWindow, TaskCreateCommit,
};
use quorum_types::{
    Approval, ApprovalId, ApprovalStatus, Decision, EntityId, EntityKind, EntityRecord,
    EntityStatus, Event, EventId, EventSubject, EventType, ImpactLevel, Patch, Role, TaskSpec,
    TaskStatus, UncertaintyLevel,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

const OP_SUBMIT_PATCH: &str = "submit_patch";
const OP_PROPOSE: &str = "propose_patch";
const OP_DECIDE: &str = "decide_approval";
const OP_CREATE_TASK: &str = "create_task";

// ── Actor ────────────────────────────────────────────────────────────

/// The authenticated caller of a write: an identifier plus the roles the
/// approval matrix checks against.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub roles: BTreeSet<Role>,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.insert(role);
        self
    }
}

// ── Patch Request ────────────────────────────────────────────────────

/// A request to change an entity's state.
///
/// Risk defaults to MEDIUM/MEDIUM; callers with a real assessment
/// override it via [`with_risk`](Self::with_risk).
#[derive(Clone, Debug)]
pub struct PatchRequest {
    pub kind: EntityKind,
    pub entity_id: EntityId,
    pub patch: Patch,
    pub actor: Actor,
    pub impact: ImpactLevel,
    pub uncertainty: UncertaintyLevel,
    pub idempotency_key: String,
}

impl PatchRequest {
    pub fn new(
        kind: EntityKind,
        entity_id: EntityId,
        patch: Patch,
        actor: Actor,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            entity_id,
            patch,
            actor,
            impact: ImpactLevel::Medium,
            uncertainty: UncertaintyLevel::Medium,
            idempotency_key: idempotency_key.into(),
        }
    }

    pub fn with_risk(mut self, impact: ImpactLevel, uncertainty: UncertaintyLevel) -> Self {
        self.impact = impact;
        self.uncertainty = uncertainty;
        self
    }
}

// ── Receipts ─────────────────────────────────────────────────────────

/// Outcome of a `submit_patch` call. Stored verbatim as the idempotency
/// result, so replays return exactly this.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum PatchReceipt {
    /// The patch was auto-approved and applied.
    Applied {
        entity_id: EntityId,
        status: Option<EntityStatus>,
        event_id: EventId,
    },
    /// The patch needs an approval workflow; a pending approval exists.
    PendingApproval {
        approval_id: ApprovalId,
        event_id: EventId,
    },
}

/// Outcome of a `propose` call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposalReceipt {
    pub approval_id: ApprovalId,
    pub event_id: EventId,
}

/// Outcome of a `decide` call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecisionReceipt {
    pub approval_id: ApprovalId,
    pub decision: Decision,
    pub decided_event_id: EventId,
    /// Present when the decision applied the proposed patch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_event_id: Option<EventId>,
}

/// Outcome of a `create_task` call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskReceipt {
    pub task_id: EntityId,
    pub event_id: EventId,
}

// ── Write Coordinator ────────────────────────────────────────────────

/// Coordinates validated, approved, idempotent writes against the store.
///
/// Holds no mutable state of its own: policy tables are immutable after
/// construction and all serialization of concurrent writers happens in
/// the store's composite commits.
pub struct WriteCoordinator {
    store: Arc<dyn GovernanceStore>,
    validator: PatchValidator,
}

impl WriteCoordinator {
    /// Coordinator with the standard policy tables.
    pub fn new(store: Arc<dyn GovernanceStore>) -> Self {
        Self::with_validator(store, PatchValidator::standard())
    }

    pub fn with_validator(store: Arc<dyn GovernanceStore>, validator: PatchValidator) -> Self {
        Self { store, validator }
    }

    pub fn validator(&self) -> &PatchValidator {
        &self.validator
    }

    /// Submit a patch for an entity.
    ///
    /// Blocked verdicts return [`WriteError::Rejected`] and write nothing,
    /// not even an idempotency record — a rejection is a pure verdict and
    /// is safe to recompute on retry. Verdicts requiring approval create a
    /// pending approval; clean verdicts apply the patch directly.
    pub async fn submit_patch(&self, request: PatchRequest) -> WriteResult<PatchReceipt> {
        if let Some(record) = self
            .store
            .find_idempotent(&request.idempotency_key, OP_SUBMIT_PATCH)
            .await?
        {
            info!(key = %request.idempotency_key, "submit_patch replayed");
            return replay(record);
        }

        let entity = self
            .store
            .get_entity(request.kind, &request.entity_id)
            .await?
            .ok_or_else(|| {
                WriteError::NotFound(format!("{} {} not found", request.kind, request.entity_id))
            })?;

        let verdict = self.validator.validate(
            request.kind,
            Some(entity.status),
            &request.patch,
            &request.actor.roles,
            request.impact,
            request.uncertainty,
        );
        if !verdict.is_allowed {
            warn!(
                entity_id = %request.entity_id,
                actor = %request.actor.id,
                "patch rejected: {}",
                verdict.summary()
            );
            return Err(WriteError::Rejected(verdict));
        }

        let now = Utc::now();
        let correlation_id = new_correlation_id();

        if verdict.requires_approval {
            let approval = Approval::new(
                request.kind,
                request.entity_id.clone(),
                request.patch.clone(),
                verdict.summary(),
                request.actor.id.clone(),
            )
            .with_idempotency_key(&request.idempotency_key);

            let event = EventAppend {
                id: EventId::generate(),
                event_type: EventType::ApprovalCreated,
                subject: EventSubject::Approval,
                subject_id: approval.id.to_string(),
                payload: json!({
                    "patch": request.patch,
                    "reason": approval.reason,
                    "requested_by": request.actor.id,
                }),
                triggered_by: request.actor.id.clone(),
                correlation_id,
                idempotency_key: Some(request.idempotency_key.clone()),
            };
            let receipt = PatchReceipt::PendingApproval {
                approval_id: approval.id.clone(),
                event_id: event.id.clone(),
            };
            let commit = ProposalCommit {
                approval,
                event,
                idempotency: IdempotencyRecord::new(
                    &request.idempotency_key,
                    OP_SUBMIT_PATCH,
                    serde_json::to_value(&receipt)?,
                    now,
                ),
            };
            match self.store.commit_proposal(commit, now).await? {
                CommitOutcome::Committed(_) => {
                    info!(entity_id = %request.entity_id, "patch parked behind approval");
                    Ok(receipt)
                }
                CommitOutcome::Replayed(record) => replay(record),
            }
        } else {
            let event = EventAppend {
                id: EventId::generate(),
                event_type: patched_event_type(request.kind, request.patch.status),
                subject: request.kind.into(),
                subject_id: request.entity_id.to_string(),
                payload: json!({
                    "patch": request.patch,
                    "applied_by": request.actor.id,
                }),
                triggered_by: request.actor.id.clone(),
                correlation_id,
                idempotency_key: Some(request.idempotency_key.clone()),
            };
            let receipt = PatchReceipt::Applied {
                entity_id: request.entity_id.clone(),
                status: request.patch.status,
                event_id: event.id.clone(),
            };
            let commit = DirectPatchCommit {
                patch: PatchApplication {
                    entity_kind: request.kind,
                    entity_id: request.entity_id.clone(),
                    expected_status: Some(entity.status),
                    new_status: request.patch.status,
                    fields: request.patch.fields.clone(),
                },
                event,
                idempotency: IdempotencyRecord::new(
                    &request.idempotency_key,
                    OP_SUBMIT_PATCH,
                    serde_json::to_value(&receipt)?,
                    now,
                ),
            };
            match self.store.commit_direct_patch(commit, now).await? {
                CommitOutcome::Committed(_) => {
                    info!(entity_id = %request.entity_id, "patch applied");
                    Ok(receipt)
                }
                CommitOutcome::Replayed(record) => replay(record),
            }
        }
    }

    /// Create a pending approval for a patch without applying it.
    pub async fn propose(
        &self,
        kind: EntityKind,
        entity_id: EntityId,
        patch: Patch,
        reason: impl Into<String>,
        requested_by: impl Into<String>,
        idempotency_key: impl Into<String>,
    ) -> WriteResult<ProposalReceipt> {
        let idempotency_key = idempotency_key.into();
        let requested_by = requested_by.into();

        if let Some(record) = self
            .store
            .find_idempotent(&idempotency_key, OP_PROPOSE)
            .await?
        {
            info!(key = %idempotency_key, "propose replayed");
            return replay(record);
        }

        if self.store.get_entity(kind, &entity_id).await?.is_none() {
            return Err(WriteError::NotFound(format!(
                "{kind} {entity_id} not found"
            )));
        }

        let now = Utc::now();
        let approval = Approval::new(kind, entity_id, patch, reason, requested_by.clone())
            .with_idempotency_key(&idempotency_key);
        let event = EventAppend {
            id: EventId::generate(),
            event_type: EventType::ApprovalCreated,
            subject: EventSubject::Approval,
            subject_id: approval.id.to_string(),
            payload: json!({
                "patch": approval.patch,
                "reason": approval.reason,
                "requested_by": requested_by,
            }),
            triggered_by: requested_by,
            correlation_id: new_correlation_id(),
            idempotency_key: Some(idempotency_key.clone()),
        };
        let receipt = ProposalReceipt {
            approval_id: approval.id.clone(),
            event_id: event.id.clone(),
        };
        let commit = ProposalCommit {
            approval,
            event,
            idempotency: IdempotencyRecord::new(
                &idempotency_key,
                OP_PROPOSE,
                serde_json::to_value(&receipt)?,
                now,
            ),
        };
        match self.store.commit_proposal(commit, now).await? {
            CommitOutcome::Committed(_) => {
                info!(approval_id = %receipt.approval_id, "approval created");
                Ok(receipt)
            }
            CommitOutcome::Replayed(record) => replay(record),
        }
    }

    /// Decide a pending approval.
    ///
    /// Conflict if the approval is already decided (exactly one of two
    /// racing deciders wins) or, for an approved decision, if the
    /// proposed transition is no longer valid against the entity's
    /// current status. On approval the patch is applied and a patched
    /// event emitted; both branches emit an APPROVAL_DECIDED event.
    pub async fn decide(
        &self,
        approval_id: &ApprovalId,
        decision: Decision,
        decided_by: impl Into<String>,
        decision_reason: Option<String>,
        idempotency_key: impl Into<String>,
    ) -> WriteResult<DecisionReceipt> {
        let idempotency_key = idempotency_key.into();
        let decided_by = decided_by.into();

        if let Some(record) = self
            .store
            .find_idempotent(&idempotency_key, OP_DECIDE)
            .await?
        {
            info!(key = %idempotency_key, "decide replayed");
            return replay(record);
        }

        let approval = self
            .store
            .get_approval(approval_id)
            .await?
            .ok_or_else(|| WriteError::NotFound(format!("approval {approval_id} not found")))?;
        if !approval.is_pending() {
            warn!(approval_id = %approval_id, status = %approval.status, "decide on settled approval");
            return Err(WriteError::Conflict(format!(
                "approval {approval_id} already {}",
                approval.status
            )));
        }

        let correlation_id = new_correlation_id();
        let mut events = Vec::new();
        let mut patch_application = None;
        let mut patch_event_id = None;

        if decision == Decision::Approved {
            let entity = self
                .store
                .get_entity(approval.entity_kind, &approval.entity_id)
                .await?
                .ok_or_else(|| {
                    WriteError::NotFound(format!(
                        "{} {} not found",
                        approval.entity_kind, approval.entity_id
                    ))
                })?;

            // Re-validate against the current status: the entity may have
            // moved since the approval was proposed.
            if let Some(new_status) = approval.patch.status {
                if !self.transition_still_valid(approval.entity_kind, entity.status, new_status) {
                    warn!(approval_id = %approval_id, "approved transition is extinct");
                    return Err(WriteError::Conflict(format!(
                        "transition {} -> {new_status} is no longer valid for {} {}",
                        entity.status, approval.entity_kind, approval.entity_id
                    )));
                }
            }

            // The commit writes two events; keys are unique per event, so
            // the patch application gets a key derived from the decide key.
            let event = EventAppend {
                id: EventId::generate(),
                event_type: patched_event_type(approval.entity_kind, approval.patch.status),
                subject: approval.entity_kind.into(),
                subject_id: approval.entity_id.to_string(),
                payload: json!({
                    "patch": approval.patch,
                    "approved_by": decided_by,
                    "approval_id": approval.id,
                }),
                triggered_by: decided_by.clone(),
                correlation_id: correlation_id.clone(),
                idempotency_key: Some(format!("{idempotency_key}:patch")),
            };
            patch_event_id = Some(event.id.clone());
            events.push(event);
            patch_application = Some(PatchApplication {
                entity_kind: approval.entity_kind,
                entity_id: approval.entity_id.clone(),
                expected_status: Some(entity.status),
                new_status: approval.patch.status,
                fields: approval.patch.fields.clone(),
            });
        }

        let decided_event = EventAppend {
            id: EventId::generate(),
            event_type: EventType::ApprovalDecided,
            subject: EventSubject::Approval,
            subject_id: approval.id.to_string(),
            payload: json!({
                "decision": decision,
                "decided_by": decided_by,
                "reason": decision_reason,
            }),
            triggered_by: decided_by.clone(),
            correlation_id,
            idempotency_key: Some(idempotency_key.clone()),
        };
        let receipt = DecisionReceipt {
            approval_id: approval.id.clone(),
            decision,
            decided_event_id: decided_event.id.clone(),
            patch_event_id,
        };
        events.push(decided_event);

        let now = Utc::now();
        let commit = DecisionCommit {
            approval_id: approval.id.clone(),
            decision,
            decided_by,
            decision_reason,
            patch: patch_application,
            events,
            idempotency: IdempotencyRecord::new(
                &idempotency_key,
                OP_DECIDE,
                serde_json::to_value(&receipt)?,
                now,
            ),
        };
        match self.store.commit_decision(commit, now).await? {
            CommitOutcome::Committed(_) => {
                info!(approval_id = %receipt.approval_id, decision = %decision, "approval decided");
                Ok(receipt)
            }
            CommitOutcome::Replayed(record) => replay(record),
        }
    }

    /// Create a task under a package.
    pub async fn create_task(
        &self,
        package_id: &EntityId,
        spec: TaskSpec,
        actor: &Actor,
        idempotency_key: impl Into<String>,
    ) -> WriteResult<TaskReceipt> {
        let idempotency_key = idempotency_key.into();

        if let Some(record) = self
            .store
            .find_idempotent(&idempotency_key, OP_CREATE_TASK)
            .await?
        {
            info!(key = %idempotency_key, "create_task replayed");
            return replay(record);
        }

        if self
            .store
            .get_entity(EntityKind::Package, package_id)
            .await?
            .is_none()
        {
            return Err(WriteError::NotFound(format!(
                "package {package_id} not found"
            )));
        }

        let now = Utc::now();
        let payload = serde_json::to_value(&spec)?;
        let mut task = EntityRecord::new_task(EntityId::generate(), package_id.clone());
        task.attributes = spec.into_attributes();

        let event = EventAppend {
            id: EventId::generate(),
            event_type: EventType::TaskCreated,
            subject: EventSubject::Task,
            subject_id: task.id.to_string(),
            payload,
            triggered_by: actor.id.clone(),
            correlation_id: new_correlation_id(),
            idempotency_key: Some(idempotency_key.clone()),
        };
        let receipt = TaskReceipt {
            task_id: task.id.clone(),
            event_id: event.id.clone(),
        };
        let commit = TaskCreateCommit {
            task,
            event,
            idempotency: IdempotencyRecord::new(
                &idempotency_key,
                OP_CREATE_TASK,
                serde_json::to_value(&receipt)?,
                now,
            ),
        };
        match self.store.commit_task_create(commit, now).await? {
            CommitOutcome::Committed(_) => {
                info!(task_id = %receipt.task_id, package_id = %package_id, "task created");
                Ok(receipt)
            }
            CommitOutcome::Replayed(record) => replay(record),
        }
    }

    /// Read an entity's audit trail, most-recent-first.
    pub async fn timeline(
        &self,
        kind: EntityKind,
        entity_id: &EntityId,
        limit: usize,
    ) -> WriteResult<Vec<Event>> {
        Ok(self
            .store
            .timeline(kind.into(), &entity_id.0, limit)
            .await?)
    }

    pub async fn get_approval(&self, id: &ApprovalId) -> WriteResult<Option<Approval>> {
        Ok(self.store.get_approval(id).await?)
    }

    /// The approval queue: pending approvals, newest first.
    pub async fn pending_approvals(&self, window: QueryWindow) -> WriteResult<Vec<Approval>> {
        self.list_approvals(Some(ApprovalStatus::Pending), window)
            .await
    }

    pub async fn list_approvals(
        &self,
        status: Option<ApprovalStatus>,
        window: QueryWindow,
    ) -> WriteResult<Vec<Approval>> {
        Ok(self.store.list_approvals(status, window).await?)
    }

    fn transition_still_valid(
        &self,
        kind: EntityKind,
        current: EntityStatus,
        new_status: EntityStatus,
    ) -> bool {
        let policies = self.validator.policies();
        match (kind, current, new_status) {
            (EntityKind::Package, EntityStatus::Package(from), EntityStatus::Package(to)) => {
                policies.package_transitions.is_valid(from, to)
            }
            (EntityKind::Task, EntityStatus::Task(from), EntityStatus::Task(to)) => {
                policies.task_transitions.is_valid(from, to)
            }
            _ => false,
        }
    }
}

/// Patched-event type for an applied patch. Task completions get their
/// own event type so downstream consumers can react without inspecting
/// payloads.
fn patched_event_type(kind: EntityKind, new_status: Option<EntityStatus>) -> EventType {
    match (kind, new_status) {
        (EntityKind::Package, _) => EventType::PackagePatched,
        (EntityKind::Task, Some(EntityStatus::Task(TaskStatus::Completed))) => {
            EventType::TaskCompleted
        }
        (EntityKind::Task, _) => EventType::TaskPatched,
    }
}

fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Deserialize a stored idempotency result back into its receipt type.
fn replay<T: DeserializeOwned>(record: IdempotencyRecord) -> WriteResult<T> {
    Ok(serde_json::from_value(record.result)?)
}
