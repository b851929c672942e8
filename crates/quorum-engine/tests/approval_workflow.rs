//! End-to-end workflow tests against the in-memory store: validation,
//! the propose/decide approval loop, idempotent replays, and the audit
//! trail they leave behind.

use quorum_engine::{
    Actor, PatchReceipt, PatchRequest, WriteCoordinator, WriteError,
};
use quorum_storage::memory::InMemoryGovernanceStore;
use quorum_storage::{EntityStore, EventStore, QueryWindow};
use quorum_types::{
    ApprovalStatus, Decision, EntityId, EntityKind, EntityRecord, EventSubject, EventType,
    ImpactLevel, PackageStatus, Patch, Role, TaskSpec, UncertaintyLevel,
};
use serde_json::json;
use std::sync::Arc;

async fn coordinator_with_package(
    status: PackageStatus,
) -> (WriteCoordinator, Arc<InMemoryGovernanceStore>, EntityId) {
    let store = Arc::new(InMemoryGovernanceStore::new());
    let package_id = EntityId::new("pkg-1");
    store
        .insert_entity(EntityRecord::new_package(package_id.clone()).with_status(status.into()))
        .await
        .unwrap();
    (
        WriteCoordinator::new(store.clone()),
        store,
        package_id,
    )
}

fn analyst() -> Actor {
    Actor::new("analyst-1").with_role(Role::Analyst)
}

fn admin() -> Actor {
    Actor::new("admin-1").with_role(Role::Admin)
}

#[tokio::test]
async fn clean_patch_applies_directly() {
    let (coordinator, _store, package_id) = coordinator_with_package(PackageStatus::Draft).await;

    let receipt = coordinator
        .submit_patch(
            PatchRequest::new(
                EntityKind::Package,
                package_id.clone(),
                Patch::status_change(PackageStatus::Submitted),
                analyst(),
                "submit-1",
            )
            .with_risk(ImpactLevel::Low, UncertaintyLevel::Low),
        )
        .await
        .unwrap();

    let PatchReceipt::Applied { status, .. } = &receipt else {
        panic!("expected a direct application");
    };
    assert_eq!(*status, Some(PackageStatus::Submitted.into()));

    let events = coordinator
        .timeline(EntityKind::Package, &package_id, 10)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::PackagePatched);
}

#[tokio::test]
async fn rejected_patch_writes_nothing() {
    let (coordinator, store, package_id) = coordinator_with_package(PackageStatus::Draft).await;

    let result = coordinator
        .submit_patch(PatchRequest::new(
            EntityKind::Package,
            package_id.clone(),
            Patch::status_change(PackageStatus::Active),
            admin(),
            "submit-1",
        ))
        .await;

    let Err(WriteError::Rejected(verdict)) = result else {
        panic!("expected a rejection");
    };
    assert!(!verdict.is_allowed);

    let entity = store
        .get_entity(EntityKind::Package, &package_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entity.status, PackageStatus::Draft.into());
    let events = coordinator
        .timeline(EntityKind::Package, &package_id, 10)
        .await
        .unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn approval_gated_patch_parks_until_decided() {
    let (coordinator, store, package_id) = coordinator_with_package(PackageStatus::Approved).await;

    let receipt = coordinator
        .submit_patch(PatchRequest::new(
            EntityKind::Package,
            package_id.clone(),
            Patch::status_change(PackageStatus::Awarded),
            admin(),
            "award-1",
        ))
        .await
        .unwrap();

    let PatchReceipt::PendingApproval { approval_id, .. } = &receipt else {
        panic!("expected a pending approval");
    };

    // parked, not applied
    let entity = store
        .get_entity(EntityKind::Package, &package_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entity.status, PackageStatus::Approved.into());
    let pending = coordinator
        .pending_approvals(QueryWindow::default())
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, *approval_id);

    let decision = coordinator
        .decide(approval_id, Decision::Approved, "admin-2", None, "decide-1")
        .await
        .unwrap();
    assert!(decision.patch_event_id.is_some());

    let entity = store
        .get_entity(EntityKind::Package, &package_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entity.status, PackageStatus::Awarded.into());

    let approval = coordinator.get_approval(approval_id).await.unwrap().unwrap();
    assert_eq!(approval.status, ApprovalStatus::Approved);
    assert_eq!(approval.decided_by.as_deref(), Some("admin-2"));
}

#[tokio::test]
async fn decide_replays_are_identical_and_mutate_once() {
    let (coordinator, store, package_id) = coordinator_with_package(PackageStatus::Approved).await;

    let approval_id = coordinator
        .propose(
            EntityKind::Package,
            package_id.clone(),
            Patch::status_change(PackageStatus::Awarded),
            "award after tender",
            "analyst-1",
            "propose-1",
        )
        .await
        .unwrap()
        .approval_id;

    let first = coordinator
        .decide(&approval_id, Decision::Approved, "admin-1", None, "decide-1")
        .await
        .unwrap();
    let second = coordinator
        .decide(&approval_id, Decision::Approved, "admin-1", None, "decide-1")
        .await
        .unwrap();
    let third = coordinator
        .decide(&approval_id, Decision::Approved, "admin-1", None, "decide-1")
        .await
        .unwrap();

    for replay in [&second, &third] {
        assert_eq!(
            serde_json::to_value(replay).unwrap(),
            serde_json::to_value(&first).unwrap()
        );
    }

    // one patch event, one decided event, no matter how many replays
    let package_events = coordinator
        .timeline(EntityKind::Package, &package_id, 10)
        .await
        .unwrap();
    assert_eq!(package_events.len(), 1);
    let approval_events = store
        .timeline(EventSubject::Approval, &approval_id.0, 10)
        .await
        .unwrap();
    let decided = approval_events
        .iter()
        .filter(|e| e.event_type == EventType::ApprovalDecided)
        .count();
    assert_eq!(decided, 1);
}

#[tokio::test]
async fn every_audit_event_carries_its_own_key() {
    let (coordinator, store, package_id) = coordinator_with_package(PackageStatus::Approved).await;

    let approval_id = coordinator
        .propose(
            EntityKind::Package,
            package_id.clone(),
            Patch::status_change(PackageStatus::Awarded),
            "award after tender",
            "analyst-1",
            "propose-1",
        )
        .await
        .unwrap()
        .approval_id;
    coordinator
        .decide(&approval_id, Decision::Approved, "admin-1", None, "decide-1")
        .await
        .unwrap();

    let mut events = store
        .timeline(EventSubject::Package, &package_id.0, 10)
        .await
        .unwrap();
    events.extend(
        store
            .timeline(EventSubject::Approval, &approval_id.0, 10)
            .await
            .unwrap(),
    );

    // approval created, patch applied, approval decided
    assert_eq!(events.len(), 3);
    let keys: Vec<&String> = events
        .iter()
        .filter_map(|e| e.idempotency_key.as_ref())
        .collect();
    assert_eq!(keys.len(), 3);
    let distinct: std::collections::BTreeSet<&String> = keys.iter().copied().collect();
    assert_eq!(distinct.len(), keys.len());
}

#[tokio::test]
async fn racing_decides_resolve_to_one_winner() {
    let (coordinator, store, package_id) = coordinator_with_package(PackageStatus::Approved).await;

    let approval_id = coordinator
        .propose(
            EntityKind::Package,
            package_id.clone(),
            Patch::status_change(PackageStatus::Awarded),
            "award after tender",
            "analyst-1",
            "propose-1",
        )
        .await
        .unwrap()
        .approval_id;

    coordinator
        .decide(&approval_id, Decision::Approved, "admin-1", None, "decide-a")
        .await
        .unwrap();
    let loser = coordinator
        .decide(&approval_id, Decision::Rejected, "admin-2", None, "decide-b")
        .await;
    assert!(matches!(loser, Err(WriteError::Conflict(_))));

    let entity = store
        .get_entity(EntityKind::Package, &package_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entity.status, PackageStatus::Awarded.into());
}

#[tokio::test]
async fn rejected_decision_leaves_entity_untouched() {
    let (coordinator, store, package_id) = coordinator_with_package(PackageStatus::Approved).await;

    let approval_id = coordinator
        .propose(
            EntityKind::Package,
            package_id.clone(),
            Patch::status_change(PackageStatus::Awarded),
            "award after tender",
            "analyst-1",
            "propose-1",
        )
        .await
        .unwrap()
        .approval_id;

    let receipt = coordinator
        .decide(
            &approval_id,
            Decision::Rejected,
            "admin-1",
            Some("tender challenged".to_string()),
            "decide-1",
        )
        .await
        .unwrap();
    assert!(receipt.patch_event_id.is_none());

    let entity = store
        .get_entity(EntityKind::Package, &package_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entity.status, PackageStatus::Approved.into());

    let approval = coordinator
        .get_approval(&approval_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(approval.status, ApprovalStatus::Rejected);
    assert_eq!(
        approval.decision_reason.as_deref(),
        Some("tender challenged")
    );
}

#[tokio::test]
async fn extinct_transition_fails_at_decide_time() {
    let (coordinator, _store, package_id) = coordinator_with_package(PackageStatus::Approved).await;

    let award = coordinator
        .propose(
            EntityKind::Package,
            package_id.clone(),
            Patch::status_change(PackageStatus::Awarded),
            "award after tender",
            "analyst-1",
            "propose-award",
        )
        .await
        .unwrap()
        .approval_id;
    let cancel = coordinator
        .propose(
            EntityKind::Package,
            package_id.clone(),
            Patch::status_change(PackageStatus::Cancelled),
            "funding withdrawn",
            "analyst-1",
            "propose-cancel",
        )
        .await
        .unwrap()
        .approval_id;

    // cancellation lands first, award's transition goes extinct
    coordinator
        .decide(&cancel, Decision::Approved, "admin-1", None, "decide-cancel")
        .await
        .unwrap();
    let stale = coordinator
        .decide(&award, Decision::Approved, "admin-1", None, "decide-award")
        .await;
    assert!(matches!(stale, Err(WriteError::Conflict(_))));
}

#[tokio::test]
async fn field_patch_merges_into_attributes_after_approval() {
    let (coordinator, store, package_id) = coordinator_with_package(PackageStatus::Active).await;

    let approval_id = coordinator
        .propose(
            EntityKind::Package,
            package_id.clone(),
            Patch::default().with_field("budget", json!(425_000)),
            "scope grew during execution",
            "analyst-1",
            "propose-1",
        )
        .await
        .unwrap()
        .approval_id;
    coordinator
        .decide(&approval_id, Decision::Approved, "admin-1", None, "decide-1")
        .await
        .unwrap();

    let entity = store
        .get_entity(EntityKind::Package, &package_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entity.status, PackageStatus::Active.into());
    assert_eq!(entity.attributes["budget"], json!(425_000));
}

#[tokio::test]
async fn task_creation_is_idempotent() {
    let (coordinator, store, package_id) = coordinator_with_package(PackageStatus::Active).await;

    let spec = TaskSpec::new("Survey the site").with_assignee("operator-3");
    let first = coordinator
        .create_task(&package_id, spec.clone(), &admin(), "task-1")
        .await
        .unwrap();
    let replay = coordinator
        .create_task(&package_id, spec, &admin(), "task-1")
        .await
        .unwrap();
    assert_eq!(first.task_id, replay.task_id);
    assert_eq!(first.event_id, replay.event_id);

    let task = store
        .get_entity(EntityKind::Task, &first.task_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.parent_id, Some(package_id));
    assert_eq!(task.attributes["title"], "Survey the site");

    let events = coordinator
        .timeline(EntityKind::Task, &first.task_id, 10)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::TaskCreated);
}

#[tokio::test]
async fn unknown_targets_are_not_found() {
    let (coordinator, _store, _package_id) = coordinator_with_package(PackageStatus::Draft).await;

    let missing = EntityId::new("pkg-missing");
    let result = coordinator
        .submit_patch(PatchRequest::new(
            EntityKind::Package,
            missing.clone(),
            Patch::status_change(PackageStatus::Submitted),
            analyst(),
            "submit-1",
        ))
        .await;
    assert!(matches!(result, Err(WriteError::NotFound(_))));

    let result = coordinator
        .create_task(&missing, TaskSpec::new("Orphan"), &admin(), "task-1")
        .await;
    assert!(matches!(result, Err(WriteError::NotFound(_))));
}
