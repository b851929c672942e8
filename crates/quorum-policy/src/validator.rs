//! Patch validation: composes the transition registries, approval matrix,
//! and risk matrix into one allow/deny + approval-requirement verdict.
//!
//! Every check records a typed [`Reason`]; `is_allowed` is derived as the
//! absence of blocking reasons, never from reason text.

use crate::approvals::ApprovalMatrix;
use crate::risk_matrix::RiskMatrix;
use crate::transitions::TransitionRegistry;
use quorum_types::{
    DecisionType, EntityKind, EntityStatus, ImpactLevel, PackageStatus, Patch, Role, TaskStatus,
    UncertaintyLevel,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ── Reasons ──────────────────────────────────────────────────────────

/// Whether a reason blocks the write or merely annotates the verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonClass {
    Blocking,
    Advisory,
}

/// A typed validation reason. Each variant is classified blocking or
/// advisory directly by the check that produces it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum Reason {
    /// The proposed status edge does not exist in the transition graph.
    InvalidTransition {
        from: EntityStatus,
        to: EntityStatus,
        valid_next: Vec<String>,
    },
    /// The patch carries a status of the wrong entity kind.
    KindMismatch {
        expected: EntityKind,
        found: EntityKind,
    },
    /// The transition rule itself demands an approval workflow.
    TransitionRequiresApproval {
        from: EntityStatus,
        to: EntityStatus,
    },
    /// The caller lacks the roles the approval matrix requires.
    RoleDenied {
        action: String,
        required_roles: Vec<Role>,
    },
    /// Risk arbitration produced a non-AUTO decision.
    RiskAssessment {
        impact: ImpactLevel,
        uncertainty: UncertaintyLevel,
        decision_type: DecisionType,
        description: String,
    },
}

impl Reason {
    pub fn class(&self) -> ReasonClass {
        match self {
            Reason::InvalidTransition { .. }
            | Reason::KindMismatch { .. }
            | Reason::RoleDenied { .. } => ReasonClass::Blocking,
            Reason::TransitionRequiresApproval { .. } | Reason::RiskAssessment { .. } => {
                ReasonClass::Advisory
            }
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.class() == ReasonClass::Blocking
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reason::InvalidTransition {
                from,
                to,
                valid_next,
            } => write!(
                f,
                "invalid status transition: {from} -> {to}; valid next statuses: [{}]",
                valid_next.join(", ")
            ),
            Reason::KindMismatch { expected, found } => {
                write!(f, "patch carries a {found} status but targets a {expected}")
            }
            Reason::TransitionRequiresApproval { from, to } => {
                write!(f, "transition {from} -> {to} requires approval")
            }
            Reason::RoleDenied {
                action,
                required_roles,
            } => {
                let required = required_roles
                    .iter()
                    .map(Role::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "action '{action}' requires one of: {required}")
            }
            Reason::RiskAssessment {
                impact,
                uncertainty,
                description,
                ..
            } => write!(f, "risk assessment ({impact}/{uncertainty}): {description}"),
        }
    }
}

// ── Validation Result ────────────────────────────────────────────────

/// The verdict on a proposed patch. Produced and consumed within one
/// validation call; it has no lifecycle of its own.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationResult {
    /// True iff no blocking reason was recorded.
    pub is_allowed: bool,
    /// True if an approval workflow is needed before applying.
    pub requires_approval: bool,
    /// True if the change must be escalated to leadership.
    pub requires_escalation: bool,
    /// The risk-arbitration category, when risk was consulted.
    pub decision_type: Option<DecisionType>,
    pub reasons: Vec<Reason>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn from_parts(
        requires_approval: bool,
        requires_escalation: bool,
        decision_type: Option<DecisionType>,
        reasons: Vec<Reason>,
        warnings: Vec<String>,
    ) -> Self {
        let is_allowed = !reasons.iter().any(Reason::is_blocking);
        Self {
            is_allowed,
            requires_approval,
            requires_escalation,
            decision_type,
            reasons,
            warnings,
        }
    }

    pub fn blocking_reasons(&self) -> Vec<&Reason> {
        self.reasons.iter().filter(|r| r.is_blocking()).collect()
    }

    /// Human-readable summary of all reasons, one per line.
    pub fn summary(&self) -> String {
        self.reasons
            .iter()
            .map(|reason| reason.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ── Policy Set ───────────────────────────────────────────────────────

/// The immutable policy tables, built once at process start and injected
/// wherever validation happens.
#[derive(Clone, Debug)]
pub struct PolicySet {
    pub package_transitions: TransitionRegistry<PackageStatus>,
    pub task_transitions: TransitionRegistry<TaskStatus>,
    pub approvals: ApprovalMatrix,
    pub risk: RiskMatrix,
}

impl PolicySet {
    pub fn standard() -> Self {
        Self {
            package_transitions: TransitionRegistry::package(),
            task_transitions: TransitionRegistry::task(),
            approvals: ApprovalMatrix::standard(),
            risk: RiskMatrix::standard(),
        }
    }
}

// ── Patch Validator ──────────────────────────────────────────────────

/// Validates proposed patches against the policy set.
#[derive(Clone, Debug)]
pub struct PatchValidator {
    policies: PolicySet,
}

enum TransitionCheck {
    Valid { requires_approval: bool },
    Invalid { valid_next: Vec<String> },
    Mismatch { found: EntityKind },
}

impl PatchValidator {
    pub fn new(policies: PolicySet) -> Self {
        Self { policies }
    }

    pub fn standard() -> Self {
        Self::new(PolicySet::standard())
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// Validate a proposed patch.
    ///
    /// Checks, in order: the status transition (short-circuits on an
    /// illegal edge), the approval matrix for the derived action, and the
    /// risk matrix for the supplied impact/uncertainty pair.
    pub fn validate(
        &self,
        kind: EntityKind,
        current_status: Option<EntityStatus>,
        patch: &Patch,
        caller_roles: &BTreeSet<Role>,
        impact: ImpactLevel,
        uncertainty: UncertaintyLevel,
    ) -> ValidationResult {
        let mut reasons = Vec::new();
        let mut warnings = Vec::new();
        let mut requires_approval = false;
        let mut requires_escalation = false;
        let mut decision_type = None;

        // Check 1: status transition state machine.
        if let Some(new_status) = patch.status {
            if let Some(current) = current_status {
                match self.check_transition(kind, current, new_status) {
                    TransitionCheck::Valid {
                        requires_approval: rule_requires_approval,
                    } => {
                        if rule_requires_approval {
                            requires_approval = true;
                            reasons.push(Reason::TransitionRequiresApproval {
                                from: current,
                                to: new_status,
                            });
                        }
                    }
                    TransitionCheck::Invalid { valid_next } => {
                        // Illegal edge: no further checks run.
                        reasons.push(Reason::InvalidTransition {
                            from: current,
                            to: new_status,
                            valid_next,
                        });
                        return ValidationResult::from_parts(false, false, None, reasons, warnings);
                    }
                    TransitionCheck::Mismatch { found } => {
                        reasons.push(Reason::KindMismatch {
                            expected: kind,
                            found,
                        });
                        return ValidationResult::from_parts(false, false, None, reasons, warnings);
                    }
                }
            } else if new_status.kind() != kind {
                reasons.push(Reason::KindMismatch {
                    expected: kind,
                    found: new_status.kind(),
                });
                return ValidationResult::from_parts(false, false, None, reasons, warnings);
            }
        }

        // Check 2: approval matrix for the derived action.
        if let Some(action) = derive_action(kind, patch) {
            if let Some(rule) = self.policies.approvals.rule(&action) {
                if !rule.is_satisfied_by(caller_roles) {
                    requires_approval = true;
                    reasons.push(Reason::RoleDenied {
                        action,
                        required_roles: rule.required_roles.iter().copied().collect(),
                    });
                }
            }
            // No rule: open action, fail-open default preserved deliberately.
        }

        // Check 3: risk arbitration.
        match self.policies.risk.decision_for(impact, uncertainty) {
            Some(cell) => {
                decision_type = Some(cell.decision_type);
                if cell.decision_type != DecisionType::Auto {
                    reasons.push(Reason::RiskAssessment {
                        impact,
                        uncertainty,
                        decision_type: cell.decision_type,
                        description: cell.description.to_string(),
                    });
                }
                requires_approval |= cell.decision_type.requires_approval();
                requires_escalation |= cell.decision_type.requires_escalation();
                if cell.notification_required {
                    warnings.push("notification required for stakeholders".to_string());
                }
            }
            None => {
                // Fail closed: an unrecognized pair requires approval and
                // escalation, never AUTO.
                decision_type = Some(DecisionType::Escalate);
                requires_approval = true;
                requires_escalation = true;
                reasons.push(Reason::RiskAssessment {
                    impact,
                    uncertainty,
                    decision_type: DecisionType::Escalate,
                    description: "unrecognized risk pair, failing closed".to_string(),
                });
            }
        }

        ValidationResult::from_parts(
            requires_approval,
            requires_escalation,
            decision_type,
            reasons,
            warnings,
        )
    }

    /// Convenience for plain package status changes.
    pub fn validate_package_status_change(
        &self,
        current: PackageStatus,
        new_status: PackageStatus,
        caller_roles: &BTreeSet<Role>,
    ) -> ValidationResult {
        self.validate(
            EntityKind::Package,
            Some(current.into()),
            &Patch::status_change(new_status),
            caller_roles,
            ImpactLevel::Medium,
            UncertaintyLevel::Medium,
        )
    }

    /// Convenience for plain task status changes.
    pub fn validate_task_status_change(
        &self,
        current: TaskStatus,
        new_status: TaskStatus,
        caller_roles: &BTreeSet<Role>,
    ) -> ValidationResult {
        self.validate(
            EntityKind::Task,
            Some(current.into()),
            &Patch::status_change(new_status),
            caller_roles,
            ImpactLevel::Low,
            UncertaintyLevel::Low,
        )
    }

    fn check_transition(
        &self,
        kind: EntityKind,
        current: EntityStatus,
        new_status: EntityStatus,
    ) -> TransitionCheck {
        match (kind, current, new_status) {
            (EntityKind::Package, EntityStatus::Package(from), EntityStatus::Package(to)) => {
                match self.policies.package_transitions.rule(from, to) {
                    Some(rule) => TransitionCheck::Valid {
                        requires_approval: rule.requires_approval,
                    },
                    None => TransitionCheck::Invalid {
                        valid_next: self
                            .policies
                            .package_transitions
                            .valid_next_statuses(from)
                            .iter()
                            .map(|status| status.as_str().to_string())
                            .collect(),
                    },
                }
            }
            (EntityKind::Task, EntityStatus::Task(from), EntityStatus::Task(to)) => {
                match self.policies.task_transitions.rule(from, to) {
                    Some(rule) => TransitionCheck::Valid {
                        requires_approval: rule.requires_approval,
                    },
                    None => TransitionCheck::Invalid {
                        valid_next: self
                            .policies
                            .task_transitions
                            .valid_next_statuses(from)
                            .iter()
                            .map(|status| status.as_str().to_string())
                            .collect(),
                    },
                }
            }
            (_, _, new_status) => TransitionCheck::Mismatch {
                found: new_status.kind(),
            },
        }
    }
}

/// Derive the action identifier for a patch. Priority order: status
/// change, then metadata update, then budget change, then scope change;
/// only the first match produces an action.
pub fn derive_action(kind: EntityKind, patch: &Patch) -> Option<String> {
    if let Some(status) = patch.status {
        return Some(format!("{kind}.status:{status}"));
    }
    if patch.fields.contains_key("metadata") {
        return Some(format!("{kind}.metadata.update"));
    }
    if patch.fields.contains_key("budget") {
        return Some(format!("{kind}.budget.change"));
    }
    if patch.fields.contains_key("scope") {
        return Some(format!("{kind}.scope.change"));
    }
    None
}
