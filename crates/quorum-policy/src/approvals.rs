//! Approval matrix: maps action identifiers to required roles.
//!
//! Actions are namespaced `"<entity>.status:<new_status>"` for status
//! changes and `"<entity>.<field>.update|change"` for field edits.

use quorum_types::Role;
use std::collections::{BTreeSet, HashMap};

/// A governance rule mapping one action to the roles that may perform it.
#[derive(Clone, Debug)]
pub struct ApprovalRule {
    pub action: &'static str,
    pub required_roles: BTreeSet<Role>,
    pub description: &'static str,
    /// How many of the required roles the caller must hold. Every shipped
    /// rule uses 1 (any one qualifying role suffices).
    pub min_roles_satisfied: usize,
}

impl ApprovalRule {
    fn new(action: &'static str, required_roles: &[Role], description: &'static str) -> Self {
        Self {
            action,
            required_roles: required_roles.iter().copied().collect(),
            description,
            min_roles_satisfied: 1,
        }
    }

    /// Whether the caller's role set satisfies this rule.
    pub fn is_satisfied_by(&self, caller_roles: &BTreeSet<Role>) -> bool {
        caller_roles.intersection(&self.required_roles).count() >= self.min_roles_satisfied
    }
}

/// Static mapping from action identifiers to required roles.
#[derive(Clone, Debug)]
pub struct ApprovalMatrix {
    rules: Vec<ApprovalRule>,
    by_action: HashMap<&'static str, usize>,
}

impl ApprovalMatrix {
    fn from_rules(rules: Vec<ApprovalRule>) -> Self {
        let by_action = rules
            .iter()
            .enumerate()
            .map(|(index, rule)| (rule.action, index))
            .collect();
        Self { rules, by_action }
    }

    /// The shipped governance table.
    pub fn standard() -> Self {
        use Role::*;
        Self::from_rules(vec![
            // Package submission
            ApprovalRule::new(
                "package.status:submitted",
                &[Analyst, Admin],
                "Submit package for review (analyst or admin)",
            ),
            // Package review and approval
            ApprovalRule::new(
                "package.status:in_review",
                &[Admin],
                "Initiate formal review (admin only)",
            ),
            ApprovalRule::new(
                "package.status:approved",
                &[Admin],
                "Approve package after review (admin only)",
            ),
            // Package award, the highest-governance edge
            ApprovalRule::new(
                "package.status:awarded",
                &[Admin],
                "Award package/contract (admin approval required)",
            ),
            // Package activation
            ApprovalRule::new(
                "package.status:active",
                &[Admin, Operator],
                "Activate package execution (admin or operator)",
            ),
            // Package cancellation
            ApprovalRule::new(
                "package.status:cancelled",
                &[Admin],
                "Cancel package (admin approval required, especially if active)",
            ),
            // Task status changes
            ApprovalRule::new(
                "task.status:review_needed",
                &[Analyst, Operator, Admin],
                "Submit task for review",
            ),
            ApprovalRule::new(
                "task.status:completed",
                &[Analyst, Operator, Admin],
                "Mark task complete",
            ),
            ApprovalRule::new(
                "task.status:cancelled",
                &[Operator, Admin],
                "Cancel task (operator or admin)",
            ),
            // Package field edits
            ApprovalRule::new(
                "package.metadata.update",
                &[Analyst, Admin],
                "Update package metadata",
            ),
            ApprovalRule::new(
                "package.budget.change",
                &[Admin],
                "Change package budget (admin only)",
            ),
            ApprovalRule::new(
                "package.scope.change",
                &[Admin],
                "Change package scope (admin only)",
            ),
        ])
    }

    /// The rule registered for an action, if any.
    pub fn rule(&self, action: &str) -> Option<&ApprovalRule> {
        self.by_action.get(action).map(|&index| &self.rules[index])
    }

    /// Required roles for an action. `None` means the action is open.
    pub fn required_roles(&self, action: &str) -> Option<&BTreeSet<Role>> {
        self.rule(action).map(|rule| &rule.required_roles)
    }

    /// Check whether the caller may perform the action.
    ///
    /// An action with no registered rule is approved: the open-action
    /// default is fail-open and preserved deliberately. Hardening it to
    /// deny-by-default is a product decision, not taken here.
    pub fn is_action_approved(&self, action: &str, caller_roles: &BTreeSet<Role>) -> (bool, String) {
        let Some(rule) = self.rule(action) else {
            return (true, format!("no approval required for {action}"));
        };

        if rule.is_satisfied_by(caller_roles) {
            return (true, format!("caller has a required role for {action}"));
        }

        let required = rule
            .required_roles
            .iter()
            .map(Role::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        (
            false,
            format!("action '{action}' requires one of: {required}"),
        )
    }

    /// All rules, in declaration order.
    pub fn rules(&self) -> &[ApprovalRule] {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(roles: &[Role]) -> BTreeSet<Role> {
        roles.iter().copied().collect()
    }

    #[test]
    fn admin_can_award() {
        let matrix = ApprovalMatrix::standard();
        let (approved, _) =
            matrix.is_action_approved("package.status:awarded", &roles(&[Role::Admin]));
        assert!(approved);
    }

    #[test]
    fn analyst_cannot_award() {
        let matrix = ApprovalMatrix::standard();
        let (approved, reason) =
            matrix.is_action_approved("package.status:awarded", &roles(&[Role::Analyst]));
        assert!(!approved);
        assert!(reason.contains("admin"));
    }

    #[test]
    fn any_qualifying_role_suffices() {
        let matrix = ApprovalMatrix::standard();
        let (approved, _) = matrix.is_action_approved(
            "package.status:active",
            &roles(&[Role::Operator, Role::Viewer]),
        );
        assert!(approved);
    }

    #[test]
    fn unregistered_action_is_open() {
        let matrix = ApprovalMatrix::standard();
        let (approved, reason) =
            matrix.is_action_approved("task.metadata.update", &roles(&[Role::Viewer]));
        assert!(approved);
        assert!(reason.contains("no approval required"));
        assert!(matrix.required_roles("task.metadata.update").is_none());
    }

    #[test]
    fn threshold_above_one_counts_the_role_intersection() {
        let rule = ApprovalRule {
            action: "package.status:awarded",
            required_roles: [Role::Admin, Role::Analyst, Role::Operator]
                .into_iter()
                .collect(),
            description: "dual sign-off",
            min_roles_satisfied: 2,
        };
        assert!(!rule.is_satisfied_by(&roles(&[Role::Admin])));
        assert!(!rule.is_satisfied_by(&roles(&[Role::Admin, Role::Viewer])));
        assert!(rule.is_satisfied_by(&roles(&[Role::Admin, Role::Operator])));
        assert!(rule.is_satisfied_by(&roles(&[Role::Admin, Role::Analyst, Role::Operator])));
    }

    #[test]
    fn viewer_is_denied_everywhere_a_rule_exists() {
        let matrix = ApprovalMatrix::standard();
        for rule in matrix.rules() {
            let (approved, _) = matrix.is_action_approved(rule.action, &roles(&[Role::Viewer]));
            assert!(!approved, "viewer unexpectedly approved for {}", rule.action);
        }
    }
}
