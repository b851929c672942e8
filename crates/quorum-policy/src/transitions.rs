//! Deterministic status transition rules for packages and tasks.
//!
//! Each entity kind has a fixed rule list compiled once into an adjacency
//! map for O(1) lookup. Absence of an edge is meaningful: there are no
//! implicit self-transitions and no default edges.

use quorum_types::{PackageStatus, RiskLevel, TaskStatus};
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

/// A valid state transition rule.
#[derive(Clone, Debug)]
pub struct Transition<S> {
    pub from: S,
    pub to: S,
    pub description: &'static str,
    pub requires_approval: bool,
    pub risk_level: RiskLevel,
}

impl<S> Transition<S> {
    fn new(from: S, to: S, description: &'static str) -> Self {
        Self {
            from,
            to,
            description,
            requires_approval: false,
            risk_level: RiskLevel::Low,
        }
    }

    fn with_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    fn with_risk(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }
}

/// A directed graph of legal status transitions for one entity kind.
#[derive(Clone, Debug)]
pub struct TransitionRegistry<S> {
    rules: Vec<Transition<S>>,
    edges: HashMap<S, BTreeSet<S>>,
    by_edge: HashMap<(S, S), usize>,
}

impl<S: Copy + Eq + Ord + Hash> TransitionRegistry<S> {
    fn from_rules(rules: Vec<Transition<S>>) -> Self {
        let mut edges: HashMap<S, BTreeSet<S>> = HashMap::new();
        let mut by_edge = HashMap::new();
        for (index, rule) in rules.iter().enumerate() {
            edges.entry(rule.from).or_default().insert(rule.to);
            by_edge.insert((rule.from, rule.to), index);
        }
        Self {
            rules,
            edges,
            by_edge,
        }
    }

    /// Whether the transition is allowed.
    pub fn is_valid(&self, from: S, to: S) -> bool {
        self.by_edge.contains_key(&(from, to))
    }

    /// The rule behind a transition, if one exists.
    pub fn rule(&self, from: S, to: S) -> Option<&Transition<S>> {
        self.by_edge.get(&(from, to)).map(|&index| &self.rules[index])
    }

    /// All valid next statuses from the given status. Unknown or dead-end
    /// statuses yield an empty set, not an error.
    pub fn valid_next_statuses(&self, from: S) -> BTreeSet<S> {
        self.edges.get(&from).cloned().unwrap_or_default()
    }

    /// The full rule list, in declaration order.
    pub fn rules(&self) -> &[Transition<S>] {
        &self.rules
    }
}

impl TransitionRegistry<PackageStatus> {
    /// The package lifecycle state machine.
    pub fn package() -> Self {
        use PackageStatus::*;
        Self::from_rules(vec![
            // Initial submission
            Transition::new(Draft, Submitted, "Submit package for review"),
            // Review flow
            Transition::new(Submitted, InReview, "Start formal review"),
            Transition::new(InReview, Approved, "Approve package after review"),
            // Rejection to resubmission
            Transition::new(InReview, Submitted, "Return to submitter for revisions"),
            Transition::new(Submitted, Draft, "Revert to draft for major changes"),
            // Award and activation
            Transition::new(Approved, Awarded, "Award package/contract")
                .with_approval()
                .with_risk(RiskLevel::High),
            Transition::new(Awarded, Active, "Activate and begin execution"),
            // Execution phase
            Transition::new(Active, OnHold, "Pause execution temporarily")
                .with_risk(RiskLevel::Medium),
            Transition::new(OnHold, Active, "Resume execution"),
            // Completion / terminal states
            Transition::new(Active, Completed, "Mark all tasks completed"),
            Transition::new(Approved, Cancelled, "Cancel before award")
                .with_risk(RiskLevel::Medium),
            Transition::new(Awarded, Cancelled, "Cancel after award (contract termination)")
                .with_approval()
                .with_risk(RiskLevel::High),
            Transition::new(Active, Cancelled, "Terminate active execution")
                .with_approval()
                .with_risk(RiskLevel::High),
            // Archival, the only edges out of a terminal status
            Transition::new(Completed, Archived, "Archive completed package"),
            Transition::new(Cancelled, Archived, "Archive cancelled package"),
        ])
    }
}

impl TransitionRegistry<TaskStatus> {
    /// The task lifecycle state machine.
    pub fn task() -> Self {
        use TaskStatus::*;
        Self::from_rules(vec![
            Transition::new(Pending, InProgress, "Start working on task"),
            // Blocking
            Transition::new(InProgress, Blocked, "Task blocked by external factor")
                .with_risk(RiskLevel::Medium),
            Transition::new(Blocked, InProgress, "Unblock and resume work"),
            // Review before completion
            Transition::new(InProgress, ReviewNeeded, "Submit for review/approval"),
            Transition::new(ReviewNeeded, Completed, "Review approved, mark complete"),
            Transition::new(ReviewNeeded, InProgress, "Returned from review for revisions"),
            // Direct completion
            Transition::new(InProgress, Completed, "Mark task complete (no review needed)"),
            // Cancellation
            Transition::new(Pending, Cancelled, "Cancel before start"),
            Transition::new(InProgress, Cancelled, "Cancel in-progress task")
                .with_risk(RiskLevel::Medium),
            Transition::new(Blocked, Cancelled, "Cancel blocked task"),
            Transition::new(ReviewNeeded, Cancelled, "Cancel instead of approving"),
        ])
    }
}
