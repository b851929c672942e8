//! Risk classification vocabulary.
//!
//! Impact and uncertainty are supplied by the caller; how they are computed
//! is out of scope here. The risk matrix in `quorum-policy` arbitrates the
//! pair into a decision type.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ── Impact ───────────────────────────────────────────────────────────

/// Business impact of a proposed change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    /// Minimal business impact
    Low,
    /// Moderate impact
    Medium,
    /// Major impact (budget, timeline, scope)
    High,
    /// Enterprise-wide impact
    Critical,
}

impl ImpactLevel {
    pub const ALL: [ImpactLevel; 4] = [
        ImpactLevel::Low,
        ImpactLevel::Medium,
        ImpactLevel::High,
        ImpactLevel::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactLevel::Low => "low",
            ImpactLevel::Medium => "medium",
            ImpactLevel::High => "high",
            ImpactLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImpactLevel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(ImpactLevel::Low),
            "medium" => Ok(ImpactLevel::Medium),
            "high" => Ok(ImpactLevel::High),
            "critical" => Ok(ImpactLevel::Critical),
            other => Err(ParseError::UnknownImpact(other.to_string())),
        }
    }
}

// ── Uncertainty ──────────────────────────────────────────────────────

/// Uncertainty in the proposed change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UncertaintyLevel {
    /// Well-understood, precedent exists
    Low,
    /// Some unknowns
    Medium,
    /// Many unknowns, novel situation
    High,
    /// Highly unpredictable
    Critical,
}

impl UncertaintyLevel {
    pub const ALL: [UncertaintyLevel; 4] = [
        UncertaintyLevel::Low,
        UncertaintyLevel::Medium,
        UncertaintyLevel::High,
        UncertaintyLevel::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UncertaintyLevel::Low => "low",
            UncertaintyLevel::Medium => "medium",
            UncertaintyLevel::High => "high",
            UncertaintyLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for UncertaintyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UncertaintyLevel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(UncertaintyLevel::Low),
            "medium" => Ok(UncertaintyLevel::Medium),
            "high" => Ok(UncertaintyLevel::High),
            "critical" => Ok(UncertaintyLevel::Critical),
            other => Err(ParseError::UnknownUncertainty(other.to_string())),
        }
    }
}

// ── Decision Type ────────────────────────────────────────────────────

/// How a change should be handled, per the risk matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    /// Proceed automatically, no approval needed
    Auto,
    /// Notify stakeholders, but do not block
    Confirm,
    /// Requires role-based approval
    ApprovalRequired,
    /// Escalate to leadership
    ExecutiveApproval,
    /// Escalate for expert review
    Escalate,
}

impl DecisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::Auto => "auto",
            DecisionType::Confirm => "confirm",
            DecisionType::ApprovalRequired => "approval_required",
            DecisionType::ExecutiveApproval => "executive_approval",
            DecisionType::Escalate => "escalate",
        }
    }

    /// Whether this decision category requires any form of approval.
    pub fn requires_approval(&self) -> bool {
        matches!(
            self,
            DecisionType::ApprovalRequired | DecisionType::ExecutiveApproval | DecisionType::Escalate
        )
    }

    /// Whether this decision category requires escalation to leadership.
    pub fn requires_escalation(&self) -> bool {
        matches!(self, DecisionType::ExecutiveApproval | DecisionType::Escalate)
    }
}

impl std::fmt::Display for DecisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Transition Risk Level ────────────────────────────────────────────

/// Coarse risk attribute attached to a transition rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
