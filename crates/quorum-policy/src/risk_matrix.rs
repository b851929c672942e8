//! Risk arbitration: impact × uncertainty → decision category.
//!
//! A deterministic 4×4 table. Lookups that miss the table fail closed —
//! they are treated as requiring both approval and escalation, never as
//! AUTO.

use quorum_types::{DecisionType, ImpactLevel, UncertaintyLevel};
use std::collections::HashMap;

/// One cell of the risk matrix.
#[derive(Clone, Debug)]
pub struct RiskCell {
    pub impact: ImpactLevel,
    pub uncertainty: UncertaintyLevel,
    pub decision_type: DecisionType,
    pub description: &'static str,
    pub notification_required: bool,
}

/// Deterministic 4×4 risk matrix.
///
/// Two asymmetries are intentional: high impact with low uncertainty still
/// requires approval (a clear, high-stakes change is never "auto"), and
/// low impact with critical uncertainty only asks for confirmation (low
/// damage tolerates high doubt).
#[derive(Clone, Debug)]
pub struct RiskMatrix {
    cells: HashMap<(ImpactLevel, UncertaintyLevel), RiskCell>,
}

impl RiskMatrix {
    /// The shipped 16-cell table.
    pub fn standard() -> Self {
        use DecisionType::*;
        use ImpactLevel as I;
        use UncertaintyLevel as U;

        let table: [(I, U, DecisionType, &'static str, bool); 16] = [
            (I::Low, U::Low, Auto, "Low impact, well-understood: proceed automatically", false),
            (I::Low, U::Medium, Auto, "Low impact, some unknowns: proceed with monitoring", false),
            (I::Low, U::High, Confirm, "Low impact, high uncertainty: confirm but don't block", true),
            (I::Low, U::Critical, Confirm, "Low impact, highly unpredictable: low damage tolerates high doubt, confirm with notification", true),
            (I::Medium, U::Low, Auto, "Moderate impact, well-understood: proceed", false),
            (I::Medium, U::Medium, Confirm, "Moderate impact/uncertainty: confirm with stakeholders", true),
            (I::Medium, U::High, ApprovalRequired, "Moderate impact, high uncertainty: require formal approval", false),
            (I::Medium, U::Critical, ExecutiveApproval, "Moderate impact, critical uncertainty: escalate to leadership", false),
            (I::High, U::Low, ApprovalRequired, "High impact, well-understood: require approval", false),
            (I::High, U::Medium, ApprovalRequired, "High impact, moderate uncertainty: require approval", false),
            (I::High, U::High, ExecutiveApproval, "High impact, high uncertainty: escalate to leadership", false),
            (I::High, U::Critical, Escalate, "High impact, critical uncertainty: escalate for expert review", false),
            (I::Critical, U::Low, ExecutiveApproval, "Critical impact, well-understood: escalate to top leadership", false),
            (I::Critical, U::Medium, ExecutiveApproval, "Critical impact, moderate uncertainty: escalate to top leadership", false),
            (I::Critical, U::High, Escalate, "Critical impact, high uncertainty: escalate for expert judgment", false),
            (I::Critical, U::Critical, Escalate, "Critical impact, critical uncertainty: escalate immediately", false),
        ];

        let cells = table
            .into_iter()
            .map(|(impact, uncertainty, decision_type, description, notification_required)| {
                (
                    (impact, uncertainty),
                    RiskCell {
                        impact,
                        uncertainty,
                        decision_type,
                        description,
                        notification_required,
                    },
                )
            })
            .collect();
        Self { cells }
    }

    /// Build a matrix from an explicit cell list. Tests use this to
    /// exercise lookups against a sparse table.
    #[cfg(test)]
    pub(crate) fn from_cells(cells: Vec<RiskCell>) -> Self {
        Self {
            cells: cells
                .into_iter()
                .map(|cell| ((cell.impact, cell.uncertainty), cell))
                .collect(),
        }
    }

    /// The cell for an (impact, uncertainty) pair.
    pub fn decision_for(
        &self,
        impact: ImpactLevel,
        uncertainty: UncertaintyLevel,
    ) -> Option<&RiskCell> {
        self.cells.get(&(impact, uncertainty))
    }

    /// Whether the pair requires any form of approval. A pair missing from
    /// the table fails closed to `true`.
    pub fn requires_approval(&self, impact: ImpactLevel, uncertainty: UncertaintyLevel) -> bool {
        match self.decision_for(impact, uncertainty) {
            Some(cell) => cell.decision_type.requires_approval(),
            None => true,
        }
    }

    /// Whether the pair requires escalation to leadership. Fails closed.
    pub fn requires_escalation(&self, impact: ImpactLevel, uncertainty: UncertaintyLevel) -> bool {
        match self.decision_for(impact, uncertainty) {
            Some(cell) => cell.decision_type.requires_escalation(),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn full_table_is_the_external_contract() {
        use DecisionType::*;
        use ImpactLevel as I;
        use UncertaintyLevel as U;

        let matrix = RiskMatrix::standard();
        let expected = [
            (I::Low, U::Low, Auto),
            (I::Low, U::Medium, Auto),
            (I::Low, U::High, Confirm),
            (I::Low, U::Critical, Confirm),
            (I::Medium, U::Low, Auto),
            (I::Medium, U::Medium, Confirm),
            (I::Medium, U::High, ApprovalRequired),
            (I::Medium, U::Critical, ExecutiveApproval),
            (I::High, U::Low, ApprovalRequired),
            (I::High, U::Medium, ApprovalRequired),
            (I::High, U::High, ExecutiveApproval),
            (I::High, U::Critical, Escalate),
            (I::Critical, U::Low, ExecutiveApproval),
            (I::Critical, U::Medium, ExecutiveApproval),
            (I::Critical, U::High, Escalate),
            (I::Critical, U::Critical, Escalate),
        ];
        for (impact, uncertainty, decision) in expected {
            let cell = matrix.decision_for(impact, uncertainty).unwrap();
            assert_eq!(
                cell.decision_type, decision,
                "{impact}/{uncertainty} arbitrated wrongly"
            );
        }
    }

    #[test]
    fn high_impact_low_uncertainty_is_never_auto() {
        let matrix = RiskMatrix::standard();
        assert!(matrix.requires_approval(ImpactLevel::High, UncertaintyLevel::Low));
    }

    #[test]
    fn low_impact_critical_uncertainty_does_not_block() {
        let matrix = RiskMatrix::standard();
        assert!(!matrix.requires_approval(ImpactLevel::Low, UncertaintyLevel::Critical));
        let cell = matrix
            .decision_for(ImpactLevel::Low, UncertaintyLevel::Critical)
            .unwrap();
        assert!(cell.notification_required);
    }

    #[test]
    fn pair_missing_from_the_table_fails_closed() {
        let matrix = RiskMatrix::from_cells(vec![RiskCell {
            impact: ImpactLevel::Low,
            uncertainty: UncertaintyLevel::Low,
            decision_type: DecisionType::Auto,
            description: "only configured cell",
            notification_required: false,
        }]);

        assert!(matrix
            .decision_for(ImpactLevel::High, UncertaintyLevel::High)
            .is_none());
        assert!(matrix.requires_approval(ImpactLevel::High, UncertaintyLevel::High));
        assert!(matrix.requires_escalation(ImpactLevel::High, UncertaintyLevel::High));
        // the configured cell still resolves normally
        assert!(!matrix.requires_approval(ImpactLevel::Low, UncertaintyLevel::Low));
    }

    proptest! {
        #[test]
        fn every_pair_resolves(impact_index in 0usize..4, uncertainty_index in 0usize..4) {
            let matrix = RiskMatrix::standard();
            let impact = ImpactLevel::ALL[impact_index];
            let uncertainty = UncertaintyLevel::ALL[uncertainty_index];
            let cell = matrix.decision_for(impact, uncertainty);
            prop_assert!(cell.is_some());
        }

        #[test]
        fn escalation_implies_approval(impact_index in 0usize..4, uncertainty_index in 0usize..4) {
            let matrix = RiskMatrix::standard();
            let impact = ImpactLevel::ALL[impact_index];
            let uncertainty = UncertaintyLevel::ALL[uncertainty_index];
            if matrix.requires_escalation(impact, uncertainty) {
                prop_assert!(matrix.requires_approval(impact, uncertainty));
            }
        }
    }
}
