//! Static tables driving the evolution loop

use hivemind_core::{AgentRole, AgentTier};

/// Collaboration task labels, in rotation order.
pub const COLLABORATION_TASKS: [&str; 6] = [
    "solar_yield_analysis",
    "grid_integration_study",
    "compliance_verification",
    "financial_optimization",
    "weather_impact_modeling",
    "quantum_uncertainty_analysis",
];

/// Decision scenarios, in rotation order.
pub const DECISION_SCENARIOS: [&[&str]; 5] = [
    &["optimize_for_efficiency", "optimize_for_reliability"],
    &["conservative_approach", "innovative_approach"],
    &["local_optimization", "grid_optimization"],
    &["immediate_action", "strategic_delay"],
    &["explore", "exploit", "consolidate"],
];

/// Collaboration pattern a task is delegated as.
pub fn pattern_for_task(task: &str) -> Option<&'static str> {
    match task {
        "solar_yield_analysis" | "compliance_verification" | "financial_optimization" => {
            Some("solar_design_review")
        }
        "grid_integration_study" | "weather_impact_modeling" => Some("grid_integration_study"),
        "quantum_uncertainty_analysis" => Some("system_optimization"),
        _ => None,
    }
}

/// One entry of the canonical roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterEntry {
    pub role: AgentRole,
    pub tier: AgentTier,
    pub tools: &'static [&'static str],
}

/// The eight agents a genesis collective starts with.
pub const CANONICAL_ROSTER: [RosterEntry; 8] = [
    RosterEntry {
        role: AgentRole::Engineer,
        tier: AgentTier::Orchestrator,
        tools: &["PySAM", "AutoGen", "Python"],
    },
    RosterEntry {
        role: AgentRole::Designer,
        tier: AgentTier::ToolUser,
        tools: &["PySAM", "CAD", "Python"],
    },
    RosterEntry {
        role: AgentRole::Analyst,
        tier: AgentTier::Orchestrator,
        tools: &["GridLAB-D", "PySAM", "AutoGen"],
    },
    RosterEntry {
        role: AgentRole::Philosopher,
        tier: AgentTier::Sage,
        tools: &["ChromaDB", "Qiskit", "RAG"],
    },
    RosterEntry {
        role: AgentRole::ComplianceOfficer,
        tier: AgentTier::Sage,
        tools: &["RAG_AS3000", "ChromaDB", "LegalDB"],
    },
    RosterEntry {
        role: AgentRole::WeatherOracle,
        tier: AgentTier::ToolUser,
        tools: &["Prophet", "WeatherAPI", "Python"],
    },
    RosterEntry {
        role: AgentRole::FinancialAdvisor,
        tier: AgentTier::ToolUser,
        tools: &["Python", "NPV", "Economics"],
    },
    RosterEntry {
        role: AgentRole::Navigator,
        tier: AgentTier::Orchestrator,
        tools: &["Qiskit", "RandomOracle", "Inspiration"],
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use hivemind_orchestrator::PatternCatalog;

    #[test]
    fn test_every_task_maps_to_builtin_pattern() {
        let catalog = PatternCatalog::builtin();
        for task in COLLABORATION_TASKS {
            let pattern = pattern_for_task(task).unwrap();
            assert!(catalog.contains(pattern), "{} -> {}", task, pattern);
        }
        assert!(pattern_for_task("unknown_task").is_none());
    }

    #[test]
    fn test_roster_covers_every_role_once() {
        let roles: Vec<AgentRole> = CANONICAL_ROSTER.iter().map(|e| e.role).collect();
        assert_eq!(roles, AgentRole::ALL.to_vec());
    }

    #[test]
    fn test_scenarios_are_binary_or_ternary() {
        for scenario in DECISION_SCENARIOS {
            assert!((2..=3).contains(&scenario.len()));
        }
    }
}
