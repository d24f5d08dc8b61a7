//! Collaboration pattern catalog
//!
//! Patterns are read-only at runtime. The built-in catalog can be extended
//! or overridden from a TOML document of the form:
//!
//! ```toml
//! [[pattern]]
//! name = "site_survey"
//! description = "Survey a site"
//! participants = ["Engineer", "WeatherOracle"]
//!
//! [[pattern.workflow]]
//! role = "WeatherOracle"
//! task = "generation_forecast"
//! outputs = ["weather_forecast"]
//! ```

use hivemind_capabilities::StepDescriptor;
use hivemind_core::{AgentRole, ConfigError, HiveError, HiveResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One step of a collaboration workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Role that performs the step
    pub role: AgentRole,
    /// Task label, dispatched with the role to a task executor
    pub task: String,
    /// Named inputs resolved from earlier outputs or the initiating context
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Named outputs this step publishes
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl WorkflowStep {
    pub fn new(role: AgentRole, task: impl Into<String>) -> Self {
        Self {
            role,
            task: task.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_inputs(mut self, inputs: &[&str]) -> Self {
        self.inputs = inputs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_outputs(mut self, outputs: &[&str]) -> Self {
        self.outputs = outputs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn to_descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            role: self.role,
            task: self.task.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
        }
    }
}

/// A named multi-step collaboration template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaborationPattern {
    pub name: String,
    pub description: String,
    /// Roles taking part
    pub participants: Vec<AgentRole>,
    /// Ordered steps
    pub workflow: Vec<WorkflowStep>,
}

impl CollaborationPattern {
    pub fn step_count(&self) -> usize {
        self.workflow.len()
    }

    fn validate(&self) -> HiveResult<()> {
        if self.name.trim().is_empty() {
            return Err(invalid("pattern.name", &self.name, "pattern name must not be empty"));
        }
        if self.workflow.is_empty() {
            return Err(invalid(
                "pattern.workflow",
                &self.name,
                "pattern must declare at least one workflow step",
            ));
        }
        if let Some(step) = self.workflow.iter().find(|s| s.task.trim().is_empty()) {
            return Err(invalid(
                "pattern.workflow.task",
                step.role.as_str(),
                "workflow step task must not be empty",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> HiveError {
    HiveError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    pattern: Vec<CollaborationPattern>,
}

// ============================================================================
// CATALOG
// ============================================================================

/// Patterns by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternCatalog {
    patterns: BTreeMap<String, CollaborationPattern>,
}

impl PatternCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The three built-in patterns.
    pub fn builtin() -> Self {
        use AgentRole::*;

        let mut catalog = Self::new();
        catalog.insert(CollaborationPattern {
            name: "solar_design_review".to_string(),
            description: "Review solar system design for technical and financial viability"
                .to_string(),
            participants: vec![Engineer, FinancialAdvisor, ComplianceOfficer],
            workflow: vec![
                WorkflowStep::new(Engineer, "initial_design").with_outputs(&["system_specs"]),
                WorkflowStep::new(FinancialAdvisor, "financial_analysis")
                    .with_inputs(&["system_specs"])
                    .with_outputs(&["financial_model"]),
                WorkflowStep::new(ComplianceOfficer, "code_compliance")
                    .with_inputs(&["system_specs"])
                    .with_outputs(&["compliance_report"]),
                WorkflowStep::new(Engineer, "design_refinement")
                    .with_inputs(&["financial_model", "compliance_report"]),
            ],
        });
        catalog.insert(CollaborationPattern {
            name: "grid_integration_study".to_string(),
            description: "Analyze grid integration requirements and impacts".to_string(),
            participants: vec![Analyst, WeatherOracle, Philosopher],
            workflow: vec![
                WorkflowStep::new(WeatherOracle, "generation_forecast")
                    .with_outputs(&["weather_forecast"]),
                WorkflowStep::new(Analyst, "grid_impact_analysis")
                    .with_inputs(&["weather_forecast"])
                    .with_outputs(&["grid_study"]),
                WorkflowStep::new(Philosopher, "uncertainty_analysis")
                    .with_inputs(&["grid_study"])
                    .with_outputs(&["risk_assessment"]),
            ],
        });
        catalog.insert(CollaborationPattern {
            name: "system_optimization".to_string(),
            description: "Optimize system performance using quantum-enhanced decision making"
                .to_string(),
            participants: vec![Designer, Navigator, Philosopher],
            workflow: vec![
                WorkflowStep::new(Designer, "performance_analysis")
                    .with_outputs(&["performance_data"]),
                WorkflowStep::new(Navigator, "optimization_scenarios")
                    .with_inputs(&["performance_data"])
                    .with_outputs(&["quantum_scenarios"]),
                WorkflowStep::new(Philosopher, "scenario_evaluation")
                    .with_inputs(&["quantum_scenarios"])
                    .with_outputs(&["recommendations"]),
            ],
        });
        catalog
    }

    /// Parse a TOML catalog document.
    pub fn from_toml_str(source: &str) -> HiveResult<Self> {
        let mut catalog = Self::new();
        catalog.extend_from_toml_str(source)?;
        Ok(catalog)
    }

    /// Add every pattern of a TOML document, replacing same-named entries.
    /// Returns the number of patterns read. Nothing is added on error.
    pub fn extend_from_toml_str(&mut self, source: &str) -> HiveResult<usize> {
        let document: CatalogDocument = toml::from_str(source).map_err(|e| {
            HiveError::Config(ConfigError::Parse {
                reason: e.to_string(),
            })
        })?;
        for pattern in &document.pattern {
            pattern.validate()?;
        }
        let count = document.pattern.len();
        for pattern in document.pattern {
            self.insert(pattern);
        }
        Ok(count)
    }

    /// Extend from a TOML file.
    pub fn extend_from_file(&mut self, path: &Path) -> HiveResult<usize> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            HiveError::Config(ConfigError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        })?;
        self.extend_from_toml_str(&source)
    }

    /// Insert or replace a pattern.
    pub fn insert(&mut self, pattern: CollaborationPattern) {
        self.patterns.insert(pattern.name.clone(), pattern);
    }

    pub fn get(&self, name: &str) -> Option<&CollaborationPattern> {
        self.patterns.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.patterns.contains_key(name)
    }

    /// Pattern names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.patterns.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollaborationPattern> {
        self.patterns.values()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
