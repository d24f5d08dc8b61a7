//! Task executors
//!
//! A task executor turns a step's resolved inputs into named outputs. The
//! registry dispatches on (role, task); pairs without an executor produce
//! only the base result stub.

use crate::conversation::WorkflowValues;
use async_trait::async_trait;
use chrono::Utc;
use hivemind_core::{AgentRole, HiveResult};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Executes one workflow task.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Produce outputs from the step's resolved inputs and the initiating context.
    async fn execute(
        &self,
        inputs: &WorkflowValues,
        context: &HashMap<String, Value>,
    ) -> HiveResult<WorkflowValues>;
}

/// Executor that returns a fixed set of fields.
#[derive(Debug, Clone, Default)]
pub struct SimulatedExecutor {
    fields: WorkflowValues,
}

impl SimulatedExecutor {
    /// Build from a JSON object. Non-object values yield an empty executor.
    pub fn from_json(value: Value) -> Self {
        let fields = match value {
            Value::Object(map) => map.into_iter().collect(),
            _ => WorkflowValues::new(),
        };
        Self { fields }
    }
}

#[async_trait]
impl TaskExecutor for SimulatedExecutor {
    async fn execute(
        &self,
        _inputs: &WorkflowValues,
        _context: &HashMap<String, Value>,
    ) -> HiveResult<WorkflowValues> {
        Ok(self.fields.clone())
    }
}

/// The result every step starts from before executor output is merged in.
pub fn base_result(role: AgentRole, task: &str) -> WorkflowValues {
    let mut result = WorkflowValues::new();
    result.insert("task".to_string(), json!(task));
    result.insert("role".to_string(), json!(role.as_str()));
    result.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
    result.insert("status".to_string(), json!("completed"));
    result
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Task executors keyed by (role, task).
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<(AgentRole, String), Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a simulated executor for every built-in catalog step.
    pub fn builtin() -> Self {
        use AgentRole::*;

        let mut registry = Self::new();
        let mut simulated = |role: AgentRole, task: &str, fields: Value| {
            registry.register(role, task, Arc::new(SimulatedExecutor::from_json(fields)));
        };

        simulated(
            Engineer,
            "initial_design",
            json!({
                "system_capacity_kw": 10.5,
                "panel_count": 30,
                "inverter_type": "string",
                "estimated_yield_kwh": 15000
            }),
        );
        simulated(
            Engineer,
            "design_refinement",
            json!({
                "refined_capacity_kw": 11.2,
                "cost_optimized": true,
                "compliance_verified": true
            }),
        );
        simulated(
            FinancialAdvisor,
            "financial_analysis",
            json!({
                "total_cost": 25000,
                "payback_period": 7.2,
                "roi_percent": 14.5,
                "financing_options": ["cash", "loan", "lease"]
            }),
        );
        simulated(
            ComplianceOfficer,
            "code_compliance",
            json!({
                "building_code_status": "compliant",
                "electrical_code_status": "compliant",
                "permit_requirements": ["electrical", "building"],
                "inspection_schedule": "standard"
            }),
        );
        simulated(
            Analyst,
            "grid_impact_analysis",
            json!({
                "grid_capacity_available": true,
                "voltage_impact": "minimal",
                "interconnection_cost": 1500,
                "utility_requirements": ["net_metering_agreement"]
            }),
        );
        simulated(
            WeatherOracle,
            "generation_forecast",
            json!({
                "annual_irradiance_kwh_m2": 1650,
                "seasonal_variation": 0.25,
                "cloud_coverage_avg": 0.35,
                "weather_risk_factors": ["occasional_snow", "dust_storms"]
            }),
        );
        simulated(
            Philosopher,
            "uncertainty_analysis",
            json!({
                "confidence_interval": [0.85, 1.15],
                "risk_factors": ["weather", "equipment", "regulatory"],
                "sensitivity_analysis": {"irradiance": 0.8, "temperature": 0.3}
            }),
        );
        simulated(
            Philosopher,
            "scenario_evaluation",
            json!({
                "recommended_scenario": "balanced_optimization",
                "risk_adjusted_return": 12.1,
                "uncertainty_bounds": [10.5, 18.2]
            }),
        );
        simulated(
            Navigator,
            "optimization_scenarios",
            json!({
                "scenario_count": 8,
                "quantum_coherence": 0.73,
                "pareto_optimal_solutions": 3,
                "recommended_exploration": ["tilt_optimization", "azimuth_adjustment"]
            }),
        );
        simulated(
            Designer,
            "performance_analysis",
            json!({
                "performance_ratio": 0.82,
                "specific_yield_kwh_kwp": 1430,
                "shading_loss_percent": 3.5
            }),
        );

        registry
    }

    /// Register or replace the executor for (role, task).
    pub fn register(&mut self, role: AgentRole, task: impl Into<String>, executor: Arc<dyn TaskExecutor>) {
        self.executors.insert((role, task.into()), executor);
    }

    pub fn get(&self, role: AgentRole, task: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(&(role, task.to_string())).cloned()
    }

    pub fn contains(&self, role: AgentRole, task: &str) -> bool {
        self.executors.contains_key(&(role, task.to_string()))
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .executors
            .keys()
            .map(|(role, task)| format!("{}/{}", role, task))
            .collect();
        keys.sort();
        f.debug_struct("ExecutorRegistry").field("executors", &keys).finish()
    }
}
