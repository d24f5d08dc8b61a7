//! Role compatibility table
//!
//! Stored as an undirected edge set: declaring `A -> B` makes both `A + B`
//! and `B + A` compatible. TOML form:
//!
//! ```toml
//! [compatible]
//! Engineer = ["Designer", "Analyst"]
//! Navigator = ["Philosopher"]
//! ```

use hivemind_core::{AgentRole, ConfigError, HiveError, HiveResult};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CompatibilityDocument {
    #[serde(default)]
    compatible: BTreeMap<String, Vec<String>>,
}

/// Which role pairs can collaborate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompatibilityTable {
    edges: BTreeSet<(AgentRole, AgentRole)>,
}

fn edge(a: AgentRole, b: AgentRole) -> (AgentRole, AgentRole) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn parse_role(name: &str) -> HiveResult<AgentRole> {
    AgentRole::parse(name).map_err(|e| {
        HiveError::Config(ConfigError::InvalidValue {
            field: "compatible".to_string(),
            value: name.to_string(),
            reason: e.to_string(),
        })
    })
}

impl CompatibilityTable {
    /// Empty table; nothing is compatible.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in adjacency list.
    pub fn builtin() -> Self {
        use AgentRole::*;

        let adjacency: [(AgentRole, [AgentRole; 2]); 8] = [
            (Engineer, [Designer, Analyst]),
            (Designer, [Engineer, FinancialAdvisor]),
            (Analyst, [Engineer, WeatherOracle]),
            (Philosopher, [Navigator, ComplianceOfficer]),
            (ComplianceOfficer, [Philosopher, FinancialAdvisor]),
            (WeatherOracle, [Analyst, Designer]),
            (FinancialAdvisor, [Designer, ComplianceOfficer]),
            (Navigator, [Philosopher, WeatherOracle]),
        ];

        let mut table = Self::new();
        for (role, partners) in adjacency {
            for partner in partners {
                table.allow(role, partner);
            }
        }
        table
    }

    /// Parse a TOML adjacency document. Role names are matched leniently.
    pub fn from_toml_str(source: &str) -> HiveResult<Self> {
        let document: CompatibilityDocument = toml::from_str(source).map_err(|e| {
            HiveError::Config(ConfigError::Parse {
                reason: e.to_string(),
            })
        })?;

        let mut table = Self::new();
        for (role, partners) in &document.compatible {
            let role = parse_role(role)?;
            for partner in partners {
                table.allow(role, parse_role(partner)?);
            }
        }
        Ok(table)
    }

    pub fn load(path: &Path) -> HiveResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            HiveError::Config(ConfigError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        })?;
        Self::from_toml_str(&source)
    }

    /// Mark `a` and `b` compatible in both directions.
    pub fn allow(&mut self, a: AgentRole, b: AgentRole) {
        self.edges.insert(edge(a, b));
    }

    pub fn is_compatible(&self, a: AgentRole, b: AgentRole) -> bool {
        self.edges.contains(&edge(a, b))
    }

    /// Roles compatible with `role`, sorted.
    pub fn partners(&self, role: AgentRole) -> Vec<AgentRole> {
        self.edges
            .iter()
            .filter_map(|&(a, b)| {
                if a == role {
                    Some(b)
                } else if b == role {
                    Some(a)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Number of undirected edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
