//! Decision oracles
//!
//! An oracle picks one option out of several. [`CircuitOracle`] samples a
//! simulated entangling circuit, [`ClassicalOracle`] draws uniformly, and
//! [`GuardedOracle`] puts a deadline on the former and degrades to the latter.

use async_trait::async_trait;
use hivemind_core::{duration_millis, CapabilityError, HiveError, HiveResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// DECISION TYPES
// ============================================================================

/// Where a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Produced by the rich oracle
    Oracle,
    /// Produced by the classical fallback
    Fallback,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Oracle => "oracle",
            Provenance::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one oracle call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// The chosen option
    pub selected: String,
    /// Index of the chosen option in the input slice
    pub index: usize,
    /// Share of shots that landed on the winning state, in [0, 1]
    pub coherence: f64,
    /// Which oracle produced this decision
    pub provenance: Provenance,
}

/// Trait for decision oracles.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Select one of `options`. Empty input is an `InvalidRequest`.
    async fn choose(&self, options: &[String]) -> HiveResult<Decision>;
}

fn reject_empty(capability: &str, options: &[String]) -> HiveResult<()> {
    if options.is_empty() {
        return Err(HiveError::Capability(CapabilityError::InvalidRequest {
            capability: capability.to_string(),
            reason: "no options to choose from".to_string(),
        }));
    }
    Ok(())
}

fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

// ============================================================================
// CIRCUIT ORACLE
// ============================================================================

/// State-vector simulation of an N-qubit register.
///
/// Only the gates the oracle needs are supported, and amplitudes stay real
/// because neither gate introduces a phase.
#[derive(Debug, Clone)]
struct Register {
    qubits: usize,
    amplitudes: Vec<f64>,
}

impl Register {
    fn new(qubits: usize) -> Self {
        let mut amplitudes = vec![0.0; 1 << qubits];
        amplitudes[0] = 1.0;
        Self { qubits, amplitudes }
    }

    fn hadamard(&mut self, target: usize) {
        let bit = 1 << target;
        let scale = std::f64::consts::FRAC_1_SQRT_2;
        for i in 0..self.amplitudes.len() {
            if i & bit == 0 {
                let a = self.amplitudes[i];
                let b = self.amplitudes[i | bit];
                self.amplitudes[i] = (a + b) * scale;
                self.amplitudes[i | bit] = (a - b) * scale;
            }
        }
    }

    fn cnot(&mut self, control: usize, target: usize) {
        let control_bit = 1 << control;
        let target_bit = 1 << target;
        for i in 0..self.amplitudes.len() {
            if i & control_bit != 0 && i & target_bit == 0 {
                self.amplitudes.swap(i, i | target_bit);
            }
        }
    }

    /// Sample `shots` measurements of the full register.
    fn measure(&self, shots: u32, rng: &mut StdRng) -> Vec<u32> {
        let mut cumulative = Vec::with_capacity(self.amplitudes.len());
        let mut total = 0.0;
        for amplitude in &self.amplitudes {
            total += amplitude * amplitude;
            cumulative.push(total);
        }

        let last = self.amplitudes.len() - 1;
        let mut counts = vec![0u32; self.amplitudes.len()];
        for _ in 0..shots {
            let draw = rng.random::<f64>() * total;
            let state = cumulative.partition_point(|c| *c <= draw).min(last);
            counts[state] += 1;
        }
        counts
    }
}

/// Oracle backed by a simulated entangling circuit.
///
/// One qubit per option (capped at [`CircuitOracle::MAX_QUBITS`]), a Hadamard
/// on every qubit, a CNOT chain, then `shots` measurements. The most frequent
/// basis state wins, ties going to the lowest state; its index modulo the
/// option count selects the option and its share of shots is the coherence.
pub struct CircuitOracle {
    shots: u32,
    rng: Mutex<StdRng>,
}

impl CircuitOracle {
    pub const MAX_QUBITS: usize = 12;
    pub const DEFAULT_SHOTS: u32 = 1024;

    pub fn new(shots: u32, seed: Option<u64>) -> Self {
        Self {
            shots: shots.max(1),
            rng: Mutex::new(rng_from_seed(seed)),
        }
    }

    pub fn shots(&self) -> u32 {
        self.shots
    }

    fn run_circuit(&self, option_count: usize) -> HiveResult<(usize, f64)> {
        let qubits = option_count.clamp(1, Self::MAX_QUBITS);
        let mut register = Register::new(qubits);
        for q in 0..qubits {
            register.hadamard(q);
        }
        for q in 0..qubits.saturating_sub(1) {
            register.cnot(q, q + 1);
        }

        let counts = {
            let mut rng = self.rng.lock().map_err(|_| {
                HiveError::Capability(CapabilityError::Failed {
                    capability: "circuit_oracle".to_string(),
                    reason: "random source lock poisoned".to_string(),
                })
            })?;
            register.measure(self.shots, &mut rng)
        };

        let mut winner = 0;
        for (state, count) in counts.iter().enumerate() {
            if *count > counts[winner] {
                winner = state;
            }
        }
        let coherence = f64::from(counts[winner]) / f64::from(self.shots);
        Ok((winner % option_count, coherence))
    }
}

impl Default for CircuitOracle {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SHOTS, None)
    }
}

impl fmt::Debug for CircuitOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitOracle")
            .field("shots", &self.shots)
            .finish()
    }
}

#[async_trait]
impl DecisionOracle for CircuitOracle {
    fn name(&self) -> &str {
        "circuit"
    }

    async fn choose(&self, options: &[String]) -> HiveResult<Decision> {
        reject_empty("circuit_oracle", options)?;
        let (index, coherence) = self.run_circuit(options.len())?;
        Ok(Decision {
            selected: options[index].clone(),
            index,
            coherence: hivemind_core::clamp_unit(coherence),
            provenance: Provenance::Oracle,
        })
    }
}

// ============================================================================
// CLASSICAL ORACLE
// ============================================================================

/// Uniform random choice with zero coherence.
pub struct ClassicalOracle {
    rng: Mutex<StdRng>,
}

impl ClassicalOracle {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: Mutex::new(rng_from_seed(seed)),
        }
    }
}

impl Default for ClassicalOracle {
    fn default() -> Self {
        Self::new(None)
    }
}

impl fmt::Debug for ClassicalOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassicalOracle").finish()
    }
}

#[async_trait]
impl DecisionOracle for ClassicalOracle {
    fn name(&self) -> &str {
        "classical"
    }

    async fn choose(&self, options: &[String]) -> HiveResult<Decision> {
        reject_empty("classical_oracle", options)?;
        let index = {
            let mut rng = self.rng.lock().map_err(|_| {
                HiveError::Capability(CapabilityError::Failed {
                    capability: "classical_oracle".to_string(),
                    reason: "random source lock poisoned".to_string(),
                })
            })?;
            rng.random_range(0..options.len())
        };
        Ok(Decision {
            selected: options[index].clone(),
            index,
            coherence: 0.0,
            provenance: Provenance::Fallback,
        })
    }
}

// ============================================================================
// GUARDED ORACLE
// ============================================================================

/// Deadline-guarded oracle that degrades to [`ClassicalOracle`].
///
/// Without a primary oracle every call goes straight to the fallback.
pub struct GuardedOracle {
    primary: Option<Arc<dyn DecisionOracle>>,
    fallback: ClassicalOracle,
    deadline: Duration,
}

impl GuardedOracle {
    pub fn new(
        primary: Option<Arc<dyn DecisionOracle>>,
        fallback: ClassicalOracle,
        deadline: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            deadline,
        }
    }

    /// Guard with no primary oracle.
    pub fn classical_only(seed: Option<u64>) -> Self {
        Self::new(None, ClassicalOracle::new(seed), Duration::from_secs(5))
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

impl fmt::Debug for GuardedOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedOracle")
            .field("primary", &self.primary.as_ref().map(|p| p.name().to_string()))
            .field("deadline", &self.deadline)
            .finish()
    }
}

#[async_trait]
impl DecisionOracle for GuardedOracle {
    fn name(&self) -> &str {
        "guarded"
    }

    async fn choose(&self, options: &[String]) -> HiveResult<Decision> {
        reject_empty("guarded_oracle", options)?;

        if let Some(primary) = &self.primary {
            match tokio::time::timeout(self.deadline, primary.choose(options)).await {
                Ok(Ok(decision)) => return Ok(decision),
                Ok(Err(e)) => {
                    tracing::warn!(
                        oracle = primary.name(),
                        error = %e,
                        "Decision oracle failed, using classical fallback"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        oracle = primary.name(),
                        deadline_ms = duration_millis(self.deadline),
                        "Decision oracle timed out, using classical fallback"
                    );
                }
            }
        }

        self.fallback.choose(options).await
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_circuit_decision_in_bounds(count in 1usize..10, seed in any::<u64>()) {
            let opts: Vec<String> = (0..count).map(|i| format!("opt{i}")).collect();
            let oracle = CircuitOracle::new(128, Some(seed));
            let (index, coherence) = oracle.run_circuit(opts.len()).unwrap();
            prop_assert!(index < count);
            prop_assert!(coherence > 0.0 && coherence <= 1.0);
        }
    }
}
