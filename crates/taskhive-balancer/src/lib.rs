//! Load balancer: a stateless-by-contract function from (candidate set,
//! load snapshot, strategy) to one chosen agent.
//!
//! The balancer never blocks. It returns `None` when every candidate is at
//! capacity, and the caller decides how to back off. All tie-breaks are
//! total orders so that a fixed input sequence produces a fixed decision
//! sequence; the weighted draw uses a seeded RNG for the same reason.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;
use taskhive_registry::AgentSnapshot;

pub use taskhive_core::BalanceStrategy;

/// Aggregate view of the agent pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub total_agents: usize,
    pub total_capacity: usize,
    pub total_active: usize,
    pub avg_utilization: f64,
}

pub struct LoadBalancer {
    strategy: BalanceStrategy,
    rr_cursor: AtomicUsize,
    rng: Mutex<StdRng>,
}

impl LoadBalancer {
    pub fn new(strategy: BalanceStrategy, seed: u64) -> Self {
        Self {
            strategy,
            rr_cursor: AtomicUsize::new(0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn strategy(&self) -> BalanceStrategy {
        self.strategy
    }

    /// Choose one agent with the balancer's configured strategy.
    pub fn select(&self, candidates: &[AgentSnapshot], capability: Option<&str>) -> Option<String> {
        self.select_with(candidates, capability, self.strategy)
    }

    /// Choose one agent with an explicit strategy override.
    ///
    /// Candidates at capacity are excluded first; `None` means every
    /// candidate is full.
    pub fn select_with(
        &self,
        candidates: &[AgentSnapshot],
        capability: Option<&str>,
        strategy: BalanceStrategy,
    ) -> Option<String> {
        let available: Vec<&AgentSnapshot> = candidates
            .iter()
            .filter(|a| a.status.is_dispatchable() && a.active < a.capacity)
            .collect();
        if available.is_empty() {
            return None;
        }

        match strategy {
            BalanceStrategy::RoundRobin => self.round_robin(&available),
            BalanceStrategy::LeastLoaded => least_loaded(&available),
            BalanceStrategy::WeightedPerformance => self.weighted(&available),
            BalanceStrategy::CapabilityScore => {
                let matching: Vec<&AgentSnapshot> = available
                    .iter()
                    .copied()
                    .filter(|a| {
                        capability.map_or(true, |cap| a.capabilities.iter().any(|c| c == cap))
                    })
                    .collect();
                if matching.is_empty() {
                    return None;
                }
                least_loaded(&matching)
            }
        }
    }

    fn round_robin(&self, available: &[&AgentSnapshot]) -> Option<String> {
        let cursor = self.rr_cursor.fetch_add(1, AtomicOrdering::Relaxed);
        Some(available[cursor % available.len()].id.clone())
    }

    fn weighted(&self, available: &[&AgentSnapshot]) -> Option<String> {
        let weights: Vec<f64> = available.iter().map(|a| performance_weight(a)).collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            // All weights zero: fall back to round-robin over the
            // zero-weight set.
            return self.round_robin(available);
        }

        let mut draw = {
            let mut rng = self.rng.lock().expect("balancer rng poisoned");
            rng.gen_range(0.0..total)
        };
        for (agent, weight) in available.iter().zip(&weights) {
            if draw < *weight {
                return Some(agent.id.clone());
            }
            draw -= weight;
        }
        // Floating point edge: attribute the remainder to the last candidate.
        available.last().map(|a| a.id.clone())
    }

    pub fn cluster_stats(candidates: &[AgentSnapshot]) -> ClusterStats {
        let total_capacity: usize = candidates.iter().map(|a| a.capacity).sum();
        let total_active: usize = candidates.iter().map(|a| a.active).sum();
        ClusterStats {
            total_agents: candidates.len(),
            total_capacity,
            total_active,
            avg_utilization: if total_capacity == 0 {
                0.0
            } else {
                total_active as f64 / total_capacity as f64
            },
        }
    }
}

/// `success_rate × (1 − utilization)`.
fn performance_weight(agent: &AgentSnapshot) -> f64 {
    let utilization = agent.active as f64 / agent.capacity.max(1) as f64;
    (agent.success_rate * (1.0 - utilization)).max(0.0)
}

/// Lowest utilization wins; ties go to lower active count, then higher
/// success rate, then lexicographically lower id.
fn least_loaded(available: &[&AgentSnapshot]) -> Option<String> {
    available
        .iter()
        .min_by(|a, b| compare_load(a, b))
        .map(|a| a.id.clone())
}

fn compare_load(a: &AgentSnapshot, b: &AgentSnapshot) -> Ordering {
    // Compare active/capacity without floats: a.active * b.capacity vs
    // b.active * a.capacity.
    let left = a.active * b.capacity.max(1);
    let right = b.active * a.capacity.max(1);
    left.cmp(&right)
        .then_with(|| a.active.cmp(&b.active))
        .then_with(|| {
            b.success_rate
                .partial_cmp(&a.success_rate)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.id.cmp(&b.id))
}
