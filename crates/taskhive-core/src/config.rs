use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Agent selection strategy, per orchestrator with per-task override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStrategy {
    RoundRobin,
    LeastLoaded,
    WeightedPerformance,
    CapabilityScore,
}

impl Default for BalanceStrategy {
    fn default() -> Self {
        Self::LeastLoaded
    }
}

/// Retry policy for dispatch-layer errors (timeouts and bus failures).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retry attempts after the initial dispatch.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt.
    #[serde(default = "default_backoff_base")]
    pub backoff_base: Duration,
    /// Upper bound on a single backoff delay.
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
            backoff_cap: default_backoff_cap(),
        }
    }
}

impl RetryConfig {
    /// Exponential backoff for the given zero-based attempt, capped.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_cap)
    }
}

/// Rolling agent health policy. An agent whose success rate over the last
/// `window` dispatches drops below `min_success_rate` transitions to `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_window")]
    pub window: usize,
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            window: default_health_window(),
            min_success_rate: default_min_success_rate(),
        }
    }
}

/// Communication bus tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Per-subscription queue depth; overflow drops the oldest message.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Number of recent messages retained for `history()`.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Default deadline for `request()` round-trips.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
            history_limit: default_history_limit(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Collaboration session limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Wall-clock bound for a whole session regardless of round count.
    #[serde(default = "default_session_timeout")]
    pub timeout: Duration,
    /// Sessions coordinated concurrently; further runs wait for a slot.
    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: default_session_timeout(),
            max_concurrent: default_max_concurrent_sessions(),
        }
    }
}

/// Dynamic agent pool limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnerConfig {
    #[serde(default = "default_max_spawned")]
    pub max_agents: usize,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            max_agents: default_max_spawned(),
        }
    }
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Number of dispatch workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Default per-task dispatch timeout; tasks may override.
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout: Duration,
    /// Delay before a task rejected by the balancer re-enters the queue.
    #[serde(default = "default_requeue_backoff")]
    pub requeue_backoff: Duration,
    /// Grace window for an agent to acknowledge a cancellation.
    #[serde(default = "default_cancel_grace")]
    pub cancel_grace: Duration,
    /// Interval between background health sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: Duration,
    /// Default agent selection strategy.
    #[serde(default)]
    pub balance: BalanceStrategy,
    /// Seed for the weighted-performance balancer draw.
    #[serde(default)]
    pub balance_seed: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub spawner: SpawnerConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            dispatch_timeout: default_dispatch_timeout(),
            requeue_backoff: default_requeue_backoff(),
            cancel_grace: default_cancel_grace(),
            sweep_interval: default_sweep_interval(),
            balance: BalanceStrategy::default(),
            balance_seed: 0,
            retry: RetryConfig::default(),
            health: HealthConfig::default(),
            bus: BusConfig::default(),
            session: SessionConfig::default(),
            spawner: SpawnerConfig::default(),
        }
    }
}

fn default_workers() -> usize {
    3
}
fn default_dispatch_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_requeue_backoff() -> Duration {
    Duration::from_millis(100)
}
fn default_cancel_grace() -> Duration {
    Duration::from_secs(5)
}
fn default_sweep_interval() -> Duration {
    Duration::from_secs(10)
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base() -> Duration {
    Duration::from_millis(100)
}
fn default_backoff_cap() -> Duration {
    Duration::from_secs(5)
}
fn default_health_window() -> usize {
    20
}
fn default_min_success_rate() -> f64 {
    0.5
}
fn default_queue_depth() -> usize {
    64
}
fn default_history_limit() -> usize {
    256
}
fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_session_timeout() -> Duration {
    Duration::from_secs(300)
}
fn default_max_concurrent_sessions() -> usize {
    4
}
fn default_max_spawned() -> usize {
    10
}
