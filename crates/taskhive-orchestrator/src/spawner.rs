use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use taskhive_bus::Bus;
use taskhive_core::{topics, HiveError, HiveResult, SpawnerConfig};
use taskhive_registry::{AgentRegistration, AgentRegistry};
use tokio::sync::Mutex;
use tracing::info;

/// Pool statistics for dynamically spawned agents.
#[derive(Debug, Clone, Serialize)]
pub struct SpawnerStats {
    pub active: usize,
    pub max_agents: usize,
    pub utilization: f64,
}

/// Spawns live agents of registered types on demand, bounded by a pool
/// cap so bursty workloads cannot grow the pool without limit.
pub struct AgentSpawner {
    registry: Arc<AgentRegistry>,
    bus: Bus,
    config: SpawnerConfig,
    counter: AtomicU64,
    spawned: Mutex<HashSet<String>>,
}

impl AgentSpawner {
    pub fn new(registry: Arc<AgentRegistry>, bus: Bus, config: SpawnerConfig) -> Self {
        Self {
            registry,
            bus,
            config,
            counter: AtomicU64::new(0),
            spawned: Mutex::new(HashSet::new()),
        }
    }

    /// Spawn an agent of `type_id` with the given capacity. Returns the
    /// new agent's id.
    pub async fn spawn(&self, type_id: &str, capacity: usize) -> HiveResult<String> {
        {
            let spawned = self.spawned.lock().await;
            if spawned.len() >= self.config.max_agents {
                return Err(HiveError::Busy(format!(
                    "agent pool is at its cap of {}",
                    self.config.max_agents
                )));
            }
        }

        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let agent_id = format!("{type_id}-{n}");
        let agent = self
            .registry
            .register_agent(
                AgentRegistration::new(&agent_id, type_id, &agent_id).with_capacity(capacity),
            )
            .await?;

        self.spawned.lock().await.insert(agent_id.clone());
        self.bus
            .publish(
                topics::ORCHESTRATOR,
                &topics::agent_event("registered"),
                json!({ "agent_id": agent.id, "type_id": agent.type_id, "spawned": true }),
            )
            .ok();
        info!(agent = %agent_id, type_id = %type_id, "Spawned agent");
        Ok(agent_id)
    }

    /// Terminate a spawned agent. Fails for agents this spawner does not
    /// own, and with `Busy` while the agent still has running tasks.
    pub async fn terminate(&self, agent_id: &str) -> HiveResult<()> {
        {
            let spawned = self.spawned.lock().await;
            if !spawned.contains(agent_id) {
                return Err(HiveError::NotFound(format!(
                    "agent '{agent_id}' was not spawned by this pool"
                )));
            }
        }

        self.registry.unregister_agent(agent_id).await?;
        self.spawned.lock().await.remove(agent_id);
        self.bus
            .publish(
                topics::ORCHESTRATOR,
                &topics::agent_event("unregistered"),
                json!({ "agent_id": agent_id, "spawned": true }),
            )
            .ok();
        info!(agent = %agent_id, "Terminated spawned agent");
        Ok(())
    }

    pub async fn stats(&self) -> SpawnerStats {
        let active = self.spawned.lock().await.len();
        SpawnerStats {
            active,
            max_agents: self.config.max_agents,
            utilization: if self.config.max_agents == 0 {
                0.0
            } else {
                active as f64 / self.config.max_agents as f64
            },
        }
    }
}
