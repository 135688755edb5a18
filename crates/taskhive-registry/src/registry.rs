use crate::types::{
    Agent, AgentFilter, AgentRegistration, AgentSnapshot, AgentStatus, AgentType, TypeFilter,
};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use taskhive_core::{HiveError, HiveResult};
use tokio::sync::RwLock;
use tracing::info;

struct Inner {
    types: HashMap<String, AgentType>,
    agents: HashMap<String, Agent>,
}

/// Catalog of agent types and live agents, indexed by capability.
///
/// Status and load counters are mutated only by the orchestrator
/// (single-writer); other readers may observe values at most one dispatch
/// cycle stale.
pub struct AgentRegistry {
    inner: RwLock<Inner>,
    /// Rolling success window length per agent.
    health_window: usize,
}

impl AgentRegistry {
    pub fn new(health_window: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                types: HashMap::new(),
                agents: HashMap::new(),
            }),
            health_window: health_window.max(1),
        }
    }

    // --- Type catalog ---

    pub async fn register_type(&self, agent_type: AgentType) -> HiveResult<()> {
        let mut inner = self.inner.write().await;
        if inner.types.contains_key(&agent_type.id) {
            return Err(HiveError::Validation(format!(
                "agent type '{}' is already registered",
                agent_type.id
            )));
        }
        info!(type_id = %agent_type.id, "Registered agent type");
        inner.types.insert(agent_type.id.clone(), agent_type);
        Ok(())
    }

    pub async fn get_type(&self, type_id: &str) -> HiveResult<AgentType> {
        let inner = self.inner.read().await;
        inner
            .types
            .get(type_id)
            .cloned()
            .ok_or_else(|| HiveError::NotFound(format!("agent type '{type_id}'")))
    }

    pub async fn list_agent_types(&self, filter: TypeFilter) -> Vec<AgentType> {
        let inner = self.inner.read().await;
        let mut types: Vec<AgentType> = inner
            .types
            .values()
            .filter(|t| filter.category.map_or(true, |c| t.category == c))
            .cloned()
            .collect();
        types.sort_by(|a, b| a.id.cmp(&b.id));
        types
    }

    // --- Live agents ---

    /// Register a live agent. The agent passes through `created` and is
    /// confirmed `idle` before the call returns.
    pub async fn register_agent(&self, registration: AgentRegistration) -> HiveResult<Agent> {
        let mut inner = self.inner.write().await;

        let agent_type = inner
            .types
            .get(&registration.type_id)
            .ok_or_else(|| HiveError::NotFound(format!("agent type '{}'", registration.type_id)))?;

        let capabilities = match registration.capabilities {
            Some(caps) => {
                for cap in &caps {
                    if !agent_type.has_capability(cap) {
                        return Err(HiveError::Validation(format!(
                            "capability '{}' is not declared by type '{}'",
                            cap, registration.type_id
                        )));
                    }
                }
                caps
            }
            None => agent_type.capabilities.iter().map(|c| c.id.clone()).collect(),
        };

        if inner.agents.contains_key(&registration.id) {
            return Err(HiveError::Validation(format!(
                "agent '{}' is already registered",
                registration.id
            )));
        }
        if registration.capacity == 0 {
            return Err(HiveError::Validation(format!(
                "agent '{}' must have capacity >= 1",
                registration.id
            )));
        }

        let mut agent = Agent {
            id: registration.id.clone(),
            type_id: registration.type_id,
            name: registration.name,
            capabilities,
            status: AgentStatus::Created,
            active_tasks: 0,
            capacity: registration.capacity,
            completed: 0,
            failed: 0,
            registered_at: Utc::now(),
            recent: VecDeque::with_capacity(self.health_window),
        };
        // Registration confirmation: created -> idle.
        agent.status = AgentStatus::Idle;

        info!(agent = %agent.id, type_id = %agent.type_id, "Registered agent");
        inner.agents.insert(agent.id.clone(), agent.clone());
        Ok(agent)
    }

    /// Remove an agent. Fails while the agent still has running tasks.
    pub async fn unregister_agent(&self, agent_id: &str) -> HiveResult<()> {
        let mut inner = self.inner.write().await;
        let agent = inner
            .agents
            .get(agent_id)
            .ok_or_else(|| HiveError::NotFound(format!("agent '{agent_id}'")))?;

        if agent.active_tasks > 0 {
            return Err(HiveError::Busy(format!(
                "agent '{agent_id}' has {} running tasks",
                agent.active_tasks
            )));
        }

        inner.agents.remove(agent_id);
        info!(agent = %agent_id, "Unregistered agent");
        Ok(())
    }

    pub async fn get_agent(&self, agent_id: &str) -> HiveResult<Agent> {
        let inner = self.inner.read().await;
        inner
            .agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| HiveError::NotFound(format!("agent '{agent_id}'")))
    }

    pub async fn list_agents(&self, filter: AgentFilter) -> Vec<Agent> {
        let inner = self.inner.read().await;
        let mut agents: Vec<Agent> = inner
            .agents
            .values()
            .filter(|a| filter.status.map_or(true, |s| a.status == s))
            .filter(|a| filter.type_id.as_deref().map_or(true, |t| a.type_id == t))
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    /// Ids of agents declaring `cap_id` that are currently dispatchable
    /// (`idle` or `busy`), in id order.
    pub async fn find_by_capability(&self, cap_id: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut ids: Vec<String> = inner
            .agents
            .values()
            .filter(|a| a.status.is_dispatchable() && a.declares(cap_id))
            .map(|a| a.id.clone())
            .collect();
        ids.sort();
        ids
    }

    // --- Status machine (single-writer: the orchestrator) ---

    pub async fn set_status(&self, agent_id: &str, status: AgentStatus) -> HiveResult<()> {
        let mut inner = self.inner.write().await;
        let agent = inner
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| HiveError::NotFound(format!("agent '{agent_id}'")))?;

        if agent.status == status {
            return Ok(());
        }
        if !agent.status.can_transition_to(status) {
            return Err(HiveError::State(format!(
                "agent '{agent_id}' cannot transition {} -> {}",
                agent.status, status
            )));
        }
        agent.status = status;
        Ok(())
    }

    /// Refuse new dispatch; in-flight tasks drain normally.
    pub async fn pause(&self, agent_id: &str) -> HiveResult<()> {
        self.set_status(agent_id, AgentStatus::Paused).await
    }

    pub async fn resume(&self, agent_id: &str) -> HiveResult<()> {
        self.set_status(agent_id, AgentStatus::Idle).await
    }

    // --- Load accounting ---

    /// Reserve one slot on the agent before dispatch. Fails with `Busy`
    /// when the agent is at capacity and with `State` when it is not
    /// dispatchable.
    pub async fn begin_dispatch(&self, agent_id: &str) -> HiveResult<()> {
        let mut inner = self.inner.write().await;
        let agent = inner
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| HiveError::NotFound(format!("agent '{agent_id}'")))?;

        if !agent.status.is_dispatchable() {
            return Err(HiveError::State(format!(
                "agent '{agent_id}' is {}",
                agent.status
            )));
        }
        if agent.active_tasks >= agent.capacity {
            return Err(HiveError::Busy(format!(
                "agent '{agent_id}' is at capacity ({})",
                agent.capacity
            )));
        }

        agent.active_tasks += 1;
        agent.status = AgentStatus::Busy;
        Ok(())
    }

    /// Release one slot and record the dispatch outcome in the rolling
    /// window. Returns `(success_rate, samples)` so the caller can apply
    /// its health policy.
    pub async fn finish_dispatch(&self, agent_id: &str, success: bool) -> HiveResult<(f64, usize)> {
        let mut inner = self.inner.write().await;
        let agent = inner
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| HiveError::NotFound(format!("agent '{agent_id}'")))?;

        agent.active_tasks = agent.active_tasks.saturating_sub(1);
        if success {
            agent.completed += 1;
        } else {
            agent.failed += 1;
        }
        agent.recent.push_back(success);
        while agent.recent.len() > self.health_window {
            agent.recent.pop_front();
        }
        if agent.status == AgentStatus::Busy && agent.active_tasks == 0 {
            agent.status = AgentStatus::Idle;
        }

        Ok((agent.success_rate(), agent.recent.len()))
    }

    /// Release a slot without recording an outcome. Used when a dispatch
    /// is abandoned (task cancelled mid-flight) so cancellations do not
    /// skew the rolling success window.
    pub async fn release_dispatch(&self, agent_id: &str) -> HiveResult<()> {
        let mut inner = self.inner.write().await;
        let agent = inner
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| HiveError::NotFound(format!("agent '{agent_id}'")))?;

        agent.active_tasks = agent.active_tasks.saturating_sub(1);
        if agent.status == AgentStatus::Busy && agent.active_tasks == 0 {
            agent.status = AgentStatus::Idle;
        }
        Ok(())
    }

    // --- Views ---

    pub async fn snapshot(&self, ids: &[String]) -> Vec<AgentSnapshot> {
        let inner = self.inner.read().await;
        ids.iter()
            .filter_map(|id| inner.agents.get(id).map(AgentSnapshot::from))
            .collect()
    }

    /// Snapshots of every idle agent, in id order. Fallback candidate set
    /// for tasks with neither an explicit agent nor a capability.
    pub async fn idle_snapshots(&self) -> Vec<AgentSnapshot> {
        let inner = self.inner.read().await;
        let mut snaps: Vec<AgentSnapshot> = inner
            .agents
            .values()
            .filter(|a| a.status == AgentStatus::Idle)
            .map(AgentSnapshot::from)
            .collect();
        snaps.sort_by(|a, b| a.id.cmp(&b.id));
        snaps
    }

    pub async fn agent_counts(&self) -> HashMap<AgentStatus, usize> {
        let inner = self.inner.read().await;
        let mut counts = HashMap::new();
        for agent in inner.agents.values() {
            *counts.entry(agent.status).or_insert(0) += 1;
        }
        counts
    }
}
