use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Closed set of agent categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentCategory {
    Research,
    Code,
    Data,
    Writing,
    Planning,
    Critique,
    Execution,
    Memory,
    Custom,
}

/// A named skill an agent type can perform, used to route tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub required_tools: Vec<String>,
    #[serde(default)]
    pub input_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub output_schema: Option<serde_json::Value>,
}

impl Capability {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            required_tools: Vec::new(),
            input_schema: None,
            output_schema: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.required_tools = tools;
        self
    }
}

/// A description of a class of agents. Immutable while referenced by live
/// agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentType {
    pub id: String,
    pub name: String,
    pub category: AgentCategory,
    #[serde(default = "default_version")]
    pub version: String,
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub config_schema: Option<serde_json::Value>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl AgentType {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: AgentCategory,
        capabilities: Vec<Capability>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            version: default_version(),
            capabilities,
            config_schema: None,
        }
    }

    pub fn has_capability(&self, cap_id: &str) -> bool {
        self.capabilities.iter().any(|c| c.id == cap_id)
    }
}

/// Lifecycle status of a live agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Created,
    Idle,
    Busy,
    Paused,
    Error,
    Stopped,
}

impl AgentStatus {
    /// Agents in these states accept dispatch and appear in capability
    /// lookups.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, AgentStatus::Idle | AgentStatus::Busy)
    }

    /// Valid edges of the agent state machine. `Stopped` is terminal;
    /// any non-terminal state may transition to `Error` or `Stopped`.
    pub fn can_transition_to(&self, next: AgentStatus) -> bool {
        use AgentStatus::*;
        if *self == Stopped {
            return false;
        }
        match (self, next) {
            (_, Stopped) => true,
            (_, Error) => *self != Error,
            (Created, Idle) => true,
            (Idle, Busy) | (Busy, Idle) => true,
            (Idle, Paused) | (Busy, Paused) => true,
            (Paused, Idle) => true,
            (Error, Idle) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Created => "created",
            AgentStatus::Idle => "idle",
            AgentStatus::Busy => "busy",
            AgentStatus::Paused => "paused",
            AgentStatus::Error => "error",
            AgentStatus::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// A registered, addressable compute unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub type_id: String,
    pub name: String,
    /// Subset of the type's declared capability ids.
    pub capabilities: Vec<String>,
    pub status: AgentStatus,
    pub active_tasks: usize,
    pub capacity: usize,
    pub completed: u64,
    pub failed: u64,
    pub registered_at: DateTime<Utc>,
    /// Outcomes of the most recent dispatches, newest last.
    #[serde(skip)]
    pub(crate) recent: VecDeque<bool>,
}

impl Agent {
    /// Success rate over the rolling window; 1.0 with no samples.
    pub fn success_rate(&self) -> f64 {
        if self.recent.is_empty() {
            return 1.0;
        }
        let ok = self.recent.iter().filter(|s| **s).count();
        ok as f64 / self.recent.len() as f64
    }

    pub fn declares(&self, cap_id: &str) -> bool {
        self.capabilities.iter().any(|c| c == cap_id)
    }
}

/// Registration request for a live agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub id: String,
    pub type_id: String,
    pub name: String,
    /// Defaults to every capability the type declares.
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    1
}

impl AgentRegistration {
    pub fn new(
        id: impl Into<String>,
        type_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            type_id: type_id.into(),
            name: name.into(),
            capabilities: None,
            capacity: default_capacity(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

/// Point-in-time load view consumed by the load balancer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: String,
    pub status: AgentStatus,
    pub active: usize,
    pub capacity: usize,
    pub success_rate: f64,
    pub capabilities: Vec<String>,
}

impl From<&Agent> for AgentSnapshot {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id.clone(),
            status: agent.status,
            active: agent.active_tasks,
            capacity: agent.capacity,
            success_rate: agent.success_rate(),
            capabilities: agent.capabilities.clone(),
        }
    }
}

/// Filter for `list_agents`.
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub status: Option<AgentStatus>,
    pub type_id: Option<String>,
}

/// Filter for `list_agent_types`.
#[derive(Debug, Clone, Default)]
pub struct TypeFilter {
    pub category: Option<AgentCategory>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_status_machine() {
        use AgentStatus::*;
        assert!(Created.can_transition_to(Idle));
        assert!(Idle.can_transition_to(Busy));
        assert!(Busy.can_transition_to(Idle));
        assert!(Idle.can_transition_to(Paused));
        assert!(Busy.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Idle));
        assert!(Busy.can_transition_to(Error));
        assert!(Error.can_transition_to(Idle));
        assert!(Paused.can_transition_to(Stopped));

        assert!(!Created.can_transition_to(Busy));
        assert!(!Paused.can_transition_to(Busy));
        assert!(!Stopped.can_transition_to(Idle));
        assert!(!Error.can_transition_to(Error));
    }

    #[test]
    fn test_success_rate_window() {
        let mut agent = Agent {
            id: "a1".into(),
            type_id: "t".into(),
            name: "A1".into(),
            capabilities: vec![],
            status: AgentStatus::Idle,
            active_tasks: 0,
            capacity: 1,
            completed: 0,
            failed: 0,
            registered_at: Utc::now(),
            recent: VecDeque::new(),
        };
        assert!((agent.success_rate() - 1.0).abs() < f64::EPSILON);

        agent.recent.extend([true, false, true, true]);
        assert!((agent.success_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_type_capability_lookup() {
        let ty = AgentType::new(
            "research",
            "Research",
            AgentCategory::Research,
            vec![Capability::new("web_research", "Web Research")],
        );
        assert!(ty.has_capability("web_research"));
        assert!(!ty.has_capability("code_writing"));
    }
}
