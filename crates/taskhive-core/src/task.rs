use crate::config::BalanceStrategy;
use crate::error::TaskFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Status of a task in the orchestration queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Dependencies satisfied, waiting for a worker.
    Queued,
    /// At least one dependency is not yet completed.
    Waiting,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Valid edges of the task state machine. A task enters `Running` at
    /// most once and never leaves a terminal state.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Waiting, Queued) => true,
            (Waiting, Cancelled) | (Queued, Cancelled) | (Running, Cancelled) => true,
            (Queued, Running) => true,
            (Running, Completed) | (Running, Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Waiting => "waiting",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Submission form for a task. The id is caller-supplied and must be unique
/// for the orchestrator's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub priority: i32,
    /// Route by capability when no explicit agent is pinned.
    #[serde(default)]
    pub capability: Option<String>,
    /// Pin the task to a specific agent.
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Per-task dispatch timeout override.
    #[serde(default)]
    pub timeout: Option<Duration>,
    /// Per-task balancer strategy override.
    #[serde(default)]
    pub balance: Option<BalanceStrategy>,
}

impl TaskSpec {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            priority: 0,
            capability: None,
            agent_id: None,
            dependencies: Vec::new(),
            timeout: None,
            balance: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_balance(mut self, strategy: BalanceStrategy) -> Self {
        self.balance = Some(strategy);
        self
    }
}

/// A task owned by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub priority: i32,
    pub capability: Option<String>,
    /// Explicit target requested at submission, if any.
    pub agent_id: Option<String>,
    pub dependencies: Vec<String>,
    pub status: TaskStatus,
    /// Set exactly when the task enters `Running`, never rewritten.
    pub assigned_agent: Option<String>,
    pub result: Option<serde_json::Value>,
    pub failure: Option<TaskFailure>,
    pub timeout: Option<Duration>,
    pub balance: Option<BalanceStrategy>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn from_spec(spec: TaskSpec) -> Self {
        let status = if spec.dependencies.is_empty() {
            TaskStatus::Queued
        } else {
            TaskStatus::Waiting
        };
        Self {
            id: spec.id,
            description: spec.description,
            priority: spec.priority,
            capability: spec.capability,
            agent_id: spec.agent_id,
            dependencies: spec.dependencies,
            status,
            assigned_agent: None,
            result: None,
            failure: None,
            timeout: spec.timeout,
            balance: spec.balance,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}
