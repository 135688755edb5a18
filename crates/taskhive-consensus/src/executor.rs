use async_trait::async_trait;
use std::sync::Arc;
use taskhive_bus::Bus;
use taskhive_core::{HiveError, HiveResult, SessionConfig, TaskSpec};
use taskhive_registry::AgentRegistry;

/// The seam between collaboration modes and the scheduler.
///
/// A mode never talks to agents directly: it hands single subtask specs to
/// an executor and gets the terminal result back. The orchestrator
/// implements this by submitting to its own queue; tests implement it with
/// scripted outputs.
#[async_trait]
pub trait SubtaskExecutor: Send + Sync {
    /// Run one subtask to its terminal status. Returns the result payload
    /// on completion, or the task's failure mapped onto the error taxonomy.
    async fn execute(&self, spec: TaskSpec) -> HiveResult<serde_json::Value>;
}

/// Everything a collaboration mode needs from its environment.
#[derive(Clone)]
pub struct ModeContext {
    pub executor: Arc<dyn SubtaskExecutor>,
    pub bus: Bus,
    pub registry: Arc<AgentRegistry>,
    pub session: SessionConfig,
}

impl ModeContext {
    pub fn new(
        executor: Arc<dyn SubtaskExecutor>,
        bus: Bus,
        registry: Arc<AgentRegistry>,
        session: SessionConfig,
    ) -> Self {
        Self {
            executor,
            bus,
            registry,
            session,
        }
    }

    /// Check the participant roster against the registry before a session
    /// starts: enough members, all known, none paused or stopped.
    pub async fn validate_participants(
        &self,
        participants: &[String],
        min: usize,
    ) -> HiveResult<()> {
        if participants.len() < min {
            return Err(HiveError::Validation(format!(
                "mode requires at least {min} participants, got {}",
                participants.len()
            )));
        }
        for id in participants {
            let agent = self.registry.get_agent(id).await?;
            if !agent.status.is_dispatchable() {
                return Err(HiveError::State(format!(
                    "participant '{id}' is {}",
                    agent.status
                )));
            }
        }
        Ok(())
    }
}
