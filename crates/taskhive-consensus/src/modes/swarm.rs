use crate::executor::ModeContext;
use crate::session::{CollaborationMode, CollaborationResult, CollaborationSession};
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use taskhive_core::{topics, HiveError, HiveResult, TaskSpec};
use taskhive_decomposer::{DecomposeHints, Decomposer};
use tracing::{info, warn};

/// How swarm members observe each other's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coordination {
    /// A reserved bus topic the coordinator writes and anyone may read.
    Blackboard,
    /// Direct messages to each participant's session topic.
    MessagePassing,
}

#[derive(Debug, Clone)]
pub struct SwarmConfig {
    pub coordination: Coordination,
    /// Convergence cap: plans larger than this are rejected outright.
    pub max_subtasks: usize,
    /// Capability the aggregation subtask is routed by.
    pub aggregator_capability: String,
    /// Pin the aggregation subtask to a specific agent.
    pub aggregator: Option<String>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            coordination: Coordination::Blackboard,
            max_subtasks: 25,
            aggregator_capability: "data_synthesis".to_string(),
            aggregator: None,
        }
    }
}

impl SwarmConfig {
    pub fn with_coordination(mut self, coordination: Coordination) -> Self {
        self.coordination = coordination;
        self
    }

    pub fn with_max_subtasks(mut self, max: usize) -> Self {
        self.max_subtasks = max.max(1);
        self
    }

    pub fn with_aggregator(mut self, agent_id: impl Into<String>) -> Self {
        self.aggregator = Some(agent_id.into());
        self
    }
}

/// Swarm mode: the decomposer turns the task into a DAG, the orchestrator
/// runs it, progress is coordinated over the bus, and a final aggregator
/// subtask produces the output.
pub struct SwarmMode {
    config: SwarmConfig,
    decomposer: Arc<Decomposer>,
}

impl SwarmMode {
    pub fn new(config: SwarmConfig, decomposer: Arc<Decomposer>) -> Self {
        Self { config, decomposer }
    }

    pub async fn run(
        &self,
        ctx: &ModeContext,
        task: &TaskSpec,
        participants: &[String],
    ) -> HiveResult<CollaborationResult> {
        let timeout = ctx.session.timeout;
        tokio::time::timeout(timeout, self.run_inner(ctx, task, participants))
            .await
            .map_err(|_| HiveError::Timeout(format!("swarm session exceeded {timeout:?}")))?
    }

    async fn run_inner(
        &self,
        ctx: &ModeContext,
        task: &TaskSpec,
        participants: &[String],
    ) -> HiveResult<CollaborationResult> {
        ctx.validate_participants(participants, 1).await?;

        let hints = DecomposeHints {
            capability: task.capability.clone(),
            priority: task.priority,
        };
        let plan = self
            .decomposer
            .decompose(&task.id, &task.description, Some(&hints))?;
        // +1 accounts for the aggregation subtask.
        if plan.subtasks.len() + 1 > self.config.max_subtasks {
            return Err(HiveError::Validation(format!(
                "swarm plan needs {} subtasks, cap is {}",
                plan.subtasks.len() + 1,
                self.config.max_subtasks
            )));
        }

        let mut session = CollaborationSession::new(
            CollaborationMode::Swarm,
            participants.to_vec(),
            ctx.bus.clone(),
        );
        session.emit_started(json!({
            "task": task.id,
            "subtasks": plan.subtasks.len(),
        }));

        // The whole DAG is submitted up front; the orchestrator resolves
        // the dependency ordering.
        let specs: Vec<(String, TaskSpec)> = plan
            .subtasks
            .iter()
            .map(|subtask| {
                let spec = TaskSpec {
                    id: session.subtask_id(&subtask.local_id),
                    description: subtask.description.clone(),
                    priority: subtask.priority,
                    capability: subtask.capability.clone(),
                    agent_id: None,
                    dependencies: subtask
                        .depends_on
                        .iter()
                        .map(|dep| session.subtask_id(dep))
                        .collect(),
                    timeout: task.timeout,
                    balance: None,
                };
                (subtask.local_id.clone(), spec)
            })
            .collect();

        let results = join_all(
            specs
                .iter()
                .map(|(_, spec)| ctx.executor.execute(spec.clone())),
        )
        .await;

        let mut completed: Vec<(String, serde_json::Value)> = Vec::new();
        for (round, ((local_id, _), result)) in specs.iter().zip(results).enumerate() {
            let round = round as u32 + 1;
            match result {
                Ok(output) => {
                    self.announce(&session, local_id, &output);
                    session.record(local_id.clone(), round, "subtask", output.clone());
                    session.emit_round(round, json!({ "subtask": local_id }));
                    completed.push((local_id.clone(), output));
                }
                Err(err) => {
                    warn!(session = %session.id, subtask = %local_id, error = %err, "Swarm subtask failed");
                    session.record(
                        local_id.clone(),
                        round,
                        "subtask",
                        json!({ "error": err.to_string() }),
                    );
                }
            }
        }

        let completion_rate = completed.len() as f64 / plan.subtasks.len().max(1) as f64;
        let results_json: Vec<serde_json::Value> = completed
            .iter()
            .map(|(id, output)| json!({ "subtask": id, "result": output }))
            .collect();

        let aggregate_spec = {
            let description = format!(
                "Aggregate the swarm's subtask results into a final answer.\nTask: {}\n\n\
                 Results:\n{}",
                task.description,
                serde_json::to_string_pretty(&results_json)?
            );
            let spec = TaskSpec::new(session.subtask_id("aggregate"), description)
                .with_capability(self.config.aggregator_capability.clone())
                .with_priority(task.priority);
            match &self.config.aggregator {
                Some(agent) => spec.with_agent(agent.clone()),
                None => spec,
            }
        };
        let output = ctx.executor.execute(aggregate_spec).await?;
        session.record(
            self.config
                .aggregator
                .clone()
                .unwrap_or_else(|| "aggregator".to_string()),
            plan.subtasks.len() as u32 + 1,
            "aggregate",
            output.clone(),
        );

        info!(
            session = %session.id,
            completion_rate = completion_rate,
            "Swarm converged"
        );
        session.emit_completed(json!({
            "completion_rate": completion_rate,
            "output": output,
        }));
        Ok(session.into_result(output, completion_rate))
    }

    /// Post a completed subtask where the configured coordination says the
    /// swarm looks for progress.
    fn announce(&self, session: &CollaborationSession, subtask: &str, output: &serde_json::Value) {
        let payload = json!({ "subtask": subtask, "result": output });
        let sender = format!("session.{}", session.short_id());
        match self.config.coordination {
            Coordination::Blackboard => {
                let _ = session_publish(session, &sender, &topics::swarm_blackboard(session.id), payload);
            }
            Coordination::MessagePassing => {
                for participant in &session.participants {
                    let _ = session_publish(
                        session,
                        &sender,
                        &topics::swarm_direct(session.id, participant),
                        payload.clone(),
                    );
                }
            }
        }
    }
}

fn session_publish(
    session: &CollaborationSession,
    sender: &str,
    topic: &str,
    payload: serde_json::Value,
) -> HiveResult<uuid::Uuid> {
    session.bus().publish(sender, topic, payload)
}
