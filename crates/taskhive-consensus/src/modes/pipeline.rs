use crate::executor::ModeContext;
use crate::session::{CollaborationMode, CollaborationResult, CollaborationSession};
use serde_json::json;
use taskhive_core::{HiveError, HiveResult, TaskSpec};
use tracing::{info, warn};

/// Shape of the data handed from one stage to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffFormat {
    /// Typed JSON payload embedding the task and the previous output.
    Structured,
    /// Free-text prompt carrying the previous output verbatim.
    Natural,
}

/// What to do when a stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Abort,
    /// Re-run the previous stage once with its original input, then retry
    /// the failed stage with the fresh output.
    BacktrackOne,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Required capability per stage, parallel to the participant list.
    /// Missing entries leave the stage routed by its pinned agent alone.
    pub capabilities: Vec<String>,
    pub handoff: HandoffFormat,
    pub on_failure: FailurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capabilities: Vec::new(),
            handoff: HandoffFormat::Structured,
            on_failure: FailurePolicy::Abort,
        }
    }
}

impl PipelineConfig {
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_handoff(mut self, handoff: HandoffFormat) -> Self {
        self.handoff = handoff;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }
}

/// Pipeline mode: ordered specialist stages, each receiving the previous
/// stage's output together with the original task.
pub struct PipelineMode {
    config: PipelineConfig,
}

impl PipelineMode {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
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
            .map_err(|_| HiveError::Timeout(format!("pipeline session exceeded {timeout:?}")))?
    }

    async fn run_inner(
        &self,
        ctx: &ModeContext,
        task: &TaskSpec,
        participants: &[String],
    ) -> HiveResult<CollaborationResult> {
        ctx.validate_participants(participants, 2).await?;

        let mut session = CollaborationSession::new(
            CollaborationMode::Pipeline,
            participants.to_vec(),
            ctx.bus.clone(),
        );
        session.emit_started(json!({
            "task": task.id,
            "stages": participants.len(),
        }));

        let mut outputs: Vec<serde_json::Value> = Vec::with_capacity(participants.len());
        let mut stage = 0usize;
        let mut backtracked = false;
        // Distinguishes re-runs of a stage so every subtask id is unique.
        let mut attempt = 0u32;

        while stage < participants.len() {
            attempt += 1;
            let previous = if stage == 0 { None } else { outputs.get(stage - 1) };
            match self
                .run_stage(ctx, &session, task, participants, stage, previous, attempt)
                .await
            {
                Ok(output) => {
                    session.record(
                        participants[stage].clone(),
                        stage as u32 + 1,
                        "stage",
                        output.clone(),
                    );
                    session.emit_round(stage as u32 + 1, json!({ "agent": participants[stage] }));
                    outputs.push(output);
                    stage += 1;
                    backtracked = false;
                }
                Err(err) if self.config.on_failure == FailurePolicy::BacktrackOne
                    && stage > 0
                    && !backtracked =>
                {
                    warn!(
                        session = %session.id,
                        stage = stage + 1,
                        error = %err,
                        "Stage failed, backtracking one stage"
                    );
                    backtracked = true;
                    attempt += 1;
                    let before_previous = if stage == 1 { None } else { outputs.get(stage - 2) };
                    let redo = self
                        .run_stage(
                            ctx,
                            &session,
                            task,
                            participants,
                            stage - 1,
                            before_previous,
                            attempt,
                        )
                        .await?;
                    session.record(
                        participants[stage - 1].clone(),
                        stage as u32,
                        "stage",
                        redo.clone(),
                    );
                    outputs[stage - 1] = redo;
                }
                Err(err) => return Err(err),
            }
        }

        let output = outputs.last().cloned().unwrap_or(serde_json::Value::Null);
        info!(session = %session.id, stages = participants.len(), "Pipeline completed");
        session.emit_completed(json!({ "output": output }));
        Ok(session.into_result(output, 1.0))
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_stage(
        &self,
        ctx: &ModeContext,
        session: &CollaborationSession,
        task: &TaskSpec,
        participants: &[String],
        stage: usize,
        previous: Option<&serde_json::Value>,
        attempt: u32,
    ) -> HiveResult<serde_json::Value> {
        let agent = &participants[stage];
        let description = match (self.config.handoff, previous) {
            (HandoffFormat::Structured, previous) => json!({
                "task": task.description,
                "stage": stage + 1,
                "input": previous.cloned().unwrap_or(serde_json::Value::Null),
            })
            .to_string(),
            (HandoffFormat::Natural, None) => task.description.clone(),
            (HandoffFormat::Natural, Some(previous)) => format!(
                "{}\n\nOutput of the previous stage:\n{}",
                task.description,
                value_as_text(previous)
            ),
        };

        let spec = TaskSpec::new(
            session.subtask_id(&format!("s{}-a{attempt}-{agent}", stage + 1)),
            description,
        )
        .with_agent(agent.clone())
        .with_priority(task.priority);
        let spec = match self.config.capabilities.get(stage) {
            Some(capability) => spec.with_capability(capability.clone()),
            None => spec,
        };
        ctx.executor.execute(spec).await
    }
}

fn value_as_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
