use crate::decision::Decision;
use crate::executor::ModeContext;
use crate::session::{CollaborationMode, CollaborationResult, CollaborationSession};
use crate::vote::{AgentOpinion, ConsensusEngine, VoteStrategy};
use futures::future::join_all;
use serde_json::json;
use taskhive_core::{HiveError, HiveResult, TaskSpec};
use tracing::info;

/// How the ensemble's outputs become one output.
#[derive(Debug, Clone)]
pub enum MergeStrategy {
    /// Majority over outputs treated as discrete decisions.
    Vote,
    /// Numeric averaging; falls back to `Vote` when nothing is numeric.
    Average,
    /// A nominated synthesizer agent merges all outputs.
    Synthesis { agent: String },
}

#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    pub merge: MergeStrategy,
    pub parallel: bool,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            merge: MergeStrategy::Vote,
            parallel: true,
        }
    }
}

impl EnsembleConfig {
    pub fn with_merge(mut self, merge: MergeStrategy) -> Self {
        self.merge = merge;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

/// Ensemble mode: K participants run the same task and their outputs are
/// merged. Confidence is the agreement score: the fraction of participants
/// whose output equals the chosen one.
pub struct EnsembleMode {
    config: EnsembleConfig,
}

impl EnsembleMode {
    pub fn new(config: EnsembleConfig) -> Self {
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
            .map_err(|_| HiveError::Timeout(format!("ensemble session exceeded {timeout:?}")))?
    }

    async fn run_inner(
        &self,
        ctx: &ModeContext,
        task: &TaskSpec,
        participants: &[String],
    ) -> HiveResult<CollaborationResult> {
        ctx.validate_participants(participants, 2).await?;

        let mut session = CollaborationSession::new(
            CollaborationMode::Ensemble,
            participants.to_vec(),
            ctx.bus.clone(),
        );
        session.emit_started(json!({
            "task": task.id,
            "parallel": self.config.parallel,
        }));
        session.round = 1;

        let specs: Vec<TaskSpec> = participants
            .iter()
            .map(|participant| {
                TaskSpec::new(session.subtask_id(&format!("run-{participant}")), &task.description)
                    .with_agent(participant.clone())
                    .with_priority(task.priority)
            })
            .collect();

        let mut outputs = Vec::with_capacity(participants.len());
        if self.config.parallel {
            for result in join_all(specs.into_iter().map(|s| ctx.executor.execute(s))).await {
                outputs.push(result?);
            }
        } else {
            for spec in specs {
                outputs.push(ctx.executor.execute(spec).await?);
            }
        }
        for (participant, output) in participants.iter().zip(&outputs) {
            session.record(participant.clone(), 1, "output", output.clone());
        }
        session.emit_round(1, json!({ "outputs": outputs.len() }));

        let merged = self.merge(ctx, &mut session, task, participants, &outputs).await?;
        let agreement = agreement_score(&outputs, &merged);

        info!(
            session = %session.id,
            agreement = agreement,
            "Ensemble merged"
        );
        session.emit_completed(json!({ "output": merged, "agreement": agreement }));
        Ok(session.into_result(merged, agreement))
    }

    async fn merge(
        &self,
        ctx: &ModeContext,
        session: &mut CollaborationSession,
        task: &TaskSpec,
        participants: &[String],
        outputs: &[serde_json::Value],
    ) -> HiveResult<serde_json::Value> {
        match &self.config.merge {
            MergeStrategy::Vote => merge_by_vote(participants, outputs),
            MergeStrategy::Average => {
                let numeric: Vec<f64> = outputs.iter().filter_map(|v| v.as_f64()).collect();
                if numeric.is_empty() {
                    merge_by_vote(participants, outputs)
                } else {
                    Ok(json!(numeric.iter().sum::<f64>() / numeric.len() as f64))
                }
            }
            MergeStrategy::Synthesis { agent } => {
                let description = format!(
                    "Synthesize a single answer from the candidate outputs.\nTask: {}\n\n\
                     Candidates:\n{}",
                    task.description,
                    serde_json::to_string_pretty(outputs)?
                );
                let spec = TaskSpec::new(session.subtask_id(&format!("synthesize-{agent}")), description)
                    .with_agent(agent.clone())
                    .with_priority(task.priority);
                let synthesized = ctx.executor.execute(spec).await?;
                session.record(agent.clone(), 2, "synthesis", synthesized.clone());
                Ok(synthesized)
            }
        }
    }
}

fn merge_by_vote(
    participants: &[String],
    outputs: &[serde_json::Value],
) -> HiveResult<serde_json::Value> {
    let opinions: Vec<AgentOpinion> = participants
        .iter()
        .zip(outputs)
        .map(|(p, o)| AgentOpinion::from_output(p, o))
        .collect();
    let result = ConsensusEngine::default().vote(&opinions, Some(VoteStrategy::Majority))?;
    Ok(result.decision.to_value())
}

fn agreement_score(outputs: &[serde_json::Value], chosen: &serde_json::Value) -> f64 {
    if outputs.is_empty() {
        return 0.0;
    }
    let chosen = Decision::from_value(chosen);
    let matching = outputs
        .iter()
        .filter(|o| Decision::from_value(o) == chosen)
        .count();
    matching as f64 / outputs.len() as f64
}
