use crate::executor::ModeContext;
use crate::session::{CollaborationMode, CollaborationResult, CollaborationSession};
use crate::vote::{AgentOpinion, ConsensusEngine, VoteStrategy};
use futures::future::join_all;
use serde_json::json;
use taskhive_core::{HiveError, HiveResult, TaskSpec};
use tracing::info;

/// Who decides the debate.
#[derive(Debug, Clone)]
pub enum Judge {
    /// A designated judge agent.
    Agent(String),
    /// A vote over a jury of agents.
    Jury {
        agents: Vec<String>,
        strategy: VoteStrategy,
    },
}

#[derive(Debug, Clone)]
pub struct DebateConfig {
    pub rounds: u32,
    pub judge: Judge,
}

impl DebateConfig {
    pub fn new(judge: Judge) -> Self {
        Self { rounds: 3, judge }
    }

    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = rounds.max(1);
        self
    }
}

/// Debate mode: K participants argue over R rounds, then a judge (agent or
/// jury vote) selects the winner.
pub struct DebateMode {
    config: DebateConfig,
}

impl DebateMode {
    pub fn new(config: DebateConfig) -> Self {
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
            .map_err(|_| HiveError::Timeout(format!("debate session exceeded {timeout:?}")))?
    }

    async fn run_inner(
        &self,
        ctx: &ModeContext,
        task: &TaskSpec,
        participants: &[String],
    ) -> HiveResult<CollaborationResult> {
        ctx.validate_participants(participants, 2).await?;

        let mut session =
            CollaborationSession::new(CollaborationMode::Debate, participants.to_vec(), ctx.bus.clone());
        session.emit_started(json!({
            "task": task.id,
            "rounds": self.config.rounds,
        }));

        for round in 1..=self.config.rounds {
            session.round = round;
            let transcript = session.transcript_text();

            let mut pending = Vec::with_capacity(participants.len());
            for participant in participants {
                let description = if round == 1 {
                    format!(
                        "Present your opening argument on the task.\nTask: {}",
                        task.description
                    )
                } else {
                    format!(
                        "Present your rebuttal for round {round}.\nTask: {}\n\n\
                         === ARGUMENTS SO FAR ===\n{transcript}\n=== END ARGUMENTS ===",
                        task.description
                    )
                };
                let spec = TaskSpec::new(
                    session.subtask_id(&format!("r{round}-{participant}")),
                    description,
                )
                .with_agent(participant.clone())
                .with_priority(task.priority);
                pending.push(ctx.executor.execute(spec));
            }

            let arguments = join_all(pending).await;
            for (participant, argument) in participants.iter().zip(arguments) {
                session.record(participant.clone(), round, "argument", argument?);
            }
            session.emit_round(round, json!({ "arguments": participants.len() }));
        }

        let verdict_round = self.config.rounds + 1;
        let (winner, confidence) = match &self.config.judge {
            Judge::Agent(judge_id) => {
                let output = self
                    .judge_once(ctx, &session, task, judge_id, verdict_round)
                    .await?;
                let opinion = AgentOpinion::from_output(judge_id, &output);
                session.record(judge_id.clone(), verdict_round, "verdict", output);
                (opinion.decision, opinion.confidence)
            }
            Judge::Jury { agents, strategy } => {
                let mut opinions = Vec::with_capacity(agents.len());
                for juror in agents {
                    let output = self
                        .judge_once(ctx, &session, task, juror, verdict_round)
                        .await?;
                    opinions.push(AgentOpinion::from_output(juror, &output));
                    session.record(juror.clone(), verdict_round, "verdict", output);
                }
                let result = ConsensusEngine::default().vote(&opinions, Some(*strategy))?;
                (result.decision, result.confidence)
            }
        };

        info!(session = %session.id, winner = %winner, "Debate decided");
        session.emit_completed(json!({ "winner": winner.to_value() }));
        let output = winner.to_value();
        Ok(session.into_result(output, confidence))
    }

    async fn judge_once(
        &self,
        ctx: &ModeContext,
        session: &CollaborationSession,
        task: &TaskSpec,
        judge_id: &str,
        round: u32,
    ) -> HiveResult<serde_json::Value> {
        let description = format!(
            "Judge the debate and return {{\"decision\", \"confidence\", \"reasoning\"}}.\n\
             Task: {}\n\n=== FULL TRANSCRIPT ===\n{}\n=== END TRANSCRIPT ===",
            task.description,
            session.transcript_text()
        );
        let spec = TaskSpec::new(session.subtask_id(&format!("judge-r{round}-{judge_id}")), description)
            .with_agent(judge_id.to_string())
            .with_priority(task.priority);
        ctx.executor.execute(spec).await
    }
}
