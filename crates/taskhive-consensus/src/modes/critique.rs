use crate::executor::ModeContext;
use crate::session::{CollaborationMode, CollaborationResult, CollaborationSession};
use futures::future::join_all;
use serde_json::json;
use taskhive_core::{HiveError, HiveResult, TaskSpec};
use tracing::info;

#[derive(Debug, Clone)]
pub struct CritiqueConfig {
    pub max_iterations: u32,
    /// Approved when the lowest critic score reaches this value.
    pub approval_threshold: f64,
    pub parallel_review: bool,
}

impl Default for CritiqueConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            approval_threshold: 0.8,
            parallel_review: true,
        }
    }
}

impl CritiqueConfig {
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_approval_threshold(mut self, threshold: f64) -> Self {
        self.approval_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn sequential_review(mut self) -> Self {
        self.parallel_review = false;
        self
    }
}

/// One critic's scored review of a draft.
#[derive(Debug, Clone)]
struct Review {
    critic_id: String,
    score: f64,
    feedback: String,
}

impl Review {
    /// Accepts `{"score": .., "comment"|"feedback": ..}` or a bare number;
    /// anything else scores 0.0 with the raw value as feedback.
    fn from_output(critic_id: &str, output: &serde_json::Value) -> Self {
        let score = output
            .get("score")
            .and_then(|s| s.as_f64())
            .or_else(|| output.as_f64())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);
        let feedback = output
            .get("comment")
            .or_else(|| output.get("feedback"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| output.to_string());
        Self {
            critic_id: critic_id.to_string(),
            score,
            feedback,
        }
    }
}

/// Critique mode: one producer drafts, M critics score, the producer
/// revises until the lowest score clears the threshold or the iteration
/// cap is hit.
pub struct CritiqueMode {
    config: CritiqueConfig,
}

impl CritiqueMode {
    pub fn new(config: CritiqueConfig) -> Self {
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
            .map_err(|_| HiveError::Timeout(format!("critique session exceeded {timeout:?}")))?
    }

    async fn run_inner(
        &self,
        ctx: &ModeContext,
        task: &TaskSpec,
        participants: &[String],
    ) -> HiveResult<CollaborationResult> {
        // One producer plus at least one critic.
        ctx.validate_participants(participants, 2).await?;
        let producer = &participants[0];
        let critics = &participants[1..];

        let mut session = CollaborationSession::new(
            CollaborationMode::Critique,
            participants.to_vec(),
            ctx.bus.clone(),
        );
        session.emit_started(json!({
            "task": task.id,
            "producer": producer,
            "critics": critics.len(),
        }));

        let mut draft = serde_json::Value::Null;
        let mut approved = false;
        let mut min_score = 0.0;
        let mut iterations = 0u32;
        let mut last_feedback: Vec<String> = Vec::new();

        for iteration in 1..=self.config.max_iterations {
            iterations = iteration;
            session.round = iteration;

            let description = if iteration == 1 {
                format!("Produce a draft for the task: {}", task.description)
            } else {
                format!(
                    "Revise your draft to address the critiques.\nTask: {}\n\n\
                     Current draft:\n{}\n\nCritiques:\n- {}",
                    task.description,
                    draft,
                    last_feedback.join("\n- ")
                )
            };
            let spec = TaskSpec::new(
                session.subtask_id(&format!("draft-i{iteration}-{producer}")),
                description,
            )
            .with_agent(producer.clone())
            .with_priority(task.priority);
            draft = ctx.executor.execute(spec).await?;
            session.record(producer.clone(), iteration, "draft", draft.clone());

            let reviews = self.collect_reviews(ctx, &session, task, critics, &draft, iteration).await?;
            for review in &reviews {
                session.record(
                    review.critic_id.clone(),
                    iteration,
                    "review",
                    json!({ "score": review.score, "feedback": review.feedback }),
                );
            }

            min_score = reviews.iter().map(|r| r.score).fold(f64::INFINITY, f64::min);
            last_feedback = reviews.iter().map(|r| r.feedback.clone()).collect();
            approved = min_score >= self.config.approval_threshold;

            session.emit_round(iteration, json!({ "min_score": min_score, "approved": approved }));
            if approved {
                break;
            }
        }

        info!(
            session = %session.id,
            iterations = iterations,
            approved = approved,
            "Critique loop finished"
        );
        session.emit_completed(json!({ "approved": approved, "iterations": iterations }));

        let output = json!({
            "draft": draft,
            "approved": approved,
            "iterations": iterations,
        });
        Ok(session.into_result(output, min_score.clamp(0.0, 1.0)))
    }

    async fn collect_reviews(
        &self,
        ctx: &ModeContext,
        session: &CollaborationSession,
        task: &TaskSpec,
        critics: &[String],
        draft: &serde_json::Value,
        iteration: u32,
    ) -> HiveResult<Vec<Review>> {
        let specs: Vec<(String, TaskSpec)> = critics
            .iter()
            .map(|critic| {
                let description = format!(
                    "Score this draft between 0 and 1 and comment.\n\
                     Reply as {{\"score\", \"comment\"}}.\nTask: {}\n\nDraft:\n{}",
                    task.description, draft
                );
                let spec = TaskSpec::new(
                    session.subtask_id(&format!("review-i{iteration}-{critic}")),
                    description,
                )
                .with_agent(critic.clone())
                .with_priority(task.priority);
                (critic.clone(), spec)
            })
            .collect();

        let mut reviews = Vec::with_capacity(critics.len());
        if self.config.parallel_review {
            let outputs = join_all(
                specs
                    .iter()
                    .map(|(_, spec)| ctx.executor.execute(spec.clone())),
            )
            .await;
            for ((critic, _), output) in specs.iter().zip(outputs) {
                reviews.push(Review::from_output(critic, &output?));
            }
        } else {
            for (critic, spec) in specs {
                let output = ctx.executor.execute(spec).await?;
                reviews.push(Review::from_output(&critic, &output));
            }
        }
        Ok(reviews)
    }
}
