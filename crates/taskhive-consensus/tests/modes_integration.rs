//! Collaboration mode tests against a scripted executor.
//!
//! The executor replays canned outputs per agent (or per capability for
//! unpinned subtasks), so each protocol's round structure, transcript
//! shape, and failure handling can be checked without a live scheduler.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskhive_bus::Bus;
use taskhive_consensus::*;
use taskhive_core::{BusConfig, HiveError, HiveResult, SessionConfig, TaskSpec};
use taskhive_decomposer::Decomposer;
use taskhive_registry::{AgentCategory, AgentRegistration, AgentRegistry, AgentType, Capability};

/// Replays canned outputs. Keyed by the spec's pinned agent, falling back
/// to its capability. An output of `{"__error__": msg}` becomes an
/// `AgentError`.
struct ScriptedExecutor {
    replies: Mutex<HashMap<String, Vec<Value>>>,
    calls: Mutex<HashMap<String, usize>>,
    executed: Mutex<Vec<TaskSpec>>,
    delay: Option<Duration>,
}

impl ScriptedExecutor {
    fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            executed: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn script(&self, key: &str, outputs: Vec<Value>) {
        self.replies.lock().unwrap().insert(key.to_string(), outputs);
    }

    fn executed_specs(&self) -> Vec<TaskSpec> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubtaskExecutor for ScriptedExecutor {
    async fn execute(&self, spec: TaskSpec) -> HiveResult<Value> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.executed.lock().unwrap().push(spec.clone());

        let key = spec
            .agent_id
            .clone()
            .or_else(|| spec.capability.clone())
            .unwrap_or_else(|| "default".to_string());

        let output = {
            let replies = self.replies.lock().unwrap();
            let outputs = replies
                .get(&key)
                .unwrap_or_else(|| panic!("no script for '{key}'"));
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(key.clone()).or_insert(0);
            let output = outputs[(*n).min(outputs.len() - 1)].clone();
            *n += 1;
            output
        };

        if let Some(message) = output.get("__error__").and_then(|m| m.as_str()) {
            return Err(HiveError::Agent(message.to_string()));
        }
        Ok(output)
    }
}

async fn context_with_agents(agents: &[&str]) -> (ModeContext, Arc<ScriptedExecutor>) {
    let registry = Arc::new(AgentRegistry::new(20));
    registry
        .register_type(AgentType::new(
            "panel",
            "Panel Agent",
            AgentCategory::Custom,
            vec![Capability::new("deliberate", "Deliberate")],
        ))
        .await
        .unwrap();
    for agent in agents {
        registry
            .register_agent(AgentRegistration::new(*agent, "panel", *agent))
            .await
            .unwrap();
    }

    let executor = Arc::new(ScriptedExecutor::new());
    let ctx = ModeContext::new(
        executor.clone(),
        Bus::new(BusConfig::default()),
        registry,
        SessionConfig {
            timeout: Duration::from_secs(5),
            ..SessionConfig::default()
        },
    );
    (ctx, executor)
}

// ---------------------------------------------------------------------------
// Debate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_debate_three_rounds_jury_of_three() {
    let (ctx, executor) = context_with_agents(&["p1", "p2", "j1", "j2", "j3"]).await;
    executor.script("p1", vec![json!("argument from p1")]);
    executor.script("p2", vec![json!("argument from p2")]);
    for juror in ["j1", "j2"] {
        executor.script(
            juror,
            vec![json!({"decision": "p1", "confidence": 0.8, "reasoning": "stronger case"})],
        );
    }
    executor.script("j3", vec![json!({"decision": "p2", "confidence": 0.9})]);

    let mode = DebateMode::new(
        DebateConfig::new(Judge::Jury {
            agents: vec!["j1".into(), "j2".into(), "j3".into()],
            strategy: VoteStrategy::Majority,
        })
        .with_rounds(3),
    );
    let task = TaskSpec::new("t-debate", "Should we adopt the new protocol?");
    let result = mode
        .run(&ctx, &task, &["p1".to_string(), "p2".to_string()])
        .await
        .unwrap();

    // 2 participants x 3 rounds of arguments, plus 3 jury verdicts.
    assert_eq!(result.transcript.len(), 2 * 3 + 3);
    assert_eq!(
        result
            .transcript
            .iter()
            .filter(|e| e.kind == "argument")
            .count(),
        6
    );
    assert_eq!(result.output, json!("p1"));
    assert_eq!(result.mode, CollaborationMode::Debate);
    assert_eq!(result.participants, vec!["p1", "p2"]);
}

#[tokio::test]
async fn test_debate_rebuttals_see_prior_arguments() {
    let (ctx, executor) = context_with_agents(&["p1", "p2", "judge"]).await;
    executor.script("p1", vec![json!("opening-p1"), json!("rebuttal-p1")]);
    executor.script("p2", vec![json!("opening-p2"), json!("rebuttal-p2")]);
    executor.script("judge", vec![json!({"decision": "opening-p1", "confidence": 0.7})]);

    let mode = DebateMode::new(
        DebateConfig::new(Judge::Agent("judge".into())).with_rounds(2),
    );
    let task = TaskSpec::new("t-debate-2", "pick a side");
    let result = mode
        .run(&ctx, &task, &["p1".to_string(), "p2".to_string()])
        .await
        .unwrap();

    // Round 2 prompts carry round 1 arguments.
    let specs = executor.executed_specs();
    let round2 = specs
        .iter()
        .find(|s| s.id.contains("r2-p1"))
        .expect("round 2 spec for p1");
    assert!(round2.description.contains("opening-p1"));
    assert!(round2.description.contains("opening-p2"));

    // Confidence comes from the judge.
    assert!((result.confidence - 0.7).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_debate_requires_two_participants() {
    let (ctx, _) = context_with_agents(&["p1"]).await;
    let mode = DebateMode::new(DebateConfig::new(Judge::Agent("p1".into())));
    let err = mode
        .run(&ctx, &TaskSpec::new("t", "x"), &["p1".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, HiveError::Validation(_)));
}

// ---------------------------------------------------------------------------
// Ensemble
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_ensemble_vote_merge_and_agreement() {
    let (ctx, executor) = context_with_agents(&["e1", "e2", "e3"]).await;
    executor.script("e1", vec![json!("blue")]);
    executor.script("e2", vec![json!("blue")]);
    executor.script("e3", vec![json!("green")]);

    let mode = EnsembleMode::new(EnsembleConfig::default());
    let task = TaskSpec::new("t-ensemble", "pick a color");
    let result = mode
        .run(
            &ctx,
            &task,
            &["e1".to_string(), "e2".to_string(), "e3".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(result.output, json!("blue"));
    assert!((result.confidence - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(
        result
            .transcript
            .iter()
            .filter(|e| e.kind == "output")
            .count(),
        3
    );
}

#[tokio::test]
async fn test_ensemble_average_merge() {
    let (ctx, executor) = context_with_agents(&["e1", "e2"]).await;
    executor.script("e1", vec![json!(4.0)]);
    executor.script("e2", vec![json!(6)]);

    let mode = EnsembleMode::new(EnsembleConfig::default().with_merge(MergeStrategy::Average));
    let result = mode
        .run(
            &ctx,
            &TaskSpec::new("t-avg", "estimate"),
            &["e1".to_string(), "e2".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(result.output, json!(5.0));
}

#[tokio::test]
async fn test_ensemble_synthesis_merge() {
    let (ctx, executor) = context_with_agents(&["e1", "e2", "synth"]).await;
    executor.script("e1", vec![json!("draft A")]);
    executor.script("e2", vec![json!("draft B")]);
    executor.script("synth", vec![json!("merged draft")]);

    let mode = EnsembleMode::new(EnsembleConfig::default().with_merge(MergeStrategy::Synthesis {
        agent: "synth".into(),
    }));
    let result = mode
        .run(
            &ctx,
            &TaskSpec::new("t-synth", "write intro"),
            &["e1".to_string(), "e2".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(result.output, json!("merged draft"));
    // The synthesizer saw both candidate outputs.
    let specs = executor.executed_specs();
    let synth_spec = specs.iter().find(|s| s.agent_id.as_deref() == Some("synth")).unwrap();
    assert!(synth_spec.description.contains("draft A"));
    assert!(synth_spec.description.contains("draft B"));
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_pipeline_structured_handoff() {
    let (ctx, executor) = context_with_agents(&["s1", "s2"]).await;
    executor.script("s1", vec![json!({"outline": "three sections"})]);
    executor.script("s2", vec![json!("final document")]);

    let mode = PipelineMode::new(PipelineConfig::default());
    let result = mode
        .run(
            &ctx,
            &TaskSpec::new("t-pipe", "write the document"),
            &["s1".to_string(), "s2".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(result.output, json!("final document"));

    let specs = executor.executed_specs();
    // Stage 1 input is null; stage 2 embeds stage 1's output.
    let stage1: Value = serde_json::from_str(&specs[0].description).unwrap();
    assert_eq!(stage1["input"], Value::Null);
    let stage2: Value = serde_json::from_str(&specs[1].description).unwrap();
    assert_eq!(stage2["input"]["outline"], "three sections");
    assert_eq!(stage2["task"], "write the document");
}

#[tokio::test]
async fn test_pipeline_natural_handoff() {
    let (ctx, executor) = context_with_agents(&["s1", "s2"]).await;
    executor.script("s1", vec![json!("bullet points")]);
    executor.script("s2", vec![json!("prose")]);

    let mode =
        PipelineMode::new(PipelineConfig::default().with_handoff(HandoffFormat::Natural));
    mode.run(
        &ctx,
        &TaskSpec::new("t-pipe-nat", "draft the memo"),
        &["s1".to_string(), "s2".to_string()],
    )
    .await
    .unwrap();

    let specs = executor.executed_specs();
    assert_eq!(specs[0].description, "draft the memo");
    assert!(specs[1].description.contains("bullet points"));
}

#[tokio::test]
async fn test_pipeline_abort_on_failure() {
    let (ctx, executor) = context_with_agents(&["s1", "s2"]).await;
    executor.script("s1", vec![json!("ok")]);
    executor.script("s2", vec![json!({"__error__": "stage exploded"})]);

    let mode = PipelineMode::new(PipelineConfig::default());
    let err = mode
        .run(
            &ctx,
            &TaskSpec::new("t-pipe-abort", "x"),
            &["s1".to_string(), "s2".to_string()],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HiveError::Agent(_)));
}

#[tokio::test]
async fn test_pipeline_backtrack_one_retries_previous_stage() {
    let (ctx, executor) = context_with_agents(&["s1", "s2"]).await;
    executor.script("s1", vec![json!("first draft"), json!("second draft")]);
    executor.script(
        "s2",
        vec![json!({"__error__": "unusable input"}), json!("done")],
    );

    let mode = PipelineMode::new(
        PipelineConfig::default().with_failure_policy(FailurePolicy::BacktrackOne),
    );
    let result = mode
        .run(
            &ctx,
            &TaskSpec::new("t-pipe-back", "produce it"),
            &["s1".to_string(), "s2".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(result.output, json!("done"));
    // s1 ran twice (original + backtrack), s2 ran twice (fail + retry).
    let specs = executor.executed_specs();
    assert_eq!(
        specs.iter().filter(|s| s.agent_id.as_deref() == Some("s1")).count(),
        2
    );
    assert_eq!(
        specs.iter().filter(|s| s.agent_id.as_deref() == Some("s2")).count(),
        2
    );
    // The retried stage saw the fresh output of the re-run.
    let retry: Value = serde_json::from_str(&specs[3].description).unwrap();
    assert_eq!(retry["input"], "second draft");
}

// ---------------------------------------------------------------------------
// Critique
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_critique_approves_after_revision() {
    let (ctx, executor) = context_with_agents(&["writer", "c1", "c2"]).await;
    executor.script("writer", vec![json!("draft v1"), json!("draft v2")]);
    executor.script(
        "c1",
        vec![
            json!({"score": 0.5, "comment": "thin on detail"}),
            json!({"score": 0.9, "comment": "much better"}),
        ],
    );
    executor.script(
        "c2",
        vec![
            json!({"score": 0.7, "comment": "missing sources"}),
            json!({"score": 0.85, "comment": "sources added"}),
        ],
    );

    let mode = CritiqueMode::new(CritiqueConfig::default());
    let task = TaskSpec::new("t-critique", "write the summary");
    let result = mode
        .run(
            &ctx,
            &task,
            &["writer".to_string(), "c1".to_string(), "c2".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(result.output["approved"], json!(true));
    assert_eq!(result.output["iterations"], json!(2));
    assert_eq!(result.output["draft"], json!("draft v2"));
    // min score of the final round.
    assert!((result.confidence - 0.85).abs() < 1e-9);

    // Revision prompt carried the critiques.
    let specs = executor.executed_specs();
    let revision = specs
        .iter()
        .filter(|s| s.agent_id.as_deref() == Some("writer"))
        .nth(1)
        .unwrap();
    assert!(revision.description.contains("thin on detail"));
}

#[tokio::test]
async fn test_critique_stops_at_iteration_cap() {
    let (ctx, executor) = context_with_agents(&["writer", "c1"]).await;
    executor.script("writer", vec![json!("draft")]);
    executor.script("c1", vec![json!({"score": 0.2, "comment": "no"})]);

    let mode = CritiqueMode::new(CritiqueConfig::default().with_max_iterations(2));
    let result = mode
        .run(
            &ctx,
            &TaskSpec::new("t-critique-cap", "hopeless task"),
            &["writer".to_string(), "c1".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(result.output["approved"], json!(false));
    assert_eq!(result.output["iterations"], json!(2));
}

// ---------------------------------------------------------------------------
// Swarm
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_swarm_runs_plan_and_aggregates() {
    let (ctx, executor) = context_with_agents(&["w1"]).await;
    // The research pattern routes by these capabilities.
    executor.script("web_research", vec![json!("findings")]);
    executor.script("data_analysis", vec![json!("analysis")]);
    executor.script("content_writing", vec![json!("report")]);
    executor.script("output_review", vec![json!("approved")]);
    executor.script("data_synthesis", vec![json!("final summary")]);

    let blackboard_sub = ctx.bus.subscribe("session.swarm.#").unwrap();

    let mode = SwarmMode::new(
        SwarmConfig::default(),
        Arc::new(Decomposer::with_builtin_patterns()),
    );
    let task = TaskSpec::new("t-swarm", "Research the orchestration market");
    let result = mode.run(&ctx, &task, &["w1".to_string()]).await.unwrap();

    assert_eq!(result.output, json!("final summary"));
    assert!((result.confidence - 1.0).abs() < f64::EPSILON);
    // 4 pattern subtasks + 1 aggregate entry.
    assert_eq!(result.transcript.len(), 5);

    // Subtask dependencies were preserved in the submitted specs.
    let specs = executor.executed_specs();
    let analyze = specs
        .iter()
        .find(|s| s.capability.as_deref() == Some("data_analysis"))
        .unwrap();
    assert_eq!(analyze.dependencies.len(), 1);
    assert!(analyze.dependencies[0].ends_with("gather"));

    // Progress was announced on the blackboard topic.
    let mut blackboard_posts = 0;
    while let Some(msg) = blackboard_sub.try_recv() {
        if msg.topic.contains("blackboard") {
            blackboard_posts += 1;
        }
    }
    assert_eq!(blackboard_posts, 4);
}

#[tokio::test]
async fn test_swarm_convergence_cap() {
    let (ctx, _) = context_with_agents(&["w1"]).await;
    let mode = SwarmMode::new(
        SwarmConfig::default().with_max_subtasks(2),
        Arc::new(Decomposer::with_builtin_patterns()),
    );
    let err = mode
        .run(
            &ctx,
            &TaskSpec::new("t-swarm-cap", "Research everything"),
            &["w1".to_string()],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HiveError::Validation(_)));
}

// ---------------------------------------------------------------------------
// Session timeout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_session_timeout_bounds_wall_time() {
    let registry = Arc::new(AgentRegistry::new(20));
    registry
        .register_type(AgentType::new(
            "panel",
            "Panel",
            AgentCategory::Custom,
            vec![Capability::new("deliberate", "Deliberate")],
        ))
        .await
        .unwrap();
    for agent in ["p1", "p2", "judge"] {
        registry
            .register_agent(AgentRegistration::new(agent, "panel", agent))
            .await
            .unwrap();
    }

    let executor = ScriptedExecutor::new().with_delay(Duration::from_secs(10));
    executor.script("p1", vec![json!("slow")]);
    executor.script("p2", vec![json!("slow")]);
    let ctx = ModeContext::new(
        Arc::new(executor),
        Bus::new(BusConfig::default()),
        registry,
        SessionConfig {
            timeout: Duration::from_millis(100),
            ..SessionConfig::default()
        },
    );

    let mode = DebateMode::new(DebateConfig::new(Judge::Agent("judge".into())));
    let err = mode
        .run(
            &ctx,
            &TaskSpec::new("t-timeout", "x"),
            &["p1".to_string(), "p2".to_string()],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HiveError::Timeout(_)));
}
