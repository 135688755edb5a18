use crate::pattern::{Pattern, PatternMatcher, SubTaskTemplate};
use crate::plan::{DecompositionPlan, ExecutionStrategy, SubTaskSpec};
use std::sync::RwLock;
use std::time::Duration;
use taskhive_core::{HiveError, HiveResult};
use tracing::info;

/// Optional routing hints for decomposition.
#[derive(Debug, Clone, Default)]
pub struct DecomposeHints {
    /// Capability to route the fallback single-subtask plan to.
    pub capability: Option<String>,
    /// Base priority applied to every produced subtask.
    pub priority: i32,
}

/// Pattern-driven task decomposer.
///
/// Patterns are matched in registration order against the request
/// description; the first match expands into a plan. When nothing matches,
/// the request becomes a single-subtask sequential plan carrying the
/// parent's capability.
pub struct Decomposer {
    patterns: RwLock<Vec<Pattern>>,
}

impl Decomposer {
    pub fn new() -> Self {
        Self {
            patterns: RwLock::new(Vec::new()),
        }
    }

    /// A decomposer preloaded with the standard request patterns.
    pub fn with_builtin_patterns() -> Self {
        let decomposer = Self::new();
        for pattern in builtin_patterns() {
            decomposer.register_pattern(pattern);
        }
        decomposer
    }

    /// Append a pattern; registration order is match order.
    pub fn register_pattern(&self, pattern: Pattern) {
        info!(pattern = %pattern.id, "Registered decomposition pattern");
        self.patterns.write().expect("pattern registry poisoned").push(pattern);
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.read().expect("pattern registry poisoned").len()
    }

    pub fn decompose(
        &self,
        task_id: &str,
        description: &str,
        hints: Option<&DecomposeHints>,
    ) -> HiveResult<DecompositionPlan> {
        if description.trim().is_empty() {
            return Err(HiveError::Validation("empty task description".into()));
        }
        let default_hints = DecomposeHints::default();
        let hints = hints.unwrap_or(&default_hints);

        let matched: Option<Pattern> = {
            let patterns = self.patterns.read().expect("pattern registry poisoned");
            patterns.iter().find(|p| p.matches(description)).cloned()
        };

        let plan = match matched {
            Some(pattern) => {
                info!(task_id = %task_id, pattern = %pattern.id, "Decomposing by pattern");
                expand_pattern(task_id, description, &pattern, hints)
            }
            None => {
                info!(task_id = %task_id, "No pattern matched, single-subtask plan");
                DecompositionPlan {
                    parent_task_id: task_id.to_string(),
                    strategy: ExecutionStrategy::Sequential,
                    subtasks: vec![SubTaskSpec {
                        local_id: "task".to_string(),
                        description: description.to_string(),
                        capability: hints.capability.clone(),
                        priority: hints.priority,
                        depends_on: Vec::new(),
                        estimated_duration: Some(Duration::from_secs(60)),
                    }],
                }
            }
        };

        plan.validate()?;
        Ok(plan)
    }
}

impl Default for Decomposer {
    fn default() -> Self {
        Self::new()
    }
}

fn expand_pattern(
    task_id: &str,
    description: &str,
    pattern: &Pattern,
    hints: &DecomposeHints,
) -> DecompositionPlan {
    let mut subtasks = Vec::with_capacity(pattern.templates.len());
    let mut previous: Option<String> = None;

    for (index, template) in pattern.templates.iter().enumerate() {
        let depends_on = if !template.depends_on.is_empty() {
            template.depends_on.clone()
        } else if pattern.strategy == ExecutionStrategy::Sequential {
            previous.clone().into_iter().collect()
        } else {
            Vec::new()
        };

        subtasks.push(SubTaskSpec {
            local_id: template.local_id.clone(),
            description: format!("{} for: {}", template.action, description),
            capability: Some(template.capability.clone()),
            priority: hints.priority + index as i32,
            depends_on,
            estimated_duration: Some(template.estimated_duration),
        });
        previous = Some(template.local_id.clone());
    }

    DecompositionPlan {
        parent_task_id: task_id.to_string(),
        strategy: pattern.strategy,
        subtasks,
    }
}

/// The standard patterns: research-and-report, code development, and data
/// pipeline, each a sequential specialist chain.
pub fn builtin_patterns() -> Vec<Pattern> {
    vec![
        Pattern::new(
            "research_and_report",
            PatternMatcher::keywords(["research", "report", "analyze", "study"]),
            ExecutionStrategy::Sequential,
            vec![
                SubTaskTemplate::new("gather", "Gather information", "web_research"),
                SubTaskTemplate::new("analyze", "Analyze findings", "data_analysis"),
                SubTaskTemplate::new("write", "Write report", "content_writing"),
                SubTaskTemplate::new("review", "Review quality", "output_review")
                    .with_estimate(Duration::from_secs(30)),
            ],
        ),
        Pattern::new(
            "code_development",
            PatternMatcher::keywords(["code", "develop", "implement", "build"]),
            ExecutionStrategy::Sequential,
            vec![
                SubTaskTemplate::new("design", "Design architecture", "task_planning"),
                SubTaskTemplate::new("implement", "Implement code", "code_writing")
                    .with_estimate(Duration::from_secs(120)),
                SubTaskTemplate::new("test", "Write tests", "code_writing"),
                SubTaskTemplate::new("review", "Review code", "code_review")
                    .with_estimate(Duration::from_secs(30)),
            ],
        ),
        Pattern::new(
            "data_pipeline",
            PatternMatcher::keywords(["data", "pipeline", "etl", "process"]),
            ExecutionStrategy::Sequential,
            vec![
                SubTaskTemplate::new("extract", "Extract data", "data_analysis"),
                SubTaskTemplate::new("transform", "Transform data", "data_analysis"),
                SubTaskTemplate::new("load", "Load data", "data_analysis"),
                SubTaskTemplate::new("validate", "Validate results", "quality_check")
                    .with_estimate(Duration::from_secs(30)),
            ],
        ),
    ]
}
