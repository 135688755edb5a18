use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use taskhive_core::{HiveError, HiveResult};

/// How a plan's subtasks relate in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// Each subtask depends on the previous one.
    Sequential,
    /// No implied dependencies.
    Parallel,
    /// Dependencies are whatever the templates declare.
    Mixed,
}

/// One planned subtask. `local_id` and `depends_on` are plan-scoped; the
/// orchestrator prefixes them with the parent task id at submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTaskSpec {
    pub local_id: String,
    pub description: String,
    pub capability: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Advisory only; never gates scheduling.
    #[serde(default)]
    pub estimated_duration: Option<Duration>,
}

/// The DAG produced by the decomposer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionPlan {
    pub parent_task_id: String,
    pub strategy: ExecutionStrategy,
    pub subtasks: Vec<SubTaskSpec>,
}

impl DecompositionPlan {
    /// Checks id uniqueness, dependency resolution, and acyclicity.
    pub fn validate(&self) -> HiveResult<()> {
        let mut ids = HashSet::new();
        for subtask in &self.subtasks {
            if !ids.insert(subtask.local_id.as_str()) {
                return Err(HiveError::Pattern(format!(
                    "duplicate subtask id '{}' in plan for '{}'",
                    subtask.local_id, self.parent_task_id
                )));
            }
        }
        for subtask in &self.subtasks {
            for dep in &subtask.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(HiveError::Pattern(format!(
                        "subtask '{}' depends on unknown id '{}'",
                        subtask.local_id, dep
                    )));
                }
            }
        }
        self.topological_order().map(|_| ())
    }

    /// Kahn's algorithm; an unprocessable remainder means a cycle.
    pub fn topological_order(&self) -> HiveResult<Vec<&SubTaskSpec>> {
        let by_id: HashMap<&str, &SubTaskSpec> = self
            .subtasks
            .iter()
            .map(|s| (s.local_id.as_str(), s))
            .collect();

        let mut in_degree: HashMap<&str, usize> = self
            .subtasks
            .iter()
            .map(|s| (s.local_id.as_str(), s.depends_on.len()))
            .collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for subtask in &self.subtasks {
            for dep in &subtask.depends_on {
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(subtask.local_id.as_str());
            }
        }

        let mut ready: VecDeque<&str> = self
            .subtasks
            .iter()
            .filter(|s| s.depends_on.is_empty())
            .map(|s| s.local_id.as_str())
            .collect();
        let mut order = Vec::with_capacity(self.subtasks.len());

        while let Some(id) = ready.pop_front() {
            order.push(by_id[id]);
            for dependent in dependents.get(id).into_iter().flatten().copied() {
                let degree = in_degree.get_mut(dependent).expect("known id");
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(dependent);
                }
            }
        }

        if order.len() != self.subtasks.len() {
            return Err(HiveError::Pattern(format!(
                "dependency cycle in plan for '{}'",
                self.parent_task_id
            )));
        }
        Ok(order)
    }

    /// Sum of the advisory duration estimates.
    pub fn estimated_duration(&self) -> Duration {
        self.subtasks
            .iter()
            .filter_map(|s| s.estimated_duration)
            .sum()
    }
}
