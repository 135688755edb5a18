use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use taskhive_core::{HiveError, HiveResult, Task, TaskFailure, TaskSpec, TaskStatus};

/// Upstream cancellation reason used for cascades.
pub const UPSTREAM_FAILED: &str = "upstream-failed";

#[derive(PartialEq, Eq)]
struct QueueEntry {
    priority: i32,
    created_at: DateTime<Utc>,
    seq: u64,
    id: String,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then earlier creation (FIFO),
        // then insertion sequence as the final total-order tie-break.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.created_at.cmp(&self.created_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Disposition of a cancel request.
pub enum CancelDisposition {
    /// The task was already terminal; cancel is a no-op.
    AlreadyTerminal,
    /// The task was queued or waiting and is now cancelled, along with the
    /// listed dependents.
    Cancelled { cascaded: Vec<String> },
    /// The task is in flight on this agent; the caller must run the
    /// cooperative cancel protocol and then call `finalize_cancel`.
    Running { agent: String },
}

/// The orchestrator's task table, priority heap, and waiting set.
///
/// Purely synchronous; the orchestrator wraps it in one lock and keeps
/// critical sections free of suspension points. Heap entries are lazily
/// invalidated: popping skips entries whose task is no longer `Queued`.
pub struct TaskQueue {
    tasks: HashMap<String, Task>,
    heap: BinaryHeap<QueueEntry>,
    waiting: HashSet<String>,
    seq: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            heap: BinaryHeap::new(),
            waiting: HashSet::new(),
            seq: 0,
        }
    }

    /// Admit a task. Dependencies may reference tasks that have not been
    /// submitted yet; the task waits until they appear and complete.
    pub fn insert(&mut self, spec: TaskSpec) -> HiveResult<TaskStatus> {
        if spec.id.is_empty() {
            return Err(HiveError::Validation("empty task id".into()));
        }
        if spec.description.trim().is_empty() {
            return Err(HiveError::Validation(format!(
                "task '{}' has an empty description",
                spec.id
            )));
        }
        if self.tasks.contains_key(&spec.id) {
            return Err(HiveError::Validation(format!(
                "task '{}' already exists",
                spec.id
            )));
        }
        if spec.dependencies.iter().any(|d| d == &spec.id) {
            return Err(HiveError::Validation(format!(
                "task '{}' depends on itself",
                spec.id
            )));
        }

        let mut task = Task::from_spec(spec);

        // A dependency that already failed or was cancelled dooms the task
        // immediately.
        let doomed = task.dependencies.iter().any(|dep| {
            matches!(
                self.tasks.get(dep).map(|t| t.status),
                Some(TaskStatus::Failed) | Some(TaskStatus::Cancelled)
            )
        });
        if doomed {
            task.status = TaskStatus::Cancelled;
            task.failure = Some(TaskFailure::cancelled(UPSTREAM_FAILED));
            task.completed_at = Some(Utc::now());
            let status = task.status;
            self.tasks.insert(task.id.clone(), task);
            return Ok(status);
        }

        if self.deps_satisfied(&task) {
            task.status = TaskStatus::Queued;
            self.push_entry(&task);
        } else {
            task.status = TaskStatus::Waiting;
            self.waiting.insert(task.id.clone());
        }

        let status = task.status;
        self.tasks.insert(task.id.clone(), task);
        Ok(status)
    }

    fn deps_satisfied(&self, task: &Task) -> bool {
        task.dependencies.iter().all(|dep| {
            matches!(
                self.tasks.get(dep).map(|t| t.status),
                Some(TaskStatus::Completed)
            )
        })
    }

    fn push_entry(&mut self, task: &Task) {
        self.seq += 1;
        self.heap.push(QueueEntry {
            priority: task.priority,
            created_at: task.created_at,
            seq: self.seq,
            id: task.id.clone(),
        });
    }

    /// Pop the highest-priority queued task. The task stays `Queued` until
    /// `mark_running`; callers that cannot place it must `requeue`.
    pub fn pop_ready(&mut self) -> Option<Task> {
        while let Some(entry) = self.heap.pop() {
            if let Some(task) = self.tasks.get(&entry.id) {
                if task.status == TaskStatus::Queued {
                    return Some(task.clone());
                }
            }
        }
        None
    }

    /// Put a popped-but-unplaced task back on the heap.
    pub fn requeue(&mut self, id: &str) -> bool {
        match self.tasks.get(id) {
            Some(task) if task.status == TaskStatus::Queued => {
                let task = task.clone();
                self.push_entry(&task);
                true
            }
            _ => false,
        }
    }

    /// Transition a popped task to `Running` on the given agent. Fails if
    /// the task was cancelled between pop and placement.
    pub fn mark_running(&mut self, id: &str, agent_id: &str) -> HiveResult<()> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| HiveError::NotFound(format!("task '{id}'")))?;
        if !task.status.can_transition_to(TaskStatus::Running) {
            return Err(HiveError::State(format!(
                "task '{id}' is {} and cannot start",
                task.status
            )));
        }
        task.status = TaskStatus::Running;
        task.assigned_agent = Some(agent_id.to_string());
        task.started_at = Some(Utc::now());
        Ok(())
    }

    /// Complete a running task and unblock dependents whose last
    /// dependency this was. Returns the newly queued dependent ids.
    pub fn complete(&mut self, id: &str, result: serde_json::Value) -> HiveResult<Vec<String>> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| HiveError::NotFound(format!("task '{id}'")))?;
        if !task.status.can_transition_to(TaskStatus::Completed) {
            return Err(HiveError::State(format!(
                "task '{id}' is {} and cannot complete",
                task.status
            )));
        }
        task.status = TaskStatus::Completed;
        task.result = Some(result);
        task.completed_at = Some(Utc::now());

        Ok(self.promote_ready())
    }

    /// Move every waiting task whose dependencies are now all completed
    /// onto the heap.
    fn promote_ready(&mut self) -> Vec<String> {
        let ready: Vec<String> = self
            .waiting
            .iter()
            .filter(|id| {
                self.tasks
                    .get(*id)
                    .map_or(false, |task| self.deps_satisfied(task))
            })
            .cloned()
            .collect();

        for id in &ready {
            self.waiting.remove(id);
            if let Some(task) = self.tasks.get_mut(id) {
                task.status = TaskStatus::Queued;
            }
            let task = self.tasks.get(id).expect("promoted task exists").clone();
            self.push_entry(&task);
        }
        ready
    }

    /// Fail a running task and cascade cancellation to its transitive
    /// dependents. Returns the cancelled dependent ids.
    pub fn fail(&mut self, id: &str, failure: TaskFailure) -> HiveResult<Vec<String>> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| HiveError::NotFound(format!("task '{id}'")))?;
        if !task.status.can_transition_to(TaskStatus::Failed) {
            return Err(HiveError::State(format!(
                "task '{id}' is {} and cannot fail",
                task.status
            )));
        }
        task.status = TaskStatus::Failed;
        task.failure = Some(failure);
        task.completed_at = Some(Utc::now());

        Ok(self.cascade_cancel(id))
    }

    /// Cancel every non-terminal transitive dependent of `root`.
    fn cascade_cancel(&mut self, root: &str) -> Vec<String> {
        let mut cancelled = Vec::new();
        let mut frontier = vec![root.to_string()];

        while let Some(current) = frontier.pop() {
            let dependents: Vec<String> = self
                .tasks
                .values()
                .filter(|t| !t.status.is_terminal() && t.dependencies.contains(&current))
                .map(|t| t.id.clone())
                .collect();

            for id in dependents {
                let task = self.tasks.get_mut(&id).expect("dependent exists");
                task.status = TaskStatus::Cancelled;
                task.failure = Some(TaskFailure::cancelled(UPSTREAM_FAILED));
                task.completed_at = Some(Utc::now());
                self.waiting.remove(&id);
                frontier.push(id.clone());
                cancelled.push(id);
            }
        }
        cancelled
    }

    /// Cancel a task. Queued and waiting tasks cancel synchronously;
    /// running tasks are reported back for the cooperative protocol.
    pub fn cancel(&mut self, id: &str, reason: &str) -> HiveResult<CancelDisposition> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| HiveError::NotFound(format!("task '{id}'")))?;

        match task.status {
            status if status.is_terminal() => Ok(CancelDisposition::AlreadyTerminal),
            TaskStatus::Running => Ok(CancelDisposition::Running {
                agent: task
                    .assigned_agent
                    .clone()
                    .expect("running task has an agent"),
            }),
            _ => {
                task.status = TaskStatus::Cancelled;
                task.failure = Some(TaskFailure::cancelled(reason));
                task.completed_at = Some(Utc::now());
                self.waiting.remove(id);
                Ok(CancelDisposition::Cancelled {
                    cascaded: self.cascade_cancel(id),
                })
            }
        }
    }

    /// Terminal step of cooperative cancellation for a running task.
    /// Returns the cascaded dependent ids; empty if the task already
    /// reached a terminal state some other way.
    pub fn finalize_cancel(&mut self, id: &str, reason: &str) -> Vec<String> {
        let Some(task) = self.tasks.get_mut(id) else {
            return Vec::new();
        };
        if task.status.is_terminal() {
            return Vec::new();
        }
        task.status = TaskStatus::Cancelled;
        task.failure = Some(TaskFailure::cancelled(reason));
        task.completed_at = Some(Utc::now());
        self.waiting.remove(id);
        self.cascade_cancel(id)
    }

    pub fn status_of(&self, id: &str) -> Option<TaskStatus> {
        self.tasks.get(id).map(|t| t.status)
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks.get(id).cloned()
    }

    /// All tasks, optionally filtered by status, in creation order.
    pub fn list(&self, status: Option<TaskStatus>) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .values()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        tasks
    }

    pub fn counts(&self) -> HashMap<TaskStatus, usize> {
        let mut counts = HashMap::new();
        for task in self.tasks.values() {
            *counts.entry(task.status).or_insert(0) += 1;
        }
        counts
    }

    pub fn queued_len(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::Queued)
            .count()
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(id: &str) -> TaskSpec {
        TaskSpec::new(id, format!("work on {id}"))
    }

    #[test]
    fn test_insert_and_pop_in_priority_order() {
        let mut queue = TaskQueue::new();
        queue.insert(spec("low").with_priority(1)).unwrap();
        queue.insert(spec("high").with_priority(5)).unwrap();
        queue.insert(spec("mid").with_priority(3)).unwrap();

        assert_eq!(queue.pop_ready().unwrap().id, "high");
        assert_eq!(queue.pop_ready().unwrap().id, "mid");
        assert_eq!(queue.pop_ready().unwrap().id, "low");
        assert!(queue.pop_ready().is_none());
    }

    #[test]
    fn test_priority_tie_breaks_by_creation_order() {
        let mut queue = TaskQueue::new();
        queue.insert(spec("first").with_priority(5)).unwrap();
        queue.insert(spec("second").with_priority(5)).unwrap();

        assert_eq!(queue.pop_ready().unwrap().id, "first");
        assert_eq!(queue.pop_ready().unwrap().id, "second");
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut queue = TaskQueue::new();
        queue.insert(spec("t1")).unwrap();
        assert!(matches!(
            queue.insert(spec("t1")).unwrap_err(),
            HiveError::Validation(_)
        ));
    }

    #[test]
    fn test_empty_description_rejected() {
        let mut queue = TaskQueue::new();
        let err = queue.insert(TaskSpec::new("t1", "  ")).unwrap_err();
        assert!(matches!(err, HiveError::Validation(_)));
    }

    #[test]
    fn test_dependent_waits_then_queues() {
        let mut queue = TaskQueue::new();
        queue.insert(spec("t1")).unwrap();
        let status = queue
            .insert(spec("t2").with_dependencies(vec!["t1".into()]))
            .unwrap();
        assert_eq!(status, TaskStatus::Waiting);

        let t1 = queue.pop_ready().unwrap();
        assert_eq!(t1.id, "t1");
        queue.mark_running("t1", "a1").unwrap();
        let ready = queue.complete("t1", json!("done")).unwrap();
        assert_eq!(ready, vec!["t2"]);
        assert_eq!(queue.status_of("t2"), Some(TaskStatus::Queued));
        assert_eq!(queue.pop_ready().unwrap().id, "t2");
    }

    #[test]
    fn test_forward_dependency_waits_for_later_submission() {
        let mut queue = TaskQueue::new();
        // t2 arrives before its dependency exists.
        let status = queue
            .insert(spec("t2").with_dependencies(vec!["t1".into()]))
            .unwrap();
        assert_eq!(status, TaskStatus::Waiting);

        queue.insert(spec("t1")).unwrap();
        queue.pop_ready().unwrap();
        queue.mark_running("t1", "a1").unwrap();
        let ready = queue.complete("t1", json!(null)).unwrap();
        assert_eq!(ready, vec!["t2"]);
    }

    #[test]
    fn test_multi_dependency_waits_for_all() {
        let mut queue = TaskQueue::new();
        queue.insert(spec("a")).unwrap();
        queue.insert(spec("b")).unwrap();
        queue
            .insert(spec("join").with_dependencies(vec!["a".into(), "b".into()]))
            .unwrap();

        queue.pop_ready().unwrap();
        queue.mark_running("a", "x").unwrap();
        assert!(queue.complete("a", json!(1)).unwrap().is_empty());

        queue.pop_ready().unwrap();
        queue.mark_running("b", "x").unwrap();
        assert_eq!(queue.complete("b", json!(2)).unwrap(), vec!["join"]);
    }

    #[test]
    fn test_fail_cascades_to_transitive_dependents() {
        let mut queue = TaskQueue::new();
        queue.insert(spec("t1")).unwrap();
        queue
            .insert(spec("t2").with_dependencies(vec!["t1".into()]))
            .unwrap();
        queue
            .insert(spec("t3").with_dependencies(vec!["t2".into()]))
            .unwrap();

        queue.pop_ready().unwrap();
        queue.mark_running("t1", "a1").unwrap();
        let mut cancelled = queue
            .fail("t1", TaskFailure::new("agent-error", "boom", false))
            .unwrap();
        cancelled.sort();
        assert_eq!(cancelled, vec!["t2", "t3"]);

        assert_eq!(queue.status_of("t1"), Some(TaskStatus::Failed));
        for id in ["t2", "t3"] {
            let task = queue.get(id).unwrap();
            assert_eq!(task.status, TaskStatus::Cancelled);
            assert_eq!(task.failure.unwrap().message, UPSTREAM_FAILED);
        }
    }

    #[test]
    fn test_insert_against_failed_dependency_cancels_immediately() {
        let mut queue = TaskQueue::new();
        queue.insert(spec("t1")).unwrap();
        queue.pop_ready().unwrap();
        queue.mark_running("t1", "a1").unwrap();
        queue
            .fail("t1", TaskFailure::new("agent-error", "boom", false))
            .unwrap();

        let status = queue
            .insert(spec("t2").with_dependencies(vec!["t1".into()]))
            .unwrap();
        assert_eq!(status, TaskStatus::Cancelled);
    }

    #[test]
    fn test_cancel_queued_task_and_dependents() {
        let mut queue = TaskQueue::new();
        queue.insert(spec("t1")).unwrap();
        queue
            .insert(spec("t2").with_dependencies(vec!["t1".into()]))
            .unwrap();

        match queue.cancel("t1", "requested").unwrap() {
            CancelDisposition::Cancelled { cascaded } => assert_eq!(cascaded, vec!["t2"]),
            _ => panic!("expected synchronous cancel"),
        }
        assert_eq!(queue.status_of("t1"), Some(TaskStatus::Cancelled));
        assert_eq!(queue.status_of("t2"), Some(TaskStatus::Cancelled));
        // The heap entry is lazily discarded.
        assert!(queue.pop_ready().is_none());
    }

    #[test]
    fn test_cancel_running_task_reports_agent() {
        let mut queue = TaskQueue::new();
        queue.insert(spec("t1")).unwrap();
        queue.pop_ready().unwrap();
        queue.mark_running("t1", "a9").unwrap();

        match queue.cancel("t1", "requested").unwrap() {
            CancelDisposition::Running { agent } => assert_eq!(agent, "a9"),
            _ => panic!("expected running disposition"),
        }
        // Cooperative protocol concludes with finalize.
        queue.finalize_cancel("t1", "requested");
        assert_eq!(queue.status_of("t1"), Some(TaskStatus::Cancelled));
    }

    #[test]
    fn test_cancel_terminal_task_is_noop() {
        let mut queue = TaskQueue::new();
        queue.insert(spec("t1")).unwrap();
        queue.pop_ready().unwrap();
        queue.mark_running("t1", "a1").unwrap();
        queue.complete("t1", json!(null)).unwrap();

        assert!(matches!(
            queue.cancel("t1", "requested").unwrap(),
            CancelDisposition::AlreadyTerminal
        ));
        assert_eq!(queue.status_of("t1"), Some(TaskStatus::Completed));
    }

    #[test]
    fn test_requeue_after_balancer_rejection() {
        let mut queue = TaskQueue::new();
        queue.insert(spec("t1")).unwrap();
        let popped = queue.pop_ready().unwrap();
        assert!(queue.pop_ready().is_none());

        assert!(queue.requeue(&popped.id));
        assert_eq!(queue.pop_ready().unwrap().id, "t1");
    }

    #[test]
    fn test_mark_running_fails_after_cancel_race() {
        let mut queue = TaskQueue::new();
        queue.insert(spec("t1")).unwrap();
        queue.pop_ready().unwrap();
        queue.cancel("t1", "requested").unwrap();

        assert!(matches!(
            queue.mark_running("t1", "a1").unwrap_err(),
            HiveError::State(_)
        ));
    }

    #[test]
    fn test_running_transition_records_agent_once() {
        let mut queue = TaskQueue::new();
        queue.insert(spec("t1")).unwrap();
        queue.pop_ready().unwrap();
        queue.mark_running("t1", "a1").unwrap();

        let task = queue.get("t1").unwrap();
        assert_eq!(task.assigned_agent.as_deref(), Some("a1"));
        assert!(task.started_at.is_some());

        // No second running transition.
        assert!(queue.mark_running("t1", "a2").is_err());
        assert_eq!(queue.get("t1").unwrap().assigned_agent.as_deref(), Some("a1"));
    }

    #[test]
    fn test_counts_and_lengths() {
        let mut queue = TaskQueue::new();
        queue.insert(spec("t1")).unwrap();
        queue
            .insert(spec("t2").with_dependencies(vec!["t1".into()]))
            .unwrap();

        assert_eq!(queue.queued_len(), 1);
        assert_eq!(queue.waiting_len(), 1);
        let counts = queue.counts();
        assert_eq!(counts[&TaskStatus::Queued], 1);
        assert_eq!(counts[&TaskStatus::Waiting], 1);
    }
}
