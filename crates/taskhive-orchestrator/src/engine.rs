use crate::queue::{CancelDisposition, TaskQueue, UPSTREAM_FAILED};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskhive_balancer::LoadBalancer;
use taskhive_bus::Bus;
use taskhive_consensus::{
    CollaborationResult, CritiqueConfig, CritiqueMode, DebateConfig, DebateMode, EnsembleConfig,
    EnsembleMode, ModeContext, PipelineConfig, PipelineMode, SubtaskExecutor, SwarmConfig,
    SwarmMode,
};
use taskhive_core::{
    topics, HiveError, HiveResult, OrchestratorConfig, Task, TaskFailure, TaskSpec, TaskStatus,
};
use taskhive_decomposer::{DecomposeHints, DecompositionPlan, Decomposer};
use taskhive_registry::{AgentRegistration, AgentRegistry, AgentSnapshot, AgentStatus, AgentType};
use tokio::sync::{watch, Mutex, Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Aggregate orchestrator statistics.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub running: bool,
    pub tasks: HashMap<String, usize>,
    pub agents: HashMap<String, usize>,
    pub queued: usize,
    pub waiting: usize,
    pub dispatched: u64,
    pub retried: u64,
}

struct Inner {
    config: OrchestratorConfig,
    registry: Arc<AgentRegistry>,
    bus: Bus,
    balancer: LoadBalancer,
    decomposer: Arc<Decomposer>,
    queue: Mutex<TaskQueue>,
    queue_notify: Notify,
    /// Caps concurrently coordinated collaboration sessions.
    sessions: Semaphore,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    dispatched: AtomicU64,
    retried: AtomicU64,
}

/// The orchestration engine: admits tasks, resolves dependencies, and
/// drives a fixed pool of dispatch workers over the bus.
///
/// Cloning is cheap; clones share the same engine. The orchestrator is the
/// composition root of the core: it owns the queue and is the single
/// writer of agent status and load counters.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let registry = Arc::new(AgentRegistry::new(config.health.window));
        let bus = Bus::new(config.bus.clone());
        let balancer = LoadBalancer::new(config.balance, config.balance_seed);
        let decomposer = Arc::new(Decomposer::with_builtin_patterns());
        let (shutdown, _) = watch::channel(false);
        let sessions = Semaphore::new(config.session.max_concurrent.max(1));

        Self {
            inner: Arc::new(Inner {
                config,
                registry,
                bus,
                balancer,
                decomposer,
                queue: Mutex::new(TaskQueue::new()),
                queue_notify: Notify::new(),
                sessions,
                shutdown,
                workers: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                dispatched: AtomicU64::new(0),
                retried: AtomicU64::new(0),
            }),
        }
    }

    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.inner.registry
    }

    pub fn decomposer(&self) -> &Arc<Decomposer> {
        &self.inner.decomposer
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    // --- Lifecycle ---

    /// Spawn `workers` dispatch workers plus the background health sweep.
    /// Passing 0 uses the configured worker count.
    pub async fn start(&self, workers: usize) -> HiveResult<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(HiveError::State("orchestrator is already running".into()));
        }
        let workers = if workers == 0 {
            self.inner.config.workers
        } else {
            workers
        };
        // A fresh shutdown epoch for this run.
        self.inner.shutdown.send_replace(false);

        info!(workers = workers, "Orchestrator starting");
        let mut handles = self.inner.workers.lock().await;
        for worker_id in 0..workers {
            let inner = self.inner.clone();
            let rx = self.inner.shutdown.subscribe();
            handles.push(tokio::spawn(worker_loop(inner, worker_id, rx)));
        }
        let inner = self.inner.clone();
        let rx = self.inner.shutdown.subscribe();
        handles.push(tokio::spawn(sweep_loop(inner, rx)));
        Ok(())
    }

    /// Graceful stop: workers finish the dispatch they hold and exit.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Orchestrator stopping");
        let _ = self.inner.shutdown.send(true);
        self.inner.queue_notify.notify_waiters();

        let mut handles = self.inner.workers.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        info!("Orchestrator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    // --- Admission ---

    /// Submit one task. Returns its id once it is queued (or waiting on
    /// dependencies).
    pub async fn submit(&self, spec: TaskSpec) -> HiveResult<String> {
        let id = spec.id.clone();
        let status = {
            let mut queue = self.inner.queue.lock().await;
            queue.insert(spec)?
        };

        match status {
            TaskStatus::Queued => {
                self.publish_task_event(&id, status, json!({})).await;
                self.inner.queue_notify.notify_one();
            }
            // Admitted against an already-failed dependency.
            TaskStatus::Cancelled => {
                self.publish_cancelled(&id, UPSTREAM_FAILED).await;
            }
            // Waiting tasks announce `queued` when their last dependency
            // completes.
            _ => {}
        }
        debug!(task_id = %id, status = %status, "Task admitted");
        Ok(id)
    }

    /// Submit every subtask of a decomposition plan. Local ids are
    /// namespaced under the parent task id.
    pub async fn submit_plan(&self, plan: &DecompositionPlan) -> HiveResult<Vec<String>> {
        plan.validate()?;

        let mut ids = Vec::with_capacity(plan.subtasks.len());
        for subtask in plan.topological_order()? {
            let spec = TaskSpec {
                id: format!("{}.{}", plan.parent_task_id, subtask.local_id),
                description: subtask.description.clone(),
                priority: subtask.priority,
                capability: subtask.capability.clone(),
                agent_id: None,
                dependencies: subtask
                    .depends_on
                    .iter()
                    .map(|dep| format!("{}.{dep}", plan.parent_task_id))
                    .collect(),
                timeout: None,
                balance: None,
            };
            ids.push(self.submit(spec).await?);
        }
        info!(parent = %plan.parent_task_id, subtasks = ids.len(), "Plan submitted");
        Ok(ids)
    }

    /// Decompose a high-level request and submit the resulting plan.
    pub async fn submit_request(
        &self,
        task_id: &str,
        description: &str,
        hints: Option<&DecomposeHints>,
    ) -> HiveResult<Vec<String>> {
        let plan = self.inner.decomposer.decompose(task_id, description, hints)?;
        self.submit_plan(&plan).await
    }

    pub async fn get(&self, task_id: &str) -> HiveResult<Task> {
        let queue = self.inner.queue.lock().await;
        queue
            .get(task_id)
            .ok_or_else(|| HiveError::NotFound(format!("task '{task_id}'")))
    }

    pub async fn list(&self, status: Option<TaskStatus>) -> Vec<Task> {
        let queue = self.inner.queue.lock().await;
        queue.list(status)
    }

    /// Cancel a task. Queued and waiting tasks cancel immediately; a
    /// running task gets a cancellation message on its agent's control
    /// topic and is marked cancelled on acknowledgement or after the grace
    /// window (the unresponsive agent is then demoted to `error`).
    /// Cancelling an already-terminal task is a no-op.
    pub async fn cancel(&self, task_id: &str) -> HiveResult<()> {
        let disposition = {
            let mut queue = self.inner.queue.lock().await;
            queue.cancel(task_id, "requested")?
        };

        match disposition {
            CancelDisposition::AlreadyTerminal => Ok(()),
            CancelDisposition::Cancelled { cascaded } => {
                self.publish_cancelled(task_id, "requested").await;
                for id in cascaded {
                    self.publish_cancelled(&id, UPSTREAM_FAILED).await;
                }
                Ok(())
            }
            CancelDisposition::Running { agent } => {
                let ack = self
                    .inner
                    .bus
                    .request(
                        topics::ORCHESTRATOR,
                        &topics::agent_control(&agent),
                        json!({ "action": "cancel", "task_id": task_id }),
                        self.inner.config.cancel_grace,
                    )
                    .await;

                if ack.is_err() {
                    warn!(task_id = %task_id, agent = %agent, "Cancel unacknowledged, demoting agent");
                    let _ = self.inner.registry.set_status(&agent, AgentStatus::Error).await;
                    self.publish_agent_event(&agent, "status_changed").await;
                }

                let cascaded = {
                    let mut queue = self.inner.queue.lock().await;
                    queue.finalize_cancel(task_id, "requested")
                };
                self.publish_cancelled(task_id, "requested").await;
                for id in cascaded {
                    self.publish_cancelled(&id, UPSTREAM_FAILED).await;
                }
                Ok(())
            }
        }
    }

    pub async fn stats(&self) -> Stats {
        let (task_counts, queued, waiting) = {
            let queue = self.inner.queue.lock().await;
            (queue.counts(), queue.queued_len(), queue.waiting_len())
        };
        let agent_counts = self.inner.registry.agent_counts().await;

        Stats {
            running: self.is_running(),
            tasks: task_counts
                .into_iter()
                .map(|(status, n)| (status.to_string(), n))
                .collect(),
            agents: agent_counts
                .into_iter()
                .map(|(status, n)| (status.to_string(), n))
                .collect(),
            queued,
            waiting,
            dispatched: self.inner.dispatched.load(Ordering::Relaxed),
            retried: self.inner.retried.load(Ordering::Relaxed),
        }
    }

    // --- Agent administration (single-writer wrappers over the registry) ---

    pub async fn register_type(&self, agent_type: AgentType) -> HiveResult<()> {
        self.inner.registry.register_type(agent_type).await
    }

    pub async fn register_agent(&self, registration: AgentRegistration) -> HiveResult<()> {
        let agent = self.inner.registry.register_agent(registration).await?;
        self.inner
            .bus
            .publish(
                topics::ORCHESTRATOR,
                &topics::agent_event("registered"),
                json!({ "agent_id": agent.id, "type_id": agent.type_id }),
            )
            .ok();
        Ok(())
    }

    pub async fn unregister_agent(&self, agent_id: &str) -> HiveResult<()> {
        self.inner.registry.unregister_agent(agent_id).await?;
        self.inner
            .bus
            .publish(
                topics::ORCHESTRATOR,
                &topics::agent_event("unregistered"),
                json!({ "agent_id": agent_id }),
            )
            .ok();
        Ok(())
    }

    /// Refuse new dispatch to the agent; in-flight tasks drain normally.
    pub async fn pause_agent(&self, agent_id: &str) -> HiveResult<()> {
        self.inner.registry.pause(agent_id).await?;
        self.publish_agent_event(agent_id, "status_changed").await;
        Ok(())
    }

    pub async fn resume_agent(&self, agent_id: &str) -> HiveResult<()> {
        self.inner.registry.resume(agent_id).await?;
        self.publish_agent_event(agent_id, "status_changed").await;
        // Paused agents may have been starving queued tasks.
        self.inner.queue_notify.notify_waiters();
        Ok(())
    }

    // --- Collaboration modes ---

    fn mode_context(&self) -> ModeContext {
        ModeContext::new(
            Arc::new(self.clone()),
            self.inner.bus.clone(),
            self.inner.registry.clone(),
            self.inner.config.session.clone(),
        )
    }

    /// Hold a coordinator slot for the duration of one session run.
    async fn session_permit(&self) -> HiveResult<tokio::sync::SemaphorePermit<'_>> {
        self.inner
            .sessions
            .acquire()
            .await
            .map_err(|_| HiveError::State("session limiter closed".into()))
    }

    pub async fn run_debate(
        &self,
        task: TaskSpec,
        participants: Vec<String>,
        config: DebateConfig,
    ) -> HiveResult<CollaborationResult> {
        let _permit = self.session_permit().await?;
        DebateMode::new(config)
            .run(&self.mode_context(), &task, &participants)
            .await
    }

    pub async fn run_ensemble(
        &self,
        task: TaskSpec,
        participants: Vec<String>,
        config: EnsembleConfig,
    ) -> HiveResult<CollaborationResult> {
        let _permit = self.session_permit().await?;
        EnsembleMode::new(config)
            .run(&self.mode_context(), &task, &participants)
            .await
    }

    pub async fn run_pipeline(
        &self,
        task: TaskSpec,
        participants: Vec<String>,
        config: PipelineConfig,
    ) -> HiveResult<CollaborationResult> {
        let _permit = self.session_permit().await?;
        PipelineMode::new(config)
            .run(&self.mode_context(), &task, &participants)
            .await
    }

    pub async fn run_critique(
        &self,
        task: TaskSpec,
        participants: Vec<String>,
        config: CritiqueConfig,
    ) -> HiveResult<CollaborationResult> {
        let _permit = self.session_permit().await?;
        CritiqueMode::new(config)
            .run(&self.mode_context(), &task, &participants)
            .await
    }

    pub async fn run_swarm(
        &self,
        task: TaskSpec,
        participants: Vec<String>,
        config: SwarmConfig,
    ) -> HiveResult<CollaborationResult> {
        let _permit = self.session_permit().await?;
        SwarmMode::new(config, self.inner.decomposer.clone())
            .run(&self.mode_context(), &task, &participants)
            .await
    }

    // --- Event helpers ---

    async fn publish_task_event(&self, task_id: &str, status: TaskStatus, extra: serde_json::Value) {
        publish_task_event(&self.inner, task_id, status, extra);
    }

    async fn publish_cancelled(&self, task_id: &str, reason: &str) {
        publish_task_event(
            &self.inner,
            task_id,
            TaskStatus::Cancelled,
            json!({ "reason": reason }),
        );
    }

    async fn publish_agent_event(&self, agent_id: &str, kind: &str) {
        let status = self
            .inner
            .registry
            .get_agent(agent_id)
            .await
            .map(|a| a.status.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        self.inner
            .bus
            .publish(
                topics::ORCHESTRATOR,
                &topics::agent_event(kind),
                json!({ "agent_id": agent_id, "status": status }),
            )
            .ok();
    }
}

#[async_trait]
impl SubtaskExecutor for Orchestrator {
    /// Submit the spec and resolve at its terminal status, listening on
    /// the task lifecycle topics with a polling fallback.
    async fn execute(&self, spec: TaskSpec) -> HiveResult<serde_json::Value> {
        // Subscribe before submitting so no terminal event can be missed.
        let sub = self.inner.bus.subscribe("orchestrator.task.#")?;
        let task_id = self.submit(spec).await?;

        loop {
            match tokio::time::timeout(Duration::from_millis(500), sub.recv()).await {
                Ok(Some(msg)) => {
                    if msg.payload.get("task_id").and_then(|v| v.as_str()) != Some(task_id.as_str())
                    {
                        continue;
                    }
                }
                Ok(None) => return Err(HiveError::Bus("lifecycle subscription closed".into())),
                // Events can be dropped under load; fall through to a poll.
                Err(_) => {}
            }

            let task = self.get(&task_id).await?;
            match task.status {
                TaskStatus::Completed => {
                    return Ok(task.result.unwrap_or(serde_json::Value::Null))
                }
                TaskStatus::Failed => {
                    let failure = task
                        .failure
                        .unwrap_or_else(|| TaskFailure::new("agent-error", "task failed", false));
                    return Err(failure.into());
                }
                TaskStatus::Cancelled => {
                    let reason = task
                        .failure
                        .map(|f| f.message)
                        .unwrap_or_else(|| "cancelled".to_string());
                    return Err(HiveError::Cancelled(reason));
                }
                _ => continue,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

async fn worker_loop(inner: Arc<Inner>, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
    debug!(worker = worker_id, "Worker started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        let popped = {
            let mut queue = inner.queue.lock().await;
            queue.pop_ready()
        };
        match popped {
            Some(task) => dispatch_task(&inner, task).await,
            None => {
                tokio::select! {
                    _ = inner.queue_notify.notified() => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
    }
    debug!(worker = worker_id, "Worker stopped");
}

/// One dispatch cycle: place the task on an agent, run the bus round-trip
/// with retries, and record the terminal outcome.
async fn dispatch_task(inner: &Arc<Inner>, task: Task) {
    let strategy = task.balance.unwrap_or(inner.config.balance);

    // Select, reserve, and flip the task to running as one placement
    // step. The queue lock is held across the slot reservation so
    // observers see `agent.active` and `task.assigned_agent` together —
    // never a reserved slot with the task still queued. A reservation
    // lost to another worker re-resolves with fresh snapshots; a
    // genuinely full pool falls through to backoff.
    let mut agent_id = None;
    for _ in 0..3 {
        let candidates = resolve_candidates(inner, &task).await;
        let Some(candidate) =
            inner
                .balancer
                .select_with(&candidates, task.capability.as_deref(), strategy)
        else {
            break;
        };

        let mut queue = inner.queue.lock().await;
        if queue.status_of(&task.id) != Some(TaskStatus::Queued) {
            // Cancelled between pop and placement.
            return;
        }
        if inner.registry.begin_dispatch(&candidate).await.is_err() {
            continue;
        }
        queue
            .mark_running(&task.id, &candidate)
            .expect("task verified queued under the placement lock");
        agent_id = Some(candidate);
        break;
    }

    let Some(agent_id) = agent_id else {
        // Everyone is full (or paused): short backoff, then back on the heap.
        tokio::time::sleep(inner.config.requeue_backoff).await;
        let mut queue = inner.queue.lock().await;
        if queue.requeue(&task.id) {
            drop(queue);
            inner.queue_notify.notify_one();
        }
        return;
    };
    publish_task_event(
        inner,
        &task.id,
        TaskStatus::Running,
        json!({ "agent_id": agent_id }),
    );
    info!(task_id = %task.id, agent = %agent_id, "Dispatching task");

    let timeout = task.timeout.unwrap_or(inner.config.dispatch_timeout);
    let payload = json!({
        "task_id": task.id,
        "description": task.description,
        "capability": task.capability,
        "priority": task.priority,
    });

    let mut attempt = 0u32;
    let outcome = loop {
        inner.dispatched.fetch_add(1, Ordering::Relaxed);
        let reply = inner
            .bus
            .request(
                topics::ORCHESTRATOR,
                &topics::agent_task(&agent_id),
                payload.clone(),
                timeout,
            )
            .await;

        match reply {
            Ok(value) => {
                if let Some(err) = value.get("err") {
                    let message = err
                        .get("message")
                        .and_then(|m| m.as_str())
                        .unwrap_or("agent reported failure");
                    break Err(HiveError::Agent(message.to_string()));
                }
                break Ok(value.get("ok").cloned().unwrap_or(value));
            }
            Err(err) if err.retryable() && attempt < inner.config.retry.max_retries => {
                // A task cancelled mid-flight is not worth re-dispatching.
                let still_running = {
                    let queue = inner.queue.lock().await;
                    queue.status_of(&task.id) == Some(TaskStatus::Running)
                };
                if !still_running {
                    let _ = inner.registry.release_dispatch(&agent_id).await;
                    return;
                }
                let backoff = inner.config.retry.backoff_for(attempt);
                attempt += 1;
                inner.retried.fetch_add(1, Ordering::Relaxed);
                warn!(
                    task_id = %task.id,
                    agent = %agent_id,
                    attempt = attempt,
                    error = %err,
                    "Dispatch attempt failed, backing off"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(err) => break Err(err),
        }
    };

    match outcome {
        Ok(result) => on_dispatch_success(inner, &task.id, &agent_id, result).await,
        Err(err) => on_dispatch_failure(inner, &task.id, &agent_id, err).await,
    }
}

/// Candidate resolution order: explicit agent, capability index, every
/// idle agent.
async fn resolve_candidates(inner: &Arc<Inner>, task: &Task) -> Vec<AgentSnapshot> {
    if let Some(agent_id) = &task.agent_id {
        inner.registry.snapshot(&[agent_id.clone()]).await
    } else if let Some(capability) = &task.capability {
        let ids = inner.registry.find_by_capability(capability).await;
        inner.registry.snapshot(&ids).await
    } else {
        inner.registry.idle_snapshots().await
    }
}

async fn on_dispatch_success(
    inner: &Arc<Inner>,
    task_id: &str,
    agent_id: &str,
    result: serde_json::Value,
) {
    let newly_ready = {
        let mut queue = inner.queue.lock().await;
        match queue.status_of(task_id) {
            Some(TaskStatus::Running) => queue.complete(task_id, result.clone()).ok(),
            // Cancelled mid-flight: the result is dropped on arrival.
            _ => None,
        }
    };

    match newly_ready {
        Some(ready) => {
            let _ = inner.registry.finish_dispatch(agent_id, true).await;
            publish_task_event(
                inner,
                task_id,
                TaskStatus::Completed,
                json!({ "agent_id": agent_id, "result": result }),
            );
            info!(task_id = %task_id, agent = %agent_id, unblocked = ready.len(), "Task completed");
            for id in ready {
                publish_task_event(inner, &id, TaskStatus::Queued, json!({}));
                inner.queue_notify.notify_one();
            }
        }
        None => {
            debug!(task_id = %task_id, "Dropping result for cancelled task");
            let _ = inner.registry.release_dispatch(agent_id).await;
        }
    }
}

async fn on_dispatch_failure(inner: &Arc<Inner>, task_id: &str, agent_id: &str, err: HiveError) {
    let kind = match &err {
        HiveError::Timeout(_) => "dispatch-timeout",
        HiveError::Bus(_) | HiveError::Io(_) => "bus-error",
        HiveError::Agent(_) => "agent-error",
        other => other.kind(),
    };
    let failure = TaskFailure::new(kind, err.to_string(), false);

    let cascaded = {
        let mut queue = inner.queue.lock().await;
        match queue.status_of(task_id) {
            Some(TaskStatus::Running) => queue.fail(task_id, failure.clone()).ok(),
            _ => None,
        }
    };

    let Some(cascaded) = cascaded else {
        // The task reached a terminal state some other way (cancel).
        let _ = inner.registry.release_dispatch(agent_id).await;
        return;
    };

    error!(task_id = %task_id, agent = %agent_id, kind = %kind, "Task failed");
    publish_task_event(
        inner,
        task_id,
        TaskStatus::Failed,
        json!({ "agent_id": agent_id, "failure": failure }),
    );
    for id in cascaded {
        publish_task_event(
            inner,
            &id,
            TaskStatus::Cancelled,
            json!({ "reason": UPSTREAM_FAILED }),
        );
    }

    // Record the outcome and apply the rolling health policy.
    if let Ok((rate, samples)) = inner.registry.finish_dispatch(agent_id, false).await {
        if samples >= inner.config.health.window && rate < inner.config.health.min_success_rate {
            warn!(
                agent = %agent_id,
                success_rate = rate,
                "Agent below health threshold, demoting to error"
            );
            let _ = inner.registry.set_status(agent_id, AgentStatus::Error).await;
            inner
                .bus
                .publish(
                    topics::ORCHESTRATOR,
                    &topics::agent_event("status_changed"),
                    json!({ "agent_id": agent_id, "status": "error" }),
                )
                .ok();
        }
    }
}

fn publish_task_event(inner: &Arc<Inner>, task_id: &str, status: TaskStatus, extra: serde_json::Value) {
    let mut payload = json!({
        "task_id": task_id,
        "status": status,
    });
    if let (Some(base), Some(extension)) = (payload.as_object_mut(), extra.as_object()) {
        for (key, value) in extension {
            base.insert(key.clone(), value.clone());
        }
    }
    inner
        .bus
        .publish(topics::ORCHESTRATOR, &topics::task_event(status), payload)
        .ok();
}

// ---------------------------------------------------------------------------
// Background health sweep
// ---------------------------------------------------------------------------

/// Periodic supervised loop: publishes a stats snapshot for external
/// observers. Runs under the orchestrator's shutdown signal.
async fn sweep_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(inner.config.sweep_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        let (task_counts, queued, waiting) = {
            let queue = inner.queue.lock().await;
            (queue.counts(), queue.queued_len(), queue.waiting_len())
        };
        let agent_counts = inner.registry.agent_counts().await;
        let payload = json!({
            "queued": queued,
            "waiting": waiting,
            "tasks": task_counts
                .iter()
                .map(|(s, n)| (s.to_string(), *n))
                .collect::<HashMap<String, usize>>(),
            "agents": agent_counts
                .iter()
                .map(|(s, n)| (s.to_string(), *n))
                .collect::<HashMap<String, usize>>(),
            "dispatched": inner.dispatched.load(Ordering::Relaxed),
            "retried": inner.retried.load(Ordering::Relaxed),
        });
        inner
            .bus
            .publish(topics::ORCHESTRATOR, topics::STATS, payload)
            .ok();
        debug!(queued = queued, waiting = waiting, "Health sweep");
    }
    debug!("Health sweep stopped");
}
