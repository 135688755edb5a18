use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use taskhive_bus::{Bus, BusMessage};
use taskhive_core::{topics, HiveResult, TaskFailure};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A dispatch handed to an agent endpoint.
#[derive(Debug, Clone)]
pub struct EndpointTask {
    pub task_id: String,
    pub description: String,
    pub capability: Option<String>,
    pub priority: i32,
}

impl EndpointTask {
    fn from_message(msg: &BusMessage) -> Self {
        Self {
            task_id: msg
                .payload
                .get("task_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            description: msg
                .payload
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            capability: msg
                .payload
                .get("capability")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            priority: msg
                .payload
                .get("priority")
                .and_then(|v| v.as_i64())
                .unwrap_or(0) as i32,
        }
    }
}

/// The opaque capability an agent exposes to the core. How an endpoint
/// produces its output is outside the core's scope.
#[async_trait]
pub trait AgentEndpoint: Send + Sync {
    async fn handle(&self, task: EndpointTask) -> HiveResult<serde_json::Value>;

    /// Cooperative cancellation notice; the default ignores it.
    async fn on_cancel(&self, _task_id: &str) {}
}

/// Bridge an endpoint onto the bus: listens on the agent's task and
/// control topics, runs the endpoint, and replies on the correlated reply
/// topic. Each task is handled on its own spawned task so an agent with
/// capacity > 1 serves dispatches concurrently.
pub fn serve_endpoint(
    bus: &Bus,
    agent_id: &str,
    endpoint: Arc<dyn AgentEndpoint>,
) -> HiveResult<JoinHandle<()>> {
    let task_sub = bus.subscribe(&topics::agent_task(agent_id))?;
    let control_sub = bus.subscribe(&topics::agent_control(agent_id))?;
    let bus = bus.clone();
    let agent_id = agent_id.to_string();

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = task_sub.recv() => {
                    let Some(msg) = msg else { break };
                    let bus = bus.clone();
                    let endpoint = endpoint.clone();
                    let agent_id = agent_id.clone();
                    tokio::spawn(async move {
                        let task = EndpointTask::from_message(&msg);
                        debug!(agent = %agent_id, task_id = %task.task_id, "Endpoint handling task");
                        let reply = match endpoint.handle(task).await {
                            Ok(output) => json!({ "ok": output }),
                            Err(err) => json!({ "err": TaskFailure::from(&err) }),
                        };
                        if let Err(err) = bus.respond(&msg, &agent_id, reply) {
                            warn!(agent = %agent_id, error = %err, "Endpoint reply failed");
                        }
                    });
                }
                msg = control_sub.recv() => {
                    let Some(msg) = msg else { break };
                    if msg.payload.get("action").and_then(|a| a.as_str()) == Some("cancel") {
                        let task_id = msg
                            .payload
                            .get("task_id")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default();
                        endpoint.on_cancel(task_id).await;
                        let _ = bus.respond(&msg, &agent_id, json!({ "ok": "cancelled" }));
                    }
                }
            }
        }
        debug!(agent = %agent_id, "Endpoint stopped");
    }))
}
