//! Reserved topic names for lifecycle events and agent dispatch.

use crate::task::TaskStatus;
use uuid::Uuid;

/// Sender id the orchestrator uses on the bus.
pub const ORCHESTRATOR: &str = "orchestrator";

/// `orchestrator.task.{queued,started,completed,failed,cancelled}`.
///
/// `Waiting` has no external event; `Running` is published as `started`.
pub fn task_event(status: TaskStatus) -> String {
    let suffix = match status {
        TaskStatus::Queued | TaskStatus::Waiting => "queued",
        TaskStatus::Running => "started",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Cancelled => "cancelled",
    };
    format!("orchestrator.task.{suffix}")
}

/// `orchestrator.agent.{registered,status_changed,unregistered}`.
pub fn agent_event(kind: &str) -> String {
    format!("orchestrator.agent.{kind}")
}

/// Periodic stats snapshots from the orchestrator's health sweep.
pub const STATS: &str = "orchestrator.stats";

/// Dispatch topic an agent endpoint listens on.
pub fn agent_task(agent_id: &str) -> String {
    format!("agent.{agent_id}.task")
}

/// Control topic for cancellation and other out-of-band signals.
pub fn agent_control(agent_id: &str) -> String {
    format!("agent.{agent_id}.control")
}

/// Reply topic for a request published on `topic`.
pub fn reply(topic: &str) -> String {
    format!("{topic}.reply")
}

/// `session.<mode>.{started,round,completed}`.
pub fn session_event(mode: &str, phase: &str) -> String {
    format!("session.{mode}.{phase}")
}

/// Shared blackboard topic for a swarm session.
pub fn swarm_blackboard(session_id: Uuid) -> String {
    format!("session.swarm.{session_id}.blackboard")
}

/// Direct-coordination topic for one participant of a swarm session.
pub fn swarm_direct(session_id: Uuid, agent_id: &str) -> String {
    format!("session.swarm.{session_id}.agent.{agent_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_event_names() {
        assert_eq!(task_event(TaskStatus::Queued), "orchestrator.task.queued");
        assert_eq!(task_event(TaskStatus::Running), "orchestrator.task.started");
        assert_eq!(
            task_event(TaskStatus::Cancelled),
            "orchestrator.task.cancelled"
        );
    }

    #[test]
    fn test_agent_topics() {
        assert_eq!(agent_task("r1"), "agent.r1.task");
        assert_eq!(agent_control("r1"), "agent.r1.control");
        assert_eq!(reply("agent.r1.task"), "agent.r1.task.reply");
    }

    #[test]
    fn test_session_topics() {
        assert_eq!(session_event("debate", "round"), "session.debate.round");
    }
}
