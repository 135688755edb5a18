use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The pub/sub envelope. Messages are not persisted across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    pub id: Uuid,
    pub sender: String,
    /// Dotted topic, e.g. `orchestrator.task.completed`.
    pub topic: String,
    pub payload: serde_json::Value,
    /// Ties a reply to its request.
    #[serde(default)]
    pub correlation_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl BusMessage {
    pub fn new(sender: impl Into<String>, topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            topic: topic.into(),
            payload,
            correlation_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let msg = BusMessage::new("r1", "agent.r1.result", serde_json::json!({"ok": 1}))
            .with_correlation(Uuid::new_v4());
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: BusMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.topic, "agent.r1.result");
        assert_eq!(parsed.correlation_id, msg.correlation_id);
    }
}
