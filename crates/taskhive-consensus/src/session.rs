use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use taskhive_bus::Bus;
use taskhive_core::topics;
use uuid::Uuid;

/// The collaboration protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaborationMode {
    Debate,
    Ensemble,
    Pipeline,
    Critique,
    Swarm,
}

impl std::fmt::Display for CollaborationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CollaborationMode::Debate => "debate",
            CollaborationMode::Ensemble => "ensemble",
            CollaborationMode::Pipeline => "pipeline",
            CollaborationMode::Critique => "critique",
            CollaborationMode::Swarm => "swarm",
        };
        write!(f, "{s}")
    }
}

/// One recorded contribution within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub agent_id: String,
    pub round: u32,
    /// Contribution kind: `argument`, `verdict`, `output`, `stage`,
    /// `draft`, `review`, `subtask`.
    pub kind: String,
    pub content: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Unified result surfaced by every collaboration mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationResult {
    pub mode: CollaborationMode,
    pub output: serde_json::Value,
    pub confidence: f64,
    pub participants: Vec<String>,
    pub transcript: Vec<TranscriptEntry>,
}

/// Transient state of one collaboration run. Lives only while the session
/// is active; its subtasks run through the normal orchestrator path.
pub struct CollaborationSession {
    pub id: Uuid,
    pub mode: CollaborationMode,
    pub participants: Vec<String>,
    pub round: u32,
    pub transcript: Vec<TranscriptEntry>,
    bus: Bus,
}

impl CollaborationSession {
    pub fn new(mode: CollaborationMode, participants: Vec<String>, bus: Bus) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            participants,
            round: 0,
            transcript: Vec::new(),
            bus,
        }
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Short id used to prefix the session's subtask ids.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    /// Id for one subtask spawned by this session.
    pub fn subtask_id(&self, suffix: &str) -> String {
        format!("{}-{}-{}", self.short_id(), self.mode, suffix)
    }

    pub fn record(
        &mut self,
        agent_id: impl Into<String>,
        round: u32,
        kind: impl Into<String>,
        content: serde_json::Value,
    ) {
        self.transcript.push(TranscriptEntry {
            agent_id: agent_id.into(),
            round,
            kind: kind.into(),
            content,
            timestamp: Utc::now(),
        });
    }

    /// Transcript text for prompts that show agents the history so far.
    pub fn transcript_text(&self) -> String {
        self.transcript
            .iter()
            .map(|e| {
                format!(
                    "[round {} | {} | {}] {}",
                    e.round, e.agent_id, e.kind, e.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn emit_started(&self, detail: serde_json::Value) {
        self.emit("started", detail);
    }

    pub fn emit_round(&self, round: u32, detail: serde_json::Value) {
        let mut payload = detail;
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("round".into(), json!(round));
        }
        self.emit("round", payload);
    }

    pub fn emit_completed(&self, detail: serde_json::Value) {
        self.emit("completed", detail);
    }

    fn emit(&self, phase: &str, detail: serde_json::Value) {
        let topic = topics::session_event(&self.mode.to_string(), phase);
        let payload = json!({
            "session_id": self.id,
            "mode": self.mode,
            "participants": self.participants,
            "detail": detail,
        });
        // Lifecycle events are best-effort; a malformed topic cannot occur
        // for the reserved names.
        let _ = self.bus.publish(&format!("session.{}", self.short_id()), &topic, payload);
    }

    /// Consume the session into the unified result.
    pub fn into_result(self, output: serde_json::Value, confidence: f64) -> CollaborationResult {
        CollaborationResult {
            mode: self.mode,
            output,
            confidence,
            participants: self.participants,
            transcript: self.transcript,
        }
    }
}
