use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type HiveResult<T> = Result<T, HiveError>;

/// Error taxonomy shared by every subsystem.
///
/// Dispatch-layer errors (`Busy`, `Timeout`, `Bus`) are recovered locally by
/// retry; everything else surfaces to the caller or to the task's terminal
/// state.
#[derive(Error, Debug)]
pub enum HiveError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("No consensus: {0}")]
    NoConsensus(String),

    #[error("Pattern error: {0}")]
    Pattern(String),

    #[error("Decomposition error: {0}")]
    Decomposition(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HiveError {
    /// Stable machine-readable kind, used in error payloads and bus replies.
    pub fn kind(&self) -> &'static str {
        match self {
            HiveError::Validation(_) => "validation",
            HiveError::NotFound(_) => "not-found",
            HiveError::State(_) => "state",
            HiveError::Busy(_) => "busy",
            HiveError::Timeout(_) => "timeout",
            HiveError::Bus(_) => "bus-error",
            HiveError::Agent(_) => "agent-error",
            HiveError::Cancelled(_) => "cancelled",
            HiveError::NoConsensus(_) => "no-consensus",
            HiveError::Pattern(_) => "pattern",
            HiveError::Decomposition(_) => "decomposition",
            HiveError::Json(_) => "validation",
            HiveError::Io(_) => "bus-error",
        }
    }

    /// Whether the dispatch layer may retry after this error.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            HiveError::Busy(_) | HiveError::Timeout(_) | HiveError::Bus(_) | HiveError::Io(_)
        )
    }
}

/// Serializable failure descriptor attached to a task that reached `failed`
/// or `cancelled`, and carried in error replies on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: String,
    pub message: String,
    pub retryable: bool,
}

impl TaskFailure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            retryable,
        }
    }

    /// Cancellation descriptor with the given reason (e.g. `upstream-failed`).
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new("cancelled", reason, false)
    }
}

impl From<&HiveError> for TaskFailure {
    fn from(err: &HiveError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            retryable: err.retryable(),
        }
    }
}

impl From<TaskFailure> for HiveError {
    fn from(failure: TaskFailure) -> Self {
        match failure.kind.as_str() {
            "validation" => HiveError::Validation(failure.message),
            "not-found" => HiveError::NotFound(failure.message),
            "state" => HiveError::State(failure.message),
            "busy" => HiveError::Busy(failure.message),
            "timeout" | "dispatch-timeout" => HiveError::Timeout(failure.message),
            "bus-error" => HiveError::Bus(failure.message),
            "cancelled" => HiveError::Cancelled(failure.message),
            "no-consensus" => HiveError::NoConsensus(failure.message),
            "pattern" => HiveError::Pattern(failure.message),
            "decomposition" => HiveError::Decomposition(failure.message),
            _ => HiveError::Agent(failure.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(HiveError::Timeout("t".into()).retryable());
        assert!(HiveError::Bus("b".into()).retryable());
        assert!(HiveError::Busy("all full".into()).retryable());
        assert!(!HiveError::Agent("broken input".into()).retryable());
        assert!(!HiveError::Validation("bad".into()).retryable());
        assert!(!HiveError::Cancelled("upstream-failed".into()).retryable());
    }

    #[test]
    fn test_failure_round_trip() {
        let err = HiveError::Agent("model refused".into());
        let failure = TaskFailure::from(&err);
        assert_eq!(failure.kind, "agent-error");
        assert!(!failure.retryable);

        let back: HiveError = failure.into();
        assert!(matches!(back, HiveError::Agent(_)));
    }

    #[test]
    fn test_failure_serialization() {
        let failure = TaskFailure::new("dispatch-timeout", "no reply in 30s", true);
        let json = serde_json::to_string(&failure).unwrap();
        let parsed: TaskFailure = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, failure);
    }
}
