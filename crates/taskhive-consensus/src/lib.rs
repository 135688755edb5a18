//! Consensus primitives and multi-agent collaboration modes.
//!
//! The voting engine turns sets of `AgentOpinion`s into decisions under
//! majority, weighted, unanimous, or threshold rules. The collaboration
//! modes (debate, ensemble, pipeline, critique, swarm) coordinate agents
//! through the `SubtaskExecutor` seam — they never dispatch directly, so
//! the same protocol runs against the real orchestrator or a scripted
//! executor in tests.

pub mod decision;
pub mod executor;
pub mod modes;
pub mod session;
pub mod vote;

pub use decision::Decision;
pub use executor::{ModeContext, SubtaskExecutor};
pub use modes::{
    Coordination, CritiqueConfig, CritiqueMode, DebateConfig, DebateMode, EnsembleConfig,
    EnsembleMode, FailurePolicy, HandoffFormat, Judge, MergeStrategy, PipelineConfig,
    PipelineMode, SwarmConfig, SwarmMode,
};
pub use session::{
    CollaborationMode, CollaborationResult, CollaborationSession, TranscriptEntry,
};
pub use vote::{AgentOpinion, ConsensusEngine, ConsensusResult, VoteStrategy};
