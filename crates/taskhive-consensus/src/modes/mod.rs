//! The five collaboration protocols, each a coordinator over the
//! `SubtaskExecutor` seam.

pub mod critique;
pub mod debate;
pub mod ensemble;
pub mod pipeline;
pub mod swarm;

pub use critique::{CritiqueConfig, CritiqueMode};
pub use debate::{DebateConfig, DebateMode, Judge};
pub use ensemble::{EnsembleConfig, EnsembleMode, MergeStrategy};
pub use pipeline::{FailurePolicy, HandoffFormat, PipelineConfig, PipelineMode};
pub use swarm::{Coordination, SwarmConfig, SwarmMode};
