//! Shared foundation for the Taskhive orchestration core.
//!
//! Defines the task model, the error taxonomy, named configuration with
//! required defaults, and the reserved topic names used on the bus. Every
//! other crate in the workspace builds on these types.

pub mod config;
pub mod error;
pub mod task;
pub mod topics;

pub use config::{
    BalanceStrategy, BusConfig, HealthConfig, OrchestratorConfig, RetryConfig, SessionConfig,
    SpawnerConfig,
};
pub use error::{HiveError, HiveResult, TaskFailure};
pub use task::{Task, TaskSpec, TaskStatus};
