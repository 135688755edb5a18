//! Orchestration engine: task queue, dependency resolution, worker pool,
//! and lifecycle management.
//!
//! The orchestrator is the composition root of the core. It owns the task
//! table and work queue, holds the single-writer contract on agent status
//! and load counters, dispatches over the communication bus, and exposes
//! the collaboration modes by implementing their `SubtaskExecutor` seam.
//!
//! # Main types
//!
//! - [`Orchestrator`] — admission API, worker pool, retry and cancellation.
//! - [`TaskQueue`] — priority heap plus waiting set with cascade semantics.
//! - [`AgentSpawner`] — bounded on-demand agent pool.
//! - [`AgentEndpoint`] / [`serve_endpoint`] — the bridge between the bus
//!   and an agent implementation.

pub mod endpoint;
pub mod engine;
pub mod queue;
pub mod spawner;

pub use endpoint::{serve_endpoint, AgentEndpoint, EndpointTask};
pub use engine::{Orchestrator, Stats};
pub use queue::{CancelDisposition, TaskQueue, UPSTREAM_FAILED};
pub use spawner::{AgentSpawner, SpawnerStats};
