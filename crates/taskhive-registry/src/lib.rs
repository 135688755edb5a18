//! Agent registry: agent-type catalog, live agent records, and the
//! capability index used for task routing.
//!
//! The registry owns `AgentType` definitions and the live `Agent` table.
//! Status and load counters follow a single-writer contract held by the
//! orchestrator; everyone else reads snapshots.

pub mod builtin;
pub mod registry;
pub mod types;

pub use builtin::builtin_types;
pub use registry::AgentRegistry;
pub use types::{
    Agent, AgentCategory, AgentFilter, AgentRegistration, AgentSnapshot, AgentStatus, AgentType,
    Capability, TypeFilter,
};
