//! Task decomposer: turns a high-level request into a dependency DAG of
//! subtasks.
//!
//! Decomposition is pattern-driven. Each pattern pairs a matcher predicate
//! with an ordered list of subtask templates; the first matching pattern in
//! registration order wins and its expansion is checked for DAG validity
//! before it leaves this crate.

pub mod decomposer;
pub mod pattern;
pub mod plan;

pub use decomposer::{builtin_patterns, DecomposeHints, Decomposer};
pub use pattern::{Pattern, PatternMatcher, SubTaskTemplate};
pub use plan::{DecompositionPlan, ExecutionStrategy, SubTaskSpec};
