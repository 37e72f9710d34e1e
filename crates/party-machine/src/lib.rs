//! Party Machine: the concurrent execution substrate for deliberation.
//!
//! Runs many agent calls in parallel against a single deadline, isolating
//! each agent's failures, panics and timeouts, and reporting one
//! [`RunResult`] plus one completion event per agent.
//!
//! # Modules
//!
//! - [`proposal`]: the immutable candidate answer produced by an agent call
//! - [`agent`]: the `Agent` capability trait and per-call context
//! - [`pool`]: `ExecutionPool`, the deadline-bounded fan-out/fan-in
//! - [`events`]: broadcast trace sink for completions and round summaries
//! - [`telemetry`]: `tracing` span helpers shared with the deliberation crate

pub mod agent;
pub mod events;
pub mod pool;
pub mod proposal;
pub mod telemetry;

pub use agent::{Agent, AgentCapability, AgentContext, AgentError, AgentTask, SharedAgent};
pub use events::{DeliberationEvent, EventBus, EventFilter, SharedEventBus};
pub use pool::{ExecutionPool, PoolOutput, RunResult, DEFAULT_MAX_WORKERS};
pub use proposal::{Proposal, DEFAULT_CONFIDENCE};
