//! Trace sink for agent execution and deliberation rounds.
//!
//! # Event Flow
//!
//! ```text
//! ┌────────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ ExecutionPool  │────▶│  Event Bus   │────▶│  Subscribers │
//! │ Deliberation   │     │  (broadcast) │     │ (progress UI,│
//! │ Engine         │     └──────────────┘     │  trace store)│
//! └────────────────┘                          └──────────────┘
//! ```
//!
//! The pool publishes one `AgentCompleted` per agent, in first-finished
//! order. The engine publishes one `RoundCompleted` per round.

pub mod bus;
pub mod types;

pub use bus::{drain_events, EventBus, EventFilter, FilteredReceiver, SharedEventBus};
pub use types::DeliberationEvent;
