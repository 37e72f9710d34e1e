//! Agent capability contract.
//!
//! An agent is anything that can turn an [`AgentContext`] into proposals.
//! Whether the pool drives it on the event loop or offloads it to a worker
//! thread is decided by [`Agent::capability`], declared by the agent itself
//! at registration time. The pool never inspects an agent at run time to find out.
//!
//! ## Failure classes
//!
//! | Variant       | Raised by               | Recorded as            |
//! |---------------|-------------------------|------------------------|
//! | `Failure`     | agent logic             | `ok=false`, error text |
//! | `Timeout`     | pool deadline           | `timed_out=true`       |
//! | `Panicked`    | pool unwind boundary    | `ok=false`, error text |
//! | `Unsupported` | missing async entry     | `ok=false`, error text |
//!
//! None of these ever escape `ExecutionPool::run`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::proposal::Proposal;

/// How the pool should drive an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentCapability {
    /// Only `propose()` is available; runs on the bounded worker pool.
    Blocking,
    /// `propose_async()` is implemented; runs directly on the event loop.
    NativeAsync,
}

impl std::fmt::Display for AgentCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocking => write!(f, "blocking"),
            Self::NativeAsync => write!(f, "native_async"),
        }
    }
}

/// Error raised inside (or on behalf of) a single agent call.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The agent's own logic failed.
    #[error("agent failure: {0}")]
    Failure(String),

    /// The call did not finish before its deadline.
    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// The call panicked; the payload message is preserved when it is a string.
    #[error("agent panicked: {0}")]
    Panicked(String),

    /// The agent declared a capability it does not implement.
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AgentError {
    pub fn failure(msg: impl Into<String>) -> Self {
        Self::Failure(msg.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// The request handed to an agent for one round.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentContext {
    /// Deliberation run this call belongs to.
    pub run_id: String,
    /// Full prompt text, including any role instruction prefix.
    pub prompt: String,
    /// Round number (1-indexed).
    pub round: u32,
    /// Role label for this round (`standard`, `thesis`, ...).
    pub role: String,
    /// Author whose argument triggered this revision, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterpart: Option<String>,
    /// Opposing or aggregated text the agent must respond to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterargument: Option<String>,
    /// The agent's own proposal from the previous round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Proposal>,
}

impl AgentContext {
    pub fn new(run_id: impl Into<String>, prompt: impl Into<String>, round: u32) -> Self {
        Self {
            run_id: run_id.into(),
            prompt: prompt.into(),
            round,
            role: "standard".to_string(),
            counterpart: None,
            counterargument: None,
            previous: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_counterpart(
        mut self,
        counterpart: impl Into<String>,
        counterargument: impl Into<String>,
    ) -> Self {
        self.counterpart = Some(counterpart.into());
        self.counterargument = Some(counterargument.into());
        self
    }

    pub fn with_previous(mut self, previous: Proposal) -> Self {
        self.previous = Some(previous);
        self
    }

    /// Whether this context asks for a revision rather than a first answer.
    pub fn is_revision(&self) -> bool {
        self.round > 1
    }
}

/// A reasoning agent ("philosopher").
///
/// Implementors must provide the blocking `propose`. Agents that can run on
/// the event loop override `capability` to return `NativeAsync` and
/// implement `propose_async`.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable agent name; also the expected author of its proposals.
    fn name(&self) -> &str;

    fn capability(&self) -> AgentCapability {
        AgentCapability::Blocking
    }

    /// Per-agent timeout, tighter than the batch deadline.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Blocking entry point. Runs on a worker thread.
    fn propose(&self, ctx: &AgentContext) -> Result<Vec<Proposal>, AgentError>;

    /// Native async entry point, used when `capability()` is `NativeAsync`.
    async fn propose_async(&self, _ctx: &AgentContext) -> Result<Vec<Proposal>, AgentError> {
        Err(AgentError::Unsupported(format!(
            "{} declares native async support but does not implement propose_async",
            self.name()
        )))
    }
}

/// Shared handle to an agent.
pub type SharedAgent = Arc<dyn Agent>;

/// One unit of work for the pool: an agent plus its own context.
#[derive(Clone)]
pub struct AgentTask {
    pub agent: SharedAgent,
    pub context: AgentContext,
}

impl AgentTask {
    pub fn new(agent: SharedAgent, context: AgentContext) -> Self {
        Self { agent, context }
    }
}

impl std::fmt::Debug for AgentTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTask")
            .field("agent", &self.agent.name())
            .field("capability", &self.agent.capability())
            .field("round", &self.context.round)
            .finish()
    }
}
