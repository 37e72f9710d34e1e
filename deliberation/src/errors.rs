//! Deliberation error taxonomy with recovery classification.
//!
//! Every failure the core can observe falls into one [`FailureClass`].
//! Callers query `is_recoverable()` / `failure_class()` without string
//! matching.
//!
//! ## Failure classes
//!
//! | Class               | Recoverable | Handled by                         |
//! |---------------------|-------------|------------------------------------|
//! | AgentFailure        | yes         | `ExecutionPool`, recorded in trace |
//! | AgentTimeout        | yes         | `ExecutionPool`, recorded in trace |
//! | EncodingFailure     | yes         | `SemanticEncoder` keyword fallback |
//! | InvalidRoundState   | no          | returned from `deliberate()`       |

use std::fmt;

use party_machine::{AgentError, RunResult};
use thiserror::Error;

use crate::similarity::EncodingError;

/// Coarse classification of anything that can go wrong during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Agent logic raised an error or panicked.
    AgentFailure,
    /// Agent did not finish before its deadline.
    AgentTimeout,
    /// Embedding backend unavailable or erroring.
    EncodingFailure,
    /// Internal invariant violated; indicates a defect.
    InvalidRoundState,
}

impl FailureClass {
    pub fn is_recoverable(self) -> bool {
        !matches!(self, Self::InvalidRoundState)
    }

    /// Classify one pool result; `None` for a successful agent.
    pub fn of_run(result: &RunResult) -> Option<Self> {
        if result.ok {
            None
        } else if result.timed_out {
            Some(Self::AgentTimeout)
        } else {
            Some(Self::AgentFailure)
        }
    }

    /// Every backend error is an encoding failure, absorbed by the fallback.
    pub fn of_encoding_error(_err: &EncodingError) -> Self {
        Self::EncodingFailure
    }

    pub fn of_agent_error(err: &AgentError) -> Self {
        if err.is_timeout() {
            Self::AgentTimeout
        } else {
            Self::AgentFailure
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AgentFailure => write!(f, "agent_failure"),
            Self::AgentTimeout => write!(f, "agent_timeout"),
            Self::EncodingFailure => write!(f, "encoding_failure"),
            Self::InvalidRoundState => write!(f, "invalid_round_state"),
        }
    }
}

/// Errors surfaced by the deliberation engine and its configuration.
#[derive(Debug, Error)]
pub enum DeliberationError {
    /// Round bookkeeping went out of sequence.
    #[error("invalid round state: expected round {expected}, got {got}")]
    InvalidRoundState { expected: u32, got: u32 },

    /// Configuration failed validation.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl DeliberationError {
    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            Self::InvalidRoundState { .. } => Some(FailureClass::InvalidRoundState),
            Self::Configuration(_) => None,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.failure_class().is_some_and(FailureClass::is_recoverable)
    }
}
