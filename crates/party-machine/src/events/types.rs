//! Event types emitted during agent execution and deliberation.
//!
//! These are the trace-sink payloads: one `AgentCompleted` per agent per
//! pool invocation, one `RoundCompleted` per deliberation round, plus
//! emergence and termination markers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// All observable deliberation events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliberationEvent {
    /// An agent's task resolved (or was abandoned at the deadline)
    AgentCompleted {
        run_id: String,
        round: u32,
        name: String,
        proposal_count: usize,
        latency_ms: u64,
        ok: bool,
        timed_out: bool,
        timestamp: DateTime<Utc>,
    },

    /// A round's results were merged and its trace recorded
    RoundCompleted {
        run_id: String,
        round: u32,
        n_proposals: usize,
        n_revised: usize,
        role: String,
        timestamp: DateTime<Utc>,
    },

    /// A revision crossed the novelty threshold
    EmergenceDetected {
        run_id: String,
        round: u32,
        source: String,
        novelty: f64,
        timestamp: DateTime<Utc>,
    },

    /// The deliberation stopped before its round limit
    DeliberationHalted {
        run_id: String,
        round: u32,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The deliberation finished and its result was assembled
    DeliberationCompleted {
        run_id: String,
        rounds: u32,
        n_proposals: usize,
        peak_novelty: f64,
        timestamp: DateTime<Utc>,
    },
}

impl DeliberationEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::AgentCompleted { timestamp, .. }
            | Self::RoundCompleted { timestamp, .. }
            | Self::EmergenceDetected { timestamp, .. }
            | Self::DeliberationHalted { timestamp, .. }
            | Self::DeliberationCompleted { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AgentCompleted { .. } => "agent_completed",
            Self::RoundCompleted { .. } => "round_completed",
            Self::EmergenceDetected { .. } => "emergence_detected",
            Self::DeliberationHalted { .. } => "deliberation_halted",
            Self::DeliberationCompleted { .. } => "deliberation_completed",
        }
    }

    /// Get the run ID this event belongs to
    pub fn run_id(&self) -> &str {
        match self {
            Self::AgentCompleted { run_id, .. }
            | Self::RoundCompleted { run_id, .. }
            | Self::EmergenceDetected { run_id, .. }
            | Self::DeliberationHalted { run_id, .. }
            | Self::DeliberationCompleted { run_id, .. } => run_id,
        }
    }

    /// Get the round number, if the event is scoped to one round
    pub fn round(&self) -> Option<u32> {
        match self {
            Self::AgentCompleted { round, .. }
            | Self::RoundCompleted { round, .. }
            | Self::EmergenceDetected { round, .. }
            | Self::DeliberationHalted { round, .. } => Some(*round),
            Self::DeliberationCompleted { .. } => None,
        }
    }
}
