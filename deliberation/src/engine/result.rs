//! The assembled outcome of one deliberation.

use party_machine::Proposal;
use serde::{Deserialize, Serialize};

use super::state::RoundTrace;
use crate::emergence::EmergenceSignal;
use crate::influence::InfluenceWeight;
use crate::roles::Role;

/// Why the round loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    /// Ran every requested round.
    Completed,
    /// Halted right after `round` produced strong emergence.
    StrongEmergence { round: u32 },
    /// Wall-clock budget ran out; `round` was the last one completed.
    BudgetExhausted { round: u32 },
    /// Caller cancelled; `round` was the last one completed.
    Cancelled { round: u32 },
}

impl Termination {
    pub fn is_early(&self) -> bool {
        !matches!(self, Self::Completed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::StrongEmergence { .. } => "strong_emergence",
            Self::BudgetExhausted { .. } => "budget_exhausted",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliberationResult {
    /// Latest proposal per agent, in first-seen order.
    pub proposals: Vec<Proposal>,
    pub rounds: Vec<RoundTrace>,
    pub emergence_signals: Vec<EmergenceSignal>,
    pub influence_weights: Vec<InfluenceWeight>,
    pub termination: Termination,
}

impl DeliberationResult {
    pub fn has_emergence(&self) -> bool {
        !self.emergence_signals.is_empty()
    }

    /// Highest novelty across all signals; 0 without any.
    pub fn peak_novelty(&self) -> f64 {
        self.emergence_signals
            .iter()
            .map(|s| s.novelty_score)
            .fold(0.0, f64::max)
    }

    pub fn final_role(&self) -> Option<Role> {
        self.rounds.last().map(|r| r.role)
    }

    pub fn total_revisions(&self) -> usize {
        self.rounds.iter().map(|r| r.n_revised).sum()
    }

    pub fn summary_line(&self) -> String {
        format!(
            "[{}] {} rounds | {} proposals | {} revisions | {} signals (peak {:.2})",
            self.termination.label().to_uppercase(),
            self.rounds.len(),
            self.proposals.len(),
            self.total_revisions(),
            self.emergence_signals.len(),
            self.peak_novelty()
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
