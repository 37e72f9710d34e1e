//! Round bookkeeping: per-round traces and the append-only round log.

use chrono::{DateTime, Utc};
use party_machine::Proposal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::DeliberationError;
use crate::roles::Role;

/// Audit record of one deliberation round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundTrace {
    /// Round number (1-indexed).
    pub round_number: u32,
    /// Proposals on the board after merging this round.
    pub n_proposals: usize,
    /// Agents whose proposal was replaced this round.
    pub n_revised: usize,
    pub role: Role,
    /// Agents invoked this round that failed.
    #[serde(default)]
    pub n_failed: usize,
    #[serde(default)]
    pub n_timed_out: usize,
    #[serde(default)]
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl RoundTrace {
    pub fn new(round_number: u32, role: Role, started_at: DateTime<Utc>) -> Self {
        Self {
            round_number,
            n_proposals: 0,
            n_revised: 0,
            role,
            n_failed: 0,
            n_timed_out: 0,
            duration_ms: 0,
            started_at,
        }
    }

    pub fn status_line(&self) -> String {
        format!(
            "round {} [{}] proposals={} revised={} failed={} timed_out={} ({}ms)",
            self.round_number,
            self.role,
            self.n_proposals,
            self.n_revised,
            self.n_failed,
            self.n_timed_out,
            self.duration_ms
        )
    }
}

/// Append-only log of round traces; numbering must run 1, 2, 3, ...
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundLog {
    rounds: Vec<RoundTrace>,
}

impl RoundLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Round number the next trace must carry.
    pub fn next_round(&self) -> u32 {
        self.rounds.last().map_or(1, |r| r.round_number + 1)
    }

    pub fn push(&mut self, trace: RoundTrace) -> Result<(), DeliberationError> {
        let expected = self.next_round();
        if trace.round_number != expected {
            return Err(DeliberationError::InvalidRoundState {
                expected,
                got: trace.round_number,
            });
        }
        self.rounds.push(trace);
        Ok(())
    }

    pub fn last(&self) -> Option<&RoundTrace> {
        self.rounds.last()
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn as_slice(&self) -> &[RoundTrace] {
        &self.rounds
    }

    pub fn into_vec(self) -> Vec<RoundTrace> {
        self.rounds
    }
}

/// Latest proposal per agent, in first-seen order.
///
/// Proposal ids are kept unique across the board: a colliding id is
/// re-keyed to `{id}#{n}`.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProposalBoard {
    entries: Vec<(String, Proposal)>,
}

impl ProposalBoard {
    /// Seed from round-1 proposals; a later proposal by the same author wins.
    pub(crate) fn seeded(initial: Vec<Proposal>) -> Self {
        let mut board = Self::default();
        for proposal in initial {
            let agent = proposal.author().to_string();
            board.replace(&agent, proposal);
        }
        board
    }

    /// Replace `agent`'s entry (or append one). Returns the stored proposal.
    pub(crate) fn replace(&mut self, agent: &str, proposal: Proposal) -> &Proposal {
        let proposal = self.unique(agent, proposal);
        let idx = match self.entries.iter().position(|(a, _)| a == agent) {
            Some(idx) => {
                self.entries[idx].1 = proposal;
                idx
            }
            None => {
                self.entries.push((agent.to_string(), proposal));
                self.entries.len() - 1
            }
        };
        &self.entries[idx].1
    }

    pub(crate) fn get(&self, agent: &str) -> Option<&Proposal> {
        self.entries
            .iter()
            .find(|(a, _)| a == agent)
            .map(|(_, p)| p)
    }

    pub(crate) fn proposals(&self) -> Vec<Proposal> {
        self.entries.iter().map(|(_, p)| p.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn unique(&self, agent: &str, proposal: Proposal) -> Proposal {
        let taken = |id: &str| {
            self.entries
                .iter()
                .any(|(a, p)| a != agent && p.id() == id)
        };
        if !taken(proposal.id()) {
            return proposal;
        }
        let base = proposal.id().to_string();
        let mut n = 1;
        let mut candidate = format!("{base}#{n}");
        while taken(&candidate) {
            n += 1;
            candidate = format!("{base}#{n}");
        }
        warn!(agent, id = %base, rekeyed = %candidate, "duplicate proposal id re-keyed");
        proposal.with_id(candidate)
    }
}
