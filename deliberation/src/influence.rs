//! Influence attribution between agents.
//!
//! When an agent revises because of a counterpart's argument, the distance
//! its new text moved from its own round-1 baseline is credited to that
//! counterpart (the catalyst). Credit accumulates across rounds.

use std::collections::{BTreeMap, HashMap};

use party_machine::Proposal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::similarity::SharedEncoder;

/// Attributed influence of one catalyst over the agents it moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfluenceWeight {
    pub philosopher_id: String,
    /// Reviser name → accumulated non-negative score.
    pub influenced: BTreeMap<String, f64>,
}

impl InfluenceWeight {
    pub fn new(philosopher_id: impl Into<String>) -> Self {
        Self {
            philosopher_id: philosopher_id.into(),
            influenced: BTreeMap::new(),
        }
    }

    pub fn total(&self) -> f64 {
        self.influenced.values().sum()
    }
}

#[derive(Debug)]
pub struct InfluenceTracker {
    encoder: SharedEncoder,
    baseline: HashMap<String, String>,
    weights: BTreeMap<String, InfluenceWeight>,
}

impl InfluenceTracker {
    pub fn new(encoder: SharedEncoder) -> Self {
        Self {
            encoder,
            baseline: HashMap::new(),
            weights: BTreeMap::new(),
        }
    }

    /// Snapshot each author's text and clear accumulated weights.
    ///
    /// If an author appears more than once, the last proposal wins.
    pub fn set_baseline(&mut self, proposals: &[Proposal]) {
        self.baseline.clear();
        self.weights.clear();
        for p in proposals {
            self.baseline
                .insert(p.author().to_string(), p.content().to_string());
        }
    }

    pub fn has_baseline(&self) -> bool {
        !self.baseline.is_empty()
    }

    /// Credit each revision's movement to the catalyst in `revised_by[author]`.
    ///
    /// Revisions with no baseline entry, no catalyst, a self-catalyst, or a
    /// zero delta are skipped. With no baseline this is a no-op.
    pub fn update(&mut self, revised: &[Proposal], revised_by: &HashMap<String, String>) {
        if self.baseline.is_empty() {
            debug!("influence update skipped: no baseline");
            return;
        }

        for proposal in revised {
            let reviser = proposal.author();
            let Some(catalyst) = revised_by.get(reviser) else {
                continue;
            };
            if catalyst == reviser {
                continue;
            }
            let Some(original) = self.baseline.get(reviser) else {
                continue;
            };

            let delta = self.encoder.distance(original, proposal.content()).max(0.0);
            if delta <= 0.0 {
                continue;
            }

            *self
                .weights
                .entry(catalyst.clone())
                .or_insert_with(|| InfluenceWeight::new(catalyst.clone()))
                .influenced
                .entry(reviser.to_string())
                .or_insert(0.0) += delta;
        }
    }

    /// Every catalyst with at least one attribution, ordered by name.
    pub fn weights(&self) -> Vec<InfluenceWeight> {
        self.weights.values().cloned().collect()
    }

    pub fn total_influence(&self, catalyst: &str) -> f64 {
        self.weights.get(catalyst).map_or(0.0, InfluenceWeight::total)
    }

    /// The `n` catalysts with the highest summed influence; ties by name.
    pub fn top_influencers(&self, n: usize) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .weights
            .values()
            .map(|w| (w.philosopher_id.clone(), w.total()))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }
}
