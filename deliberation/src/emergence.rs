//! Emergence detection: novelty of revisions against the round-1 baseline.
//!
//! Novelty of a revision is its minimum embedding distance to any baseline
//! proposal, so a revision that merely restates *someone's* opening
//! position is not novel even if it moved far from its author's own.

use std::collections::HashMap;

use party_machine::Proposal;
use serde::{Deserialize, Serialize};

use crate::similarity::SharedEncoder;

/// Default novelty above which a signal is emitted.
pub const DEFAULT_EMERGENCE_THRESHOLD: f64 = 0.3;

/// Default novelty at or above which the engine halts early.
pub const DEFAULT_STRONG_EMERGENCE_THRESHOLD: f64 = 0.85;

/// A revision judged novel relative to the baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergenceSignal {
    /// Novelty in `[0, 1]`; 0 = identical to some baseline entry.
    pub novelty_score: f64,
    pub source_philosopher: String,
    /// `(catalyst, source)` when the revision was triggered by a known catalyst.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalyst_pair: Option<(String, String)>,
    pub round_detected: u32,
    pub proposal_id: String,
}

impl EmergenceSignal {
    pub fn is_strong(&self, strong_threshold: f64) -> bool {
        self.novelty_score >= strong_threshold
    }
}

pub struct EmergenceDetector {
    encoder: SharedEncoder,
    threshold: f64,
}

impl EmergenceDetector {
    /// `threshold` is clamped to `[0, 1]`.
    pub fn new(encoder: SharedEncoder, threshold: f64) -> Self {
        Self {
            encoder,
            threshold: clamp_unit(threshold),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Novelty of one text against the baseline; 0 for an empty baseline.
    pub fn novelty(&self, baseline: &[Proposal], text: &str) -> f64 {
        if baseline.is_empty() {
            return 0.0;
        }
        clamp_unit(
            self.encoder
                .min_distance(text, baseline.iter().map(Proposal::content)),
        )
    }

    pub fn detect(
        &self,
        baseline: &[Proposal],
        current: &[Proposal],
        round_num: u32,
    ) -> Vec<EmergenceSignal> {
        self.detect_with_catalysts(baseline, current, round_num, &HashMap::new())
    }

    /// Like [`detect`](Self::detect), filling `catalyst_pair` from
    /// `catalysts[source] = catalyst`.
    pub fn detect_with_catalysts(
        &self,
        baseline: &[Proposal],
        current: &[Proposal],
        round_num: u32,
        catalysts: &HashMap<String, String>,
    ) -> Vec<EmergenceSignal> {
        if baseline.is_empty() || current.is_empty() {
            return Vec::new();
        }

        let mut signals: Vec<EmergenceSignal> = current
            .iter()
            .filter_map(|proposal| {
                let novelty = self.novelty(baseline, proposal.content());
                (novelty > self.threshold).then(|| EmergenceSignal {
                    novelty_score: novelty,
                    source_philosopher: proposal.author().to_string(),
                    catalyst_pair: catalysts
                        .get(proposal.author())
                        .map(|c| (c.clone(), proposal.author().to_string())),
                    round_detected: round_num,
                    proposal_id: proposal.id().to_string(),
                })
            })
            .collect();

        signals.sort_by(|a, b| b.novelty_score.total_cmp(&a.novelty_score));
        signals
    }

    /// True iff any signal's novelty is at or above `strong_threshold`.
    pub fn has_strong_emergence(signals: &[EmergenceSignal], strong_threshold: f64) -> bool {
        signals.iter().any(|s| s.is_strong(strong_threshold))
    }
}

fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}
