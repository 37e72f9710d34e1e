//! Pairwise tension between proposals over an opposition lexicon.
//!
//! Each [`OppositionPair`] names two poles (e.g. freedom vs determinism)
//! with a keyword list per pole. A proposal takes the side whose keywords
//! it mentions more often, or stays neutral on a tie. Two proposals are
//! *engaged* on a pair when both take a side, and *opposed* when those
//! sides differ:
//!
//! ```text
//! tension(a, b) = opposed / engaged        (0 when engaged == 0)
//! ```
//!
//! The score is symmetric and in `[0, 1]` by construction.

use std::cmp::Ordering;

use party_machine::Proposal;
use serde::{Deserialize, Serialize};

use crate::similarity::tokenize;

// ── Lexicon ──────────────────────────────────────────────────────────

/// One axis of philosophical opposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OppositionPair {
    pub name: String,
    pub left: Vec<String>,
    pub right: Vec<String>,
}

impl OppositionPair {
    pub fn new(name: &str, left: &[&str], right: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            left: left.iter().map(|s| s.to_lowercase()).collect(),
            right: right.iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    /// Side taken by a tokenised text.
    pub fn stance(&self, tokens: &[String]) -> Stance {
        let left = tokens.iter().filter(|t| self.left.contains(t)).count();
        let right = tokens.iter().filter(|t| self.right.contains(t)).count();
        match left.cmp(&right) {
            Ordering::Greater => Stance::Left,
            Ordering::Less => Stance::Right,
            Ordering::Equal => Stance::Neutral,
        }
    }
}

/// Ordered set of opposition pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OppositionLexicon {
    pairs: Vec<OppositionPair>,
}

impl OppositionLexicon {
    pub fn new(pairs: Vec<OppositionPair>) -> Self {
        Self { pairs }
    }

    pub fn pairs(&self) -> &[OppositionPair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Stance of `text` on every pair, in lexicon order.
    pub fn profile(&self, text: &str) -> Vec<Stance> {
        let tokens = tokenize(text);
        self.pairs.iter().map(|p| p.stance(&tokens)).collect()
    }
}

impl Default for OppositionLexicon {
    fn default() -> Self {
        Self::new(vec![
            OppositionPair::new(
                "freedom_determinism",
                &["freedom", "free", "liberty", "choice", "autonomy", "will"],
                &["determinism", "determined", "necessity", "causation", "fate", "destiny"],
            ),
            OppositionPair::new(
                "individual_collective",
                &["individual", "individuals", "personal", "self", "private", "person"],
                &["collective", "society", "community", "social", "common", "state"],
            ),
            OppositionPair::new(
                "subjective_objective",
                &["subjective", "perspective", "experience", "feeling", "opinion", "interpretation"],
                &["objective", "fact", "facts", "empirical", "measurable", "neutral"],
            ),
            OppositionPair::new(
                "reason_emotion",
                &["reason", "rational", "logic", "logical", "rationality", "argument"],
                &["emotion", "emotions", "emotional", "passion", "passions", "intuition"],
            ),
            OppositionPair::new(
                "being_becoming",
                &["being", "permanence", "eternal", "static", "essence", "unchanging"],
                &["becoming", "change", "flux", "process", "evolution", "growth"],
            ),
            OppositionPair::new(
                "mind_body",
                &["mind", "mental", "consciousness", "soul", "spirit", "thought"],
                &["body", "physical", "matter", "material", "brain", "flesh"],
            ),
            OppositionPair::new(
                "duty_consequence",
                &["duty", "obligation", "principle", "rule", "rules", "imperative"],
                &["consequence", "consequences", "outcome", "outcomes", "utility", "results"],
            ),
            OppositionPair::new(
                "universal_particular",
                &["universal", "universals", "general", "absolute", "abstract", "global"],
                &["particular", "specific", "relative", "concrete", "local", "contextual"],
            ),
            OppositionPair::new(
                "tradition_progress",
                &["tradition", "traditional", "custom", "heritage", "conservative", "past"],
                &["progress", "innovation", "reform", "future", "revolution", "modern"],
            ),
            OppositionPair::new(
                "certainty_doubt",
                &["certainty", "certain", "knowledge", "proof", "sure", "conviction"],
                &["doubt", "uncertainty", "skepticism", "uncertain", "question", "ignorance"],
            ),
        ])
    }
}

/// Side a proposal takes on one opposition pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    Left,
    Right,
    Neutral,
}

/// Tension score for two stance profiles of equal length.
pub fn profile_tension(a: &[Stance], b: &[Stance]) -> f64 {
    let mut engaged = 0usize;
    let mut opposed = 0usize;
    for (sa, sb) in a.iter().zip(b.iter()) {
        if *sa == Stance::Neutral || *sb == Stance::Neutral {
            continue;
        }
        engaged += 1;
        if sa != sb {
            opposed += 1;
        }
    }
    if engaged == 0 {
        0.0
    } else {
        (opposed as f64 / engaged as f64).clamp(0.0, 1.0)
    }
}

// ── Matrix ───────────────────────────────────────────────────────────

/// One unordered pair of proposals and their tension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensionPair {
    /// Author of the earlier proposal in input order.
    pub left: String,
    pub right: String,
    pub left_id: String,
    pub right_id: String,
    pub tension: f64,
}

impl TensionPair {
    pub fn involves(&self, author: &str) -> bool {
        self.left == author || self.right == author
    }

    /// The other member of the pair, if `author` is one of them.
    pub fn partner_of(&self, author: &str) -> Option<&str> {
        if self.left == author {
            Some(&self.right)
        } else if self.right == author {
            Some(&self.left)
        } else {
            None
        }
    }
}

/// Symmetric tension matrix over one round's proposals.
#[derive(Debug, Clone)]
pub struct InteractionMatrix {
    authors: Vec<String>,
    ids: Vec<String>,
    tensions: Vec<Vec<f64>>,
}

impl InteractionMatrix {
    /// Build with the default lexicon.
    pub fn from_proposals(proposals: &[Proposal]) -> Self {
        Self::with_lexicon(proposals, &OppositionLexicon::default())
    }

    pub fn with_lexicon(proposals: &[Proposal], lexicon: &OppositionLexicon) -> Self {
        let profiles: Vec<Vec<Stance>> = proposals
            .iter()
            .map(|p| lexicon.profile(p.content()))
            .collect();

        let n = proposals.len();
        let mut tensions = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let t = profile_tension(&profiles[i], &profiles[j]);
                tensions[i][j] = t;
                tensions[j][i] = t;
            }
        }

        Self {
            authors: proposals.iter().map(|p| p.author().to_string()).collect(),
            ids: proposals.iter().map(|p| p.id().to_string()).collect(),
            tensions,
        }
    }

    pub fn len(&self) -> usize {
        self.authors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
    }

    pub fn authors(&self) -> &[String] {
        &self.authors
    }

    /// Tension by input index. Self-pairs and out-of-range indices are 0.
    pub fn tension(&self, i: usize, j: usize) -> f64 {
        if i == j {
            return 0.0;
        }
        self.tensions
            .get(i)
            .and_then(|row| row.get(j))
            .copied()
            .unwrap_or(0.0)
    }

    /// Tension between the first proposals of two authors.
    pub fn tension_between(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.index_of(a)?;
        let j = self.index_of(b)?;
        (i != j).then(|| self.tension(i, j))
    }

    /// Every unordered pair in input order (i < j).
    pub fn pairs(&self) -> Vec<TensionPair> {
        let n = self.len();
        let mut out = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for i in 0..n {
            for j in (i + 1)..n {
                out.push(self.pair(i, j));
            }
        }
        out
    }

    /// The `top_k` pairs by descending tension; ties keep input order.
    pub fn high_interference_pairs(&self, top_k: usize) -> Vec<TensionPair> {
        let mut pairs = self.pairs();
        pairs.sort_by(|a, b| b.tension.total_cmp(&a.tension));
        pairs.truncate(top_k);
        pairs
    }

    /// Mean tension over all unordered pairs; 0 with fewer than two proposals.
    pub fn mean_tension(&self) -> f64 {
        let pairs = self.pairs();
        if pairs.is_empty() {
            return 0.0;
        }
        pairs.iter().map(|p| p.tension).sum::<f64>() / pairs.len() as f64
    }

    /// Other authors ranked by tension with `author`, highest first.
    pub fn partners_of(&self, author: &str) -> Vec<(String, f64)> {
        let Some(i) = self.index_of(author) else {
            return Vec::new();
        };
        let mut partners: Vec<(String, f64)> = (0..self.len())
            .filter(|&j| j != i)
            .map(|j| (self.authors[j].clone(), self.tension(i, j)))
            .collect();
        partners.sort_by(|a, b| b.1.total_cmp(&a.1));
        partners
    }

    fn pair(&self, i: usize, j: usize) -> TensionPair {
        TensionPair {
            left: self.authors[i].clone(),
            right: self.authors[j].clone(),
            left_id: self.ids[i].clone(),
            right_id: self.ids[j].clone(),
            tension: self.tension(i, j),
        }
    }

    fn index_of(&self, author: &str) -> Option<usize> {
        self.authors.iter().position(|a| a == author)
    }
}
