//! Dialectic roles and the instruction prefixes injected into revisions.

use std::fmt;

use party_machine::Proposal;
use serde::{Deserialize, Serialize};

/// Minimum number of rounds in dialectic mode.
pub const DIALECTIC_MIN_ROUNDS: u32 = 3;

/// Default cap on proposals quoted in a synthesis instruction.
pub const DEFAULT_SYNTHESIS_MAX_SOURCES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Standard,
    Thesis,
    Antithesis,
    Synthesis,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Thesis => "thesis",
            Self::Antithesis => "antithesis",
            Self::Synthesis => "synthesis",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps rounds to roles and renders role instructions.
#[derive(Debug, Clone, Copy)]
pub struct RoleAssigner {
    dialectic_mode: bool,
    max_sources: usize,
}

impl RoleAssigner {
    pub fn new(dialectic_mode: bool) -> Self {
        Self {
            dialectic_mode,
            max_sources: DEFAULT_SYNTHESIS_MAX_SOURCES,
        }
    }

    pub fn with_max_sources(mut self, max_sources: usize) -> Self {
        self.max_sources = max_sources.max(1);
        self
    }

    pub fn dialectic_mode(&self) -> bool {
        self.dialectic_mode
    }

    pub fn role_for(&self, round_num: u32) -> Role {
        Self::assign_role(round_num, self.dialectic_mode)
    }

    /// Standard everywhere unless dialectic: 1 → thesis, 2 → antithesis, 3+ → synthesis.
    pub fn assign_role(round_num: u32, dialectic_mode: bool) -> Role {
        if !dialectic_mode {
            return Role::Standard;
        }
        match round_num {
            0 | 1 => Role::Thesis,
            2 => Role::Antithesis,
            _ => Role::Synthesis,
        }
    }

    /// Rounds actually run: dialectic mode raises the request to at least 3.
    pub fn effective_max_rounds(requested: u32, dialectic_mode: bool) -> u32 {
        if dialectic_mode {
            requested.max(DIALECTIC_MIN_ROUNDS)
        } else {
            requested
        }
    }

    /// Instruction prepended to a revision request.
    ///
    /// Empty for thesis and standard. Antithesis needs `opposing`; synthesis
    /// quotes up to `max_sources` of `prior`. A missing input yields an
    /// instruction without the quoted material.
    pub fn role_prompt_prefix(
        &self,
        role: Role,
        opposing: Option<&Proposal>,
        prior: &[Proposal],
    ) -> String {
        match role {
            Role::Standard | Role::Thesis => String::new(),
            Role::Antithesis => match opposing {
                Some(p) => format!(
                    "ANTITHESIS: Your task is to refute the following position from {}. \
                     Identify its weakest premise and argue directly against it; do not \
                     concede its conclusion.\n\n[{}]: {}\n\n",
                    p.author(),
                    p.author(),
                    p.content()
                ),
                None => "ANTITHESIS: Your task is to refute the strongest opposing position. \
                         Identify its weakest premise and argue directly against it.\n\n"
                    .to_string(),
            },
            Role::Synthesis => {
                let mut out = String::from(
                    "SYNTHESIS: Integrate the positions below into a single reconciling view \
                     (Aufhebung): preserve what is true in each, cancel what is one-sided, and \
                     lift both into a higher position that neither could reach alone.\n\n",
                );
                out.push_str(&Self::aggregate(prior, self.max_sources));
                out
            }
        }
    }

    /// `[author]: content` blocks for at most `limit` proposals.
    pub fn aggregate(proposals: &[Proposal], limit: usize) -> String {
        proposals
            .iter()
            .take(limit)
            .map(|p| format!("[{}]: {}\n\n", p.author(), p.content()))
            .collect()
    }
}

impl Default for RoleAssigner {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_mode_is_always_standard() {
        for round in 1..6 {
            assert_eq!(RoleAssigner::assign_role(round, false), Role::Standard);
        }
    }

    #[test]
    fn dialectic_sequence() {
        let a = RoleAssigner::new(true);
        let roles: Vec<Role> = (1..=5).map(|r| a.role_for(r)).collect();
        assert_eq!(
            roles,
            [
                Role::Thesis,
                Role::Antithesis,
                Role::Synthesis,
                Role::Synthesis,
                Role::Synthesis
            ]
        );
    }

    #[test]
    fn dialectic_floor_on_rounds() {
        assert_eq!(RoleAssigner::effective_max_rounds(1, true), 3);
        assert_eq!(RoleAssigner::effective_max_rounds(5, true), 5);
        assert_eq!(RoleAssigner::effective_max_rounds(1, false), 1);
    }

    #[test]
    fn prefixes() {
        let a = RoleAssigner::new(true);
        assert!(a.role_prompt_prefix(Role::Thesis, None, &[]).is_empty());
        assert!(a.role_prompt_prefix(Role::Standard, None, &[]).is_empty());

        let opp = Proposal::new("hobbes", "life is nasty, brutish and short");
        let anti = a.role_prompt_prefix(Role::Antithesis, Some(&opp), &[]);
        assert!(anti.contains("refute"));
        assert!(anti.contains("hobbes"));
        assert!(anti.contains("nasty, brutish"));
    }

    #[test]
    fn synthesis_quotes_at_most_max_sources() {
        let a = RoleAssigner::new(true);
        let prior: Vec<Proposal> = (0..12)
            .map(|i| Proposal::new(format!("p{i}"), format!("position number {i}")))
            .collect();
        let synth = a.role_prompt_prefix(Role::Synthesis, None, &prior);
        assert!(synth.contains("Aufhebung"));
        assert!(synth.contains("[p9]"));
        assert!(!synth.contains("[p10]"));

        let narrow = a.with_max_sources(2).role_prompt_prefix(Role::Synthesis, None, &prior);
        assert!(narrow.contains("[p1]"));
        assert!(!narrow.contains("[p2]"));
    }

    #[test]
    fn role_display_matches_serde() {
        assert_eq!(Role::Antithesis.to_string(), "antithesis");
        assert_eq!(serde_json::to_string(&Role::Synthesis).unwrap(), "\"synthesis\"");
    }
}
