//! Deliberation configuration.
//!
//! Resolution order (highest wins):
//! 1. Environment variables (`DELIBERATION_*`)
//! 2. TOML file passed to [`DeliberationConfig::load`]
//! 3. Built-in defaults
//!
//! Thresholds and the opposition lexicon are empirically tuned, so they
//! live here rather than in the algorithms that consume them.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::emergence::{DEFAULT_EMERGENCE_THRESHOLD, DEFAULT_STRONG_EMERGENCE_THRESHOLD};
use crate::errors::DeliberationError;
use crate::interaction::OppositionLexicon;
use crate::roles::{RoleAssigner, DEFAULT_SYNTHESIS_MAX_SOURCES};
use crate::similarity::{DEFAULT_CACHE_CAPACITY, DEFAULT_KEYWORD_DIMENSION};

// ── Environment variable names ───────────────────────────────────────

const ENV_MAX_ROUNDS: &str = "DELIBERATION_MAX_ROUNDS";
const ENV_TOP_K: &str = "DELIBERATION_TOP_K";
const ENV_DIALECTIC: &str = "DELIBERATION_DIALECTIC";
const ENV_ROUND_TIMEOUT_MS: &str = "DELIBERATION_ROUND_TIMEOUT_MS";
const ENV_MAX_WORKERS: &str = "DELIBERATION_MAX_WORKERS";
const ENV_STRONG_THRESHOLD: &str = "DELIBERATION_STRONG_THRESHOLD";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliberationConfig {
    /// Requested round count, including round 1.
    pub max_rounds: u32,
    /// Interference pairs selected per standard/antithesis round.
    pub top_k: usize,
    /// Pairs below this tension are never selected.
    pub min_tension: f64,
    pub dialectic_mode: bool,
    pub detect_emergence: bool,
    pub track_influence: bool,
    pub emergence_threshold: f64,
    pub strong_emergence_threshold: f64,
    /// Deadline for one round's pool invocation.
    pub round_timeout_ms: u64,
    /// Wall-clock cap for the whole deliberation.
    pub total_budget_ms: Option<u64>,
    /// Worker threads for blocking agents.
    pub max_workers: usize,
    pub synthesis_max_sources: usize,
    /// Agents that synthesize in synthesis rounds; empty = the pair members.
    pub synthesizers: Vec<String>,
    pub embedding_cache_capacity: usize,
    pub keyword_dimension: usize,
    pub lexicon: OppositionLexicon,
}

impl Default for DeliberationConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            top_k: 2,
            min_tension: 0.0,
            dialectic_mode: false,
            detect_emergence: true,
            track_influence: true,
            emergence_threshold: DEFAULT_EMERGENCE_THRESHOLD,
            strong_emergence_threshold: DEFAULT_STRONG_EMERGENCE_THRESHOLD,
            round_timeout_ms: 30_000,
            total_budget_ms: None,
            max_workers: party_machine::DEFAULT_MAX_WORKERS,
            synthesis_max_sources: DEFAULT_SYNTHESIS_MAX_SOURCES,
            synthesizers: Vec::new(),
            embedding_cache_capacity: DEFAULT_CACHE_CAPACITY,
            keyword_dimension: DEFAULT_KEYWORD_DIMENSION,
            lexicon: OppositionLexicon::default(),
        }
    }
}

impl DeliberationConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).context("failed to parse deliberation config TOML")
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config in {}", path.display()))
    }

    /// Full resolution: file (if any), then environment, then validation.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_toml_file(p)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from any key lookup. Unparseable values are ignored
    /// with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        override_parsed(&lookup, ENV_MAX_ROUNDS, &mut self.max_rounds);
        override_parsed(&lookup, ENV_TOP_K, &mut self.top_k);
        override_parsed(&lookup, ENV_ROUND_TIMEOUT_MS, &mut self.round_timeout_ms);
        override_parsed(&lookup, ENV_MAX_WORKERS, &mut self.max_workers);
        override_parsed(
            &lookup,
            ENV_STRONG_THRESHOLD,
            &mut self.strong_emergence_threshold,
        );
        if let Some(raw) = lookup(ENV_DIALECTIC) {
            match parse_flag(&raw) {
                Some(flag) => self.dialectic_mode = flag,
                None => warn!(key = ENV_DIALECTIC, value = %raw, "ignoring invalid boolean"),
            }
        }
    }

    pub fn validate(&self) -> Result<(), DeliberationError> {
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(DeliberationError::Configuration(format!(
                    "{name} must be within [0, 1], got {v}"
                )))
            }
        };
        unit("min_tension", self.min_tension)?;
        unit("emergence_threshold", self.emergence_threshold)?;
        unit("strong_emergence_threshold", self.strong_emergence_threshold)?;

        if self.top_k == 0 {
            return Err(DeliberationError::Configuration("top_k must be positive".into()));
        }
        if self.max_workers == 0 {
            return Err(DeliberationError::Configuration(
                "max_workers must be positive".into(),
            ));
        }
        if self.round_timeout_ms == 0 {
            return Err(DeliberationError::Configuration(
                "round_timeout_ms must be positive".into(),
            ));
        }
        if self.lexicon.is_empty() {
            return Err(DeliberationError::Configuration(
                "opposition lexicon must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Rounds that will actually run, after the dialectic floor.
    pub fn effective_max_rounds(&self) -> u32 {
        RoleAssigner::effective_max_rounds(self.max_rounds, self.dialectic_mode)
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }

    pub fn total_budget(&self) -> Option<Duration> {
        self.total_budget_ms.map(Duration::from_millis)
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_dialectic(mut self, dialectic_mode: bool) -> Self {
        self.dialectic_mode = dialectic_mode;
        self
    }

    pub fn with_round_timeout(mut self, timeout: Duration) -> Self {
        self.round_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_thresholds(mut self, emergence: f64, strong: f64) -> Self {
        self.emergence_threshold = emergence;
        self.strong_emergence_threshold = strong;
        self
    }

    pub fn with_synthesizers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synthesizers = names.into_iter().map(Into::into).collect();
        self
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(v) => *slot = v,
            Err(_) => warn!(key, value = %raw, "ignoring unparseable override"),
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
