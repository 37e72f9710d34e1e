//! Multi-round deliberation over a pool of reasoning agents.
//!
//! Each round after the first, the agents whose proposals conflict most
//! are asked to revise against their strongest counterpart. Revisions are
//! compared with round 1 to surface emergent positions, and the movement
//! they show is credited to whoever caused it.
//!
//! # Modules
//!
//! - [`interaction`]: lexicon-based tension between proposals
//! - [`similarity`]: text encoders with a deterministic keyword fallback
//! - [`emergence`]: novelty of revisions against the round-1 baseline
//! - [`influence`]: catalyst attribution across rounds
//! - [`roles`]: dialectic role schedule and role instructions
//! - [`engine`]: the round loop tying everything to the execution pool
//! - [`config`]: TOML + environment configuration
//! - [`errors`]: error and failure classification

pub mod config;
pub mod emergence;
pub mod engine;
pub mod errors;
pub mod influence;
pub mod interaction;
pub mod roles;
pub mod similarity;

pub use config::DeliberationConfig;
pub use emergence::{
    EmergenceDetector, EmergenceSignal, DEFAULT_EMERGENCE_THRESHOLD,
    DEFAULT_STRONG_EMERGENCE_THRESHOLD,
};
pub use engine::{DeliberationEngine, DeliberationResult, RoundLog, RoundTrace, Termination};
pub use errors::{DeliberationError, FailureClass};
pub use influence::{InfluenceTracker, InfluenceWeight};
pub use interaction::{InteractionMatrix, OppositionLexicon, OppositionPair, Stance, TensionPair};
pub use roles::{Role, RoleAssigner, DIALECTIC_MIN_ROUNDS};
pub use similarity::{
    EncodingError, KeywordBackend, SemanticEncoder, SharedBackend, SharedEncoder,
    TextSimilarityBackend,
};
