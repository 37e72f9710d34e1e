//! The deliberation engine: drives rounds, picks revisers, detects emergence.
//!
//! ```text
//!   ROUND_1 (given or convened)
//!      │
//!      ▼
//!   ROUND_k, k = 2..=max_rounds
//!      ├─ InteractionMatrix over the board → revision plan
//!      ├─ ExecutionPool::run_tasks(plan)   → merge ok revisions
//!      ├─ RoundTrace appended
//!      ├─ EmergenceDetector (revisions vs round-1 baseline)
//!      │     └─ strong emergence ──────────────────▶ EARLY_HALT
//!      └─ InfluenceTracker::update
//!      │
//!      ▼                    (cancel / budget) ─────▶ EARLY_HALT
//!   DONE
//! ```
//!
//! All deliberation state is local to one `deliberate()` call and is only
//! touched after the pool has fully joined, so nothing here needs a lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use party_machine::{
    telemetry, AgentContext, AgentTask, DeliberationEvent, ExecutionPool, PoolOutput, Proposal,
    SharedAgent, SharedEventBus,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument, Span};

use super::result::{DeliberationResult, Termination};
use super::state::{ProposalBoard, RoundLog, RoundTrace};
use crate::config::DeliberationConfig;
use crate::emergence::{EmergenceDetector, EmergenceSignal};
use crate::errors::DeliberationError;
use crate::influence::InfluenceTracker;
use crate::interaction::{InteractionMatrix, TensionPair};
use crate::roles::{Role, RoleAssigner};
use crate::similarity::{SemanticEncoder, SharedBackend, SharedEncoder};

/// One agent's assignment for the coming round.
#[derive(Debug, Clone)]
struct Revision {
    agent: String,
    /// Counterpart whose argument triggers this revision.
    catalyst: Option<String>,
    /// Position to refute (standard / antithesis).
    opposing: Option<Proposal>,
    /// Positions to integrate (synthesis).
    sources: Vec<Proposal>,
}

pub struct DeliberationEngine {
    config: DeliberationConfig,
    pool: ExecutionPool,
    encoder: SharedEncoder,
    detector: EmergenceDetector,
    roles: RoleAssigner,
    events: Option<SharedEventBus>,
    cancel: CancellationToken,
}

impl DeliberationEngine {
    /// Engine with the deterministic keyword backend.
    pub fn new(config: DeliberationConfig) -> Result<Self, DeliberationError> {
        config.validate()?;
        let encoder =
            SemanticEncoder::keyword(config.keyword_dimension, config.embedding_cache_capacity);
        Ok(Self::assemble(config, encoder.shared()))
    }

    /// Engine with a learned primary backend; falls back to keywords on failure.
    pub fn with_backend(
        config: DeliberationConfig,
        backend: SharedBackend,
    ) -> Result<Self, DeliberationError> {
        config.validate()?;
        let encoder = SemanticEncoder::with_primary(
            backend,
            config.keyword_dimension,
            config.embedding_cache_capacity,
        );
        Ok(Self::assemble(config, encoder.shared()))
    }

    fn assemble(config: DeliberationConfig, encoder: SharedEncoder) -> Self {
        Self {
            pool: ExecutionPool::new(config.max_workers),
            detector: EmergenceDetector::new(Arc::clone(&encoder), config.emergence_threshold),
            roles: RoleAssigner::new(config.dialectic_mode)
                .with_max_sources(config.synthesis_max_sources),
            encoder,
            config,
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Publish agent, round and run events to `bus`.
    pub fn with_event_bus(mut self, bus: SharedEventBus) -> Self {
        self.pool = ExecutionPool::new(self.config.max_workers).with_event_bus(Arc::clone(&bus));
        self.events = Some(bus);
        self
    }

    pub fn config(&self) -> &DeliberationConfig {
        &self.config
    }

    pub fn encoder(&self) -> &SharedEncoder {
        &self.encoder
    }

    /// Cancelling this token stops the engine before its next round.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run a deliberation from caller-supplied round-1 proposals.
    pub async fn deliberate(
        &self,
        agents: &[SharedAgent],
        prompt: &str,
        initial_proposals: Vec<Proposal>,
    ) -> Result<DeliberationResult, DeliberationError> {
        let run_id = new_run_id();
        let span = telemetry::run_span(&run_id, agents.len(), self.config.dialectic_mode);
        self.run_rounds(&run_id, agents, prompt, initial_proposals, None, Instant::now())
            .instrument(span)
            .await
    }

    /// Generate round 1 by running every agent, then deliberate.
    pub async fn convene(
        &self,
        agents: &[SharedAgent],
        prompt: &str,
    ) -> Result<DeliberationResult, DeliberationError> {
        let run_id = new_run_id();
        let span = telemetry::run_span(&run_id, agents.len(), self.config.dialectic_mode);

        async {
            let started = Instant::now();
            let role = self.roles.role_for(1);
            let context = AgentContext::new(&run_id, prompt, 1).with_role(role.as_str());
            let deadline = self.round_deadline(started).unwrap_or(Duration::ZERO);

            let output = self
                .pool
                .run(agents, &context, deadline)
                .instrument(telemetry::round_span(&run_id, 1, role.as_str()))
                .await;
            debug!(
                run_id = %run_id,
                succeeded = output.succeeded(),
                proposals = output.proposals.len(),
                "round 1 convened"
            );

            let initial = attributed(&output);
            self.run_rounds(&run_id, agents, prompt, initial, Some(&output), started)
                .await
        }
        .instrument(span)
        .await
    }

    async fn run_rounds(
        &self,
        run_id: &str,
        agents: &[SharedAgent],
        prompt: &str,
        initial: Vec<Proposal>,
        round_one: Option<&PoolOutput>,
        started: Instant,
    ) -> Result<DeliberationResult, DeliberationError> {
        let max_rounds = self.config.effective_max_rounds();
        info!(
            run_id,
            agents = agents.len(),
            initial = initial.len(),
            max_rounds,
            dialectic = self.config.dialectic_mode,
            "deliberation started"
        );

        let mut log = RoundLog::new();
        let mut board = ProposalBoard::seeded(initial);
        let baseline = board.proposals();

        let mut tracker = InfluenceTracker::new(Arc::clone(&self.encoder));
        if self.config.track_influence {
            tracker.set_baseline(&baseline);
        }

        // ── Round 1 ──────────────────────────────────────────────────
        let mut first = RoundTrace::new(1, self.roles.role_for(1), Utc::now());
        first.n_proposals = board.len();
        first.duration_ms = elapsed_ms(started);
        if let Some(output) = round_one {
            first.n_failed = output.failed();
            first.n_timed_out = output.timed_out();
        }
        self.record_round(run_id, &mut log, first)?;

        // ── Rounds 2..=max ───────────────────────────────────────────
        let mut signals: Vec<EmergenceSignal> = Vec::new();
        let mut termination = Termination::Completed;

        for round in 2..=max_rounds {
            if self.cancel.is_cancelled() {
                termination = Termination::Cancelled { round: round - 1 };
                break;
            }
            let Some(deadline) = self.round_deadline(started) else {
                termination = Termination::BudgetExhausted { round: round - 1 };
                break;
            };

            let role = self.roles.role_for(round);
            let round_started = Instant::now();
            let span = telemetry::round_span(run_id, round, role.as_str());
            let mut trace = RoundTrace::new(round, role, Utc::now());

            let matrix =
                InteractionMatrix::with_lexicon(&board.proposals(), &self.config.lexicon);
            let plan = self.plan_revisions(&matrix, &board, role);
            let catalysts: HashMap<String, String> = plan
                .iter()
                .filter_map(|r| r.catalyst.clone().map(|c| (r.agent.clone(), c)))
                .collect();
            let tasks = self.build_tasks(run_id, agents, prompt, round, role, &board, &plan);
            debug!(
                run_id,
                round,
                role = %role,
                planned = plan.len(),
                invoked = tasks.len(),
                mean_tension = matrix.mean_tension(),
                "revision plan ready"
            );

            let output = self
                .pool
                .run_tasks(tasks, deadline)
                .instrument(span.clone())
                .await;

            let mut revised = Vec::new();
            for result in output.results.iter().filter(|r| r.ok) {
                match output.proposals_from(&result.agent_id).last() {
                    Some(latest) => {
                        let latest = attribute(&result.agent_id, latest.clone());
                        let stored = board.replace(&result.agent_id, latest);
                        revised.push(stored.clone());
                    }
                    None => debug!(agent = %result.agent_id, round, "empty revision; keeping prior proposal"),
                }
            }

            trace.n_proposals = board.len();
            trace.n_revised = revised.len();
            trace.n_failed = output.failed();
            trace.n_timed_out = output.timed_out();
            trace.duration_ms = elapsed_ms(round_started);
            telemetry::record_round_result(
                &span,
                trace.n_proposals,
                trace.n_revised,
                trace.duration_ms,
            );
            self.record_round(run_id, &mut log, trace)?;

            let mut strong = false;
            if self.config.detect_emergence {
                let found =
                    self.detector
                        .detect_with_catalysts(&baseline, &revised, round, &catalysts);
                for signal in &found {
                    self.publish(DeliberationEvent::EmergenceDetected {
                        run_id: run_id.to_string(),
                        round,
                        source: signal.source_philosopher.clone(),
                        novelty: signal.novelty_score,
                        timestamp: Utc::now(),
                    });
                }
                strong = EmergenceDetector::has_strong_emergence(
                    &found,
                    self.config.strong_emergence_threshold,
                );
                signals.extend(found);
            }

            if strong {
                info!(run_id, round, "strong emergence detected; halting");
                termination = Termination::StrongEmergence { round };
                break;
            }

            if self.config.track_influence {
                tracker.update(&revised, &catalysts);
            }
        }

        if termination.is_early() {
            self.publish(DeliberationEvent::DeliberationHalted {
                run_id: run_id.to_string(),
                round: log.last().map_or(0, |r| r.round_number),
                reason: termination.label().to_string(),
                timestamp: Utc::now(),
            });
        }

        let result = DeliberationResult {
            proposals: board.proposals(),
            rounds: log.into_vec(),
            emergence_signals: signals,
            influence_weights: tracker.weights(),
            termination,
        };

        telemetry::record_run_result(
            &Span::current(),
            result.rounds.len() as u32,
            result.proposals.len(),
            result.termination.label(),
        );
        self.publish(DeliberationEvent::DeliberationCompleted {
            run_id: run_id.to_string(),
            rounds: result.rounds.len() as u32,
            n_proposals: result.proposals.len(),
            peak_novelty: result.peak_novelty(),
            timestamp: Utc::now(),
        });
        info!(run_id, "{}", result.summary_line());
        Ok(result)
    }

    // ── Planning ─────────────────────────────────────────────────────

    /// Decide who revises this round and against what.
    fn plan_revisions(
        &self,
        matrix: &InteractionMatrix,
        board: &ProposalBoard,
        role: Role,
    ) -> Vec<Revision> {
        let pairs: Vec<TensionPair> = matrix
            .high_interference_pairs(self.config.top_k)
            .into_iter()
            .filter(|p| p.tension >= self.config.min_tension)
            .collect();

        match role {
            Role::Synthesis => {
                let synthesizers = if self.config.synthesizers.is_empty() {
                    pair_members(&pairs)
                } else {
                    self.config.synthesizers.clone()
                };
                synthesizers
                    .into_iter()
                    .map(|agent| {
                        let sources = self.collect_synthesis_counterarguments(matrix, board, &agent);
                        Revision {
                            catalyst: sources.first().map(|p| p.author().to_string()),
                            agent,
                            opposing: None,
                            sources,
                        }
                    })
                    .collect()
            }
            Role::Standard | Role::Thesis | Role::Antithesis => pair_members(&pairs)
                .into_iter()
                .map(|agent| {
                    // Pairs are sorted by tension, so the first hit is the strongest partner.
                    let catalyst = pairs
                        .iter()
                        .find_map(|p| p.partner_of(&agent))
                        .map(str::to_string);
                    let opposing = catalyst.as_deref().and_then(|c| board.get(c)).cloned();
                    Revision {
                        agent,
                        catalyst,
                        opposing,
                        sources: Vec::new(),
                    }
                })
                .collect(),
        }
    }

    /// Other proposals a synthesizer must integrate, highest tension first.
    fn collect_synthesis_counterarguments(
        &self,
        matrix: &InteractionMatrix,
        board: &ProposalBoard,
        synthesizer: &str,
    ) -> Vec<Proposal> {
        let ranked: Vec<Proposal> = if board.get(synthesizer).is_some() {
            matrix
                .partners_of(synthesizer)
                .into_iter()
                .filter_map(|(author, _)| board.get(&author).cloned())
                .collect()
        } else {
            board.proposals()
        };
        ranked
            .into_iter()
            .filter(|p| p.author() != synthesizer)
            .take(self.config.synthesis_max_sources.max(1))
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn build_tasks(
        &self,
        run_id: &str,
        agents: &[SharedAgent],
        prompt: &str,
        round: u32,
        role: Role,
        board: &ProposalBoard,
        plan: &[Revision],
    ) -> Vec<AgentTask> {
        plan.iter()
            .filter_map(|rev| {
                let Some(agent) = agents.iter().find(|a| a.name() == rev.agent) else {
                    warn!(agent = %rev.agent, round, "planned reviser is not in the agent list; skipping");
                    return None;
                };

                let prefix = self
                    .roles
                    .role_prompt_prefix(role, rev.opposing.as_ref(), &rev.sources);
                let mut context = AgentContext::new(run_id, format!("{prefix}{prompt}"), round)
                    .with_role(role.as_str());

                if let Some(catalyst) = &rev.catalyst {
                    let counterargument = match role {
                        Role::Synthesis => {
                            RoleAssigner::aggregate(&rev.sources, rev.sources.len())
                        }
                        _ => rev
                            .opposing
                            .as_ref()
                            .map(|p| p.content().to_string())
                            .unwrap_or_default(),
                    };
                    context = context.with_counterpart(catalyst.clone(), counterargument);
                }
                if let Some(previous) = board.get(&rev.agent) {
                    context = context.with_previous(previous.clone());
                }

                Some(AgentTask::new(Arc::clone(agent), context))
            })
            .collect()
    }

    // ── Bookkeeping ──────────────────────────────────────────────────

    fn record_round(
        &self,
        run_id: &str,
        log: &mut RoundLog,
        trace: RoundTrace,
    ) -> Result<(), DeliberationError> {
        let event = DeliberationEvent::RoundCompleted {
            run_id: run_id.to_string(),
            round: trace.round_number,
            n_proposals: trace.n_proposals,
            n_revised: trace.n_revised,
            role: trace.role.to_string(),
            timestamp: Utc::now(),
        };
        info!(run_id, "{}", trace.status_line());
        log.push(trace)?;
        self.publish(event);
        Ok(())
    }

    /// Deadline for the next pool invocation; `None` once the budget is spent.
    fn round_deadline(&self, started: Instant) -> Option<Duration> {
        let timeout = self.config.round_timeout();
        match self.config.total_budget() {
            None => Some(timeout),
            Some(budget) => {
                let remaining = budget.saturating_sub(started.elapsed());
                (!remaining.is_zero()).then(|| timeout.min(remaining))
            }
        }
    }

    fn publish(&self, event: DeliberationEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

/// Distinct pair members in order of first appearance.
fn pair_members(pairs: &[TensionPair]) -> Vec<String> {
    let mut members: Vec<String> = Vec::new();
    for pair in pairs {
        for name in [&pair.left, &pair.right] {
            if !members.contains(name) {
                members.push(name.clone());
            }
        }
    }
    members
}

/// Proposals are keyed by the agent that produced them, whatever author
/// they claim.
fn attribute(agent: &str, proposal: Proposal) -> Proposal {
    if proposal.author() == agent {
        return proposal;
    }
    warn!(agent, claimed = proposal.author(), "proposal author differs from agent; re-attributing");
    proposal.with_author(agent)
}

/// Every successful agent's proposals, attributed to that agent.
fn attributed(output: &PoolOutput) -> Vec<Proposal> {
    output
        .results
        .iter()
        .filter(|r| r.ok)
        .flat_map(|r| {
            output
                .proposals_from(&r.agent_id)
                .iter()
                .cloned()
                .map(|p| attribute(&r.agent_id, p))
        })
        .collect()
}

fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use party_machine::{Agent, AgentError};

    struct Echo(&'static str);

    impl Agent for Echo {
        fn name(&self) -> &str {
            self.0
        }

        fn propose(&self, ctx: &AgentContext) -> Result<Vec<Proposal>, AgentError> {
            Ok(vec![Proposal::new(self.0, ctx.prompt.clone())])
        }
    }

    fn engine(config: DeliberationConfig) -> DeliberationEngine {
        DeliberationEngine::new(config).unwrap()
    }

    fn board(items: &[(&str, &str)]) -> ProposalBoard {
        ProposalBoard::seeded(
            items
                .iter()
                .map(|(a, c)| Proposal::new(*a, *c))
                .collect(),
        )
    }

    const FREE: &str = "freedom individual subjective reason";
    const FATED: &str = "determinism collective objective emotion";

    #[test]
    fn invalid_config_is_rejected() {
        let err = DeliberationEngine::new(DeliberationConfig::default().with_top_k(0));
        assert!(matches!(err, Err(DeliberationError::Configuration(_))));
    }

    #[test]
    fn antithesis_plan_pairs_catalysts() {
        let e = engine(DeliberationConfig::default().with_top_k(1));
        let b = board(&[("a", FREE), ("b", FATED), ("c", "bananas")]);
        let m = InteractionMatrix::from_proposals(&b.proposals());
        let plan = e.plan_revisions(&m, &b, Role::Antithesis);

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].agent, "a");
        assert_eq!(plan[0].catalyst.as_deref(), Some("b"));
        assert_eq!(plan[1].catalyst.as_deref(), Some("a"));
        assert_eq!(plan[0].opposing.as_ref().map(Proposal::content), Some(FATED));
    }

    #[test]
    fn min_tension_filters_pairs() {
        let mut config = DeliberationConfig::default().with_top_k(3);
        config.min_tension = 0.5;
        let e = engine(config);
        let b = board(&[("a", FREE), ("b", FATED), ("c", "bananas")]);
        let m = InteractionMatrix::from_proposals(&b.proposals());
        let agents: Vec<String> = e
            .plan_revisions(&m, &b, Role::Standard)
            .into_iter()
            .map(|r| r.agent)
            .collect();
        assert_eq!(agents, ["a", "b"]);
    }

    #[test]
    fn synthesis_uses_configured_synthesizers() {
        let e = engine(DeliberationConfig::default().with_synthesizers(["hegel"]));
        let b = board(&[("a", FREE), ("b", FATED), ("hegel", "spirit unfolds")]);
        let m = InteractionMatrix::from_proposals(&b.proposals());
        let plan = e.plan_revisions(&m, &b, Role::Synthesis);

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].agent, "hegel");
        let authors: Vec<&str> = plan[0].sources.iter().map(Proposal::author).collect();
        assert_eq!(authors.len(), 2);
        assert!(!authors.contains(&"hegel"));
    }

    #[test]
    fn synthesis_sources_are_capped() {
        let mut config = DeliberationConfig::default();
        config.synthesis_max_sources = 2;
        let e = engine(config);
        let b = board(&[("a", FREE), ("b", FATED), ("c", FREE), ("d", FATED)]);
        let m = InteractionMatrix::from_proposals(&b.proposals());
        let sources = e.collect_synthesis_counterarguments(&m, &b, "a");
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].author(), "b");

        let outsider = e.collect_synthesis_counterarguments(&m, &b, "zeno");
        assert_eq!(outsider.len(), 2);
    }

    #[test]
    fn tasks_skip_unknown_agents_and_carry_context() {
        let e = engine(DeliberationConfig::default().with_top_k(1));
        let b = board(&[("a", FREE), ("b", FATED)]);
        let m = InteractionMatrix::from_proposals(&b.proposals());
        let plan = e.plan_revisions(&m, &b, Role::Antithesis);
        let agents: Vec<SharedAgent> = vec![Arc::new(Echo("a"))];

        let tasks = e.build_tasks("run", &agents, "is the will free?", 2, Role::Antithesis, &b, &plan);
        assert_eq!(tasks.len(), 1);
        let ctx = &tasks[0].context;
        assert_eq!(ctx.role, "antithesis");
        assert_eq!(ctx.counterpart.as_deref(), Some("b"));
        assert_eq!(ctx.counterargument.as_deref(), Some(FATED));
        assert!(ctx.prompt.starts_with("ANTITHESIS"));
        assert!(ctx.prompt.ends_with("is the will free?"));
        assert_eq!(ctx.previous.as_ref().map(Proposal::content), Some(FREE));
    }

    #[test]
    fn budget_deadline() {
        let mut config = DeliberationConfig::default();
        config.round_timeout_ms = 1_000;
        config.total_budget_ms = Some(50);
        let e = engine(config);
        let started = Instant::now();
        let d = e.round_deadline(started).unwrap();
        assert!(d <= Duration::from_millis(50));

        let mut spent = DeliberationConfig::default();
        spent.total_budget_ms = Some(0);
        assert!(engine(spent).round_deadline(started).is_none());
    }

    #[test]
    fn foreign_author_is_re_attributed() {
        let own = Proposal::new("kant", "duty").with_id("k1");
        assert_eq!(attribute("kant", own.clone()), own);

        let claimed = attribute("kant", Proposal::new("anonymous", "duty").with_id("k2"));
        assert_eq!(claimed.author(), "kant");
        assert_eq!(claimed.id(), "k2");
        assert_eq!(claimed.content(), "duty");
    }

    #[test]
    fn pair_members_are_distinct() {
        let pair = |l: &str, r: &str| TensionPair {
            left: l.into(),
            right: r.into(),
            left_id: String::new(),
            right_id: String::new(),
            tension: 1.0,
        };
        assert_eq!(pair_members(&[pair("a", "b"), pair("b", "c")]), ["a", "b", "c"]);
    }
}
