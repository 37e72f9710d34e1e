//! DeliberationEngine integration tests with scripted philosophers.
//!
//! Covers: tension-driven reviser selection, the dialectic role sequence,
//! strong-emergence halting, influence attribution, encoder fallback,
//! all-agent failure, cancellation, the wall-clock budget, and the event
//! stream.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use deliberation::{
    DeliberationConfig, DeliberationEngine, EncodingError, InteractionMatrix, Role, Termination,
    TextSimilarityBackend,
};
use party_machine::events::drain_events;
use party_machine::{
    Agent, AgentCapability, AgentContext, AgentError, DeliberationEvent, EventBus, Proposal,
    SharedAgent,
};

static INIT: Once = Once::new();

/// Route engine logs to the test writer so failures show the round trail.
fn init_test_subscriber() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

const FREE: &str = "freedom individual subjective reason autonomy personal";
const FATED: &str = "determinism collective objective emotion necessity society";
const NEUTRAL: &str = "bananas grow slowly near rivers";

/// Blocking agent that states its thesis in round 1 and revises with `revise`.
struct Philosopher {
    name: &'static str,
    thesis: &'static str,
    revise: fn(&str, u32) -> String,
    delay: Duration,
    seen: Mutex<Vec<AgentContext>>,
}

impl Philosopher {
    fn new(name: &'static str, thesis: &'static str) -> Arc<Self> {
        Self::build(name, thesis, keep_thesis, Duration::ZERO)
    }

    fn revising(name: &'static str, thesis: &'static str, revise: fn(&str, u32) -> String) -> Arc<Self> {
        Self::build(name, thesis, revise, Duration::ZERO)
    }

    fn slow(name: &'static str, thesis: &'static str, delay_ms: u64) -> Arc<Self> {
        Self::build(name, thesis, keep_thesis, Duration::from_millis(delay_ms))
    }

    fn build(
        name: &'static str,
        thesis: &'static str,
        revise: fn(&str, u32) -> String,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            thesis,
            revise,
            delay,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn initial(&self) -> Proposal {
        Proposal::new(self.name, self.thesis)
    }

    fn contexts(&self) -> Vec<AgentContext> {
        self.seen.lock().unwrap().clone()
    }
}

impl Agent for Philosopher {
    fn name(&self) -> &str {
        self.name
    }

    fn propose(&self, ctx: &AgentContext) -> Result<Vec<Proposal>, AgentError> {
        self.seen.lock().unwrap().push(ctx.clone());
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let text = if ctx.round <= 1 {
            self.thesis.to_string()
        } else {
            (self.revise)(self.thesis, ctx.round)
        };
        Ok(vec![Proposal::new(self.name, text)])
    }
}

/// Native-async agent that answers under someone else's name.
struct Ventriloquist {
    name: &'static str,
    speaks_as: &'static str,
    thesis: &'static str,
}

#[async_trait]
impl Agent for Ventriloquist {
    fn name(&self) -> &str {
        self.name
    }

    fn capability(&self) -> AgentCapability {
        AgentCapability::NativeAsync
    }

    fn propose(&self, _ctx: &AgentContext) -> Result<Vec<Proposal>, AgentError> {
        Err(AgentError::failure("blocking path must not be used"))
    }

    async fn propose_async(&self, ctx: &AgentContext) -> Result<Vec<Proposal>, AgentError> {
        tokio::time::sleep(Duration::from_millis(2)).await;
        let text = if ctx.round <= 1 {
            self.thesis.to_string()
        } else {
            drift(self.thesis, ctx.round)
        };
        Ok(vec![Proposal::new(self.speaks_as, text)])
    }
}

/// Embedding backend that works for `ok_calls` encodes, then goes away.
struct Fading {
    calls: AtomicUsize,
    ok_calls: usize,
}

impl TextSimilarityBackend for Fading {
    fn name(&self) -> &str {
        "fading"
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EncodingError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.ok_calls {
            Ok(vec![text.len() as f32, 1.0, 0.5])
        } else {
            Err(EncodingError::Unavailable("embedding server restarted".into()))
        }
    }
}

struct Mute(&'static str);

impl Agent for Mute {
    fn name(&self) -> &str {
        self.0
    }

    fn propose(&self, _ctx: &AgentContext) -> Result<Vec<Proposal>, AgentError> {
        Err(AgentError::failure("nothing to say"))
    }
}

/// Same stance, one extra neutral word per round.
fn keep_thesis(thesis: &str, round: u32) -> String {
    format!("{thesis} revised r{round}")
}

/// Mostly the same vocabulary with a few new words.
fn drift(thesis: &str, _round: u32) -> String {
    format!("{thesis} tempered by considered doubt")
}

/// Word-for-word restatement of round 1.
fn restate(thesis: &str, _round: u32) -> String {
    thesis.to_string()
}

/// Keeps the thesis but adds as much new material.
fn widen(thesis: &str, _round: u32) -> String {
    format!("{thesis} yet history economics language ritual memory myth")
}

/// Nothing in common with any round-1 proposal.
fn leap(_thesis: &str, _round: u32) -> String {
    "an entirely unprecedented cosmological vista".to_string()
}

fn shared(agents: &[Arc<Philosopher>]) -> Vec<SharedAgent> {
    agents
        .iter()
        .map(|a| Arc::clone(a) as SharedAgent)
        .collect()
}

fn initial(agents: &[Arc<Philosopher>]) -> Vec<Proposal> {
    agents.iter().map(|a| a.initial()).collect()
}

// ── Reviser selection ───────────────────────────────────────────────

#[tokio::test]
async fn test_disjoint_vocabulary_pair_is_selected_to_revise() {
    let kant = Philosopher::new("kant", FREE);
    let spinoza = Philosopher::new("spinoza", FATED);
    let gardener = Philosopher::new("gardener", NEUTRAL);
    let agents = vec![Arc::clone(&kant), Arc::clone(&spinoza), Arc::clone(&gardener)];

    let matrix = InteractionMatrix::from_proposals(&initial(&agents));
    let tension = matrix.tension_between("kant", "spinoza").unwrap();
    assert!((tension - 1.0).abs() < 1e-9, "tension was {tension}");

    let config = DeliberationConfig::default().with_top_k(1).with_max_rounds(2);
    let engine = DeliberationEngine::new(config).unwrap();
    let result = engine
        .deliberate(&shared(&agents), "is the will free?", initial(&agents))
        .await
        .unwrap();

    assert_eq!(result.rounds.len(), 2);
    assert_eq!(result.rounds[0].n_revised, 0);
    assert_eq!(result.rounds[1].n_revised, 2);
    assert_eq!(result.rounds[1].n_proposals, 3);
    assert_eq!(result.termination, Termination::Completed);

    assert!(gardener.contexts().is_empty());
    let kant_ctx = kant.contexts();
    assert_eq!(kant_ctx.len(), 1);
    assert_eq!(kant_ctx[0].round, 2);
    assert_eq!(kant_ctx[0].counterpart.as_deref(), Some("spinoza"));
    assert_eq!(kant_ctx[0].counterargument.as_deref(), Some(FATED));
    assert_eq!(
        kant_ctx[0].previous.as_ref().map(Proposal::content),
        Some(FREE)
    );

    let kant_final = result.proposals.iter().find(|p| p.author() == "kant").unwrap();
    assert_eq!(kant_final.content(), keep_thesis(FREE, 2));
    let gardener_final = result.proposals.iter().find(|p| p.author() == "gardener").unwrap();
    assert_eq!(gardener_final.content(), NEUTRAL);
}

#[tokio::test]
async fn test_dialectic_mode_forces_three_roles() {
    let kant = Philosopher::new("kant", FREE);
    let spinoza = Philosopher::new("spinoza", FATED);
    let agents = vec![Arc::clone(&kant), Arc::clone(&spinoza)];

    let mut config = DeliberationConfig::default()
        .with_max_rounds(1)
        .with_dialectic(true);
    config.detect_emergence = false;
    let engine = DeliberationEngine::new(config).unwrap();

    let result = engine
        .deliberate(&shared(&agents), "what grounds morality?", initial(&agents))
        .await
        .unwrap();

    let roles: Vec<Role> = result.rounds.iter().map(|r| r.role).collect();
    assert_eq!(roles, [Role::Thesis, Role::Antithesis, Role::Synthesis]);
    assert_eq!(result.final_role(), Some(Role::Synthesis));

    let seen = kant.contexts();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].role, "antithesis");
    assert!(seen[0].prompt.starts_with("ANTITHESIS"));
    assert!(seen[0].prompt.ends_with("what grounds morality?"));
    assert_eq!(seen[1].role, "synthesis");
    assert!(seen[1].prompt.starts_with("SYNTHESIS"));
    assert!(seen[1].prompt.contains("[spinoza]:"));
}

// ── Emergence and influence ─────────────────────────────────────────

#[tokio::test]
async fn test_strong_emergence_halts_before_influence_update() {
    let kant = Philosopher::revising("kant", FREE, leap);
    let spinoza = Philosopher::revising("spinoza", FATED, leap);
    let agents = vec![kant, spinoza];

    let config = DeliberationConfig::default()
        .with_max_rounds(3)
        .with_thresholds(0.0, 0.0);
    let engine = DeliberationEngine::new(config).unwrap();

    let result = engine
        .deliberate(&shared(&agents), "what is time?", initial(&agents))
        .await
        .unwrap();

    assert_eq!(result.termination, Termination::StrongEmergence { round: 2 });
    assert_eq!(result.rounds.len(), 2);
    assert!(result.has_emergence());
    assert!(result.peak_novelty() > 0.0);
    assert!(result.influence_weights.is_empty());

    let signal = &result.emergence_signals[0];
    assert_eq!(signal.round_detected, 2);
    let (catalyst, source) = signal.catalyst_pair.clone().unwrap();
    assert_eq!(source, signal.source_philosopher);
    assert_ne!(catalyst, source);
}

#[tokio::test]
async fn test_influence_is_credited_to_catalyst() {
    let kant = Philosopher::revising("kant", FREE, drift);
    let spinoza = Philosopher::new("spinoza", FATED);
    let agents = vec![kant, spinoza];

    let config = DeliberationConfig::default()
        .with_top_k(1)
        .with_max_rounds(2)
        .with_thresholds(0.3, 1.0);
    let engine = DeliberationEngine::new(config).unwrap();

    let result = engine
        .deliberate(&shared(&agents), "is the will free?", initial(&agents))
        .await
        .unwrap();

    assert_eq!(result.termination, Termination::Completed);
    let weight = result
        .influence_weights
        .iter()
        .find(|w| w.philosopher_id == "spinoza")
        .expect("spinoza moved kant");
    let score = weight.influenced["kant"];
    assert!(score > 0.0 && score < 1.0, "score was {score}");
}

#[tokio::test]
async fn test_verbatim_restatement_is_not_emergence() {
    init_test_subscriber();
    let agents = vec![
        Philosopher::revising("plato", "justice is the harmony of the soul", restate),
        Philosopher::revising("zeno", FATED, restate),
    ];

    let config = DeliberationConfig::default()
        .with_max_rounds(2)
        .with_thresholds(0.0, 0.0);
    let engine = DeliberationEngine::new(config).unwrap();
    let result = engine
        .deliberate(&shared(&agents), "what is justice?", initial(&agents))
        .await
        .unwrap();

    assert_eq!(result.termination, Termination::Completed);
    assert!(result.emergence_signals.is_empty());
    assert_eq!(result.peak_novelty(), 0.0);
}

#[tokio::test]
async fn test_failing_embedding_backend_never_aborts() {
    init_test_subscriber();
    let kant = Philosopher::revising("kant", FREE, widen);
    let spinoza = Philosopher::new("spinoza", FATED);
    let agents = vec![kant, spinoza];

    let backend = Arc::new(Fading {
        calls: AtomicUsize::new(0),
        ok_calls: 2,
    });
    let config = DeliberationConfig::default()
        .with_top_k(1)
        .with_max_rounds(2)
        .with_thresholds(0.1, 1.0);
    let engine = DeliberationEngine::with_backend(config, backend.clone()).unwrap();

    let result = engine
        .deliberate(&shared(&agents), "is the will free?", initial(&agents))
        .await
        .unwrap();

    assert!(engine.encoder().is_degraded());
    assert_eq!(engine.encoder().active_backend(), "keyword");
    assert!(backend.calls.load(Ordering::SeqCst) > 2);

    assert_eq!(result.termination, Termination::Completed);
    assert!(result
        .emergence_signals
        .iter()
        .any(|s| s.source_philosopher == "kant"));
    assert!(result
        .influence_weights
        .iter()
        .any(|w| w.philosopher_id == "spinoza" && w.influenced.contains_key("kant")));
}

#[tokio::test]
async fn test_revisions_are_attributed_to_the_producing_agent() {
    init_test_subscriber();
    let mimic: SharedAgent = Arc::new(Ventriloquist {
        name: "kant",
        speaks_as: "anonymous",
        thesis: FREE,
    });
    let spinoza = Philosopher::new("spinoza", FATED);
    let agents: Vec<SharedAgent> = vec![mimic, Arc::clone(&spinoza) as SharedAgent];

    let config = DeliberationConfig::default()
        .with_top_k(1)
        .with_max_rounds(2)
        .with_thresholds(0.3, 1.0);
    let engine = DeliberationEngine::new(config).unwrap();
    let result = engine.convene(&agents, "is the will free?").await.unwrap();

    let authors: Vec<&str> = result.proposals.iter().map(Proposal::author).collect();
    assert_eq!(authors, ["kant", "spinoza"]);
    assert_eq!(result.rounds[1].n_revised, 2);
    assert_eq!(spinoza.contexts()[1].counterpart.as_deref(), Some("kant"));
    assert!(result
        .influence_weights
        .iter()
        .any(|w| w.philosopher_id == "spinoza" && w.influenced.contains_key("kant")));
}

// ── Failure paths ───────────────────────────────────────────────────

#[tokio::test]
async fn test_convene_with_all_agents_failing() {
    let agents: Vec<SharedAgent> = vec![Arc::new(Mute("a")), Arc::new(Mute("b"))];
    let engine = DeliberationEngine::new(DeliberationConfig::default()).unwrap();

    let result = engine.convene(&agents, "anyone?").await.unwrap();

    assert!(result.proposals.is_empty());
    assert_eq!(result.rounds[0].n_proposals, 0);
    assert_eq!(result.rounds[0].n_failed, 2);
    assert_eq!(result.rounds.len(), 3);
    assert_eq!(result.total_revisions(), 0);
    assert!(!result.has_emergence());
    assert_eq!(result.termination, Termination::Completed);
}

#[tokio::test]
async fn test_convene_generates_round_one() {
    let kant = Philosopher::new("kant", FREE);
    let spinoza = Philosopher::new("spinoza", FATED);
    let agents = vec![Arc::clone(&kant), spinoza];

    let config = DeliberationConfig::default().with_top_k(1).with_max_rounds(2);
    let engine = DeliberationEngine::new(config).unwrap();
    let result = engine.convene(&shared(&agents), "is the will free?").await.unwrap();

    assert_eq!(result.rounds[0].n_proposals, 2);
    assert_eq!(result.rounds[1].n_revised, 2);
    let rounds: Vec<u32> = kant.contexts().iter().map(|c| c.round).collect();
    assert_eq!(rounds, [1, 2]);
}

#[tokio::test]
async fn test_cancelled_before_revision_rounds() {
    let agents = vec![Philosopher::new("kant", FREE), Philosopher::new("spinoza", FATED)];
    let engine = DeliberationEngine::new(DeliberationConfig::default()).unwrap();
    engine.cancellation_token().cancel();

    let result = engine
        .deliberate(&shared(&agents), "is the will free?", initial(&agents))
        .await
        .unwrap();

    assert_eq!(result.termination, Termination::Cancelled { round: 1 });
    assert_eq!(result.rounds.len(), 1);
    assert_eq!(result.proposals.len(), 2);
}

#[tokio::test]
async fn test_budget_exhaustion_stops_the_loop() {
    let agents = vec![
        Philosopher::slow("kant", FREE, 400),
        Philosopher::slow("spinoza", FATED, 400),
    ];
    let mut config = DeliberationConfig::default()
        .with_max_rounds(4)
        .with_round_timeout(Duration::from_secs(5));
    config.total_budget_ms = Some(100);
    let engine = DeliberationEngine::new(config).unwrap();

    let started = std::time::Instant::now();
    let result = engine
        .deliberate(&shared(&agents), "is the will free?", initial(&agents))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_millis(350));
    assert_eq!(result.termination, Termination::BudgetExhausted { round: 2 });
    assert_eq!(result.rounds.len(), 2);
    assert_eq!(result.rounds[1].n_timed_out, 2);
    assert_eq!(result.rounds[1].n_revised, 0);
    // Timed-out revisions leave the round-1 board intact.
    let contents: Vec<&str> = result.proposals.iter().map(Proposal::content).collect();
    assert_eq!(contents, [FREE, FATED]);
}

// ── Events ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_event_stream_for_one_run() {
    let bus = EventBus::new().shared();
    let mut rx = bus.subscribe();
    let agents = vec![Philosopher::new("kant", FREE), Philosopher::new("spinoza", FATED)];

    let config = DeliberationConfig::default().with_top_k(1).with_max_rounds(2);
    let engine = DeliberationEngine::new(config)
        .unwrap()
        .with_event_bus(Arc::clone(&bus));
    engine
        .deliberate(&shared(&agents), "is the will free?", initial(&agents))
        .await
        .unwrap();

    let events = drain_events(&mut rx);
    let kinds: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
    assert_eq!(kinds.first(), Some(&"round_completed"));
    assert_eq!(kinds.last(), Some(&"deliberation_completed"));
    assert_eq!(kinds.iter().filter(|k| **k == "agent_completed").count(), 2);
    assert_eq!(kinds.iter().filter(|k| **k == "round_completed").count(), 2);

    let run_id = events[0].run_id().to_string();
    assert!(events.iter().all(|e| e.run_id() == run_id));

    let rounds: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            DeliberationEvent::RoundCompleted { round, .. } => Some(*round),
            _ => None,
        })
        .collect();
    assert_eq!(rounds, [1, 2]);
}
