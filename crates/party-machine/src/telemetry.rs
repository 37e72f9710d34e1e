//! Span helpers for deliberation tracing.
//!
//! All spans use dot-notation field names so they export cleanly to an
//! OpenTelemetry collector when a subscriber with that layer is installed.
//! The library never installs a subscriber itself.
//!
//! # Span Hierarchy
//!
//! ```text
//! deliberation.run              (one per deliberate()/convene() call)
//!   └─ deliberation.round       (one per round k >= 1)
//!       └─ party.invoke         (one ExecutionPool invocation)
//!           └─ party.agent      (one agent call)
//! ```

use tracing::Span;

// ── Span Name Constants ──────────────────────────────────────────────

pub const SPAN_RUN: &str = "deliberation.run";
pub const SPAN_ROUND: &str = "deliberation.round";
pub const SPAN_INVOKE: &str = "party.invoke";
pub const SPAN_AGENT: &str = "party.agent";

// ── Field Name Constants ─────────────────────────────────────────────

pub const FIELD_RUN_ID: &str = "deliberation.run_id";
pub const FIELD_ROUND: &str = "deliberation.round.number";
pub const FIELD_ROLE: &str = "deliberation.role";
pub const FIELD_PROPOSALS: &str = "deliberation.proposals";
pub const FIELD_REVISED: &str = "deliberation.revised";
pub const FIELD_TERMINATION: &str = "deliberation.termination";
pub const FIELD_AGENT_NAME: &str = "party.agent.name";
pub const FIELD_CAPABILITY: &str = "party.agent.capability";
pub const FIELD_AGENT_COUNT: &str = "party.agent_count";
pub const FIELD_TIMED_OUT: &str = "party.timed_out";
pub const FIELD_SUCCESS: &str = "party.success";
pub const FIELD_DURATION_MS: &str = "party.duration_ms";

// ── Span Builders ────────────────────────────────────────────────────

/// Root span for one deliberation.
///
/// Fields filled later via [`record_run_result`]: rounds, proposals, termination.
pub fn run_span(run_id: &str, agent_count: usize, dialectic: bool) -> Span {
    tracing::info_span!(
        "deliberation.run",
        "deliberation.run_id" = %run_id,
        "party.agent_count" = agent_count as u64,
        "deliberation.dialectic" = dialectic,
        "deliberation.round.number" = tracing::field::Empty,
        "deliberation.proposals" = tracing::field::Empty,
        "deliberation.termination" = tracing::field::Empty,
    )
}

pub fn record_run_result(span: &Span, rounds: u32, proposals: usize, termination: &str) {
    span.record("deliberation.round.number", rounds);
    span.record("deliberation.proposals", proposals as u64);
    span.record("deliberation.termination", termination);
}

/// Span for one deliberation round.
///
/// Fields filled later via [`record_round_result`]: proposals, revised, duration.
pub fn round_span(run_id: &str, round: u32, role: &str) -> Span {
    tracing::info_span!(
        "deliberation.round",
        "deliberation.run_id" = %run_id,
        "deliberation.round.number" = round,
        "deliberation.role" = %role,
        "deliberation.proposals" = tracing::field::Empty,
        "deliberation.revised" = tracing::field::Empty,
        "party.duration_ms" = tracing::field::Empty,
    )
}

pub fn record_round_result(span: &Span, proposals: usize, revised: usize, duration_ms: u64) {
    span.record("deliberation.proposals", proposals as u64);
    span.record("deliberation.revised", revised as u64);
    span.record("party.duration_ms", duration_ms);
}

/// Span for one `ExecutionPool` invocation.
pub fn invoke_span(agent_count: usize, deadline_ms: u64) -> Span {
    tracing::info_span!(
        "party.invoke",
        "party.agent_count" = agent_count as u64,
        "party.deadline_ms" = deadline_ms,
        "party.success" = tracing::field::Empty,
        "party.timed_out" = tracing::field::Empty,
        "party.duration_ms" = tracing::field::Empty,
    )
}

/// Record how many agents succeeded and timed out in one invocation.
pub fn record_invoke_result(span: &Span, succeeded: usize, timed_out: usize, duration_ms: u64) {
    span.record("party.success", succeeded as u64);
    span.record("party.timed_out", timed_out as u64);
    span.record("party.duration_ms", duration_ms);
}

/// Span for one agent call inside the pool.
pub fn agent_span(name: &str, capability: &str, round: u32) -> Span {
    tracing::debug_span!(
        "party.agent",
        "party.agent.name" = %name,
        "party.agent.capability" = %capability,
        "deliberation.round.number" = round,
        "party.success" = tracing::field::Empty,
        "party.duration_ms" = tracing::field::Empty,
    )
}

pub fn record_agent_result(span: &Span, success: bool, duration_ms: u64) {
    span.record("party.success", success);
    span.record("party.duration_ms", duration_ms);
}
