//! ExecutionPool: concurrent agent fan-out with one deadline per invocation.
//!
//! ```text
//!   run_tasks(tasks, deadline)
//!     ├─ JoinSet::spawn(task_0)   NativeAsync → driven on the runtime
//!     ├─ JoinSet::spawn(task_1)   Blocking    → spawn_blocking, gated by
//!     ├─ ...                                    a max_workers semaphore
//!     └─ join loop: timeout_at(deadline, join_next())
//!          ├─ each resolved task → RunResult + AgentCompleted event
//!          └─ deadline           → outstanding tasks marked timed_out
//! ```
//!
//! Every agent yields exactly one [`RunResult`]. Failures, panics and
//! timeouts are captured per agent and never escape `run`/`run_tasks`.
//! Timeout is logical: a blocking call that overruns keeps its worker
//! thread (and its semaphore permit) until it returns, and its output is
//! discarded.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn, Instrument, Span};

use crate::agent::{AgentCapability, AgentContext, AgentError, AgentTask, SharedAgent};
use crate::events::{DeliberationEvent, SharedEventBus};
use crate::proposal::Proposal;
use crate::telemetry;

/// Default number of worker threads for blocking agents.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Outcome record for one agent in one pool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub agent_id: String,
    pub ok: bool,
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: u64,
    pub proposal_count: usize,
}

impl RunResult {
    fn succeeded(agent_id: &str, latency_ms: u64, proposal_count: usize) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            ok: true,
            timed_out: false,
            error: None,
            latency_ms,
            proposal_count,
        }
    }

    fn errored(agent_id: &str, latency_ms: u64, err: &AgentError) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            ok: false,
            timed_out: err.is_timeout(),
            error: Some(err.to_string()),
            latency_ms,
            proposal_count: 0,
        }
    }
}

/// Joined output of one pool invocation.
#[derive(Debug, Clone, Default)]
pub struct PoolOutput {
    /// Proposals of every `ok` agent, in submission order.
    pub proposals: Vec<Proposal>,
    /// One result per submitted agent, in submission order.
    pub results: Vec<RunResult>,
    per_agent: Vec<Vec<Proposal>>,
}

impl PoolOutput {
    /// Proposals contributed by one agent (empty if it failed or is unknown).
    pub fn proposals_from(&self, agent_id: &str) -> &[Proposal] {
        self.results
            .iter()
            .position(|r| r.agent_id == agent_id)
            .and_then(|idx| self.per_agent.get(idx))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn result_for(&self, agent_id: &str) -> Option<&RunResult> {
        self.results.iter().find(|r| r.agent_id == agent_id)
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.ok).count()
    }

    pub fn timed_out(&self) -> usize {
        self.results.iter().filter(|r| r.timed_out).count()
    }

    /// Agents that failed for any reason other than a timeout.
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.ok && !r.timed_out).count()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Bookkeeping for a submitted task, kept on the join side.
struct Submitted {
    name: String,
    run_id: String,
    round: u32,
}

/// Concurrent executor for agent calls.
pub struct ExecutionPool {
    max_workers: usize,
    workers: Arc<Semaphore>,
    events: Option<SharedEventBus>,
}

impl ExecutionPool {
    /// Create a pool; `max_workers` is raised to at least 1.
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            max_workers,
            workers: Arc::new(Semaphore::new(max_workers)),
            events: None,
        }
    }

    pub fn with_event_bus(mut self, bus: SharedEventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Worker slots not currently held by a blocking call.
    pub fn available_workers(&self) -> usize {
        self.workers.available_permits()
    }

    pub fn event_bus(&self) -> Option<&SharedEventBus> {
        self.events.as_ref()
    }

    /// Run every agent against the same context.
    pub async fn run(
        &self,
        agents: &[SharedAgent],
        context: &AgentContext,
        deadline: Duration,
    ) -> PoolOutput {
        let tasks = agents
            .iter()
            .map(|agent| AgentTask::new(Arc::clone(agent), context.clone()))
            .collect();
        self.run_tasks(tasks, deadline).await
    }

    /// Run each task with its own context; wait at most `deadline` overall.
    pub async fn run_tasks(&self, tasks: Vec<AgentTask>, deadline: Duration) -> PoolOutput {
        if tasks.is_empty() {
            return PoolOutput::default();
        }
        let span = telemetry::invoke_span(tasks.len(), duration_ms(deadline));
        self.drive(tasks, deadline).instrument(span).await
    }

    async fn drive(&self, tasks: Vec<AgentTask>, deadline: Duration) -> PoolOutput {
        let started = Instant::now();
        let batch_deadline = started + deadline;

        let mut submitted = Vec::with_capacity(tasks.len());
        let mut join_set: JoinSet<(usize, Result<Vec<Proposal>, AgentError>, u64)> =
            JoinSet::new();

        for (idx, task) in tasks.into_iter().enumerate() {
            let agent_deadline = match task.agent.timeout() {
                Some(limit) => batch_deadline.min(started + limit),
                None => batch_deadline,
            };
            submitted.push(Submitted {
                name: task.agent.name().to_string(),
                run_id: task.context.run_id.clone(),
                round: task.context.round,
            });

            let span = telemetry::agent_span(
                task.agent.name(),
                &task.agent.capability().to_string(),
                task.context.round,
            );
            let workers = Arc::clone(&self.workers);
            join_set.spawn(
                async move {
                    let start = Instant::now();
                    let result = invoke(task, workers, agent_deadline).await;
                    let latency_ms = duration_ms(start.elapsed());
                    telemetry::record_agent_result(&Span::current(), result.is_ok(), latency_ms);
                    (idx, result, latency_ms)
                }
                .instrument(span),
            );
        }

        let mut slots: Vec<Option<(RunResult, Vec<Proposal>)>> =
            (0..submitted.len()).map(|_| None).collect();
        let mut deadline_hit = false;

        loop {
            match tokio::time::timeout_at(batch_deadline, join_set.join_next()).await {
                Ok(Some(Ok((idx, outcome, latency_ms)))) => {
                    let meta = &submitted[idx];
                    let (result, proposals) = match outcome {
                        Ok(proposals) => {
                            debug!(
                                agent = %meta.name,
                                proposals = proposals.len(),
                                latency_ms,
                                "agent completed"
                            );
                            (
                                RunResult::succeeded(&meta.name, latency_ms, proposals.len()),
                                proposals,
                            )
                        }
                        Err(err) => {
                            warn!(agent = %meta.name, error = %err, latency_ms, "agent failed");
                            (RunResult::errored(&meta.name, latency_ms, &err), Vec::new())
                        }
                    };
                    self.publish_completion(meta, &result);
                    slots[idx] = Some((result, proposals));
                }
                Ok(Some(Err(join_err))) => {
                    // Tasks catch their own panics; this only fires if the runtime
                    // cancelled one underneath us.
                    warn!(error = %join_err, "agent task lost");
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_hit = true;
                    break;
                }
            }
        }

        // Logical cancellation: outstanding futures are dropped, blocking
        // calls run to completion on their worker and are discarded.
        join_set.abort_all();

        let elapsed_ms = duration_ms(started.elapsed());
        let mut output = PoolOutput::default();
        for (idx, slot) in slots.into_iter().enumerate() {
            let (result, proposals) = match slot {
                Some(done) => done,
                None => {
                    let meta = &submitted[idx];
                    let err = if deadline_hit {
                        AgentError::Timeout {
                            after_ms: duration_ms(deadline),
                        }
                    } else {
                        AgentError::failure("agent task was cancelled before completing")
                    };
                    warn!(agent = %meta.name, error = %err, "agent did not finish");
                    let result = RunResult::errored(&meta.name, elapsed_ms, &err);
                    self.publish_completion(meta, &result);
                    (result, Vec::new())
                }
            };
            if result.ok {
                output.proposals.extend(proposals.iter().cloned());
            }
            output.results.push(result);
            output.per_agent.push(proposals);
        }

        telemetry::record_invoke_result(
            &Span::current(),
            output.succeeded(),
            output.timed_out(),
            elapsed_ms,
        );
        debug!(
            agents = output.results.len(),
            succeeded = output.succeeded(),
            timed_out = output.timed_out(),
            failed = output.failed(),
            elapsed_ms,
            "pool invocation joined"
        );
        output
    }

    fn publish_completion(&self, meta: &Submitted, result: &RunResult) {
        if let Some(bus) = &self.events {
            bus.publish(DeliberationEvent::AgentCompleted {
                run_id: meta.run_id.clone(),
                round: meta.round,
                name: meta.name.clone(),
                proposal_count: result.proposal_count,
                latency_ms: result.latency_ms,
                ok: result.ok,
                timed_out: result.timed_out,
                timestamp: Utc::now(),
            });
        }
    }
}

impl Default for ExecutionPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS)
    }
}

/// Drive one agent call to completion or to its own deadline.
async fn invoke(
    task: AgentTask,
    workers: Arc<Semaphore>,
    deadline: Instant,
) -> Result<Vec<Proposal>, AgentError> {
    let budget_ms = duration_ms(deadline.saturating_duration_since(Instant::now()));
    let AgentTask { agent, context } = task;

    let work = async move {
        match agent.capability() {
            AgentCapability::NativeAsync => AssertUnwindSafe(agent.propose_async(&context))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(AgentError::Panicked(panic_message(&*payload)))),
            AgentCapability::Blocking => {
                let permit = match workers.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return Err(AgentError::failure("worker pool closed")),
                };
                let handle = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    agent.propose(&context)
                });
                match handle.await {
                    Ok(result) => result,
                    Err(err) if err.is_panic() => {
                        Err(AgentError::Panicked(panic_message(&*err.into_panic())))
                    }
                    Err(err) => Err(AgentError::Internal(err.into())),
                }
            }
        }
    };

    match tokio::time::timeout_at(deadline, work).await {
        Ok(result) => result,
        Err(_) => Err(AgentError::Timeout {
            after_ms: budget_ms,
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
