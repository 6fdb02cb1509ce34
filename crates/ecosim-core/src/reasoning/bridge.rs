//! Reasoning Bridge
//!
//! Runs reasoning calls on a dedicated tokio runtime so the tick loop never
//! blocks. Each call is a spawned task that reports back through an unbounded
//! channel; the controller drains the channel at the start of every tick.
//!
//! At most one call is in flight per agent. Calls for agents that die are
//! aborted, and any completion that arrives for a request no longer tracked
//! is discarded.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ecosim_events::AgentId;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::config::ReasoningConfig;

use super::backend::ReasoningBackend;
use super::parse::parse_decision;
use super::{ReasoningDecision, ReasoningError, ReasoningRequest};

/// Outcome of one request, after retries
#[derive(Debug)]
pub struct Completion {
    pub agent: AgentId,
    pub request_id: u64,
    pub attempts: u32,
    pub result: Result<ReasoningDecision, ReasoningError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Requests refused because the agent already had a call in flight
    pub skipped: u64,
    /// Completions discarded because nobody was waiting for them
    pub stale: u64,
}

pub struct ReasoningBridge {
    runtime: Runtime,
    backend: Arc<ReasoningBackend>,
    tx: UnboundedSender<Completion>,
    rx: UnboundedReceiver<Completion>,
    in_flight: BTreeMap<AgentId, (u64, JoinHandle<()>)>,
    timeout: Duration,
    max_retries: u32,
    stats: BridgeStats,
}

impl ReasoningBridge {
    pub fn new(config: &ReasoningConfig, backend: ReasoningBackend) -> Result<Self, ReasoningError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name("ecosim-reasoning")
            .enable_all()
            .build()
            .map_err(|e| ReasoningError::Unavailable(format!("failed to start runtime: {e}")))?;
        let (tx, rx) = mpsc::unbounded_channel();
        tracing::info!(
            backend = backend.name(),
            timeout_ms = config.timeout_ms,
            max_retries = config.max_retries,
            "reasoning bridge started"
        );
        Ok(Self {
            runtime,
            backend: Arc::new(backend),
            tx,
            rx,
            in_flight: BTreeMap::new(),
            timeout: Duration::from_millis(config.timeout_ms.max(1)),
            max_retries: config.max_retries,
            stats: BridgeStats::default(),
        })
    }

    /// Spawn a call for `request`. Returns false if the agent already has one in flight.
    pub fn dispatch(&mut self, request: ReasoningRequest) -> bool {
        let agent = request.agent.id;
        if self.in_flight.contains_key(&agent) {
            self.stats.skipped += 1;
            tracing::trace!(%agent, "reasoning call already in flight");
            return false;
        }

        let request_id = request.request_id;
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        let timeout = self.timeout;
        let max_retries = self.max_retries;

        let handle = self.runtime.spawn(async move {
            let (result, attempts) = request_decision(&backend, &request, timeout, max_retries).await;
            let completion = Completion {
                agent,
                request_id,
                attempts,
                result,
            };
            if tx.send(completion).is_err() {
                tracing::trace!(%agent, "bridge closed before completion");
            }
        });

        self.in_flight.insert(agent, (request_id, handle));
        self.stats.dispatched += 1;
        true
    }

    /// Completions received since the last poll, in agent id order
    pub fn poll(&mut self) -> Vec<Completion> {
        let mut done = Vec::new();
        while let Ok(completion) = self.rx.try_recv() {
            if let Some(completion) = self.accept(completion) {
                done.push(completion);
            }
        }
        done.sort_by_key(|c| c.agent);
        done
    }

    /// Block until `count` completions have arrived or `limit` elapses.
    pub fn wait_for(&mut self, count: usize, limit: Duration) -> Vec<Completion> {
        let deadline = Instant::now() + limit;
        let mut done = Vec::new();
        while done.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let rx = &mut self.rx;
            let received = self
                .runtime
                .block_on(async { tokio::time::timeout(remaining, rx.recv()).await });
            match received {
                Ok(Some(completion)) => {
                    if let Some(completion) = self.accept(completion) {
                        done.push(completion);
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
        done.sort_by_key(|c| c.agent);
        done
    }

    fn accept(&mut self, completion: Completion) -> Option<Completion> {
        match self.in_flight.get(&completion.agent) {
            Some((id, _)) if *id == completion.request_id => {
                self.in_flight.remove(&completion.agent);
            }
            _ => {
                self.stats.stale += 1;
                return None;
            }
        }
        match &completion.result {
            Ok(_) => self.stats.succeeded += 1,
            Err(e) => {
                self.stats.failed += 1;
                tracing::debug!(agent = %completion.agent, error = %e, "reasoning call failed, using local decision");
            }
        }
        Some(completion)
    }

    /// Abort the agent's outstanding call, if any
    pub fn cancel(&mut self, agent: AgentId) -> bool {
        match self.in_flight.remove(&agent) {
            Some((_, handle)) => {
                handle.abort();
                self.stats.cancelled += 1;
                true
            }
            None => false,
        }
    }

    /// Abort every outstanding call
    pub fn cancel_all(&mut self) {
        let agents: Vec<AgentId> = self.in_flight.keys().copied().collect();
        for agent in agents {
            self.cancel(agent);
        }
    }

    pub fn is_in_flight(&self, agent: AgentId) -> bool {
        self.in_flight.contains_key(&agent)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }
}

impl Drop for ReasoningBridge {
    fn drop(&mut self) {
        for (_, (_, handle)) in std::mem::take(&mut self.in_flight) {
            handle.abort();
        }
    }
}

/// One request with per-attempt timeout and bounded retries
async fn request_decision(
    backend: &ReasoningBackend,
    request: &ReasoningRequest,
    timeout: Duration,
    max_retries: u32,
) -> (Result<ReasoningDecision, ReasoningError>, u32) {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let result = match tokio::time::timeout(timeout, backend.generate(request)).await {
            Ok(Ok(body)) => parse_decision(&body),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ReasoningError::Timeout(timeout.as_millis() as u64)),
        };
        match result {
            Err(e) if e.is_retryable() && attempts <= max_retries => {
                tracing::debug!(
                    agent = %request.agent.id,
                    attempt = attempts,
                    error = %e,
                    "retrying reasoning call"
                );
            }
            other => return (other, attempts),
        }
    }
}
