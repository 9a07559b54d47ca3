//! Runs one program at a time on a sandbox worker, racing it against a timer.
//!
//! ## Design
//!
//! The coordinator owns at most one [`Worker`]. The first run (or an explicit
//! [`warm_up`](Coordinator::warm_up)) spawns it and waits for it to load; the
//! wait is bounded by `ready_timeout_ms` and is not charged to the run.
//!
//! A run posts the program and then waits on the worker's event channel with
//! `recv_timeout` until the run's deadline. Whichever comes first decides the
//! result, and nothing that arrives later can change it:
//!
//! - a reply tagged with the run's sequence number becomes the result
//! - the deadline passing gives a timeout result
//! - a fault or a dead channel gives a worker-fault result
//!
//! After a timeout or a fault the worker is terminated and replaced straight
//! away, so the next run gets a fresh interpreter. Replies tagged with an
//! older sequence number, or ready messages, are discarded. Terminated
//! workers are kept in a retired list until their threads have exited;
//! [`lingering_workers`](Coordinator::lingering_workers) reports how many are
//! still winding down.
//!
//! Runs are serialised by `&mut self`: there is never more than one in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::WorkerError;
use crate::runner::Executor;
use crate::stdin::Prompter;
use crate::types::{timeout_message, ExecutionRequest, ExecutionResult, FailureKind, SandboxSettings};
use crate::worker::{ExecuteMessage, Worker, WorkerEvent, WorkerMessage, WorkerState};

/// How a dispatched run ended, before it is turned into a result.
enum Outcome {
    Reply {
        output: Option<String>,
        error: Option<String>,
    },
    Timeout,
    Fault(String),
}

/// Owner of the sandbox worker.
pub struct Coordinator {
    settings: SandboxSettings,
    prompter: Option<Arc<dyn Prompter>>,
    worker: Option<Worker>,
    retired: Vec<Worker>,
    spawned: u64,
}

impl Coordinator {
    pub fn new(settings: SandboxSettings) -> Self {
        Self {
            settings,
            prompter: None,
            worker: None,
            retired: Vec::new(),
            spawned: 0,
        }
    }

    /// Answer function-mode `input()` calls with `prompter`. Applies to
    /// workers spawned from now on.
    pub fn with_prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    pub fn settings(&self) -> &SandboxSettings {
        &self.settings
    }

    /// Number of workers spawned so far, replacements included.
    pub fn workers_spawned(&self) -> u64 {
        self.spawned
    }

    /// Terminated workers whose threads are still running.
    pub fn lingering_workers(&mut self) -> usize {
        self.retired.retain(|worker| !worker.has_exited());
        self.retired.len()
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker
            .as_ref()
            .map_or(WorkerState::Uninitialized, Worker::state)
    }

    /// Spawn the worker (if needed) and wait for it to load.
    pub fn warm_up(&mut self) -> Result<(), WorkerError> {
        self.ready_worker().map(|_| ())
    }

    /// Ping the worker. An unresponsive worker is replaced.
    pub fn liveness(&mut self) -> Result<(), WorkerError> {
        let timeout = self.settings.timeout();
        let result = self.ready_worker().and_then(|worker| worker.ping(timeout));
        if let Err(err) = &result {
            warn!(%err, "liveness check failed");
            self.recycle("liveness");
        }
        result
    }

    /// Run one program and report its outcome. Never panics on learner code.
    pub fn run_one(&mut self, request: &ExecutionRequest) -> ExecutionResult {
        let started = Instant::now();
        let result = match self.dispatch(request) {
            Outcome::Reply { output, error } => ExecutionResult::from_reply(output, error),
            Outcome::Timeout => {
                warn!(timeout_ms = request.timeout_ms, "run timed out");
                self.recycle("timeout");
                ExecutionResult::failed(FailureKind::Timeout, timeout_message(request.timeout_ms))
            }
            Outcome::Fault(message) => {
                warn!(%message, "worker fault");
                self.recycle("fault");
                ExecutionResult::failed(FailureKind::WorkerFault, format!("Worker error: {message}"))
            }
        };
        let result = result.with_duration(started.elapsed());
        debug!(
            duration_ms = result.duration_ms,
            failure = ?result.failure,
            "run finished"
        );
        result
    }

    fn dispatch(&mut self, request: &ExecutionRequest) -> Outcome {
        let worker = match self.ready_worker() {
            Ok(worker) => worker,
            Err(err) => return Outcome::Fault(err.to_string()),
        };
        let seq = match worker.post(ExecuteMessage::from(request)) {
            Ok(seq) => seq,
            Err(err) => return Outcome::Fault(err.to_string()),
        };

        let deadline = Instant::now() + request.timeout();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining == Duration::ZERO {
                return Outcome::Timeout;
            }
            match worker.next_event(remaining) {
                Ok(None) => return Outcome::Timeout,
                Ok(Some(WorkerEvent::Message {
                    seq: Some(tag),
                    message: WorkerMessage::Reply { output, error },
                })) if tag == seq => {
                    worker.complete(seq);
                    return Outcome::Reply { output, error };
                }
                Ok(Some(WorkerEvent::Fault { seq: tag, message }))
                    if tag.map_or(true, |t| t == seq) =>
                {
                    return Outcome::Fault(message);
                }
                Ok(Some(stale)) => debug!(?stale, seq, "discarding event for another request"),
                Err(err) => return Outcome::Fault(err.to_string()),
            }
        }
    }

    /// The current worker, spawned and loaded if necessary.
    fn ready_worker(&mut self) -> Result<&mut Worker, WorkerError> {
        let needs_spawn = self
            .worker
            .as_ref()
            .map_or(true, |w| w.state() == WorkerState::Terminated);
        if needs_spawn {
            self.spawn_worker()?;
        }

        let ready_timeout = self.settings.ready_timeout();
        let worker = self
            .worker
            .as_mut()
            .ok_or(WorkerError::Disconnected)?;
        if let Err(err) = worker.wait_ready(ready_timeout) {
            worker.terminate();
            return Err(err);
        }
        Ok(worker)
    }

    fn spawn_worker(&mut self) -> Result<(), WorkerError> {
        self.spawned += 1;
        let mut worker = Worker::new(self.spawned, self.settings.clone(), self.prompter.clone());
        worker.initialize()?;
        self.worker = Some(worker);
        Ok(())
    }

    /// Terminate the current worker and start its replacement loading.
    fn recycle(&mut self, reason: &str) {
        if let Some(mut old) = self.worker.take() {
            old.terminate();
            self.retired.push(old);
        }
        self.retired.retain(|worker| !worker.has_exited());
        match self.spawn_worker() {
            Ok(()) => info!(reason, worker = self.spawned, "worker replaced"),
            Err(err) => warn!(reason, %err, "could not spawn replacement worker"),
        }
    }
}

impl Executor for Coordinator {
    fn run_one(&mut self, request: &ExecutionRequest) -> ExecutionResult {
        Coordinator::run_one(self, request)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
