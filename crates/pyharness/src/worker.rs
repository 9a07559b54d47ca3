//! Sandbox worker: one interpreter on one dedicated thread.
//!
//! The interpreter is `!Send`, so it is built on the worker thread and never
//! leaves it. The owning side talks to the thread over two channels:
//! [`WorkerRequest`]s in and [`WorkerEvent`]s out. Each execute request is
//! tagged with a sequence number, and the reply carries the same tag so a
//! late reply from an abandoned request can be told apart from the current
//! one.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized --initialize--> Initializing --ready--> Ready <--> Busy
//!        any state --terminate / fault / disconnect--> Terminated
//! ```
//!
//! A terminated worker is never reused; the coordinator builds a new one.
//! Terminating raises a shared flag, drops the request channel and hands the
//! thread to a reaper that keeps sending the interpreter an interrupt until
//! the thread has exited. Learner code that is still running raises
//! `KeyboardInterrupt` at its next bytecode instruction.
//!
//! The thread runs on a [`WORKER_STACK_SIZE`] stack, enough for the
//! interpreter's recursion limit.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rustpython_vm::signal::{user_signal_channel, UserSignalReceiver, UserSignalSender};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::WorkerError;
use crate::output::CaptureBuffer;
use crate::stdin::{InputSource, Prompter};
use crate::types::{ExecutionRequest, SandboxSettings};
use crate::vm::{build_interpreter, forget_modules_since, interrupt_signal, loaded_modules, run_code, RunContext};

/// Native stack of a worker thread.
pub const WORKER_STACK_SIZE: usize = 256 * 1024 * 1024;

/// How often an abandoned worker is interrupted again while it winds down.
const INTERRUPT_RETRY: Duration = Duration::from_millis(25);

/// How long the reaper keeps interrupting before giving up on a thread.
const REAPER_PATIENCE: Duration = Duration::from_secs(30);

// ── Protocol ──────────────────────────────────────────────────────────────────

/// Input lines for a program-mode request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramInput {
    pub test_input_list: Vec<String>,
}

/// Payload of an execute request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteMessage {
    pub user_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_case: Option<ProgramInput>,
    /// Program mode: serve `input()` from `test_case`.
    #[serde(default, alias = "isProgram")]
    pub program: bool,
}

impl From<&ExecutionRequest> for ExecuteMessage {
    fn from(request: &ExecutionRequest) -> Self {
        Self {
            user_code: request.user_code.clone(),
            test_case: request.stdin_lines.clone().map(|test_input_list| ProgramInput {
                test_input_list,
            }),
            program: request.is_program(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    Ready,
    Ping,
}

/// A message produced by the worker, in its JSON shape.
///
/// `{"type":"ready"}` is a control message; `{"output": ...}` and
/// `{"error": ...}` are execution replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerMessage {
    Control {
        #[serde(rename = "type")]
        kind: ControlKind,
    },
    Reply {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl WorkerMessage {
    pub fn ready() -> Self {
        WorkerMessage::Control {
            kind: ControlKind::Ready,
        }
    }
}

#[derive(Debug)]
pub(crate) enum WorkerRequest {
    Ping,
    Execute { seq: u64, message: ExecuteMessage },
}

/// Something the worker thread reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// A regular message; `seq` is set on replies to execute requests.
    Message {
        seq: Option<u64>,
        message: WorkerMessage,
    },
    /// The thread failed and is exiting.
    Fault { seq: Option<u64>, message: String },
}

// ── Handle ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Uninitialized,
    Initializing,
    Ready,
    Busy,
    Terminated,
}

struct Channels {
    requests: Sender<WorkerRequest>,
    events: Receiver<WorkerEvent>,
}

/// What is needed to stop the thread once it has been abandoned.
struct ThreadHandle {
    join: JoinHandle<()>,
    interrupts: UserSignalSender,
}

/// Owning handle for one worker thread.
pub struct Worker {
    id: u64,
    settings: SandboxSettings,
    prompter: Option<Arc<dyn Prompter>>,
    state: WorkerState,
    channels: Option<Channels>,
    thread: Option<ThreadHandle>,
    terminated: Arc<AtomicBool>,
    exited: Arc<AtomicBool>,
    next_seq: u64,
    in_flight: Option<u64>,
}

impl Worker {
    pub fn new(id: u64, settings: SandboxSettings, prompter: Option<Arc<dyn Prompter>>) -> Self {
        Self {
            id,
            settings,
            prompter,
            state: WorkerState::Uninitialized,
            channels: None,
            thread: None,
            terminated: Arc::new(AtomicBool::new(false)),
            exited: Arc::new(AtomicBool::new(true)),
            next_seq: 1,
            in_flight: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Whether the thread has finished, interpreter dropped. A worker that was
    /// never initialised has no thread and counts as exited.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Sequence number of the request in flight, if any.
    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    /// Spawn the thread and start loading the runtime. Returns immediately;
    /// use [`wait_ready`](Self::wait_ready) to block until it has loaded.
    pub fn initialize(&mut self) -> Result<(), WorkerError> {
        if self.state != WorkerState::Uninitialized {
            return Err(WorkerError::AlreadyStarted(self.id));
        }
        let (request_tx, request_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let (interrupt_tx, interrupt_rx) = user_signal_channel();
        let settings = self.settings.clone();
        let prompter = self.prompter.clone();
        let terminated = Arc::clone(&self.terminated);
        self.exited.store(false, Ordering::SeqCst);
        let exited = Arc::clone(&self.exited);
        let id = self.id;

        let join = thread::Builder::new()
            .name(format!("pyharness-worker-{id}"))
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || {
                let channels = WorkerChannels {
                    requests: request_rx,
                    events: event_tx,
                };
                worker_main(id, settings, prompter, channels, interrupt_rx, terminated);
                exited.store(true, Ordering::SeqCst);
            })
            .map_err(|e| {
                self.exited.store(true, Ordering::SeqCst);
                WorkerError::Spawn(e.to_string())
            })?;

        self.channels = Some(Channels {
            requests: request_tx,
            events: event_rx,
        });
        self.thread = Some(ThreadHandle {
            join,
            interrupts: interrupt_tx,
        });
        self.state = WorkerState::Initializing;
        debug!(worker = id, "worker thread spawned");
        Ok(())
    }

    /// Block until the runtime has loaded, or `timeout` elapses.
    pub fn wait_ready(&mut self, timeout: Duration) -> Result<(), WorkerError> {
        match self.state {
            WorkerState::Ready | WorkerState::Busy => return Ok(()),
            WorkerState::Uninitialized => return Err(WorkerError::NotReady(self.id)),
            WorkerState::Terminated => return Err(WorkerError::Terminated(self.id)),
            WorkerState::Initializing => {}
        }
        let started = Instant::now();
        let deadline = started + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.next_event(remaining)? {
                None => return Err(WorkerError::ReadyTimeout(timeout)),
                Some(WorkerEvent::Message {
                    message: WorkerMessage::Control { kind: ControlKind::Ready },
                    ..
                }) => {
                    self.state = WorkerState::Ready;
                    info!(
                        worker = self.id,
                        load_ms = started.elapsed().as_millis() as u64,
                        "worker ready"
                    );
                    return Ok(());
                }
                Some(WorkerEvent::Fault { message, .. }) => {
                    self.mark_terminated();
                    return Err(WorkerError::RuntimeLoad(message));
                }
                Some(other) => debug!(worker = self.id, ?other, "ignoring event while loading"),
            }
        }
    }

    /// Liveness check: the worker answers a ping with a ready message.
    pub fn ping(&mut self, timeout: Duration) -> Result<(), WorkerError> {
        self.ensure_idle()?;
        self.send(WorkerRequest::Ping)?;
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.next_event(remaining)? {
                None => return Err(WorkerError::Unresponsive(timeout)),
                Some(WorkerEvent::Message {
                    message: WorkerMessage::Control { kind: ControlKind::Ready },
                    ..
                }) => return Ok(()),
                Some(WorkerEvent::Fault { message, .. }) => {
                    self.mark_terminated();
                    return Err(WorkerError::RuntimeLoad(message));
                }
                Some(stale) => debug!(worker = self.id, ?stale, "discarding stale event"),
            }
        }
    }

    /// Send an execute request. Only one request may be in flight.
    pub fn post(&mut self, message: ExecuteMessage) -> Result<u64, WorkerError> {
        self.ensure_idle()?;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.send(WorkerRequest::Execute { seq, message })?;
        self.state = WorkerState::Busy;
        self.in_flight = Some(seq);
        Ok(seq)
    }

    /// Wait up to `timeout` for the next event. `Ok(None)` means nothing
    /// arrived in time.
    pub fn next_event(&mut self, timeout: Duration) -> Result<Option<WorkerEvent>, WorkerError> {
        let Some(channels) = self.channels.as_ref() else {
            return Err(WorkerError::Terminated(self.id));
        };
        match channels.events.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                self.mark_terminated();
                Err(WorkerError::Disconnected)
            }
        }
    }

    /// Mark request `seq` as answered and return to `Ready`.
    pub fn complete(&mut self, seq: u64) {
        if self.in_flight == Some(seq) {
            self.in_flight = None;
            self.state = WorkerState::Ready;
        }
    }

    /// Stop the worker. Idempotent.
    pub fn terminate(&mut self) {
        if self.state == WorkerState::Terminated {
            return;
        }
        info!(worker = self.id, state = ?self.state, "terminating worker");
        self.mark_terminated();
    }

    /// Interrupt the thread until it exits, from a detached reaper thread.
    fn reap(&mut self) {
        let Some(ThreadHandle { join, interrupts }) = self.thread.take() else {
            return;
        };
        if join.is_finished() {
            return;
        }
        let id = self.id;
        let spawned = thread::Builder::new()
            .name(format!("pyharness-reaper-{id}"))
            .spawn(move || {
                let started = Instant::now();
                // The wake-up flag is process wide and another interpreter may
                // consume it first, so keep sending until the thread is gone.
                while !join.is_finished() {
                    if started.elapsed() > REAPER_PATIENCE {
                        warn!(worker = id, "worker thread did not stop; abandoning it");
                        return;
                    }
                    if interrupts.send(interrupt_signal()).is_err() {
                        break;
                    }
                    thread::sleep(INTERRUPT_RETRY);
                }
                debug!(
                    worker = id,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "worker thread stopped"
                );
            });
        if let Err(err) = spawned {
            warn!(worker = id, %err, "could not start reaper thread");
        }
    }

    fn mark_terminated(&mut self) {
        self.terminated.store(true, Ordering::SeqCst);
        self.channels = None;
        self.in_flight = None;
        self.state = WorkerState::Terminated;
        self.reap();
    }

    fn ensure_idle(&self) -> Result<(), WorkerError> {
        match self.state {
            WorkerState::Ready => Ok(()),
            WorkerState::Busy => Err(WorkerError::Busy(self.id)),
            WorkerState::Uninitialized | WorkerState::Initializing => {
                Err(WorkerError::NotReady(self.id))
            }
            WorkerState::Terminated => Err(WorkerError::Terminated(self.id)),
        }
    }

    fn send(&mut self, request: WorkerRequest) -> Result<(), WorkerError> {
        let sent = match self.channels.as_ref() {
            Some(channels) => channels.requests.send(request).is_ok(),
            None => return Err(WorkerError::Terminated(self.id)),
        };
        if sent {
            Ok(())
        } else {
            self.mark_terminated();
            Err(WorkerError::Disconnected)
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.terminate();
    }
}

// ── Worker thread ─────────────────────────────────────────────────────────────

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_owned()
    }
}

/// The thread's ends of the request and event channels.
struct WorkerChannels {
    requests: Receiver<WorkerRequest>,
    events: Sender<WorkerEvent>,
}

fn worker_main(
    id: u64,
    settings: SandboxSettings,
    prompter: Option<Arc<dyn Prompter>>,
    channels: WorkerChannels,
    interrupts: UserSignalReceiver,
    terminated: Arc<AtomicBool>,
) {
    let WorkerChannels { requests, events } = channels;
    let built = panic::catch_unwind(AssertUnwindSafe(|| build_interpreter(&settings, interrupts)));
    let mut interp = match built {
        Ok(interp) => interp,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(worker = id, %message, "runtime failed to load");
            let _ = events.send(WorkerEvent::Fault { seq: None, message });
            return;
        }
    };
    let baseline = loaded_modules(&interp);

    let ready = WorkerEvent::Message {
        seq: None,
        message: WorkerMessage::ready(),
    };
    if events.send(ready).is_err() {
        return;
    }

    while let Ok(request) = requests.recv() {
        if terminated.load(Ordering::SeqCst) {
            break;
        }
        match request {
            WorkerRequest::Ping => {
                let pong = WorkerEvent::Message {
                    seq: None,
                    message: WorkerMessage::ready(),
                };
                if events.send(pong).is_err() {
                    break;
                }
            }
            WorkerRequest::Execute { seq, message } => {
                let stdin_lines = message.program.then(|| {
                    message
                        .test_case
                        .map(|input| input.test_input_list)
                        .unwrap_or_default()
                });
                let capture = CaptureBuffer::new(settings.max_output_bytes);
                let ctx = RunContext {
                    code: &message.user_code,
                    capture: capture.clone(),
                    input: InputSource::for_run(stdin_lines, prompter.as_ref()),
                    terminated: Arc::clone(&terminated),
                };

                let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_code(&mut interp, ctx)));
                let reply = match outcome {
                    Ok(Ok(output)) => WorkerMessage::Reply {
                        output: Some(output),
                        error: None,
                    },
                    Ok(Err(error)) => WorkerMessage::Reply {
                        output: None,
                        error: Some(error),
                    },
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        warn!(worker = id, seq, %message, "worker panicked while executing");
                        let _ = events.send(WorkerEvent::Fault {
                            seq: Some(seq),
                            message,
                        });
                        break;
                    }
                };

                let stderr = capture.stderr();
                if !stderr.is_empty() {
                    debug!(worker = id, seq, %stderr, "learner code wrote to stderr");
                }
                forget_modules_since(&interp, &baseline);

                let event = WorkerEvent::Message {
                    seq: Some(seq),
                    message: reply,
                };
                if events.send(event).is_err() {
                    break;
                }
            }
        }
    }
    debug!(worker = id, "worker thread exiting");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
