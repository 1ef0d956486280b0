//! Child process lifecycle for one sync run.
//!
//! At most one run is active at a time. A supervisor thread spawns the
//! external tool with the ephemeral config directory as its working
//! directory, reader threads forward each output line to an unbounded
//! queue, and the caller polls that queue on its own schedule. The queue is
//! the only cross-thread channel; cancellation is a cooperative stop flag
//! plus a best-effort kill that is never awaited by the cancelling caller.
//!
//! States: `Idle → Starting → Running → (Succeeded | Failed | Cancelled)`.
//! Terminal states persist until the next start and count as ready for a
//! new invocation.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc};
use std::thread;

use anyhow::{Context, Result, bail};
use tracing::{debug, error, info, instrument, warn};

use crate::credentials::EphemeralConfig;

/// Interpreter used when the caller does not override it.
pub const DEFAULT_PYTHON: &str = "python3";

/// Python module name of the external tool.
pub const DEFAULT_MODULE: &str = "spotify_to_tidal";

/// Fully composed child invocation.
///
/// Carries no working directory: the coordinator always runs the child
/// inside the ephemeral config directory so the tool finds its
/// `config.yml`. Environment is inherited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl LaunchSpec {
    /// Compose `<python> -m <module> <args...>`.
    pub fn for_module(python: &str, module: &str, args: Vec<String>) -> Self {
        let mut full_args = vec!["-m".to_string(), module.to_string()];
        full_args.extend(args);
        Self {
            program: python.to_string(),
            args: full_args,
        }
    }

    /// Human-readable command line for diagnostics. Never contains secrets;
    /// those only exist inside the config document.
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Coordinator state, observable from the polling side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Idle,
    Starting,
    Running,
    Succeeded,
    Failed { code: Option<i32> },
    Cancelled,
}

impl RunStatus {
    /// `true` while a run occupies the single invocation slot.
    pub fn is_active(&self) -> bool {
        matches!(self, RunStatus::Starting | RunStatus::Running)
    }
}

/// Terminal result of one run, delivered through the event queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed { code: Option<i32>, message: String },
    Cancelled,
}

/// One entry in the output queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// One decoded line of the child's merged stdout/stderr.
    Line(String),
    /// The run reached a terminal state and the ephemeral config is gone.
    Finished(RunOutcome),
}

struct Shared {
    status: Mutex<RunStatus>,
    stop: AtomicBool,
    child: Mutex<Option<Child>>,
}

/// Spawns and supervises the external tool, one run at a time.
pub struct Coordinator {
    shared: Arc<Shared>,
    sender: Sender<Event>,
    receiver: Mutex<Receiver<Event>>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            shared: Arc::new(Shared {
                status: Mutex::new(RunStatus::Idle),
                stop: AtomicBool::new(false),
                child: Mutex::new(None),
            }),
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Begin a run. Takes ownership of the ephemeral config; the supervisor
    /// deletes it once the child has exited, whatever the outcome.
    ///
    /// Rejected while a run is already `Starting` or `Running` — no
    /// queueing, no cancel-then-restart automation, no second child.
    pub fn start(&self, spec: LaunchSpec, config: EphemeralConfig) -> Result<()> {
        {
            let mut status = lock(&self.shared.status);
            if status.is_active() {
                bail!("a sync run is already in progress");
            }
            *status = RunStatus::Starting;
        }
        self.shared.stop.store(false, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let sender = self.sender.clone();
        let spawned = thread::Builder::new()
            .name("s2t-run".to_string())
            .spawn(move || run_supervisor(&shared, &sender, &spec, config));
        if let Err(err) = spawned {
            // The closure (and with it the config dir) was dropped.
            *lock(&self.shared.status) = RunStatus::Idle;
            return Err(err).context("spawn supervisor thread");
        }
        Ok(())
    }

    /// Request cancellation: set the stop flag and ask the child to die.
    ///
    /// Best-effort and non-blocking; exit is observed asynchronously when
    /// the reader threads hit end-of-stream. A run cancelled before the
    /// child exits always ends `Cancelled`, regardless of the exit code.
    pub fn cancel(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(child) = lock(&self.shared.child).as_mut() {
            info!("cancellation requested, terminating child");
            if let Err(err) = child.kill() {
                warn!(err = %err, "could not terminate child");
            }
        } else {
            debug!("cancel requested with no running child");
        }
    }

    /// Drain all pending events without blocking.
    ///
    /// The caller polls on a fixed short interval; the queue's own
    /// synchronization is the only lock involved.
    pub fn poll(&self) -> Vec<Event> {
        let receiver = lock(&self.receiver);
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Snapshot of the current status.
    pub fn status(&self) -> RunStatus {
        lock(&self.shared.status).clone()
    }
}

/// Lock that recovers from poisoning; a panicked holder only ever leaves
/// fully written values behind here.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[instrument(skip_all, fields(program = %spec.program))]
fn run_supervisor(
    shared: &Arc<Shared>,
    sender: &Sender<Event>,
    spec: &LaunchSpec,
    config: EphemeralConfig,
) {
    info!(workdir = %config.path().display(), "starting external tool");

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(config.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            error!(err = %err, "failed to spawn external tool");
            let message = format!(
                "could not start `{}`: {err}. Make sure `{}` is installed and the interpreter is on PATH.",
                spec.command_line(),
                DEFAULT_MODULE
            );
            let _ = sender.send(Event::Line(message.clone()));
            config.close();
            finish(shared, sender, RunOutcome::Failed {
                code: None,
                message,
            });
            return;
        }
    };

    *lock(&shared.status) = RunStatus::Running;

    // Two readers feeding one queue give the merged-stream view; each is
    // the only reader of its pipe.
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        let sender = sender.clone();
        let shared = Arc::clone(shared);
        readers.push(thread::spawn(move || {
            forward_lines(stdout, &sender, &shared.stop);
        }));
    }
    if let Some(stderr) = child.stderr.take() {
        let sender = sender.clone();
        let shared = Arc::clone(shared);
        readers.push(thread::spawn(move || {
            forward_lines(stderr, &sender, &shared.stop);
        }));
    }

    *lock(&shared.child) = Some(child);

    // Close the window where cancel() ran before the handle was stored.
    if shared.stop.load(Ordering::SeqCst)
        && let Some(child) = lock(&shared.child).as_mut()
        && let Err(err) = child.kill()
    {
        warn!(err = %err, "could not terminate child after early cancel");
    }

    for handle in readers {
        if handle.join().is_err() {
            warn!("output reader thread panicked");
        }
    }

    // Pipes are closed; reclaim the handle before waiting so cancel() is
    // never blocked behind a lingering child.
    let child = lock(&shared.child).take();
    let outcome = match child {
        Some(mut child) => match child.wait() {
            Ok(status) => classify_exit(shared, status),
            Err(err) => {
                error!(err = %err, "could not collect child exit status");
                RunOutcome::Failed {
                    code: None,
                    message: format!("could not collect exit status: {err}"),
                }
            }
        },
        None => RunOutcome::Failed {
            code: None,
            message: "child handle disappeared".to_string(),
        },
    };

    config.close();
    finish(shared, sender, outcome);
}

fn classify_exit(shared: &Shared, status: ExitStatus) -> RunOutcome {
    // Stop flag wins over the exit code: a killed child often reports
    // non-zero, and that must not read as a failure.
    if shared.stop.load(Ordering::SeqCst) {
        return RunOutcome::Cancelled;
    }
    if status.success() {
        return RunOutcome::Succeeded;
    }
    let code = status.code();
    let message = match code {
        Some(code) => format!("external tool exited with code {code}"),
        None => "external tool was terminated by a signal".to_string(),
    };
    RunOutcome::Failed { code, message }
}

/// Publish the terminal status, then the `Finished` event.
///
/// Status is written first so a poller that sees `Finished` never observes
/// an active status afterwards. The child handle is already cleared.
fn finish(shared: &Shared, sender: &Sender<Event>, outcome: RunOutcome) {
    let status = match &outcome {
        RunOutcome::Succeeded => RunStatus::Succeeded,
        RunOutcome::Cancelled => RunStatus::Cancelled,
        RunOutcome::Failed { code, .. } => RunStatus::Failed { code: *code },
    };
    debug!(status = ?status, "run finished");
    *lock(&shared.status) = status;
    let _ = sender.send(Event::Finished(outcome));
}

/// Blocking line loop over one child pipe.
///
/// The stop flag is checked once per line, which bounds cancellation
/// latency without busy-waiting; once set, already-produced output is no
/// longer forwarded. Lines are decoded lossily so binary noise from the
/// child cannot kill the stream.
fn forward_lines<R: Read>(reader: R, sender: &Sender<Event>, stop: &AtomicBool) {
    let mut reader = BufReader::new(reader);
    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                while matches!(line.last(), Some(b'\n' | b'\r')) {
                    line.pop();
                }
                let text = String::from_utf8_lossy(&line).into_owned();
                if sender.send(Event::Line(text)).is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!(err = %err, "error reading child output");
                break;
            }
        }
    }
}
