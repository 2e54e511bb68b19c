//! Host-shell side of the automation process.
//!
//! Spawns the bot as a child process with its configuration injected
//! through the environment, relays its stdout events and stderr lines to an
//! [`EventSink`], and drives it with control commands on stdin.
//!
//! Startup waits for the child's `ready` event. If the child exits first,
//! startup fails; if neither happens within the ready timeout, the child is
//! presumed alive and reported as `Running (Timed out)`.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ShellConfig;
use crate::error::{Result, SupervisorError};
use crate::events::{ControlCommand, EventSink, ProcessEvent, Status};

/// How long to wait for `ready` before reporting a degraded start.
pub const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a graceful shutdown may take before the child is killed.
pub const STOP_GRACE: Duration = Duration::from_secs(1);

/// Upper bound for the child to disappear after a kill.
const KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Program and arguments used to launch the automation process.
#[derive(Debug, Clone)]
pub struct ChildCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ChildCommand {
    pub fn new(program: impl Into<PathBuf>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// This executable's own `bot` subcommand.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self {
            program: std::env::current_exe()?,
            args: vec!["bot".to_string()],
        })
    }
}

/// Exit state published by the watcher task: `None` while running,
/// `Some(code)` once the child is gone.
type ExitState = Option<Option<i32>>;

struct RunningChild {
    generation: u64,
    stdin: ChildStdin,
    /// Dropping this kills the child.
    kill: Option<oneshot::Sender<()>>,
    exited: watch::Receiver<ExitState>,
}

#[derive(Default)]
struct Inner {
    running: Option<RunningChild>,
    generation: u64,
}

/// Manages at most one automation child process.
pub struct Supervisor {
    command: ChildCommand,
    ready_timeout: Duration,
    stop_grace: Duration,
    inner: Arc<Mutex<Inner>>,
}

impl Supervisor {
    pub fn new(command: ChildCommand) -> Self {
        Self {
            command,
            ready_timeout: READY_TIMEOUT,
            stop_grace: STOP_GRACE,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.running.is_some()
    }

    /// Spawn the child and wait for it to become ready.
    pub async fn start(&self, config: &ShellConfig, sink: Arc<dyn EventSink>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.running.is_some() {
            return Err(SupervisorError::AlreadyRunning.into());
        }
        config.validate()?;

        sink.on_log("Initializing Discord bot...");

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .envs(config.to_env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(SupervisorError::Spawn)?;

        let stdin = child.stdin.take().ok_or_else(|| {
            SupervisorError::ControlChannel("child stdin unavailable".into())
        })?;
        let (ready_tx, ready_rx) = oneshot::channel();
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel::<ExitState>(None);

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(relay_stdout(stdout, Arc::clone(&sink), ready_tx));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(relay_stderr(stderr, Arc::clone(&sink)));
        }

        inner.generation += 1;
        let generation = inner.generation;
        info!(pid = ?child.id(), generation, "Bot process spawned");

        tokio::spawn(watch_exit(
            child,
            kill_rx,
            exit_tx,
            Arc::clone(&sink),
            Arc::clone(&self.inner),
            generation,
        ));

        inner.running = Some(RunningChild {
            generation,
            stdin,
            kill: Some(kill_tx),
            exited: exit_rx.clone(),
        });
        drop(inner);

        // The readiness deadline runs from spawn, whatever happens to stdout.
        let deadline = Instant::now() + self.ready_timeout;
        let mut exited = exit_rx.clone();
        let mut after_close = exit_rx;
        tokio::select! {
            ready = ready_rx => match ready {
                Ok(()) => {
                    sink.on_status(Status::Running);
                    Ok(())
                }
                // stdout closed without `ready`; wait for the exit, bounded by the deadline.
                Err(_) => tokio::select! {
                    code = wait_exit(&mut after_close) => {
                        Err(SupervisorError::ExitedDuringStartup { code: code.flatten() }.into())
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        report_startup_timeout(sink.as_ref());
                        Ok(())
                    }
                },
            },
            code = wait_exit(&mut exited) => {
                Err(SupervisorError::ExitedDuringStartup { code: code.flatten() }.into())
            }
            _ = tokio::time::sleep_until(deadline) => {
                report_startup_timeout(sink.as_ref());
                Ok(())
            }
        }
    }

    /// Ask the child to shut down, killing it if it does not exit in time.
    /// Returns `false` when nothing was running.
    pub async fn stop(&self) -> Result<bool> {
        let Some(mut running) = self.inner.lock().await.running.take() else {
            return Ok(false);
        };
        let mut exited = running.exited.clone();

        if write_command(&mut running.stdin, &ControlCommand::Shutdown)
            .await
            .is_ok()
            && tokio::time::timeout(self.stop_grace, wait_exit(&mut exited))
                .await
                .is_ok()
        {
            return Ok(true);
        }

        debug!("Graceful shutdown did not finish; killing bot process");
        if let Some(kill) = running.kill.take() {
            let _ = kill.send(());
        }
        tokio::time::timeout(KILL_TIMEOUT, wait_exit(&mut exited))
            .await
            .map_err(|_| SupervisorError::StopTimeout {
                timeout: KILL_TIMEOUT,
            })?;
        Ok(true)
    }

    /// Forward a control command to the running child.
    pub async fn send(&self, command: ControlCommand) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let running = inner.running.as_mut().ok_or(SupervisorError::NotRunning)?;
        write_command(&mut running.stdin, &command).await?;
        Ok(())
    }

    pub async fn toggle_fishing(&self) -> Result<()> {
        self.send(ControlCommand::ToggleFishing).await
    }
}

fn report_startup_timeout(sink: &dyn EventSink) {
    warn!("Bot startup timed out");
    sink.on_log("Bot startup timed out, but process is still running");
    sink.on_status(Status::TimedOut);
}

async fn write_command(
    stdin: &mut ChildStdin,
    command: &ControlCommand,
) -> std::result::Result<(), SupervisorError> {
    let line = format!("{}\n", command.to_line());
    stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| SupervisorError::ControlChannel(e.to_string()))?;
    stdin
        .flush()
        .await
        .map_err(|e| SupervisorError::ControlChannel(e.to_string()))
}

/// Resolves once the watcher publishes an exit. `None` if the watcher died.
async fn wait_exit(exited: &mut watch::Receiver<ExitState>) -> Option<Option<i32>> {
    let state = exited.wait_for(Option::is_some).await.ok().map(|state| *state);
    state.flatten()
}

async fn relay_stdout(
    stdout: tokio::process::ChildStdout,
    sink: Arc<dyn EventSink>,
    ready_tx: oneshot::Sender<()>,
) {
    let mut ready_tx = Some(ready_tx);
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match ProcessEvent::parse_line(&line) {
            Some(ProcessEvent::Ready) => {
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(());
                }
            }
            Some(event) => sink.emit(event),
            None if line.trim().is_empty() => {}
            None => sink.on_log(line.trim()),
        }
    }
}

async fn relay_stderr(stderr: tokio::process::ChildStderr, sink: Arc<dyn EventSink>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if !line.is_empty() {
            sink.on_log(&format!("ERROR: {line}"));
        }
    }
}

async fn watch_exit(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: watch::Sender<ExitState>,
    sink: Arc<dyn EventSink>,
    inner: Arc<Mutex<Inner>>,
    generation: u64,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_rx => {
            if let Err(e) = child.start_kill() {
                warn!("Failed to kill bot process: {e}");
            }
            child.wait().await
        }
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            warn!("Failed to wait for bot process: {e}");
            None
        }
    };
    let shown = code.map_or_else(|| "null".to_string(), |c| c.to_string());
    info!(code = %shown, "Bot process exited");
    sink.on_log(&format!("Bot process exited with code {shown}"));
    sink.on_status(Status::Stopped);

    let mut inner = inner.lock().await;
    if inner
        .running
        .as_ref()
        .is_some_and(|r| r.generation == generation)
    {
        inner.running = None;
    }
    drop(inner);
    let _ = exit_tx.send(Some(code));
}
