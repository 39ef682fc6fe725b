//! Worker process supervisor.
//!
//! Owns the lifecycle of the single game-server process:
//! - `start` picks a launch command, spawns the worker in its own process
//!   group with a scrubbed environment, and wires its output into the
//!   [`LogHub`].
//! - `stop` asks the server to save and stop over the console, falls back
//!   to SIGTERM, and escalates to SIGKILL after a bounded wait.
//! - An exit watcher clears the worker handle and records how the process
//!   ended.

pub mod launcher;
pub mod signal;
pub mod sink;

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{LaunchConfig, SupervisorConfig};
use crate::logs::{LogHub, LogLine};
use crate::{AppError, Result};

pub use launcher::{select_launch, LaunchPlan};
pub use sink::CommandSink;

/// Environment variables passed through to the worker.
///
/// Everything else, including the agent's RCON password and token secret,
/// is stripped with `env_clear()`.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "LANG",
    "LC_ALL",
    "TZ",
    "USER",
    "JAVA_HOME",
    "TMPDIR",
];

/// Prefix of lines the supervisor writes into the log stream itself.
pub const LINE_PREFIX: &str = "[warden]";

/// How long the exit watcher waits for output pumps to drain.
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to wait for the exit watcher after SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// The live worker. At most one exists at a time.
#[derive(Debug, Clone)]
struct WorkerHandle {
    pid: u32,
    started_at: DateTime<Utc>,
    started: Instant,
    generation: u64,
}

/// Point-in-time view of the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    /// Whether a worker is running.
    pub running: bool,
    /// Worker pid.
    pub pid: Option<u32>,
    /// Wall-clock start time.
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds since start.
    pub uptime_seconds: Option<u64>,
}

/// Supervises the one worker process rooted at `root`.
pub struct ProcessSupervisor {
    root: PathBuf,
    launch: LaunchConfig,
    timing: SupervisorConfig,
    history_max: usize,
    logs: Arc<LogHub>,
    sink: Arc<dyn CommandSink>,
    worker: Arc<Mutex<Option<WorkerHandle>>>,
    generation: AtomicU64,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("root", &self.root)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl ProcessSupervisor {
    /// Create a supervisor for the server in `root`.
    #[must_use]
    pub fn new(
        root: PathBuf,
        launch: LaunchConfig,
        timing: SupervisorConfig,
        history_max: usize,
        logs: Arc<LogHub>,
        sink: Arc<dyn CommandSink>,
    ) -> Self {
        Self {
            root,
            launch,
            timing,
            history_max: history_max.max(1),
            logs,
            sink,
            worker: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<WorkerHandle>> {
        lock_handle(&self.worker)
    }

    /// Spawn the worker.
    ///
    /// Returns once the process is spawned; does not wait for the server
    /// to finish loading.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Precondition` if a worker is already running and
    /// `AppError::Process` if no launch command exists or the spawn fails.
    pub fn start(&self) -> Result<WorkerStatus> {
        let mut slot = self.lock_worker();
        if let Some(existing) = slot.as_ref() {
            return Err(AppError::Precondition(format!(
                "server is already running (pid {})",
                existing.pid
            )));
        }

        let plan = launcher::select_launch(&self.root, &self.launch)?;
        let mut child = self.spawn(&plan)?;
        let pid = child
            .id()
            .ok_or_else(|| AppError::Process("worker exited before its pid was read".into()))?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = WorkerHandle {
            pid,
            started_at: Utc::now(),
            started: Instant::now(),
            generation,
        };
        *slot = Some(handle.clone());

        self.logs.append(format!(
            "{LINE_PREFIX} Starting server with: {}",
            plan.describe()
        ));

        let stdout = child.stdout.take().map(|out| pump(out, Arc::clone(&self.logs)));
        let stderr = child.stderr.take().map(|err| pump(err, Arc::clone(&self.logs)));
        drop(slot);

        tokio::spawn(watch_exit(
            child,
            generation,
            [stdout, stderr],
            Arc::clone(&self.worker),
            Arc::clone(&self.logs),
        ));

        info!(pid, generation, command = %plan.describe(), "server started");
        Ok(status_of(Some(&handle)))
    }

    /// Stop the worker gracefully, escalating if it does not exit.
    ///
    /// Sends `save-all`, waits the flush delay, then sends `stop`. If the
    /// console is unreachable the worker gets SIGTERM instead. If it is
    /// still alive after the stop timeout it gets SIGKILL.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Precondition` if no worker is running and
    /// `AppError::Process` if a signal cannot be delivered.
    pub async fn stop(&self) -> Result<()> {
        let (pid, generation) = self
            .current()
            .ok_or_else(|| AppError::Precondition("server is not running".into()))?;

        info!(pid, "stopping server");

        if let Err(err) = self.request_console_stop().await {
            warn!(pid, %err, "console stop failed, sending SIGTERM");
            signal::terminate(pid)?;
        }

        if self.wait_for_exit(generation, self.timing.stop_timeout()).await {
            info!(pid, "server stopped");
            return Ok(());
        }

        warn!(
            pid,
            timeout_secs = self.timing.stop_timeout_seconds,
            "server did not exit in time, sending SIGKILL"
        );
        signal::force_kill(pid)?;
        if !self.wait_for_exit(generation, KILL_GRACE).await {
            error!(pid, "exit not observed after SIGKILL");
        }
        Ok(())
    }

    /// Stop if running, pause, then start.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`ProcessSupervisor::stop`] and
    /// [`ProcessSupervisor::start`].
    pub async fn restart(&self) -> Result<WorkerStatus> {
        if self.is_running() {
            self.stop().await?;
            tokio::time::sleep(self.timing.restart_delay()).await;
        }
        self.start()
    }

    /// SIGKILL the worker immediately.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Precondition` if no worker is running and
    /// `AppError::Process` if the signal cannot be delivered.
    pub async fn kill(&self) -> Result<()> {
        let (pid, generation) = self
            .current()
            .ok_or_else(|| AppError::Precondition("server is not running".into()))?;

        warn!(pid, "killing server");
        signal::force_kill(pid)?;
        if !self.wait_for_exit(generation, KILL_GRACE).await {
            error!(pid, "exit not observed after SIGKILL");
        }
        Ok(())
    }

    /// Whether a worker is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock_worker().is_some()
    }

    /// Worker pid, if running.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.lock_worker().as_ref().map(|handle| handle.pid)
    }

    /// Time since the worker started, if running.
    #[must_use]
    pub fn uptime(&self) -> Option<Duration> {
        self.lock_worker()
            .as_ref()
            .map(|handle| handle.started.elapsed())
    }

    /// Snapshot of the worker.
    #[must_use]
    pub fn status(&self) -> WorkerStatus {
        status_of(self.lock_worker().as_ref())
    }

    /// The most recent `min(lines, history_max)` output lines.
    #[must_use]
    pub fn history(&self, lines: usize) -> Vec<LogLine> {
        self.logs.recent(lines.min(self.history_max))
    }

    fn current(&self) -> Option<(u32, u64)> {
        self.lock_worker()
            .as_ref()
            .map(|handle| (handle.pid, handle.generation))
    }

    fn spawn(&self, plan: &LaunchPlan) -> Result<Child> {
        let mut cmd = Command::new(plan.program());
        cmd.args(plan.args());

        cmd.env_clear();
        for &key in ALLOWED_ENV_VARS {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }

        cmd.current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        // Own process group: signals reach script-launched JVMs, and a
        // Ctrl-C aimed at the agent does not reach the worker.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd.spawn()
            .map_err(|err| AppError::Process(format!("failed to spawn worker: {err}")))
    }

    async fn request_console_stop(&self) -> Result<()> {
        self.sink.dispatch("save-all").await?;
        tokio::time::sleep(self.timing.flush_delay()).await;
        self.sink.dispatch("stop").await?;
        Ok(())
    }

    /// Poll until the worker of `generation` is gone or `timeout` elapses.
    async fn wait_for_exit(&self, generation: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let alive = self
                .lock_worker()
                .as_ref()
                .is_some_and(|handle| handle.generation == generation);
            if !alive {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(self.timing.poll_interval()).await;
        }
    }
}

fn lock_handle(worker: &Mutex<Option<WorkerHandle>>) -> MutexGuard<'_, Option<WorkerHandle>> {
    worker.lock().unwrap_or_else(PoisonError::into_inner)
}

fn status_of(handle: Option<&WorkerHandle>) -> WorkerStatus {
    WorkerStatus {
        running: handle.is_some(),
        pid: handle.map(|h| h.pid),
        started_at: handle.map(|h| h.started_at),
        uptime_seconds: handle.map(|h| h.started.elapsed().as_secs()),
    }
}

/// Copy lines from one output stream into the hub.
fn pump<R>(stream: R, logs: Arc<LogHub>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    logs.append(text.trim_end_matches(['\r', '\n']));
                }
                Err(err) => {
                    debug!(%err, "worker output stream failed");
                    break;
                }
            }
        }
    })
}

async fn watch_exit(
    mut child: Child,
    generation: u64,
    pumps: [Option<JoinHandle<()>>; 2],
    worker: Arc<Mutex<Option<WorkerHandle>>>,
    logs: Arc<LogHub>,
) {
    let outcome = child.wait().await;

    let drain = async {
        for pump in pumps.into_iter().flatten() {
            let _ = pump.await;
        }
    };
    if tokio::time::timeout(PUMP_DRAIN_TIMEOUT, drain).await.is_err() {
        debug!(generation, "output pumps still open after exit");
    }

    let line = match outcome {
        Ok(status) => match status.code() {
            Some(code) => format!("{LINE_PREFIX} Server exited with code {code}"),
            None => format!("{LINE_PREFIX} Server terminated by {}", describe_signal(status)),
        },
        Err(err) => format!("{LINE_PREFIX} Lost track of server process: {err}"),
    };
    info!(generation, "{line}");
    // The exit line lands before the handle clears, so a caller that sees
    // the worker gone also sees why.
    logs.append(line);

    let mut slot = lock_handle(&worker);
    if slot
        .as_ref()
        .is_some_and(|handle| handle.generation == generation)
    {
        *slot = None;
    }
}

#[cfg(unix)]
fn describe_signal(status: std::process::ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    status
        .signal()
        .map_or_else(|| "an unknown signal".to_owned(), |sig| format!("signal {sig}"))
}

#[cfg(not(unix))]
fn describe_signal(_status: std::process::ExitStatus) -> String {
    "an unknown signal".to_owned()
}
