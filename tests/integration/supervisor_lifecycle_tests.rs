//! Process supervisor end to end with a shell start script standing in for
//! the game server.
#![cfg(unix)]

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mc_warden::config::{LaunchConfig, SupervisorConfig};
use mc_warden::logs::LogHub;
use mc_warden::supervisor::{CommandSink, ProcessSupervisor, LINE_PREFIX};
use mc_warden::{AppError, Result};

use super::test_helpers::wait_until;

/// Records commands and either accepts or refuses them.
struct ScriptedSink {
    reachable: bool,
    sent: Mutex<Vec<String>>,
}

impl ScriptedSink {
    fn new(reachable: bool) -> Arc<Self> {
        Arc::new(Self {
            reachable,
            sent: Mutex::new(Vec::new()),
        })
    }
}

impl CommandSink for ScriptedSink {
    fn dispatch<'a>(
        &'a self,
        command: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            self.sent.lock().unwrap().push(command.to_owned());
            if self.reachable {
                Ok(String::new())
            } else {
                Err(AppError::Rcon("connection refused".into()))
            }
        })
    }
}

const TRAPPING_SCRIPT: &str = r#"
echo "Starting minecraft server"
echo "warming up" >&2
echo "manifest=${CARGO_MANIFEST_DIR:-unset}"
trap 'echo "Stopping server"; exit 0' TERM
while true; do sleep 0.1; done
"#;

const STUBBORN_SCRIPT: &str = r#"
echo "Starting minecraft server"
trap '' TERM
while true; do sleep 0.1; done
"#;

fn timing() -> SupervisorConfig {
    SupervisorConfig {
        flush_delay_ms: 20,
        poll_interval_ms: 25,
        stop_timeout_seconds: 1,
        restart_delay_ms: 20,
    }
}

fn supervisor_for(
    script: &str,
    sink: Arc<ScriptedSink>,
) -> (tempfile::TempDir, Arc<LogHub>, ProcessSupervisor) {
    let root = tempfile::tempdir().expect("root");
    std::fs::write(root.path().join("start.sh"), script).expect("script");
    let logs = Arc::new(LogHub::new(100));
    let supervisor = ProcessSupervisor::new(
        root.path().to_path_buf(),
        LaunchConfig::default(),
        timing(),
        50,
        Arc::clone(&logs),
        sink,
    );
    (root, logs, supervisor)
}

fn has_line(logs: &LogHub, needle: &str) -> bool {
    logs.recent(100).iter().any(|line| line.text.contains(needle))
}

#[tokio::test]
async fn start_streams_output_into_hub() {
    let (_root, logs, supervisor) = supervisor_for(TRAPPING_SCRIPT, ScriptedSink::new(false));

    let status = supervisor.start().expect("start");

    assert!(status.running);
    assert!(status.pid.is_some());
    assert_eq!(supervisor.pid(), status.pid);
    assert!(supervisor.uptime().is_some());
    let lines = logs.recent(100);
    assert_eq!(
        lines[0].text,
        format!("{LINE_PREFIX} Starting server with: sh start.sh")
    );
    assert!(wait_until(Duration::from_secs(5), || has_line(&logs, "Starting minecraft server")).await);
    assert!(wait_until(Duration::from_secs(5), || has_line(&logs, "warming up")).await);

    supervisor.kill().await.expect("kill");
}

#[tokio::test]
async fn worker_environment_is_scrubbed() {
    let (_root, logs, supervisor) = supervisor_for(TRAPPING_SCRIPT, ScriptedSink::new(false));

    supervisor.start().expect("start");

    assert!(wait_until(Duration::from_secs(5), || has_line(&logs, "manifest=")).await);
    assert!(has_line(&logs, "manifest=unset"));
    supervisor.kill().await.expect("kill");
}

#[tokio::test]
async fn second_start_is_rejected() {
    let (_root, _logs, supervisor) = supervisor_for(TRAPPING_SCRIPT, ScriptedSink::new(false));
    supervisor.start().expect("start");

    let result = supervisor.start();

    assert!(matches!(result, Err(AppError::Precondition(_))));
    supervisor.kill().await.expect("kill");
}

#[tokio::test]
async fn stop_falls_back_to_sigterm_when_console_unreachable() {
    let sink = ScriptedSink::new(false);
    let (_root, logs, supervisor) = supervisor_for(TRAPPING_SCRIPT, Arc::clone(&sink));
    supervisor.start().expect("start");
    assert!(wait_until(Duration::from_secs(5), || has_line(&logs, "Starting minecraft server")).await);

    supervisor.stop().await.expect("stop");

    assert!(!supervisor.is_running());
    assert_eq!(*sink.sent.lock().unwrap(), vec!["save-all"]);
    assert!(has_line(&logs, "Stopping server"));
    assert!(has_line(&logs, &format!("{LINE_PREFIX} Server exited with code 0")));
}

#[tokio::test]
async fn stop_escalates_to_sigkill_after_timeout() {
    let sink = ScriptedSink::new(true);
    let (_root, logs, supervisor) = supervisor_for(STUBBORN_SCRIPT, Arc::clone(&sink));
    supervisor.start().expect("start");

    supervisor.stop().await.expect("stop");

    assert!(!supervisor.is_running());
    assert_eq!(*sink.sent.lock().unwrap(), vec!["save-all", "stop"]);
    assert!(has_line(&logs, &format!("{LINE_PREFIX} Server terminated by signal 9")));
}

#[tokio::test]
async fn stop_when_stopped_is_a_precondition_error() {
    let (_root, _logs, supervisor) = supervisor_for(TRAPPING_SCRIPT, ScriptedSink::new(false));

    assert!(matches!(supervisor.stop().await, Err(AppError::Precondition(_))));
    assert!(matches!(supervisor.kill().await, Err(AppError::Precondition(_))));
    assert_eq!(supervisor.pid(), None);
    assert_eq!(supervisor.uptime(), None);
}

#[tokio::test]
async fn restart_replaces_the_worker() {
    let (_root, _logs, supervisor) = supervisor_for(TRAPPING_SCRIPT, ScriptedSink::new(false));
    let first = supervisor.start().expect("start").pid;

    let status = supervisor.restart().await.expect("restart");

    assert!(status.running);
    assert_ne!(status.pid, first);
    supervisor.kill().await.expect("kill");
}

#[tokio::test]
async fn exit_is_observed_without_a_stop_request() {
    let (_root, logs, supervisor) = supervisor_for("echo done\nexit 3\n", ScriptedSink::new(false));

    supervisor.start().expect("start");

    assert!(wait_until(Duration::from_secs(5), || !supervisor.is_running()).await);
    assert!(has_line(&logs, &format!("{LINE_PREFIX} Server exited with code 3")));
    assert!(supervisor.status().uptime_seconds.is_none());
}

#[tokio::test]
async fn history_is_clamped_to_maximum() {
    let (_root, logs, supervisor) = supervisor_for(TRAPPING_SCRIPT, ScriptedSink::new(false));
    for i in 0..80 {
        logs.append(format!("line {i}"));
    }

    let history = supervisor.history(1_000);

    assert_eq!(history.len(), 50);
    assert_eq!(history.last().map(|l| l.text.as_str()), Some("line 79"));
}

#[tokio::test]
async fn missing_launch_command_fails_start() {
    let root = tempfile::tempdir().expect("root");
    let supervisor = ProcessSupervisor::new(
        root.path().to_path_buf(),
        LaunchConfig::default(),
        timing(),
        50,
        Arc::new(LogHub::new(10)),
        ScriptedSink::new(false),
    );

    assert!(matches!(supervisor.start(), Err(AppError::Process(_))));
    assert!(!supervisor.is_running());
}
