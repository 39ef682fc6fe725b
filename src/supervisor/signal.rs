//! Process-group signalling for the worker.
//!
//! The worker is spawned as the leader of its own process group, so
//! signals reach a `sh` wrapper and the JVM it started alike.

use crate::Result;

/// Ask the worker group to terminate (SIGTERM).
///
/// # Errors
///
/// Returns `AppError::Process` if the signal cannot be delivered.
pub fn terminate(pid: u32) -> Result<()> {
    imp::send(pid, imp::Kind::Terminate)
}

/// Kill the worker group (SIGKILL).
///
/// # Errors
///
/// Returns `AppError::Process` if the signal cannot be delivered.
pub fn force_kill(pid: u32) -> Result<()> {
    imp::send(pid, imp::Kind::Kill)
}

#[cfg(unix)]
mod imp {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    use crate::{AppError, Result};

    pub(super) enum Kind {
        Terminate,
        Kill,
    }

    pub(super) fn send(pid: u32, kind: Kind) -> Result<()> {
        let raw = i32::try_from(pid)
            .map_err(|_| AppError::Process(format!("pid {pid} out of range")))?;
        let signal = match kind {
            Kind::Terminate => Signal::SIGTERM,
            Kind::Kill => Signal::SIGKILL,
        };
        match killpg(Pid::from_raw(raw), signal) {
            // Already gone: the exit watcher will observe it.
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(err) => Err(AppError::Process(format!(
                "failed to send {signal} to process group {pid}: {err}"
            ))),
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use crate::{AppError, Result};

    pub(super) enum Kind {
        Terminate,
        Kill,
    }

    pub(super) fn send(pid: u32, kind: Kind) -> Result<()> {
        let name = match kind {
            Kind::Terminate => "SIGTERM",
            Kind::Kill => "SIGKILL",
        };
        Err(AppError::Process(format!(
            "cannot send {name} to {pid}: signals are unsupported on this platform"
        )))
    }
}
