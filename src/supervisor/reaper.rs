//! Child reaping
//!
//! Services are launched fire-and-forget, and when running as PID 1 orphans
//! are reparented to us. Something has to call wait() on them. The daemon
//! loop calls `reap_all` on a timer, between requests.
//!
//! `waitpid(-1)` must never run while a launch is in flight: std waits on
//! a child whose exec failed and panics if that child was already collected.

use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::time::Duration;

/// How often the daemon loop collects exited children
pub const REAP_INTERVAL: Duration = Duration::from_millis(100);

/// Information about a reaped process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReapedProcess {
    pub pid: Pid,
    pub status: WaitResult,
}

/// Exit status of a reaped process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// Process exited normally with code
    Exited(i32),
    /// Process killed by signal
    Signaled(i32),
}

impl WaitResult {
    /// Convert a terminal wait status; stops and continues are not exits
    pub fn from_wait_status(status: WaitStatus) -> Option<(Pid, Self)> {
        match status {
            WaitStatus::Exited(pid, code) => Some((pid, WaitResult::Exited(code))),
            WaitStatus::Signaled(pid, signal, _) => {
                Some((pid, WaitResult::Signaled(signal as i32)))
            }
            _ => None,
        }
    }
}

/// Collect every exited child without blocking
pub fn reap_all() -> Vec<ReapedProcess> {
    let mut reaped = Vec::new();

    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(status) => {
                if let Some((pid, result)) = WaitResult::from_wait_status(status) {
                    log::debug!("Reaped PID {} ({:?})", pid, result);
                    reaped.push(ReapedProcess { pid, status: result });
                }
            }
            Err(nix::errno::Errno::ECHILD) => break,
            Err(e) => {
                log::error!("waitpid error: {}", e);
                break;
            }
        }
    }

    reaped
}
