//! Runtime state and status derivation
//!
//! ```text
//!   never attempted ──► Stopped
//!   attempted, alive ──► Running
//!   attempted, dead  ──► Failed   (crash, launch error, or stop)
//!   no definition    ──► NotFound
//! ```

use nix::unistd::Pid;
use std::fmt;

use super::reaper::WaitResult;

/// Externally visible service status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    NotFound,
    Running,
    Failed,
    Stopped,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    /// Status marker used in the status block
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Running => "🟢",
            Self::Failed => "🔴",
            Self::Stopped | Self::NotFound => "⚫️",
        }
    }

    /// Derive a status from what we know about an id
    ///
    /// `alive` is only consulted when a pid was recorded and no exit has been
    /// collected for it.
    pub fn derive(
        defined: bool,
        state: Option<&RuntimeState>,
        started: bool,
        alive: impl FnOnce(Pid) -> bool,
    ) -> Self {
        if !defined {
            return Self::NotFound;
        }
        if let Some(pid) = state.and_then(RuntimeState::live_pid) {
            if alive(pid) {
                return Self::Running;
            }
        }
        if started {
            Self::Failed
        } else {
            Self::Stopped
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-id record of the last launch attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeState {
    /// Pid of the last successful launch
    pub pid: Option<Pid>,
    /// Exit collected for `pid` by the reaper
    pub exit: Option<WaitResult>,
    /// Error message of the last failed launch
    pub error: Option<String>,
}

impl RuntimeState {
    pub fn launched(pid: Pid) -> Self {
        Self {
            pid: Some(pid),
            exit: None,
            error: None,
        }
    }

    pub fn launch_failed(error: String) -> Self {
        Self {
            pid: None,
            exit: None,
            error: Some(error),
        }
    }

    /// Pid still worth probing
    pub fn live_pid(&self) -> Option<Pid> {
        match self.exit {
            Some(_) => None,
            None => self.pid,
        }
    }
}
