//! Process launching and liveness probing

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{Gid, Group, Pid, Uid, User};
use std::os::unix::process::CommandExt;
use std::process::Command;

use crate::registry::ServiceDefinition;

/// Process management seam used by the supervisor
pub trait Launcher {
    /// Start the definition's command, returning the child pid
    fn launch(&mut self, def: &ServiceDefinition) -> Result<Pid, LaunchError>;

    /// Whether `pid` is still alive
    fn probe(&self, pid: Pid) -> bool;

    /// Send SIGTERM to `pid`
    fn terminate(&mut self, pid: Pid) -> nix::Result<()>;
}

/// Launches real OS processes
pub struct ProcessLauncher {
    /// Switch identity before exec (only possible as root)
    privileged: bool,
}

impl ProcessLauncher {
    pub fn new() -> Self {
        Self {
            privileged: Uid::effective().is_root(),
        }
    }
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&mut self, def: &ServiceDefinition) -> Result<Pid, LaunchError> {
        if def.start_command.trim().is_empty() {
            return Err(LaunchError::EmptyCommand(def.id.clone()));
        }

        // argv[0] is the command itself; no further arguments
        let mut cmd = Command::new(&def.start_command);

        if self.privileged {
            // Resolve before fork: NSS lookups are not safe in pre_exec
            let uid = resolve_user(&def.run_as_user)?;
            let gid = resolve_group(&def.run_as_group)?;

            unsafe {
                cmd.pre_exec(move || {
                    nix::unistd::setgroups(&[gid])?;
                    nix::unistd::setgid(gid)?;
                    nix::unistd::setuid(uid)?;
                    Ok(())
                });
            }
        }

        let child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            command: def.start_command.clone(),
            source,
        })?;

        // The Child handle is dropped without waiting; the daemon loop reaps it
        Ok(Pid::from_raw(child.id() as i32))
    }

    fn probe(&self, pid: Pid) -> bool {
        // Collect our own exited child first, otherwise the zombie still
        // answers the null signal
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => true,
            Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => {
                log::debug!("PID {} exited (collected by probe)", pid);
                false
            }
            Ok(_) => true,
            Err(Errno::ECHILD) => kill(pid, None).is_ok(),
            Err(e) => {
                log::debug!("waitpid({}) failed: {}", pid, e);
                kill(pid, None).is_ok()
            }
        }
    }

    fn terminate(&mut self, pid: Pid) -> nix::Result<()> {
        kill(pid, Signal::SIGTERM)
    }
}

/// Resolve a user name (or numeric uid)
fn resolve_user(user: &str) -> Result<Uid, LaunchError> {
    if let Ok(uid) = user.parse::<u32>() {
        return Ok(Uid::from_raw(uid));
    }
    match User::from_name(user) {
        Ok(Some(u)) => Ok(u.uid),
        _ => Err(LaunchError::UnknownUser(user.to_string())),
    }
}

/// Resolve a group name (or numeric gid)
fn resolve_group(group: &str) -> Result<Gid, LaunchError> {
    if let Ok(gid) = group.parse::<u32>() {
        return Ok(Gid::from_raw(gid));
    }
    match Group::from_name(group) {
        Ok(Some(g)) => Ok(g.gid),
        _ => Err(LaunchError::UnknownGroup(group.to_string())),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Service {0} has no start command")]
    EmptyCommand(String),

    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Unknown group: {0}")]
    UnknownGroup(String),
}
