//! Daemon event loop
//!
//! The loop owns the supervisor. Control connections, the reap timer,
//! signals and handle commands are taken one at a time, and each is handled
//! to completion before the next is looked at. Requests therefore observe a
//! total order without locks, and `waitpid(-1)` never overlaps a launch.
//!
//! Signals:
//! - SIGTERM/SIGINT: stop services and exit (PID 1 keeps serving)
//! - SIGHUP: reload descriptors
//! - SIGUSR1: dump service status to the log

use std::time::Duration;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

use crate::boot::StartupOrchestrator;
use crate::server::{serve_connection, ControlServer};
use crate::supervisor::{reap_all, Launcher, Supervisor};

/// Work the loop does outside of control requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Stop every running service, then exit unless persistent
    Shutdown,
    /// Re-read the services directory
    Reload,
    /// Log every service's status
    DumpState,
}

/// Sends commands to a running daemon loop
#[derive(Clone)]
pub struct DaemonHandle {
    tx: mpsc::Sender<Command>,
}

impl DaemonHandle {
    /// Returns false once the loop is gone
    pub async fn send(&self, command: Command) -> bool {
        self.tx.send(command).await.is_ok()
    }
}

/// OS signal streams, each mapped to a command
struct SignalStreams {
    term: Signal,
    int: Signal,
    hup: Signal,
    usr1: Signal,
}

impl SignalStreams {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            term: signal(SignalKind::terminate())?,
            int: signal(SignalKind::interrupt())?,
            hup: signal(SignalKind::hangup())?,
            usr1: signal(SignalKind::user_defined1())?,
        })
    }

    async fn next(&mut self) -> (&'static str, Command) {
        tokio::select! {
            _ = self.term.recv() => ("SIGTERM", Command::Shutdown),
            _ = self.int.recv() => ("SIGINT", Command::Shutdown),
            _ = self.hup.recv() => ("SIGHUP", Command::Reload),
            _ = self.usr1.recv() => ("SIGUSR1", Command::DumpState),
        }
    }
}

pub struct Daemon<L: Launcher> {
    supervisor: Supervisor<L>,
    server: ControlServer,
    orchestrator: StartupOrchestrator,
    commands_tx: mpsc::Sender<Command>,
    commands: mpsc::Receiver<Command>,
    signals: Option<SignalStreams>,
    reap_interval: Option<Duration>,
    /// Keep running after a shutdown command (PID 1 must never exit)
    persistent: bool,
}

impl<L: Launcher> Daemon<L> {
    pub fn new(
        supervisor: Supervisor<L>,
        server: ControlServer,
        orchestrator: StartupOrchestrator,
    ) -> Self {
        let (commands_tx, commands) = mpsc::channel(16);
        Self {
            supervisor,
            server,
            orchestrator,
            commands_tx,
            commands,
            signals: None,
            reap_interval: None,
            persistent: false,
        }
    }

    /// Collect exited children every `interval`
    ///
    /// Only one loop per process may reap: `waitpid(-1)` takes any child.
    pub fn reaping(mut self, interval: Duration) -> Self {
        self.reap_interval = Some(interval);
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Map SIGTERM, SIGINT, SIGHUP and SIGUSR1 onto loop commands
    pub fn install_signal_handlers(&mut self) -> std::io::Result<()> {
        self.signals = Some(SignalStreams::install()?);
        Ok(())
    }

    pub fn handle(&self) -> DaemonHandle {
        DaemonHandle {
            tx: self.commands_tx.clone(),
        }
    }

    /// Serve until a shutdown command arrives
    pub async fn run(self) {
        let Daemon {
            mut supervisor,
            server,
            orchestrator,
            commands_tx,
            mut commands,
            mut signals,
            reap_interval,
            persistent,
        } = self;
        drop(commands_tx);

        let mut reaper = reap_interval.map(|period| {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        log::info!("Listening on {}", server.path().display());

        loop {
            let command = tokio::select! {
                accepted = server.accept() => {
                    match accepted {
                        Ok(stream) => {
                            if let Err(e) = serve_connection(stream, &mut supervisor).await {
                                log::warn!("Control connection failed: {}", e);
                            }
                        }
                        Err(e) => log::error!("accept error: {}", e),
                    }
                    continue;
                }

                _ = tick(&mut reaper) => {
                    for process in reap_all() {
                        supervisor.record_exit(&process);
                    }
                    continue;
                }

                (name, command) = next_signal(&mut signals) => {
                    log::info!("Received {}", name);
                    command
                }

                Some(command) = commands.recv() => command,
            };

            match command {
                Command::Shutdown => {
                    let stopped = supervisor.stop_all();
                    log::info!("Signalled {} services", stopped.len());
                    if persistent {
                        log::warn!("Running as PID 1, not exiting");
                    } else {
                        return;
                    }
                }
                Command::Reload => match orchestrator.reload(&mut supervisor) {
                    Ok(report) => log::info!(
                        "Reloaded {} services ({} skipped)",
                        report.loaded.len(),
                        report.skipped.len()
                    ),
                    Err(e) => log::error!("Failed to reload descriptors: {}", e),
                },
                Command::DumpState => {
                    for (id, status) in supervisor.statuses() {
                        log::info!("  {}: {}", id, status);
                    }
                }
            }
        }
    }
}

async fn tick(reaper: &mut Option<Interval>) {
    match reaper {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn next_signal(signals: &mut Option<SignalStreams>) -> (&'static str, Command) {
    match signals {
        Some(streams) => streams.next().await,
        None => std::future::pending().await,
    }
}
