//! Process supervisor
//!
//! Owns the service registry and the per-id runtime state, and implements
//! the recursive dependency-ordered start:
//!
//! 1. an id already marked started is a no-op (this also breaks cycles)
//! 2. an unknown id is a no-op
//! 3. a disabled id is skipped, unless it is the bootstrap id or the start
//!    was requested explicitly; skipping leaves the id unmarked
//! 4. the id is marked started, then each dependency is started in order,
//!    best-effort
//! 5. the start command is launched; a launch error still counts as an
//!    attempt, so status reports it as failed

mod process;
mod reaper;
mod state;

pub use process::{LaunchError, Launcher, ProcessLauncher};
pub use reaper::{reap_all, ReapedProcess, WaitResult, REAP_INTERVAL};
pub use state::{RuntimeState, ServiceStatus};

use nix::unistd::Pid;
use std::collections::{HashMap, HashSet};

use crate::journal::Journal;
use crate::registry::{RegistryError, ServiceRegistry};

/// The supervisor's own synthetic service id
pub const BOOTSTRAP_ID: &str = "moodberryd";

/// Why a start was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// Boot pass or dependency recursion: honours `enabled`
    Automatic,
    /// Control request for this exact id: ignores `enabled`
    Explicit,
}

pub struct Supervisor<L: Launcher = ProcessLauncher> {
    registry: ServiceRegistry,
    launcher: L,
    journal: Journal,
    /// Last launch attempt per id
    runtime: HashMap<String, RuntimeState>,
    /// Ids a start was attempted for during this daemon lifetime
    started: HashSet<String>,
}

impl<L: Launcher> Supervisor<L> {
    pub fn new(registry: ServiceRegistry, launcher: L, journal: Journal) -> Self {
        Self {
            registry,
            launcher,
            journal,
            runtime: HashMap::new(),
            started: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Swap in freshly loaded definitions
    ///
    /// Runtime state and started-markers survive, so reloading never
    /// relaunches anything.
    pub fn replace_registry(&mut self, registry: ServiceRegistry) {
        log::info!("Registry replaced ({} services)", registry.len());
        self.registry = registry;
    }

    /// Pre-mark the bootstrap id so no descriptor can launch a second daemon
    pub fn mark_bootstrap(&mut self) {
        self.started.insert(BOOTSTRAP_ID.to_string());
    }

    pub fn is_started(&self, id: &str) -> bool {
        self.started.contains(id)
    }

    pub fn runtime(&self, id: &str) -> Option<&RuntimeState> {
        self.runtime.get(id)
    }

    /// Start `id` and its dependencies, skipping disabled services
    pub fn start(&mut self, id: &str) {
        self.start_inner(id, Trigger::Automatic);
    }

    /// Start `id` on request: `id` itself runs even when disabled, its
    /// dependencies follow the usual rules
    pub fn start_explicit(&mut self, id: &str) {
        self.start_inner(id, Trigger::Explicit);
    }

    fn start_inner(&mut self, id: &str, trigger: Trigger) {
        if self.started.contains(id) {
            return;
        }

        let Some(def) = self.registry.get(id) else {
            log::debug!("Skipping unknown service {}", id);
            return;
        };

        let is_bootstrap = id == BOOTSTRAP_ID;
        if !def.enabled && !is_bootstrap && trigger == Trigger::Automatic {
            log::debug!("Skipping disabled service {}", id);
            return;
        }

        let def = def.clone();

        // Mark before recursing so a cycle back to this id stops here
        self.started.insert(id.to_string());

        if !is_bootstrap {
            self.journal
                .append(&format!("< * > Loading {}...", def.label()));
        }

        for dep in &def.dependencies {
            self.start_inner(dep, Trigger::Automatic);
        }

        match self.launcher.launch(&def) {
            Ok(pid) => {
                log::info!("Started {} (PID {})", id, pid);
                self.runtime
                    .insert(id.to_string(), RuntimeState::launched(pid));
                if !is_bootstrap {
                    self.journal.append(&format!("< ✓ > Loaded {}.", def.label()));
                }
            }
            Err(e) => {
                log::warn!("Failed to launch {}: {}", id, e);
                self.runtime
                    .insert(id.to_string(), RuntimeState::launch_failed(e.to_string()));
                if !is_bootstrap {
                    self.journal
                        .append(&format!("< ! > Failed to load {}: {}", def.name, e));
                }
            }
        }
    }

    /// Send SIGTERM to the recorded pid
    ///
    /// The pid is signalled whether or not it is still alive. The
    /// started-marker stays set, so the service reads as failed afterwards.
    pub fn stop(&mut self, id: &str) -> Result<Option<Pid>, RegistryError> {
        self.registry.require(id)?;

        let Some(pid) = self.runtime.get(id).and_then(|s| s.pid) else {
            log::debug!("{} has no recorded pid, nothing to signal", id);
            return Ok(None);
        };

        match self.launcher.terminate(pid) {
            Ok(()) => log::info!("Sent SIGTERM to {} (PID {})", id, pid),
            Err(e) => log::warn!("Failed to signal {} (PID {}): {}", id, pid, e),
        }
        Ok(Some(pid))
    }

    /// Stop, forget the start attempt, and start again
    pub fn restart(&mut self, id: &str) -> Result<(), RegistryError> {
        self.stop(id)?;
        self.started.remove(id);
        self.start_explicit(id);
        Ok(())
    }

    pub fn status(&self, id: &str) -> ServiceStatus {
        ServiceStatus::derive(
            self.registry.contains(id),
            self.runtime.get(id),
            self.started.contains(id),
            |pid| self.launcher.probe(pid),
        )
    }

    /// Status of every known service, in registry order
    pub fn statuses(&self) -> Vec<(String, ServiceStatus)> {
        self.registry
            .ids()
            .map(|id| (id.clone(), self.status(id)))
            .collect()
    }

    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<(), RegistryError> {
        self.registry.set_enabled(id, enabled)
    }

    /// Apply an exit collected by the reaper
    pub fn record_exit(&mut self, reaped: &ReapedProcess) {
        let entry = self
            .runtime
            .iter_mut()
            .find(|(_, state)| state.pid == Some(reaped.pid) && state.exit.is_none());

        match entry {
            Some((id, state)) => {
                log::info!("{} (PID {}) exited: {:?}", id, reaped.pid, reaped.status);
                state.exit = Some(reaped.status);
            }
            None => log::debug!("Reaped untracked PID {}", reaped.pid),
        }
    }

    /// Signal every service that still looks alive; returns their ids
    pub fn stop_all(&mut self) -> Vec<String> {
        let running: Vec<String> = self
            .statuses()
            .into_iter()
            .filter(|(_, status)| *status == ServiceStatus::Running)
            .map(|(id, _)| id)
            .collect();

        for id in &running {
            log::info!("Stopping {} for shutdown", id);
            if let Err(e) = self.stop(id) {
                log::warn!("Failed to stop {}: {}", id, e);
            }
        }
        running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ServiceDefinition;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    /// Records launches instead of forking
    #[derive(Default)]
    struct FakeLauncher {
        next_pid: i32,
        launched: Vec<String>,
        alive: HashSet<i32>,
        failing: HashSet<String>,
        terminated: Vec<i32>,
    }

    impl Launcher for FakeLauncher {
        fn launch(&mut self, def: &ServiceDefinition) -> Result<Pid, LaunchError> {
            self.launched.push(def.id.clone());
            if self.failing.contains(&def.id) {
                return Err(LaunchError::Spawn {
                    command: def.start_command.clone(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            self.next_pid += 1;
            let pid = 1000 + self.next_pid;
            self.alive.insert(pid);
            Ok(Pid::from_raw(pid))
        }

        fn probe(&self, pid: Pid) -> bool {
            self.alive.contains(&pid.as_raw())
        }

        fn terminate(&mut self, pid: Pid) -> nix::Result<()> {
            self.terminated.push(pid.as_raw());
            self.alive.remove(&pid.as_raw());
            Ok(())
        }
    }

    fn def(id: &str, needs: &[&str], enabled: bool) -> ServiceDefinition {
        ServiceDefinition {
            id: id.into(),
            name: id.into(),
            description: String::new(),
            start_command: format!("/usr/bin/{}", id),
            run_as_user: "root".into(),
            run_as_group: "root".into(),
            dependencies: needs.iter().map(|s| s.to_string()).collect(),
            enabled,
            path: PathBuf::from(format!("/nonexistent/{}.yml", id)),
        }
    }

    fn supervisor(defs: Vec<ServiceDefinition>) -> Supervisor<FakeLauncher> {
        let mut registry = ServiceRegistry::new();
        for d in defs {
            registry.insert(d);
        }
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "moodberry-supervisor-{}-{}.log",
            std::process::id(),
            id
        ));
        let _ = std::fs::remove_file(&path);
        let journal = Journal::open(&path).unwrap();
        Supervisor::new(registry, FakeLauncher::default(), journal)
    }

    #[test]
    fn test_chain_starts_leaf_first() {
        let mut sup = supervisor(vec![
            def("a", &["b"], true),
            def("b", &["c"], true),
            def("c", &[], true),
        ]);
        sup.start("a");
        assert_eq!(sup.launcher().launched, ["c", "b", "a"]);
    }

    #[test]
    fn test_dependencies_in_declaration_order() {
        let mut sup = supervisor(vec![
            def("web", &["db", "cache"], true),
            def("cache", &[], true),
            def("db", &[], true),
        ]);
        sup.start("web");
        assert_eq!(sup.launcher().launched, ["db", "cache", "web"]);
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut sup = supervisor(vec![def("db", &[], true)]);
        sup.start("db");
        let pid = sup.runtime("db").unwrap().pid;
        sup.start("db");
        sup.start_explicit("db");

        assert_eq!(sup.launcher().launched, ["db"]);
        assert_eq!(sup.runtime("db").unwrap().pid, pid);
    }

    #[test]
    fn test_cycle_terminates() {
        let mut sup = supervisor(vec![def("a", &["b"], true), def("b", &["a"], true)]);
        sup.start("a");

        assert!(sup.is_started("a"));
        assert!(sup.is_started("b"));
        assert_eq!(sup.launcher().launched, ["b", "a"]);
    }

    #[test]
    fn test_self_dependency_terminates() {
        let mut sup = supervisor(vec![def("a", &["a"], true)]);
        sup.start("a");
        assert_eq!(sup.launcher().launched, ["a"]);
    }

    #[test]
    fn test_unknown_dependency_skipped() {
        let mut sup = supervisor(vec![def("web", &["ghost", "db"], true), def("db", &[], true)]);
        sup.start("web");

        assert_eq!(sup.launcher().launched, ["db", "web"]);
        assert!(!sup.is_started("ghost"));
    }

    #[test]
    fn test_unknown_id_is_noop() {
        let mut sup = supervisor(vec![]);
        sup.start("ghost");
        assert!(sup.launcher().launched.is_empty());
        assert!(!sup.is_started("ghost"));
        assert_eq!(sup.status("ghost"), ServiceStatus::NotFound);
    }

    #[test]
    fn test_disabled_skipped_without_marking() {
        let mut sup = supervisor(vec![def("web", &[], false)]);
        sup.start("web");

        assert!(sup.launcher().launched.is_empty());
        assert!(!sup.is_started("web"));
        assert_eq!(sup.status("web"), ServiceStatus::Stopped);

        sup.start_explicit("web");
        assert_eq!(sup.launcher().launched, ["web"]);
        assert_eq!(sup.status("web"), ServiceStatus::Running);
    }

    #[test]
    fn test_explicit_start_keeps_rules_for_dependencies() {
        let mut sup = supervisor(vec![def("web", &["db"], false), def("db", &[], false)]);
        sup.start_explicit("web");
        assert_eq!(sup.launcher().launched, ["web"]);
    }

    #[test]
    fn test_disabled_dependency_does_not_block_dependent() {
        let mut sup = supervisor(vec![def("web", &["db"], true), def("db", &[], false)]);
        sup.start("web");
        assert_eq!(sup.launcher().launched, ["web"]);
    }

    #[test]
    fn test_bootstrap_premarked() {
        let mut sup = supervisor(vec![def(BOOTSTRAP_ID, &[], false), def("db", &[BOOTSTRAP_ID], true)]);
        sup.mark_bootstrap();
        sup.start("db");
        sup.start(BOOTSTRAP_ID);
        assert_eq!(sup.launcher().launched, ["db"]);
    }

    #[test]
    fn test_bootstrap_ignores_enabled() {
        let mut sup = supervisor(vec![def(BOOTSTRAP_ID, &[], false)]);
        sup.start(BOOTSTRAP_ID);
        assert_eq!(sup.launcher().launched, [BOOTSTRAP_ID]);
    }

    #[test]
    fn test_failed_dependency_is_best_effort() {
        let mut sup = supervisor(vec![
            def("web", &["db", "cache"], true),
            def("db", &[], true),
            def("cache", &[], true),
        ]);
        sup.launcher.failing.insert("db".into());
        sup.start("web");

        assert_eq!(sup.launcher().launched, ["db", "cache", "web"]);
        assert_eq!(sup.status("db"), ServiceStatus::Failed);
        assert_eq!(sup.status("cache"), ServiceStatus::Running);
        assert_eq!(sup.status("web"), ServiceStatus::Running);
        assert!(sup.runtime("db").unwrap().error.is_some());
    }

    #[test]
    fn test_status_lifecycle() {
        let mut sup = supervisor(vec![def("db", &[], true)]);
        assert_eq!(sup.status("db"), ServiceStatus::Stopped);

        sup.start("db");
        assert_eq!(sup.status("db"), ServiceStatus::Running);

        let pid = sup.stop("db").unwrap();
        assert_eq!(pid.map(|p| p.as_raw()), Some(1001));
        assert_eq!(sup.status("db"), ServiceStatus::Failed);
        assert!(sup.is_started("db"));
    }

    #[test]
    fn test_stop_without_pid_sends_nothing() {
        let mut sup = supervisor(vec![def("db", &[], true)]);
        assert_eq!(sup.stop("db").unwrap(), None);
        assert!(sup.launcher().terminated.is_empty());
    }

    #[test]
    fn test_stop_signals_stale_pid() {
        let mut sup = supervisor(vec![def("db", &[], true)]);
        sup.start("db");
        sup.stop("db").unwrap();
        sup.stop("db").unwrap();
        assert_eq!(sup.launcher().terminated, [1001, 1001]);
    }

    #[test]
    fn test_stop_unknown() {
        let mut sup = supervisor(vec![]);
        assert!(matches!(sup.stop("ghost"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_restart_relaunches() {
        let mut sup = supervisor(vec![def("db", &[], true)]);
        sup.start("db");
        sup.stop("db").unwrap();
        assert_eq!(sup.status("db"), ServiceStatus::Failed);

        sup.restart("db").unwrap();
        assert_eq!(sup.launcher().launched, ["db", "db"]);
        assert_eq!(sup.status("db"), ServiceStatus::Running);
        assert_eq!(sup.runtime("db").unwrap().pid.map(|p| p.as_raw()), Some(1002));
    }

    #[test]
    fn test_record_exit() {
        let mut sup = supervisor(vec![def("db", &[], true)]);
        sup.start("db");
        let pid = sup.runtime("db").unwrap().pid.unwrap();

        sup.record_exit(&ReapedProcess {
            pid,
            status: WaitResult::Exited(1),
        });

        // The fake still reports the pid alive; the collected exit wins
        assert_eq!(sup.status("db"), ServiceStatus::Failed);
        assert_eq!(sup.runtime("db").unwrap().exit, Some(WaitResult::Exited(1)));
    }

    #[test]
    fn test_record_exit_untracked() {
        let mut sup = supervisor(vec![def("db", &[], true)]);
        sup.start("db");
        sup.record_exit(&ReapedProcess {
            pid: Pid::from_raw(77),
            status: WaitResult::Signaled(9),
        });
        assert_eq!(sup.status("db"), ServiceStatus::Running);
    }

    #[test]
    fn test_stop_all() {
        let mut sup = supervisor(vec![def("db", &[], true), def("web", &["db"], true), def("off", &[], false)]);
        sup.start("web");
        sup.start("off");

        let stopped = sup.stop_all();
        assert_eq!(stopped, ["db", "web"]);
        assert_eq!(sup.launcher().terminated.len(), 2);
    }

    #[test]
    fn test_journal_progress_lines() {
        let mut sup = supervisor(vec![def("web", &["db"], true), def("db", &[], true)]);
        sup.start("web");

        let lines = sup.journal().read_all().unwrap();
        let tails: Vec<&str> = lines
            .iter()
            .map(|l| l.split_once("> ").map(|(_, rest)| rest).unwrap_or(l))
            .collect();
        assert_eq!(
            tails,
            [
                "< * > Loading web...",
                "< * > Loading db...",
                "< ✓ > Loaded db.",
                "< ✓ > Loaded web.",
            ]
        );
    }

    #[test]
    fn test_replace_registry_keeps_markers() {
        let mut sup = supervisor(vec![def("db", &[], true)]);
        sup.start("db");

        let mut registry = ServiceRegistry::new();
        registry.insert(def("db", &[], true));
        sup.replace_registry(registry);
        sup.start("db");

        assert_eq!(sup.launcher().launched, ["db"]);
        assert_eq!(sup.status("db"), ServiceStatus::Running);
    }
}
