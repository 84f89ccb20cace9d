//! moodberryd - init and service supervisor daemon
//!
//! Loads descriptors from /etc/moodberry/services, starts every enabled
//! service in dependency order, then listens on /run/moodberry.sock for
//! `<id> <verb>` requests.

use clap::Parser;
use log::info;
use std::path::PathBuf;

use moodberry::boot::StartupOrchestrator;
use moodberry::config::{DaemonConfig, JOURNAL_PATH, PREFS_PATH, SERVICES_DIR};
use moodberry::daemon::Daemon;
use moodberry::journal::Journal;
use moodberry::prefs::Prefs;
use moodberry::protocol::SOCKET_PATH;
use moodberry::server::ControlServer;
use moodberry::supervisor::{ProcessLauncher, Supervisor, REAP_INTERVAL};
use moodberry::{is_pid1, logging};

#[derive(Parser)]
#[command(name = "moodberryd")]
#[command(about = "Minimal init and service supervisor")]
struct Args {
    /// Directory containing *.yml service descriptors
    #[arg(long, default_value = SERVICES_DIR)]
    services_dir: PathBuf,

    /// Branding preferences file
    #[arg(long, default_value = PREFS_PATH)]
    prefs: PathBuf,

    /// Journal file (progress lines, read back by `status`)
    #[arg(long, default_value = JOURNAL_PATH)]
    journal: PathBuf,

    /// Control socket path
    #[arg(long, default_value = SOCKET_PATH)]
    socket: PathBuf,

    /// Load descriptors but don't start anything
    #[arg(long)]
    no_boot: bool,

    /// Debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Args {
    fn config(&self) -> DaemonConfig {
        DaemonConfig {
            services_dir: self.services_dir.clone(),
            prefs_path: self.prefs.clone(),
            journal_path: self.journal.clone(),
            socket_path: self.socket.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init(logging::level(args.verbose))?;

    let config = args.config();
    let journal = Journal::open(&config.journal_path)?;

    for line in Prefs::load(&config.prefs_path).banner() {
        journal.append(&line);
    }

    // A missing services directory is fatal
    let orchestrator = StartupOrchestrator::new(&config.services_dir);
    let (registry, report) = match orchestrator.load(&journal) {
        Ok(loaded) => loaded,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };
    for (path, reason) in &report.skipped {
        log::warn!("Skipped {}: {}", path.display(), reason);
    }

    let mut supervisor = Supervisor::new(registry, ProcessLauncher::new(), journal);
    if args.no_boot {
        info!("--no-boot given, not starting services");
        supervisor.mark_bootstrap();
    } else {
        orchestrator.boot(&mut supervisor);
    }

    let server = ControlServer::bind(&config.socket_path)?;

    // Exits during boot are collected on the loop's first tick
    let mut daemon = Daemon::new(supervisor, server, orchestrator)
        .reaping(REAP_INTERVAL)
        .persistent(is_pid1());

    if let Err(e) = daemon.install_signal_handlers() {
        log::error!("Failed to set up signal handlers: {}", e);
    }

    daemon.run().await;
    info!("moodberryd exiting");
    Ok(())
}
