//! moodberry - minimal init and service supervisor
//!
//! Reads YAML service descriptors, starts services in dependency order,
//! tracks their liveness, and answers `<id> <verb>` requests on a local
//! control socket.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   moodberryd                     │
//! ├─────────────────────────────────────────────────┤
//! │  Startup Orchestrator  │  Control Server         │
//! ├─────────────────────────────────────────────────┤
//! │  Process Supervisor (start / stop / status)      │
//! ├─────────────────────────────────────────────────┤
//! │  Service Registry      │  Journal                │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod boot;
pub mod config;
pub mod daemon;
pub mod journal;
pub mod logging;
pub mod prefs;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod supervisor;

pub use registry::{ServiceDefinition, ServiceRegistry};
pub use supervisor::{ServiceStatus, Supervisor, BOOTSTRAP_ID};

/// Check if we are running as PID 1
pub fn is_pid1() -> bool {
    std::process::id() == 1
}
