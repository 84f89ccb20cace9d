//! Daemon file locations

use std::path::PathBuf;

use crate::protocol::SOCKET_PATH;

pub const SERVICES_DIR: &str = "/etc/moodberry/services";
pub const PREFS_PATH: &str = "/etc/moodberry/prefs.yml";
pub const JOURNAL_PATH: &str = "/var/log/openmb.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Directory scanned for `*.yml` descriptors
    pub services_dir: PathBuf,
    pub prefs_path: PathBuf,
    /// Append-only journal, also read back by `status`
    pub journal_path: PathBuf,
    pub socket_path: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            services_dir: PathBuf::from(SERVICES_DIR),
            prefs_path: PathBuf::from(PREFS_PATH),
            journal_path: PathBuf::from(JOURNAL_PATH),
            socket_path: PathBuf::from(SOCKET_PATH),
        }
    }
}
