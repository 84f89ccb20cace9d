//! Boot-time driver
//!
//! Scans the services directory, fills the registry, and runs one start
//! pass over every known id.

use glob::MatchOptions;
use std::path::{Path, PathBuf};

use crate::journal::Journal;
use crate::registry::{load_definition, ServiceRegistry, DESCRIPTOR_EXTENSION};
use crate::supervisor::{Launcher, Supervisor};

/// Outcome of loading a descriptor directory
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Ids loaded successfully
    pub loaded: Vec<String>,
    /// Descriptors that failed to parse, with the reason
    pub skipped: Vec<(PathBuf, String)>,
}

/// List descriptor files in `dir`, sorted by path
///
/// A missing directory is an error: the daemon must not run with an empty
/// service set by accident.
pub fn list_descriptor_files(dir: &Path) -> Result<Vec<PathBuf>, BootError> {
    if !dir.is_dir() {
        return Err(BootError::MissingDirectory(dir.to_path_buf()));
    }

    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = format!("{}/*.{}", escaped, DESCRIPTOR_EXTENSION);
    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::new()
    };

    let mut paths = Vec::new();
    for entry in glob::glob_with(&pattern, options)? {
        match entry {
            Ok(path) if path.is_file() => paths.push(path),
            Ok(_) => {}
            Err(e) => log::warn!("Skipping unreadable entry: {}", e),
        }
    }
    paths.sort();
    Ok(paths)
}

pub struct StartupOrchestrator {
    services_dir: PathBuf,
}

impl StartupOrchestrator {
    pub fn new(services_dir: &Path) -> Self {
        Self {
            services_dir: services_dir.to_path_buf(),
        }
    }

    pub fn services_dir(&self) -> &Path {
        &self.services_dir
    }

    /// Load every descriptor, skipping (and journaling) the broken ones
    pub fn load(&self, journal: &Journal) -> Result<(ServiceRegistry, LoadReport), BootError> {
        let mut registry = ServiceRegistry::new();
        let mut report = LoadReport::default();

        for path in list_descriptor_files(&self.services_dir)? {
            match load_definition(&path) {
                Ok(def) => {
                    log::debug!("Loaded {} from {}", def.id, path.display());
                    report.loaded.push(def.id.clone());
                    registry.insert(def);
                }
                Err(e) => {
                    log::warn!("Failed to load {}: {}", path.display(), e);
                    journal.append(&format!("  < ! > Error loading: {}", path.display()));
                    report.skipped.push((path, e.to_string()));
                }
            }
        }

        log::info!(
            "Loaded {} services from {} ({} skipped)",
            report.loaded.len(),
            self.services_dir.display(),
            report.skipped.len()
        );
        Ok((registry, report))
    }

    /// Start pass: bootstrap id pre-marked, then every id in registry order
    ///
    /// Returns the ids that ended up marked started.
    pub fn boot<L: Launcher>(&self, supervisor: &mut Supervisor<L>) -> Vec<String> {
        supervisor.mark_bootstrap();

        let ids: Vec<String> = supervisor.registry().ids().cloned().collect();
        for id in &ids {
            supervisor.start(id);
        }

        let started: Vec<String> = ids
            .into_iter()
            .filter(|id| supervisor.is_started(id))
            .collect();
        log::info!("Boot complete: {} services started", started.len());
        started
    }

    /// Reload descriptors from disk into a running supervisor
    pub fn reload<L: Launcher>(
        &self,
        supervisor: &mut Supervisor<L>,
    ) -> Result<LoadReport, BootError> {
        let (registry, report) = self.load(supervisor.journal())?;
        supervisor.replace_registry(registry);
        Ok(report)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootError {
    #[error("Services directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("Invalid descriptor pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}
