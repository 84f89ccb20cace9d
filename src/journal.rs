//! Append-only service journal
//!
//! Progress lines for service starts go here, prefixed with a local
//! timestamp. The status verb greps this file for a service's display name.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Log target used when echoing journal lines through the `log` facade
pub const JOURNAL_TARGET: &str = "moodberry::journal";

const TIMESTAMP_FORMAT: &str = "<%H:%M:%S, %b %d> ";

pub struct Journal {
    path: PathBuf,
    file: File,
}

impl Journal {
    /// Open (creating if needed) the journal file in append mode
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a timestamped line
    ///
    /// Write failures are logged, never propagated: losing a progress line
    /// must not abort a service start.
    pub fn append(&self, message: &str) {
        let entry = format!("{}{}", Local::now().format(TIMESTAMP_FORMAT), message);
        log::info!(target: JOURNAL_TARGET, "{}", entry);

        if let Err(e) = writeln!(&self.file, "{}", entry) {
            log::warn!("Failed to write journal {}: {}", self.path.display(), e);
        }
    }

    /// Every line written so far, oldest first
    pub fn read_all(&self) -> io::Result<Vec<String>> {
        let file = File::open(&self.path)?;
        BufReader::new(file).lines().collect()
    }

    /// Lines containing `needle` as a plain substring
    pub fn matching(&self, needle: &str) -> io::Result<Vec<String>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|line| line.contains(needle))
            .collect())
    }
}
