//! Logger setup for the daemon
//!
//! Journal lines are echoed to stdout exactly as written to the journal
//! file; everything else is a diagnostic on stderr.

use log::LevelFilter;
use std::str::FromStr;

use crate::journal::JOURNAL_TARGET;

/// Pick the log level: `RUST_LOG` (a bare level name) wins over `--verbose`
pub fn level(verbose: bool) -> LevelFilter {
    std::env::var("RUST_LOG")
        .ok()
        .and_then(|v| LevelFilter::from_str(v.trim()).ok())
        .unwrap_or(if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
}

pub fn init(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    let journal = fern::Dispatch::new()
        .filter(|meta| meta.target() == JOURNAL_TARGET)
        .format(|out, message, _| out.finish(format_args!("{}", message)))
        .chain(std::io::stdout());

    let diagnostics = fern::Dispatch::new()
        .filter(|meta| meta.target() != JOURNAL_TARGET)
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .chain(std::io::stderr());

    fern::Dispatch::new()
        .level(level)
        // Journal echo is always shown, whatever the diagnostic level
        .level_for(JOURNAL_TARGET, LevelFilter::Info.max(level))
        .chain(journal)
        .chain(diagnostics)
        .apply()
}
