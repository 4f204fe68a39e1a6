//! Diagnostic logging setup.
//!
//! CLI commands log to stderr. The TUI owns the screen, so it logs to a file
//! under the data directory instead.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use env_logger::{Builder, Env, Target};
use log::LevelFilter;

const LOG_FILE_NAME: &str = "visionsnap.log";

/// Where diagnostic log records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to open log file '{}': {source}", .path.display())]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Logger already initialized: {0}")]
    AlreadyInitialized(#[from] log::SetLoggerError),
}

/// Default log file location for TUI mode.
pub fn default_log_file() -> PathBuf {
    directories::ProjectDirs::from("", "", "visionsnap")
        .map(|d| d.data_dir().join(LOG_FILE_NAME))
        .unwrap_or_else(|| std::env::temp_dir().join(LOG_FILE_NAME))
}

fn open_log_file(path: &Path) -> Result<File, LoggingError> {
    let to_err = |source| LoggingError::OpenFile {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(to_err)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(to_err)
}

fn builder(verbose: bool) -> Builder {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder
}

/// Install the global logger. Level comes from `RUST_LOG` (default `info`);
/// `verbose` forces `debug`.
pub fn init(target: &LogTarget, verbose: bool) -> Result<(), LoggingError> {
    let mut builder = builder(verbose);
    match target {
        LogTarget::Stderr => {
            builder.target(Target::Stderr);
        }
        LogTarget::File(path) => {
            let file = open_log_file(path)?;
            builder.target(Target::Pipe(Box::new(file))).write_style(env_logger::WriteStyle::Never);
        }
    }
    builder.try_init()?;
    Ok(())
}
