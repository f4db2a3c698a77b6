//! Run logs for query sessions.
//!
//! [`init`] installs a global subscriber that appends every event to one
//! `run_<timestamp>_<pid>.log` file per process and optionally mirrors it to
//! stderr. Query spans are logged when they close, with their busy time, so each
//! `select` or `multi` call leaves a timing line next to the sampler's events.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use time::{
    OffsetDateTime, UtcOffset, format_description::BorrowedFormatItem, macros::format_description,
};
use tracing::Subscriber;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{InitError, RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Registry,
    filter::ParseError,
    fmt::{self, MakeWriter, format::FmtSpan},
    prelude::*,
};

const RUN_LOG_PREFIX: &str = "run_";
const RUN_LOG_EXTENSION: &str = "log";

static RUN_LOG: OnceLock<(PathBuf, WorkerGuard)> = OnceLock::new();

/// Errors that may occur while setting up run logs.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// No directory was configured and the platform has no data directory.
    #[error("No run log directory configured and no platform data directory available")]
    NoLogDir,
    /// Failed to create the run log directory.
    #[error("Failed to prepare run log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to list earlier run logs for pruning.
    #[error("Failed to read run log directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to delete an old run log.
    #[error("Failed to remove old run log {path}: {source}")]
    RemoveFile {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to format the run timestamp for the file name.
    #[error("Failed to format run log time: {0}")]
    FormatTime(#[from] time::error::Format),
    /// The configured filter directive did not parse.
    #[error("Invalid log filter `{directive}`: {source}")]
    Filter {
        directive: String,
        source: ParseError,
    },
    /// Failed to open this run's log file.
    #[error("Failed to open run log: {0}")]
    Appender(#[from] InitError),
    /// Another global subscriber is already installed.
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Where run logs go and how much they record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunLogOptions {
    /// Run log directory. `None` means [`default_log_dir`].
    pub dir: Option<PathBuf>,
    /// Filter directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Run logs left in the directory after pruning, this run's included.
    pub keep: usize,
    /// Mirror events to stderr.
    pub stderr: bool,
}

impl Default for RunLogOptions {
    fn default() -> Self {
        Self {
            dir: None,
            filter: "quarry=info".to_string(),
            keep: 10,
            stderr: true,
        }
    }
}

/// `<platform local data dir>/quarry/runs`, if the platform has one.
pub fn default_log_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "quarry").map(|dirs| dirs.data_local_dir().join("runs"))
}

/// Install the run log subscriber and return this process's log path.
///
/// Later calls return the same path and leave the subscriber alone.
pub fn init(options: &RunLogOptions) -> Result<PathBuf, LoggingError> {
    if let Some((path, _)) = RUN_LOG.get() {
        return Ok(path.clone());
    }
    let dir = match &options.dir {
        Some(dir) => dir.clone(),
        None => default_log_dir().ok_or(LoggingError::NoLogDir)?,
    };
    fs::create_dir_all(&dir).map_err(|source| LoggingError::CreateDir {
        path: dir.clone(),
        source,
    })?;
    let name = run_log_name(now_local_or_utc(), std::process::id())?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(&name)
        .build(&dir)?;
    prune_run_logs(&dir, options.keep.max(1))?;

    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => parse_filter(&options.filter)?,
    };
    tracing::subscriber::set_global_default(run_subscriber(writer, filter, options.stderr))?;

    let path = dir.join(name);
    let _ = RUN_LOG.set((path.clone(), guard));
    tracing::info!(path = %path.display(), "Run log started");
    Ok(path)
}

fn run_subscriber<W>(file_writer: W, filter: EnvFilter, stderr: bool) -> impl Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let timer = run_timer();
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_timer(timer.clone())
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(file_writer);
    let stderr_layer = stderr.then(|| {
        fmt::layer()
            .with_timer(timer)
            .with_writer(std::io::stderr)
    });
    Registry::default()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
}

fn parse_filter(directive: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(directive).map_err(|source| LoggingError::Filter {
        directive: directive.to_string(),
        source,
    })
}

fn run_log_name(started: OffsetDateTime, pid: u32) -> Result<String, LoggingError> {
    const STAMP: &[BorrowedFormatItem<'_>] =
        format_description!("[year][month][day]T[hour][minute][second]");
    let stamp = started.format(STAMP)?;
    Ok(format!("{RUN_LOG_PREFIX}{stamp}_{pid}.{RUN_LOG_EXTENSION}"))
}

/// Delete the oldest run logs in `dir` until `keep` remain.
///
/// Names sort by start time. Files that are not run logs are never touched.
fn prune_run_logs(dir: &Path, keep: usize) -> Result<Vec<PathBuf>, LoggingError> {
    let mut runs: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|source| LoggingError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_run_log(path))
        .collect();
    runs.sort();
    let excess = runs.len().saturating_sub(keep);
    let removed: Vec<PathBuf> = runs.drain(..excess).collect();
    for path in &removed {
        fs::remove_file(path).map_err(|source| LoggingError::RemoveFile {
            path: path.clone(),
            source,
        })?;
    }
    Ok(removed)
}

fn is_run_log(path: &Path) -> bool {
    path.is_file()
        && path.extension().is_some_and(|ext| ext == RUN_LOG_EXTENSION)
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(RUN_LOG_PREFIX))
}

fn run_timer() -> fmt::time::OffsetTime<&'static [BorrowedFormatItem<'static>]> {
    const CLOCK: &[BorrowedFormatItem<'static>] =
        format_description!("[hour]:[minute]:[second].[subsecond digits:3]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    fmt::time::OffsetTime::new(offset, CLOCK)
}

fn now_local_or_utc() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
