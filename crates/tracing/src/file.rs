use crate::LogFormat;
use rolling_file::{RollingConditionBasic, RollingFileAppender};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};

/// Flushes buffered log lines to the file when dropped.
pub type FileWorkerGuard = WorkerGuard;

/// Settings of the log file destination.
///
/// Lines go to `<dir>/blob-archiver.log`. Once it exceeds `max_size_bytes` it is rotated to
/// `blob-archiver.log.1` and so on, keeping at most `max_files` rotated files.
#[derive(Debug, Clone)]
pub struct FileLog {
    /// Directory of the log files, created if missing.
    pub dir: PathBuf,
    /// Line layout.
    pub format: LogFormat,
    /// Level applied to every target without a directive of its own.
    pub level: LevelFilter,
    /// Comma separated filter directives.
    pub directives: String,
    /// Size at which the active file is rotated.
    pub max_size_bytes: u64,
    /// Number of rotated files kept.
    pub max_files: usize,
}

impl FileLog {
    /// Name of the active log file.
    pub const FILE_NAME: &'static str = "blob-archiver.log";

    /// Logs at `debug` into `dir`, rotating every 200 MB and keeping five files.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            format: LogFormat::Terminal,
            level: LevelFilter::DEBUG,
            directives: String::new(),
            max_size_bytes: 200 * 1024 * 1024,
            max_files: 5,
        }
    }

    /// Opens the rotating file behind a background writer thread.
    pub(crate) fn writer(&self) -> eyre::Result<(NonBlocking, WorkerGuard)> {
        std::fs::create_dir_all(&self.dir).map_err(|err| {
            eyre::eyre!("could not create log directory {}: {err}", self.dir.display())
        })?;
        let appender = RollingFileAppender::new(
            self.dir.join(Self::FILE_NAME),
            RollingConditionBasic::new().max_size(self.max_size_bytes),
            self.max_files,
        )?;
        Ok(tracing_appender::non_blocking(appender))
    }
}
