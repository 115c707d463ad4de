//! Logging setup for the blob archiver.
//!
//! [`LogSettings`] describes where log output goes: always stdout, and optionally a directory of
//! size-rotated log files. Each destination has its own [`LogFormat`] and filter directives.
//!
//! ```
//! use blob_archiver_tracing::{tracing::level_filters::LevelFilter, LogFormat, LogSettings};
//!
//! fn main() -> eyre::Result<()> {
//!     let mut settings = LogSettings::default();
//!     settings.stdout.format = LogFormat::Json;
//!     settings.stdout.level = LevelFilter::DEBUG;
//!     settings.stdout.directives = "archiver::lock=trace".to_string();
//!
//!     let _guard = settings.init()?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use tracing;
pub use tracing_subscriber;

mod file;
pub use file::{FileLog, FileWorkerGuard};

use clap::ValueEnum;
use std::{fmt, io};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::{
    fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Dependencies that flood `debug` output with connection-level chatter.
const QUIET_DEPENDENCIES: [&str; 5] =
    ["hyper=warn", "hyper_util=warn", "h2=warn", "rustls=warn", "reqwest=info"];

/// Layout of emitted log lines.
#[derive(Debug, Copy, Clone, ValueEnum, Eq, PartialEq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Terminal,
    /// One JSON object per line.
    Json,
    /// `key=value` pairs.
    #[value(name = "logfmt")]
    LogFmt,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Terminal => "terminal",
            Self::Json => "json",
            Self::LogFmt => "logfmt",
        })
    }
}

impl LogFormat {
    fn layer<W>(self, writer: W, ansi: bool, filter: EnvFilter) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        match self {
            Self::Terminal => tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_filter(filter)
                .boxed(),
            Self::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter)
                .boxed(),
            Self::LogFmt => tracing_logfmt::builder()
                .layer()
                .with_writer(writer)
                .with_filter(filter)
                .boxed(),
        }
    }
}

/// Settings of the stdout destination.
#[derive(Debug, Clone)]
pub struct StdoutLog {
    /// Line layout.
    pub format: LogFormat,
    /// Level applied to every target without a directive of its own.
    pub level: LevelFilter,
    /// Comma separated filter directives, e.g. `archiver::walker=trace`.
    pub directives: String,
    /// Emit ANSI colors. Only honored by [`LogFormat::Terminal`].
    pub ansi: bool,
}

impl Default for StdoutLog {
    fn default() -> Self {
        Self {
            format: LogFormat::Terminal,
            level: LevelFilter::INFO,
            directives: String::new(),
            ansi: true,
        }
    }
}

/// Where and how the archiver logs.
#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    /// The stdout destination.
    pub stdout: StdoutLog,
    /// The optional log file destination.
    pub file: Option<FileLog>,
}

impl LogSettings {
    /// Installs the global subscriber.
    ///
    /// `RUST_LOG` replaces the default level of every destination when set. Returns the guard of
    /// the file writer, which flushes pending lines when dropped and must be kept alive until
    /// exit. Installing twice is not an error; the first subscriber stays in place.
    pub fn init(self) -> eyre::Result<Option<FileWorkerGuard>> {
        let mut layers = Vec::with_capacity(2);

        let filter = env_filter(self.stdout.level, &self.stdout.directives)?;
        layers.push(self.stdout.format.layer(io::stdout, self.stdout.ansi, filter));

        let guard = match self.file {
            Some(file) => {
                let (writer, guard): (NonBlocking, _) = file.writer()?;
                let filter = env_filter(file.level, &file.directives)?;
                layers.push(file.format.layer(writer, false, filter));
                Some(guard)
            }
            None => None,
        };

        let _ = tracing_subscriber::registry().with(layers).try_init();
        Ok(guard)
    }
}

/// Builds the filter of one destination.
fn env_filter(level: LevelFilter, directives: &str) -> eyre::Result<EnvFilter> {
    let filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();
    QUIET_DEPENDENCIES
        .into_iter()
        .chain(directives.split(',').map(str::trim).filter(|d| !d.is_empty()))
        .try_fold(filter, |filter, directive| Ok(filter.add_directive(directive.parse()?)))
}

/// Installs a subscriber writing through the test harness, filtered by `RUST_LOG`.
///
/// Silently does nothing if a subscriber is already installed.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
