//! Command line arguments shared by all commands.

use alloy_primitives::B256;
use blob_archiver::Config;
use blob_archiver_storage::StorageType;
use blob_archiver_tracing::{
    tracing::level_filters::LevelFilter, FileLog, FileWorkerGuard, LogFormat, LogSettings,
    StdoutLog,
};
use clap::{ArgAction, Args};
use std::{io::IsTerminal, path::PathBuf};

const MB_TO_BYTES: u64 = 1024 * 1024;

/// Logging destinations and formats.
#[derive(Debug, Args)]
#[command(next_help_heading = "Logging")]
pub(crate) struct LogArgs {
    /// The format of log messages written to stdout.
    #[arg(long = "log.stdout.format", value_name = "FORMAT", global = true, default_value = "terminal")]
    pub(crate) stdout_format: LogFormat,

    /// Additional filter directives for stdout, e.g. `archiver::lock=trace`.
    #[arg(long = "log.stdout.filter", value_name = "FILTER", global = true, default_value = "")]
    pub(crate) stdout_filter: String,

    /// Directory to write rotated log files to. File logging is off when unset.
    #[arg(long = "log.file.directory", value_name = "PATH", global = true)]
    pub(crate) file_directory: Option<PathBuf>,

    /// The format of log messages written to the log file.
    #[arg(long = "log.file.format", value_name = "FORMAT", global = true, default_value = "terminal")]
    pub(crate) file_format: LogFormat,

    /// The filter to use for logs written to the log file.
    #[arg(long = "log.file.filter", value_name = "FILTER", global = true, default_value = "debug")]
    pub(crate) file_filter: String,

    /// The maximum size (in MB) of one log file.
    #[arg(long = "log.file.max-size", value_name = "SIZE", global = true, default_value_t = 200)]
    pub(crate) file_max_size: u64,

    /// The maximum amount of log files that will be stored.
    #[arg(long = "log.file.max-files", value_name = "COUNT", global = true, default_value_t = 5)]
    pub(crate) file_max_files: usize,

    /// When to color stdout output.
    #[arg(
        long,
        value_name = "WHEN",
        global = true,
        default_value = "always",
        value_parser = ["always", "auto", "never"]
    )]
    pub(crate) color: String,

    #[command(flatten)]
    pub(crate) verbosity: Verbosity,
}

impl LogArgs {
    /// Installs the global subscriber.
    ///
    /// The returned guard flushes the log file when dropped and must be kept alive.
    pub(crate) fn init_tracing(&self) -> eyre::Result<Option<FileWorkerGuard>> {
        self.settings().init()
    }

    fn settings(&self) -> LogSettings {
        let ansi = match self.color.as_str() {
            "never" => false,
            "auto" => std::io::stdout().is_terminal(),
            _ => true,
        };
        let stdout = StdoutLog {
            format: self.stdout_format,
            level: self.verbosity.level(),
            directives: self.stdout_filter.clone(),
            ansi,
        };
        let file = self.file_directory.as_ref().map(|dir| FileLog {
            format: self.file_format,
            directives: self.file_filter.clone(),
            max_size_bytes: self.file_max_size * MB_TO_BYTES,
            max_files: self.file_max_files,
            ..FileLog::new(dir)
        });
        LogSettings { stdout, file }
    }
}

/// Verbosity of stdout logging.
#[derive(Debug, Args)]
#[command(next_help_heading = "Display")]
pub(crate) struct Verbosity {
    /// Set the minimum log level.
    ///
    /// -v      Errors
    /// -vv     Warnings
    /// -vvv    Info
    /// -vvvv   Debug
    /// -vvvvv  Traces (warning: very verbose!)
    #[arg(short, long, action = ArgAction::Count, global = true, default_value_t = 3, verbatim_doc_comment, help_heading = "Display")]
    verbosity: u8,

    /// Silence all log output.
    #[arg(long, alias = "silent", short = 'q', global = true, help_heading = "Display")]
    quiet: bool,
}

impl Verbosity {
    /// The stdout level for the chosen verbosity.
    pub(crate) fn level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::OFF
        }
        match self.verbosity.saturating_sub(1) {
            0 => LevelFilter::ERROR,
            1 => LevelFilter::WARN,
            2 => LevelFilter::INFO,
            3 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

/// Values overriding the configuration file.
///
/// Every flag can also be given through its `BLOB_ARCHIVER_*` environment variable.
#[derive(Debug, Args)]
#[command(next_help_heading = "Configuration")]
pub(crate) struct ConfigOverrides {
    /// Base URL of the beacon node REST API.
    #[arg(long = "beacon.url", env = "BLOB_ARCHIVER_BEACON_URL", global = true)]
    beacon_url: Option<String>,

    /// Storage backend.
    #[arg(long = "storage.type", env = "BLOB_ARCHIVER_STORAGE_TYPE", global = true)]
    storage_type: Option<StorageType>,

    /// Directory of the file backend.
    #[arg(id = "storage.file.directory", long = "storage.file.directory", env = "BLOB_ARCHIVER_FILE_DIRECTORY", global = true)]
    file_directory: Option<PathBuf>,

    /// Endpoint of an S3 compatible service.
    #[arg(long = "s3.endpoint", env = "BLOB_ARCHIVER_S3_ENDPOINT", global = true)]
    s3_endpoint: Option<String>,

    /// S3 bucket.
    #[arg(long = "s3.bucket", env = "BLOB_ARCHIVER_S3_BUCKET", global = true)]
    s3_bucket: Option<String>,

    /// Key prefix inside the bucket.
    #[arg(long = "s3.path", env = "BLOB_ARCHIVER_S3_PATH", global = true)]
    s3_path: Option<String>,

    /// S3 access key id.
    #[arg(long = "s3.access-key", env = "BLOB_ARCHIVER_S3_ACCESS_KEY", global = true)]
    s3_access_key: Option<String>,

    /// S3 secret access key.
    #[arg(
        long = "s3.secret-access-key",
        env = "BLOB_ARCHIVER_S3_SECRET_ACCESS_KEY",
        hide_env_values = true,
        global = true
    )]
    s3_secret_access_key: Option<String>,

    /// Gzip blob objects before upload.
    #[arg(long = "s3.compress", env = "BLOB_ARCHIVER_S3_COMPRESS", global = true)]
    s3_compress: bool,

    /// Oldest block to archive.
    #[arg(long = "archiver.origin-block", env = "BLOB_ARCHIVER_ORIGIN_BLOCK", global = true)]
    origin_block: Option<B256>,

    /// Identity recorded in the lockfile.
    #[arg(long = "archiver.id", env = "BLOB_ARCHIVER_ID", global = true)]
    archiver_id: Option<String>,
}

impl ConfigOverrides {
    /// Writes every given value into `config`.
    pub(crate) fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.beacon_url {
            config.beacon.url.clone_from(url);
        }
        if let Some(kind) = self.storage_type {
            config.storage.kind = kind;
        }
        if let Some(directory) = &self.file_directory {
            config.storage.file.directory.clone_from(directory);
        }

        let s3 = &mut config.storage.s3;
        if let Some(endpoint) = &self.s3_endpoint {
            s3.endpoint = Some(endpoint.clone());
        }
        if let Some(bucket) = &self.s3_bucket {
            s3.bucket.clone_from(bucket);
        }
        if let Some(path) = &self.s3_path {
            s3.path.clone_from(path);
        }
        if let Some(key) = &self.s3_access_key {
            s3.access_key = Some(key.clone());
        }
        if let Some(secret) = &self.s3_secret_access_key {
            s3.secret_access_key = Some(secret.clone());
        }
        if self.s3_compress {
            s3.compress = true;
        }

        if let Some(origin) = self.origin_block {
            config.archiver.origin_block = origin;
        }
        if let Some(id) = &self.archiver_id {
            config.archiver.archiver_id = Some(id.clone());
        }
    }
}
