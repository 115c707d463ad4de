//! CLI definition and entrypoint to executable.

use crate::{
    args::{ConfigOverrides, LogArgs},
    runner::run_until_shutdown,
};
use blob_archiver::{Archiver, ArchiverError, Config};
use blob_archiver_beacon_client::HttpBeaconClient;
use blob_archiver_storage::{DataStore, FileStorage, ObjectStorage, StorageType};
use clap::{Args, Parser, Subcommand};
use eyre::WrapErr;
use std::{path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

/// Parse CLI options, set up logging and run the chosen command.
pub(crate) fn run() -> eyre::Result<()> {
    Cli::parse().run()
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Archives beacon chain blob sidecars", long_about = None)]
pub(crate) struct Cli {
    /// The command to run
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML configuration file. It is created with default values if it does not
    /// exist.
    #[arg(long, value_name = "FILE", global = true, env = "BLOB_ARCHIVER_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigOverrides,

    #[command(flatten)]
    logs: LogArgs,
}

impl Cli {
    /// Executes the parsed command.
    pub(crate) fn run(self) -> eyre::Result<()> {
        let config = self.load_config()?;

        if let Commands::Config(command) = &self.command {
            return command.execute(&config)
        }

        let _guard = self.logs.init_tracing()?;
        config.validate().wrap_err("invalid configuration")?;
        info!(target: "archiver::cli", storage = %config.storage.kind, beacon = %config.beacon.url, "Loaded configuration");

        run_until_shutdown(|cancel| self.command.execute(config, cancel))
    }

    /// Reads the configuration file, if any, and applies the command line overrides.
    fn load_config(&self) -> eyre::Result<Config> {
        let mut config = match &self.config {
            Some(path) => confy::load_path::<Config>(path)
                .wrap_err_with(|| format!("could not load config file {}", path.display()))?,
            None => Config::default(),
        };
        self.overrides.apply(&mut config);
        Ok(config)
    }
}

/// Commands to be executed
#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Follow the chain and archive blobs until stopped
    #[command(name = "run")]
    Run,
    /// Fetch and overwrite the blobs of a slot range
    #[command(name = "rearchive")]
    Rearchive(RearchiveCommand),
    /// Write the effective configuration to stdout
    #[command(name = "config")]
    Config(ConfigCommand),
}

impl Commands {
    async fn execute(self, config: Config, cancel: CancellationToken) -> eyre::Result<()> {
        let beacon_url = Url::parse(&config.beacon.url)
            .wrap_err_with(|| format!("invalid beacon node url {}", config.beacon.url))?;
        let beacon = HttpBeaconClient::new(beacon_url, config.beacon.timeout)?;

        match config.storage.kind {
            StorageType::File => {
                let store = FileStorage::open(&config.storage.file.directory)?;
                self.execute_with(Archiver::new(beacon, store, config.archiver), cancel).await
            }
            StorageType::S3 => {
                let store = ObjectStorage::s3(&config.storage.s3)?;
                self.execute_with(Archiver::new(beacon, store, config.archiver), cancel).await
            }
        }
    }

    async fn execute_with<S>(
        self,
        archiver: Archiver<HttpBeaconClient, S>,
        cancel: CancellationToken,
    ) -> eyre::Result<()>
    where
        S: DataStore + Clone + 'static,
    {
        match self {
            Self::Run => match Arc::new(archiver).start(cancel).await {
                Ok(()) | Err(ArchiverError::Cancelled) => Ok(()),
                Err(err) => Err(err.into()),
            },
            Self::Rearchive(command) => command.execute(&archiver, cancel).await,
            Self::Config(_) => Ok(()),
        }
    }
}

/// `blob-archiver rearchive` arguments.
#[derive(Debug, Args)]
pub(crate) struct RearchiveCommand {
    /// First slot to rearchive.
    #[arg(long)]
    from: u64,

    /// Last slot to rearchive, inclusive.
    #[arg(long)]
    to: u64,
}

impl RearchiveCommand {
    async fn execute<S>(
        &self,
        archiver: &Archiver<HttpBeaconClient, S>,
        cancel: CancellationToken,
    ) -> eyre::Result<()>
    where
        S: DataStore + Clone + 'static,
    {
        let heartbeat = match archiver.acquire_lease(&cancel).await {
            Ok(heartbeat) => heartbeat,
            Err(ArchiverError::Cancelled) => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let res = tokio::select! {
            res = archiver.rearchive_range(self.from, self.to) => res.map(Some),
            _ = cancel.cancelled() => Ok(None),
        };
        cancel.cancel();
        heartbeat.await?;

        match res? {
            Some(last) => info!(target: "archiver::cli", from = self.from, to = last, "Rearchive finished"),
            None => info!(target: "archiver::cli", "Rearchive interrupted"),
        }
        Ok(())
    }
}

/// `blob-archiver config` arguments.
#[derive(Debug, Args)]
pub(crate) struct ConfigCommand {
    /// Show the default configuration instead of the effective one.
    #[arg(long)]
    default: bool,
}

impl ConfigCommand {
    fn execute(&self, config: &Config) -> eyre::Result<()> {
        let config = if self.default { Config::default() } else { config.clone() };
        println!("{}", toml::to_string_pretty(&config)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use blob_archiver_tracing::tracing::level_filters::LevelFilter;
    use clap::CommandFactory;

    /// Tests that the help message is parsed correctly. This ensures that clap args are configured
    /// correctly and no conflicts are introduced via attributes that would result in a panic at
    /// runtime
    #[test]
    fn test_parse_help_all_subcommands() {
        let cli = Cli::command();
        for sub_command in cli.get_subcommands() {
            let err = Cli::try_parse_from(["blob-archiver", sub_command.get_name(), "--help"])
                .err()
                .unwrap_or_else(|| {
                    panic!("Failed to parse help message {}", sub_command.get_name())
                });

            assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        }
    }

    #[test]
    fn parse_rearchive_range() {
        let cli =
            Cli::try_parse_from(["blob-archiver", "rearchive", "--from", "10", "--to", "20"])
                .unwrap();
        let Commands::Rearchive(command) = cli.command else { panic!("expected rearchive") };
        assert_eq!((command.from, command.to), (10, 20));
    }

    #[test]
    fn rearchive_requires_range() {
        assert!(Cli::try_parse_from(["blob-archiver", "rearchive", "--from", "10"]).is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let origin = B256::repeat_byte(0x11);
        let cli = Cli::try_parse_from([
            "blob-archiver",
            "run",
            "--beacon.url",
            "http://beacon:5052",
            "--storage.type",
            "s3",
            "--s3.bucket",
            "blobs",
            "--s3.compress",
            "--archiver.origin-block",
            &origin.to_string(),
            "--archiver.id",
            "archiver-1",
        ])
        .unwrap();

        let config = cli.load_config().unwrap();
        assert_eq!(config.beacon.url, "http://beacon:5052");
        assert_eq!(config.storage.kind, StorageType::S3);
        assert_eq!(config.storage.s3.bucket, "blobs");
        assert!(config.storage.s3.compress);
        assert_eq!(config.archiver.origin_block, origin);
        assert_eq!(config.archiver.archiver_id.as_deref(), Some("archiver-1"));
        config.validate().unwrap();
    }

    #[test]
    fn unknown_storage_type_is_rejected() {
        assert!(Cli::try_parse_from(["blob-archiver", "run", "--storage.type", "gcs"]).is_err());
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archiver.toml");
        let mut stored = Config::default();
        stored.beacon.url = "http://from-file:5052".to_string();
        stored.storage.file.directory = PathBuf::from("/from/file");
        confy::store_path(&path, &stored).unwrap();

        let cli = Cli::try_parse_from([
            "blob-archiver",
            "run",
            "--config",
            path.to_str().unwrap(),
            "--storage.file.directory",
            "/from/flag",
        ])
        .unwrap();

        let config = cli.load_config().unwrap();
        assert_eq!(config.beacon.url, "http://from-file:5052");
        assert_eq!(config.storage.file.directory, PathBuf::from("/from/flag"));
    }

    #[test]
    fn verbosity_maps_to_levels() {
        let cli = Cli::try_parse_from(["blob-archiver", "run"]).unwrap();
        assert_eq!(cli.logs.verbosity.level(), LevelFilter::INFO);

        let cli = Cli::try_parse_from(["blob-archiver", "run", "-vvvv"]).unwrap();
        assert_eq!(cli.logs.verbosity.level(), LevelFilter::DEBUG);

        let cli = Cli::try_parse_from(["blob-archiver", "run", "-q"]).unwrap();
        assert_eq!(cli.logs.verbosity.level(), LevelFilter::OFF);
    }
}
