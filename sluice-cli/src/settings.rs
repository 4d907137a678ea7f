//! Layered configuration: defaults, optional TOML file, `SLUICE_*`
//! environment variables, then command-line flags.
//!
//! ```toml
//! input_dir = "/var/spool/inbox"
//! archive_dir = "/var/spool/done"
//! disposition = "archive"
//! order = "modified"
//! backoff = "5s"
//! poll_interval = "1s"
//! pause_file = "/var/spool/inbox.paused"
//! command = ["/opt/ingest tools/ingest", "--quiet"]
//! batch_action = "detached"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use config::{Config, Environment, File};
use serde::Deserialize;
use sluice_sdk::{ExecutionMode, FileOrder};

use crate::duration::parse_duration;

/// What happens to a file once it has been handled successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    #[default]
    Delete,
    Archive,
}

/// File selection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Name,
    Modified,
}

impl From<Order> for FileOrder {
    fn from(order: Order) -> Self {
        match order {
            Order::Name => FileOrder::Name,
            Order::Modified => FileOrder::Modified,
        }
    }
}

/// How the end-of-batch summary runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    #[default]
    Sync,
    Detached,
}

impl From<BatchMode> for ExecutionMode {
    fn from(mode: BatchMode) -> Self {
        match mode {
            BatchMode::Sync => ExecutionMode::Sync,
            BatchMode::Detached => ExecutionMode::Detached,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub input_dir: PathBuf,
    pub archive_dir: Option<PathBuf>,
    pub order: Order,
    pub ignore_hidden: bool,
    pub max_listed: Option<usize>,
    /// Pause after an empty poll; "0s" disables.
    pub backoff: String,
    pub poll_interval: String,
    /// Polling is suspended while this file exists.
    pub pause_file: Option<PathBuf>,
    pub disposition: Disposition,
    /// Program and arguments run per file, with the file path appended as
    /// last argument. A list, so paths may contain spaces.
    pub command: Option<Vec<String>>,
    pub batch_action: BatchMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("inbox"),
            archive_dir: None,
            order: Order::Name,
            ignore_hidden: true,
            max_listed: None,
            backoff: "5s".to_string(),
            poll_interval: "1s".to_string(),
            pause_file: None,
            disposition: Disposition::Delete,
            command: None,
            batch_action: BatchMode::Sync,
        }
    }
}

/// Command-line values that take precedence over file and environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub input_dir: Option<PathBuf>,
    pub archive_dir: Option<PathBuf>,
    pub order: Option<Order>,
    pub backoff: Option<String>,
    pub poll_interval: Option<String>,
    pub pause_file: Option<PathBuf>,
    pub disposition: Option<Disposition>,
    pub command: Option<Vec<String>>,
    pub batch_action: Option<BatchMode>,
}

impl Settings {
    /// Load settings from an optional config file and the environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder
            .add_source(Environment::with_prefix("SLUICE").try_parsing(true))
            .build()
            .context("Failed to load configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(v) = overrides.input_dir {
            self.input_dir = v;
        }
        if let Some(v) = overrides.archive_dir {
            self.archive_dir = Some(v);
        }
        if let Some(v) = overrides.order {
            self.order = v;
        }
        if let Some(v) = overrides.backoff {
            self.backoff = v;
        }
        if let Some(v) = overrides.poll_interval {
            self.poll_interval = v;
        }
        if let Some(v) = overrides.pause_file {
            self.pause_file = Some(v);
        }
        if let Some(v) = overrides.disposition {
            self.disposition = v;
        }
        if let Some(v) = overrides.command {
            self.command = Some(v);
        }
        if let Some(v) = overrides.batch_action {
            self.batch_action = v;
        }
        self
    }

    /// Check cross-field constraints before anything touches the disk.
    pub fn validate(&self) -> Result<()> {
        self.backoff()?;
        let interval = self.poll_interval()?;
        if interval.is_zero() {
            bail!("poll_interval must be greater than zero");
        }
        if self.disposition == Disposition::Archive && self.archive_dir.is_none() {
            bail!("disposition \"archive\" requires archive_dir");
        }
        if self.max_listed == Some(0) {
            bail!("max_listed must be greater than zero");
        }
        if let Some(command) = &self.command {
            if command.first().is_none_or(|program| program.trim().is_empty()) {
                bail!("command must name a program");
            }
        }
        Ok(())
    }

    pub fn backoff(&self) -> Result<Duration> {
        parse_duration(&self.backoff).context("Invalid backoff")
    }

    pub fn poll_interval(&self) -> Result<Duration> {
        parse_duration(&self.poll_interval).context("Invalid poll_interval")
    }
}
