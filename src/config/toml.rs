//! TOML configuration file parsing

use super::*;
use crate::config::cli::Cli;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config =
        ::toml::from_str(contents).context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Config {
    // Cohort settings
    if let Some(workers) = cli.workers {
        config.cohort.workers = workers;
    }
    if let Some(threads) = cli.threads {
        config.cohort.threads = threads;
    }

    // Registration settings; the paths and fixed name only exist on the CLI
    config.registration.fixed = cli.fixed.clone();
    config.registration.input_dir = cli.input_dir.clone();
    config.registration.output_dir = cli.output_dir.clone();
    if let Some(threads) = cli.linear_threads {
        config.registration.linear_threads = threads;
    }
    if cli.keep_intermediates {
        config.registration.keep_intermediates = true;
    }

    // Timing overrides
    if let Some(secs) = cli.poll_interval {
        config.timing.poll_interval_secs = secs;
    }
    if let Some(secs) = cli.barrier_timeout {
        config.timing.barrier_timeout_secs = secs;
    }
    if let Some(secs) = cli.signal_timeout {
        config.timing.signal_timeout_secs = secs;
    }
    if let Some(secs) = cli.lock_timeout {
        config.timing.lock_timeout_secs = secs;
    }

    // Runtime settings
    if let Some(ref path) = cli.summary_json {
        config.runtime.summary_json = Some(path.clone());
    }
    if cli.debug {
        config.runtime.debug = true;
    }

    config
}
