//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//! Cohort settings come from the environment or flags, tuning knobs from an
//! optional TOML file; flags always win. Validation is centralized in
//! [`validator::validate_config`] so every worker fails the same way on the
//! same misconfiguration.

pub mod cli;
pub mod toml;
pub mod validator;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::coord::TimingPolicy;

/// Largest cohort the protocol supports.
pub const MAX_COHORT: u32 = 1024;

/// Complete run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cohort: CohortConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub registration: RegistrationConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Cohort sizing, identical for every worker of a run.
///
/// Zero means "not set": both values are required and validation rejects the
/// default. There are deliberately no fallbacks here; a cohort whose workers
/// disagree on size deadlocks, so the values must come from one shared
/// source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortConfig {
    /// How many worker processes join the run.
    #[serde(default)]
    pub workers: u32,
    /// Per-worker thread budget for the full registration stage.
    #[serde(default)]
    pub threads: u32,
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            threads: 0,
        }
    }
}

impl fmt::Display for CohortConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} workers, {} threads per worker",
            self.workers, self.threads
        )
    }
}

/// Bounds and intervals for every protocol wait, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_barrier_timeout_secs")]
    pub barrier_timeout_secs: u64,
    #[serde(default = "default_signal_timeout_secs")]
    pub signal_timeout_secs: u64,
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    1
}

fn default_barrier_timeout_secs() -> u64 {
    60
}

// A follower waits out an entire registration between signals.
fn default_signal_timeout_secs() -> u64 {
    4 * 60 * 60
}

fn default_lock_timeout_secs() -> u64 {
    30
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            barrier_timeout_secs: default_barrier_timeout_secs(),
            signal_timeout_secs: default_signal_timeout_secs(),
            lock_timeout_secs: default_lock_timeout_secs(),
        }
    }
}

impl TimingConfig {
    /// The protocol-layer view of these knobs.
    pub fn policy(&self) -> TimingPolicy {
        TimingPolicy {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            barrier_timeout: Duration::from_secs(self.barrier_timeout_secs),
            signal_timeout: Duration::from_secs(self.signal_timeout_secs),
            lock_timeout: Duration::from_secs(self.lock_timeout_secs),
        }
    }
}

impl fmt::Display for TimingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "poll {}s, barrier {}s, signal {}s, lock {}s",
            self.poll_interval_secs,
            self.barrier_timeout_secs,
            self.signal_timeout_secs,
            self.lock_timeout_secs
        )
    }
}

/// What to register and where.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Name of the fixed image (file or slice directory) in the input dir.
    #[serde(default)]
    pub fixed: String,
    /// Directory holding the fixed and moving images.
    #[serde(default)]
    pub input_dir: PathBuf,
    /// Output directory; also hosts the shared coordination directory, so it
    /// must be on a filesystem every worker sees.
    #[serde(default)]
    pub output_dir: PathBuf,
    /// Thread budget for the leader-only linear stage.
    #[serde(default = "default_linear_threads")]
    pub linear_threads: u32,
    /// Keep per-item intermediate artifacts instead of removing them.
    #[serde(default)]
    pub keep_intermediates: bool,
}

fn default_linear_threads() -> u32 {
    1
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            fixed: String::new(),
            input_dir: PathBuf::new(),
            output_dir: PathBuf::new(),
            linear_threads: default_linear_threads(),
            keep_intermediates: false,
        }
    }
}

impl fmt::Display for RegistrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fixed '{}', {} -> {}",
            self.fixed,
            self.input_dir.display(),
            self.output_dir.display()
        )?;
        if self.keep_intermediates {
            write!(f, " (keeping intermediates)")?;
        }
        Ok(())
    }
}

/// Runtime behavior outside the protocol itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Print debug diagnostics to stderr.
    #[serde(default)]
    pub debug: bool,
    /// Write the run summary as JSON to this path.
    #[serde(default)]
    pub summary_json: Option<PathBuf>,
}

pub use cli::Cli;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_leave_cohort_unset() {
        let config = Config::default();
        assert_eq!(config.cohort.workers, 0);
        assert_eq!(config.cohort.threads, 0);
        assert_eq!(config.timing.poll_interval_secs, 1);
        assert_eq!(config.timing.barrier_timeout_secs, 60);
        assert_eq!(config.registration.linear_threads, 1);
        assert!(!config.registration.keep_intermediates);
        assert!(config.runtime.summary_json.is_none());
    }

    #[test]
    fn test_timing_policy_conversion() {
        let timing = TimingConfig {
            poll_interval_secs: 2,
            barrier_timeout_secs: 90,
            signal_timeout_secs: 600,
            lock_timeout_secs: 15,
        };
        let policy = timing.policy();
        assert_eq!(policy.poll_interval, Duration::from_secs(2));
        assert_eq!(policy.barrier_timeout, Duration::from_secs(90));
        assert_eq!(policy.signal_timeout, Duration::from_secs(600));
        assert_eq!(policy.lock_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_display_formats() {
        let cohort = CohortConfig {
            workers: 4,
            threads: 2,
        };
        assert_eq!(cohort.to_string(), "4 workers, 2 threads per worker");

        let timing = TimingConfig::default();
        assert_eq!(
            timing.to_string(),
            "poll 1s, barrier 60s, signal 14400s, lock 30s"
        );
    }
}
