//! Configuration validation

use super::*;
use anyhow::Result;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_cohort(&config.cohort)?;
    validate_timing(&config.timing)?;
    validate_registration(&config.registration)?;

    // Soft check: the full stage runs every worker's threads at once
    let total_threads = config.cohort.workers.saturating_mul(config.cohort.threads);
    let cpus = num_cpus::get() as u32;
    if total_threads > cpus {
        eprintln!(
            "Warning: cohort asks for {} threads in the full stage but this host has {} CPUs",
            total_threads, cpus
        );
    }

    Ok(())
}

/// Validate cohort configuration
pub fn validate_cohort(cohort: &CohortConfig) -> Result<()> {
    if cohort.workers == 0 {
        anyhow::bail!(
            "cohort size must be set to a positive integer (--workers or NUMBER_OF_WORKERS)"
        );
    }
    if cohort.workers > MAX_COHORT {
        anyhow::bail!(
            "cohort size must be between 1 and {}, got {}",
            MAX_COHORT,
            cohort.workers
        );
    }
    if cohort.threads == 0 {
        anyhow::bail!(
            "per-worker threads must be set to a positive integer (--threads or REGISTRATION_THREADS)"
        );
    }

    Ok(())
}

/// Validate timing configuration
pub fn validate_timing(timing: &TimingConfig) -> Result<()> {
    if timing.poll_interval_secs == 0 {
        anyhow::bail!("poll_interval_secs must be at least 1");
    }
    if timing.barrier_timeout_secs < timing.poll_interval_secs {
        anyhow::bail!(
            "barrier_timeout_secs ({}) must be at least poll_interval_secs ({})",
            timing.barrier_timeout_secs,
            timing.poll_interval_secs
        );
    }
    if timing.signal_timeout_secs < timing.poll_interval_secs {
        anyhow::bail!(
            "signal_timeout_secs ({}) must be at least poll_interval_secs ({})",
            timing.signal_timeout_secs,
            timing.poll_interval_secs
        );
    }
    if timing.lock_timeout_secs == 0 {
        anyhow::bail!("lock_timeout_secs must be at least 1");
    }

    Ok(())
}

/// Validate registration configuration
pub fn validate_registration(registration: &RegistrationConfig) -> Result<()> {
    if registration.fixed.trim().is_empty() {
        anyhow::bail!("fixed image name must not be empty");
    }
    if registration.input_dir.as_os_str().is_empty() {
        anyhow::bail!("input directory must be specified");
    }
    if !registration.input_dir.is_dir() {
        anyhow::bail!(
            "input directory does not exist: {}",
            registration.input_dir.display()
        );
    }
    if registration.output_dir.as_os_str().is_empty() {
        anyhow::bail!("output directory must be specified");
    }
    if registration.linear_threads == 0 {
        anyhow::bail!("linear_threads must be at least 1");
    }

    Ok(())
}
