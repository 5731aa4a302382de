//! CLI argument parsing using clap

use clap::Parser;
use std::path::PathBuf;

/// regflock - Cohort-coordinated ANTs image registration
#[derive(Parser, Debug)]
#[command(name = "regflock")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Input directory holding the fixed image and the moving images
    #[arg(value_name = "INPUT_DIR")]
    pub input_dir: PathBuf,

    /// Output directory (shared by every worker of the cohort)
    #[arg(value_name = "OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Name of the fixed image inside the input directory
    ///
    /// Either a NIfTI volume (.nii/.nii.gz) or a directory of DICOM slices.
    #[arg(short = 'f', long)]
    pub fixed: String,

    // === Cohort Options ===
    /// Number of worker processes in the cohort
    ///
    /// Every worker of a run must be launched with the same value.
    #[arg(short = 'w', long, env = "NUMBER_OF_WORKERS")]
    pub workers: Option<u32>,

    /// Threads each worker contributes to the full registration stage
    #[arg(short = 't', long, env = "REGISTRATION_THREADS")]
    pub threads: Option<u32>,

    // === Registration Options ===
    /// Threads for the leader-only linear pre-registration stage
    #[arg(long)]
    pub linear_threads: Option<u32>,

    /// Keep intermediate registration artifacts (warp fields, affines)
    #[arg(long)]
    pub keep_intermediates: bool,

    // === Timing Options ===
    /// Polling interval for coordination waits, in seconds
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// How long to wait for the full cohort to join, in seconds
    #[arg(long)]
    pub barrier_timeout: Option<u64>,

    /// How long to wait for a leader signal, in seconds
    #[arg(long)]
    pub signal_timeout: Option<u64>,

    /// How long to wait for the coordination file lock, in seconds
    #[arg(long)]
    pub lock_timeout: Option<u64>,

    // === Output Options ===
    /// Write the run summary as JSON to this path
    #[arg(long)]
    pub summary_json: Option<PathBuf>,

    // === Configuration File ===
    /// TOML configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Dry run - validate configuration without executing
    #[arg(long)]
    pub dry_run: bool,

    /// Enable debug output (timing, spawned commands, etc.)
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate CLI arguments
    ///
    /// Only checks what the TOML merge cannot repair; the merged config goes
    /// through the full validator afterwards.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.fixed.trim().is_empty() {
            anyhow::bail!("fixed image name must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_invocation_parses() {
        let cli = Cli::try_parse_from([
            "regflock", "/data/in", "/data/out", "-f", "template.nii.gz",
        ])
        .unwrap();
        assert_eq!(cli.input_dir, PathBuf::from("/data/in"));
        assert_eq!(cli.output_dir, PathBuf::from("/data/out"));
        assert_eq!(cli.fixed, "template.nii.gz");
        assert!(cli.workers.is_none());
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_cohort_flags_parse() {
        let cli = Cli::try_parse_from([
            "regflock",
            "/data/in",
            "/data/out",
            "-f",
            "template.nii.gz",
            "-w",
            "4",
            "-t",
            "2",
            "--linear-threads",
            "8",
            "--keep-intermediates",
        ])
        .unwrap();
        assert_eq!(cli.workers, Some(4));
        assert_eq!(cli.threads, Some(2));
        assert_eq!(cli.linear_threads, Some(8));
        assert!(cli.keep_intermediates);
    }

    #[test]
    fn test_missing_fixed_is_rejected() {
        let result = Cli::try_parse_from(["regflock", "/data/in", "/data/out"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_fixed_fails_validation() {
        let cli =
            Cli::try_parse_from(["regflock", "/data/in", "/data/out", "-f", "  "]).unwrap();
        assert!(cli.validate().is_err());
    }
}
