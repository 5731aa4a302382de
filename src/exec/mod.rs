//! External toolchain invocation
//!
//! The domain computation is not reimplemented here: registration, slice
//! conversion, mosaic rendering, and JPEG conversion are long-running
//! external commands invoked with path-based arguments. This module owns
//! that collaborator boundary.
//!
//! # Architecture
//!
//! The [`Toolchain`] trait is the seam: the pipeline drives any
//! implementation, so tests substitute [`mock::MockToolchain`] and never
//! spawn real tools. [`AntsToolchain`] is the production backend, shelling
//! out to the ANTs programs.
//!
//! Argument vectors and environment sets are built by pure functions so the
//! exact invocation contract is unit-testable. Every invocation's exit
//! status is inspected; a non-zero exit is an error naming the program, and
//! the caller decides how far the failure propagates.
//!
//! # Stages
//!
//! Registration runs in one of two stages:
//!
//! - **Linear** (`-t a`): rigid+affine only. Cheap, run by the leader alone
//!   with a low thread budget and no multi-process environment.
//! - **Full** (`-t s`): the complete deformable registration. Run by every
//!   worker simultaneously; the toolkit's own file-based barrier (pointed at
//!   the shared directory) fuses the cohort's processes into one
//!   computation. Both stages share an output prefix so the full stage finds
//!   the linear stage's affine where it expects it.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context};

use crate::coord::CoordDir;
use crate::Result;

const REGISTRATION_PROGRAM: &str = "antsRegistrationSyNQuick.sh";
const CONVERT_PROGRAM: &str = "dcm2niix";
const MOSAIC_PROGRAM: &str = "CreateTiledMosaic";
const JPEG_PROGRAM: &str = "ConvertToJpg";

const ENV_THREADS: &str = "ITK_GLOBAL_DEFAULT_NUMBER_OF_THREADS";
const ENV_PROCESS_NUMBER: &str = "ITK_PROCESS_NUMBER";
const ENV_BARRIER_PREFIX: &str = "ITK_BARRIER_FILE_PREFIX";
const ENV_DATA_PREFIX: &str = "ITK_DATA_FILE_PREFIX";
const ENV_BARRIER_RESET: &str = "ITK_BARRIER_FILES_RESET";

/// Multi-process context for the full registration stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CohortSlot {
    pub worker_id: u32,
    pub cohort: u32,
    pub barrier_prefix: PathBuf,
    pub data_prefix: PathBuf,
}

impl CohortSlot {
    /// Derive the slot for one worker from the shared directory layout.
    pub fn new(worker_id: u32, cohort: u32, dir: &CoordDir) -> Self {
        Self {
            worker_id,
            cohort,
            barrier_prefix: dir.barrier_scratch_prefix(),
            data_prefix: dir.data_scratch_prefix(),
        }
    }
}

/// Which phase of the registration to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationStage {
    /// Rigid+affine only; purely local to the invoking worker.
    Linear,
    /// Full deformable registration across the whole cohort.
    Full(CohortSlot),
}

impl RegistrationStage {
    fn transform_flag(&self) -> &'static str {
        match self {
            RegistrationStage::Linear => "a",
            RegistrationStage::Full(_) => "s",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RegistrationStage::Linear => "linear",
            RegistrationStage::Full(_) => "full",
        }
    }
}

/// Everything one registration invocation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationJob {
    pub fixed: PathBuf,
    pub moving: PathBuf,
    pub output_dir: PathBuf,
    pub item: String,
    pub threads: u32,
    pub stage: RegistrationStage,
}

/// The volume the full stage deposits in the output directory.
pub fn warped_volume_path(output_dir: &Path, item: &str) -> PathBuf {
    output_dir.join(format!("{}Warped.nii.gz", item))
}

/// Argument vector for one registration invocation.
pub fn register_argv(job: &RegistrationJob) -> Vec<String> {
    vec![
        "-d".to_string(),
        "3".to_string(),
        "-f".to_string(),
        job.fixed.display().to_string(),
        "-m".to_string(),
        job.moving.display().to_string(),
        "-o".to_string(),
        job.output_dir.join(&job.item).display().to_string(),
        "-n".to_string(),
        job.threads.to_string(),
        "-t".to_string(),
        job.stage.transform_flag().to_string(),
    ]
}

/// Environment for one registration invocation.
///
/// The linear stage only caps the toolkit's threads. The full stage carries
/// the complete multi-process contract: the cohort size as the thread count,
/// this worker's slot number, and the shared-directory scratch prefixes.
pub fn register_env(job: &RegistrationJob) -> Vec<(String, String)> {
    match &job.stage {
        RegistrationStage::Linear => {
            vec![(ENV_THREADS.to_string(), job.threads.to_string())]
        }
        RegistrationStage::Full(slot) => vec![
            (ENV_THREADS.to_string(), slot.cohort.to_string()),
            (ENV_PROCESS_NUMBER.to_string(), slot.worker_id.to_string()),
            (
                ENV_BARRIER_PREFIX.to_string(),
                slot.barrier_prefix.display().to_string(),
            ),
            (
                ENV_DATA_PREFIX.to_string(),
                slot.data_prefix.display().to_string(),
            ),
            (ENV_BARRIER_RESET.to_string(), "1".to_string()),
        ],
    }
}

fn single_process_env() -> Vec<(String, String)> {
    vec![(ENV_THREADS.to_string(), "1".to_string())]
}

/// Reset the toolkit's barrier scratch: one cleared unsigned 64-bit counter
/// per cohort slot. Leader-only, before the first item.
pub fn reset_barrier_scratch(dir: &CoordDir, cohort: u32) -> Result<()> {
    for slot in 0..cohort {
        let path = dir.barrier_scratch_path(slot);
        fs::write(&path, [0u8; 8])
            .with_context(|| format!("resetting barrier scratch {}", path.display()))?;
    }
    Ok(())
}

/// The collaborator boundary the pipeline drives.
///
/// Implementations run the operation to completion and report failure as an
/// error; none of the operations touch the coordination records.
pub trait Toolchain {
    /// Run one registration stage to completion.
    fn register(&self, job: &RegistrationJob) -> Result<()>;

    /// Convert a directory of slices into one volume named `<name>.nii`
    /// inside `dest_dir`; returns the volume's path.
    fn convert_slices(&self, slices_dir: &Path, dest_dir: &Path, name: &str) -> Result<PathBuf>;

    /// Render a tiled 2D mosaic of `volume` at `dest`.
    fn render_mosaic(&self, volume: &Path, dest: &Path) -> Result<()>;

    /// Convert `src` to a JPEG at `dest`.
    fn to_jpeg(&self, src: &Path, dest: &Path) -> Result<()>;
}

/// Production backend: shells out to the ANTs toolchain.
pub struct AntsToolchain {
    debug: bool,
}

impl AntsToolchain {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    fn run(&self, program: &str, argv: &[String], env: &[(String, String)]) -> Result<()> {
        if self.debug {
            eprintln!("DEBUG: exec {} {}", program, argv.join(" "));
        }
        let mut command = Command::new(program);
        command.args(argv);
        for (key, value) in env {
            command.env(key, value);
        }
        let status = command
            .status()
            .with_context(|| format!("failed to launch {} (is it on PATH?)", program))?;
        if !status.success() {
            bail!("{} exited with {}", program, status);
        }
        Ok(())
    }
}

impl Toolchain for AntsToolchain {
    fn register(&self, job: &RegistrationJob) -> Result<()> {
        self.run(REGISTRATION_PROGRAM, &register_argv(job), &register_env(job))
            .with_context(|| {
                format!(
                    "{} registration of item '{}' failed",
                    job.stage.name(),
                    job.item
                )
            })
    }

    fn convert_slices(&self, slices_dir: &Path, dest_dir: &Path, name: &str) -> Result<PathBuf> {
        let argv = vec![
            "-o".to_string(),
            dest_dir.display().to_string(),
            "-f".to_string(),
            name.to_string(),
            slices_dir.display().to_string(),
        ];
        self.run(CONVERT_PROGRAM, &argv, &[])
            .with_context(|| format!("converting slices in {}", slices_dir.display()))?;

        // The converter may emit several volumes for mixed series; the first
        // (and usually only) one under the requested name is registered.
        let volume = dest_dir.join(format!("{}.nii", name));
        if !volume.is_file() {
            bail!(
                "slice conversion produced no volume at {}",
                volume.display()
            );
        }
        Ok(volume)
    }

    fn render_mosaic(&self, volume: &Path, dest: &Path) -> Result<()> {
        let argv = vec![
            "-i".to_string(),
            volume.display().to_string(),
            "-o".to_string(),
            dest.display().to_string(),
        ];
        self.run(MOSAIC_PROGRAM, &argv, &single_process_env())
            .with_context(|| format!("rendering mosaic of {}", volume.display()))
    }

    fn to_jpeg(&self, src: &Path, dest: &Path) -> Result<()> {
        let argv = vec![src.display().to_string(), dest.display().to_string()];
        self.run(JPEG_PROGRAM, &argv, &single_process_env())
            .with_context(|| format!("converting {} to JPEG", src.display()))
    }
}

pub mod mock;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn linear_job() -> RegistrationJob {
        RegistrationJob {
            fixed: PathBuf::from("/in/fixed.nii"),
            moving: PathBuf::from("/in/brain.nii.gz"),
            output_dir: PathBuf::from("/out"),
            item: "brain".to_string(),
            threads: 1,
            stage: RegistrationStage::Linear,
        }
    }

    fn full_job() -> RegistrationJob {
        let dir = CoordDir::new("/out/tmp");
        RegistrationJob {
            threads: 4,
            stage: RegistrationStage::Full(CohortSlot::new(2, 3, &dir)),
            ..linear_job()
        }
    }

    #[test]
    fn test_register_argv_linear() {
        assert_eq!(
            register_argv(&linear_job()),
            vec![
                "-d", "3", "-f", "/in/fixed.nii", "-m", "/in/brain.nii.gz", "-o", "/out/brain",
                "-n", "1", "-t", "a",
            ]
        );
    }

    #[test]
    fn test_register_argv_full() {
        let argv = register_argv(&full_job());
        assert_eq!(argv[7], "/out/brain");
        assert_eq!(argv[9], "4");
        assert_eq!(argv[11], "s");
    }

    #[test]
    fn test_linear_env_is_thread_cap_only() {
        assert_eq!(
            register_env(&linear_job()),
            vec![(
                "ITK_GLOBAL_DEFAULT_NUMBER_OF_THREADS".to_string(),
                "1".to_string()
            )]
        );
    }

    #[test]
    fn test_full_env_carries_multi_process_contract() {
        let env = register_env(&full_job());
        assert_eq!(
            env,
            vec![
                (
                    "ITK_GLOBAL_DEFAULT_NUMBER_OF_THREADS".to_string(),
                    "3".to_string()
                ),
                ("ITK_PROCESS_NUMBER".to_string(), "2".to_string()),
                (
                    "ITK_BARRIER_FILE_PREFIX".to_string(),
                    "/out/tmp/itkbarrier".to_string()
                ),
                (
                    "ITK_DATA_FILE_PREFIX".to_string(),
                    "/out/tmp/itkdata".to_string()
                ),
                ("ITK_BARRIER_FILES_RESET".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_warped_volume_naming() {
        assert_eq!(
            warped_volume_path(Path::new("/out"), "brain"),
            Path::new("/out/brainWarped.nii.gz")
        );
    }

    #[test]
    fn test_reset_barrier_scratch_zeroes_every_slot() {
        let out = TempDir::new().unwrap();
        let dir = CoordDir::under_output(out.path());
        dir.ensure().unwrap();

        reset_barrier_scratch(&dir, 3).unwrap();

        for slot in 0..3 {
            let contents = fs::read(dir.barrier_scratch_path(slot)).unwrap();
            assert_eq!(contents, vec![0u8; 8]);
        }
        assert!(!dir.barrier_scratch_path(3).exists());
    }

    #[test]
    fn test_reset_overwrites_stale_scratch() {
        let out = TempDir::new().unwrap();
        let dir = CoordDir::under_output(out.path());
        dir.ensure().unwrap();
        fs::write(dir.barrier_scratch_path(0), 7u64.to_le_bytes()).unwrap();

        reset_barrier_scratch(&dir, 1).unwrap();
        assert_eq!(fs::read(dir.barrier_scratch_path(0)).unwrap(), vec![0u8; 8]);
    }
}
