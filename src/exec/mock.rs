//! Mock toolchain for testing
//!
//! Stands in for the real external tools so the pipeline can be exercised
//! end-to-end (full cohorts included) on machines without ANTs installed.
//! The mock records every invocation for later assertions and fabricates the
//! artifact each real tool would leave behind, so downstream steps see the
//! files they expect. Registration can be forced to fail to drive the abort
//! path.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};

use super::{warped_volume_path, RegistrationJob, RegistrationStage, Toolchain};
use crate::Result;

/// One recorded call on the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Register(RegistrationJob),
    ConvertSlices {
        slices_dir: PathBuf,
        dest_dir: PathBuf,
        name: String,
    },
    RenderMosaic {
        volume: PathBuf,
        dest: PathBuf,
    },
    ToJpeg {
        src: PathBuf,
        dest: PathBuf,
    },
}

/// Records invocations and fabricates artifacts instead of spawning tools.
///
/// Clones share their recording, so a test can keep one handle while the
/// pipeline drives another.
#[derive(Clone, Default)]
pub struct MockToolchain {
    invocations: Arc<Mutex<Vec<Invocation>>>,
    fail_registrations: Arc<Mutex<bool>>,
    work: Arc<Mutex<Duration>>,
    fuse: Arc<Mutex<Option<Arc<Barrier>>>>,
}

impl MockToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `register` call fail.
    pub fn fail_registrations(&self) {
        *self.fail_registrations.lock().unwrap() = true;
    }

    /// Give every `register` call a real duration, for tests whose pacing
    /// assumes registration is slower than a poll interval.
    pub fn delay_registrations(&self, work: Duration) {
        *self.work.lock().unwrap() = work;
    }

    /// Rendezvous every full-stage `register` across `cohort` concurrent
    /// callers before returning, the way the real toolkit's own barrier fuses
    /// the cohort's processes into one computation.
    pub fn fuse_full_stage(&self, cohort: usize) {
        *self.fuse.lock().unwrap() = Some(Arc::new(Barrier::new(cohort)));
    }

    /// Everything recorded so far, in call order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    /// The registration jobs recorded so far, in call order.
    pub fn registrations(&self) -> Vec<RegistrationJob> {
        self.invocations()
            .into_iter()
            .filter_map(|call| match call {
                Invocation::Register(job) => Some(job),
                _ => None,
            })
            .collect()
    }

    fn record(&self, invocation: Invocation) {
        self.invocations.lock().unwrap().push(invocation);
    }

    fn fabricate(&self, path: &Path, what: &str) -> Result<()> {
        fs::write(path, what)
            .with_context(|| format!("mock fabricating {} at {}", what, path.display()))
    }
}

impl Toolchain for MockToolchain {
    fn register(&self, job: &RegistrationJob) -> Result<()> {
        self.record(Invocation::Register(job.clone()));
        if *self.fail_registrations.lock().unwrap() {
            bail!("mock registration failure for item '{}'", job.item);
        }
        let work = *self.work.lock().unwrap();
        if !work.is_zero() {
            thread::sleep(work);
        }
        match job.stage {
            RegistrationStage::Linear => {
                let affine = job
                    .output_dir
                    .join(format!("{}0GenericAffine.mat", job.item));
                self.fabricate(&affine, "affine")
            }
            RegistrationStage::Full(_) => {
                // Clone out of the mutex so no lock is held across the wait.
                let fuse = self.fuse.lock().unwrap().clone();
                if let Some(barrier) = fuse {
                    barrier.wait();
                }
                let warped = warped_volume_path(&job.output_dir, &job.item);
                self.fabricate(&warped, "warped volume")
            }
        }
    }

    fn convert_slices(&self, slices_dir: &Path, dest_dir: &Path, name: &str) -> Result<PathBuf> {
        self.record(Invocation::ConvertSlices {
            slices_dir: slices_dir.to_path_buf(),
            dest_dir: dest_dir.to_path_buf(),
            name: name.to_string(),
        });
        let volume = dest_dir.join(format!("{}.nii", name));
        self.fabricate(&volume, "converted volume")?;
        Ok(volume)
    }

    fn render_mosaic(&self, volume: &Path, dest: &Path) -> Result<()> {
        self.record(Invocation::RenderMosaic {
            volume: volume.to_path_buf(),
            dest: dest.to_path_buf(),
        });
        self.fabricate(dest, "mosaic")
    }

    fn to_jpeg(&self, src: &Path, dest: &Path) -> Result<()> {
        self.record(Invocation::ToJpeg {
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
        });
        self.fabricate(dest, "jpeg")
    }
}
