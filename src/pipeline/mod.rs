//! Registration pipeline
//!
//! Drives one worker through a complete cohort run: join the cohort, then
//! either lead or follow until every moving image has been registered, then
//! tear down.
//!
//! # Architecture
//!
//! The pipeline composes the other modules and owns the order of operations:
//!
//! - **coord**: cohort membership, signals, and the dispatch relay
//! - **input**: classifying the input directory (leader only)
//! - **exec**: the external toolchain behind the [`Toolchain`] seam
//! - **output**: the per-worker run summary
//!
//! The leader walks the moving images one at a time. Per item it runs the
//! local linear stage, publishes the dispatch record, broadcasts START, runs
//! its own slot of the fused full stage, broadcasts IDLE, and then renders
//! the review mosaic and removes surplus artifacts while the followers idle.
//! Followers loop on the broadcast channel and contribute their slot to each
//! full stage with the exact parameters the leader relayed.
//!
//! The external full-stage command is itself a rendezvous: it does not
//! return until every cohort process has joined it. That property paces the
//! whole protocol - the leader cannot race ahead of a follower that is still
//! computing, because its own invocation is fused to the follower's.
//!
//! Teardown runs on success and on failure. A leader that aborts broadcasts
//! EXIT first so no follower is left polling, and every exit path hands the
//! worker's counter slot back so the last worker out can purge the shared
//! directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::Config;
use crate::coord::{CohortSession, CoordDir, DispatchRecord, Signal, TimingPolicy};
use crate::exec::{
    reset_barrier_scratch, warped_volume_path, AntsToolchain, CohortSlot, RegistrationJob,
    RegistrationStage, Toolchain,
};
use crate::input::{scan_inputs, InputEntry, InputKind};
use crate::output::RunSummary;
use crate::util::time::{format_duration, Stopwatch};
use crate::Result;

/// Scratch name for a fixed image converted from slices.
const FIXED_SCRATCH_NAME: &str = "fixed_image";

const FIXED_MOSAIC_VOLUME: &str = "FixedTiled.nii";
const FIXED_MOSAIC_JPEG: &str = "FixedTiled.jpg";

/// Per-item artifacts the toolkit deposits beyond the warped volume and its
/// JPEG, removed after each item unless intermediates are kept.
const SURPLUS_SUFFIXES: &[&str] = &[
    "1InverseWarp.nii.gz",
    "1Warp.nii.gz",
    "InverseWarped.nii.gz",
    "0GenericAffine.mat",
    "WarpedTiled.nii",
];

/// Run a complete worker using the real ANTs toolchain.
pub fn run(config: &Config) -> Result<RunSummary> {
    let tools = AntsToolchain::new(config.runtime.debug);
    run_with(config, &tools)
}

/// Run a complete worker against any [`Toolchain`] implementation.
pub fn run_with(config: &Config, tools: &dyn Toolchain) -> Result<RunSummary> {
    run_with_timing(config, tools, config.timing.policy())
}

fn run_with_timing(
    config: &Config,
    tools: &dyn Toolchain,
    timing: TimingPolicy,
) -> Result<RunSummary> {
    let mut watch = Stopwatch::start();

    let dir = CoordDir::under_output(&config.registration.output_dir);
    let session = CohortSession::join(dir, config.cohort.workers, timing)?;
    let identity = *session.identity();
    if config.runtime.debug {
        eprintln!("DEBUG TIMING: Cohort join: {:.3}s", watch.lap().as_secs_f64());
    }

    let mut summary = RunSummary::begin(identity.id, identity.role_name(), identity.cohort);
    println!(
        "Assigned worker {} of {} ({}) on {}",
        identity.id,
        identity.cohort,
        identity.role_name(),
        summary.hostname
    );

    let outcome = if identity.is_leader() {
        drive_leader(&session, config, tools, &mut summary)
    } else {
        drive_follower(&session, tools, &mut summary)
    };
    if config.runtime.debug {
        eprintln!("DEBUG TIMING: Drive: {:.3}s", watch.lap().as_secs_f64());
    }

    match outcome {
        Ok(()) => {
            let coord_root = session.dir().root().to_path_buf();
            if session.leave()? && config.runtime.debug {
                eprintln!("DEBUG: last worker out, removed {}", coord_root.display());
            }
            summary.finish(watch.total());
            Ok(summary)
        }
        Err(err) => {
            // Release any followers still polling, then hand the counter
            // slot back so the rest of the cohort can tear down cleanly.
            if identity.is_leader() {
                let _ = session.broadcast(Signal::Exit);
            }
            let _ = session.leave();
            Err(err)
        }
    }
}

fn drive_leader(
    session: &CohortSession,
    config: &Config,
    tools: &dyn Toolchain,
    summary: &mut RunSummary,
) -> Result<()> {
    let registration = &config.registration;
    let output_dir = registration.output_dir.as_path();
    let identity = *session.identity();
    let dir = session.dir();
    let slot = CohortSlot::new(identity.id, identity.cohort, dir);

    // First broadcast parks the followers in their outer wait.
    session.broadcast(Signal::Idle)?;
    reset_barrier_scratch(dir, identity.cohort)?;

    let scan = scan_inputs(&registration.input_dir, &registration.fixed)?;
    let fixed_volume = materialize_volume(&scan.fixed, FIXED_SCRATCH_NAME, dir, tools)?;
    println!("Fixed image: {}", fixed_volume.display());

    let mut items = Vec::with_capacity(scan.moving.len());
    for entry in &scan.moving {
        let name = entry.item_name();
        let volume = materialize_volume(entry, &name, dir, tools)?;
        items.push((name, volume));
    }
    println!("Moving images: {}", items.len());
    if items.is_empty() {
        eprintln!(
            "Warning: no moving images found in {}",
            registration.input_dir.display()
        );
    }

    // Review image of the fixed volume.
    let fixed_mosaic = output_dir.join(FIXED_MOSAIC_VOLUME);
    tools.render_mosaic(&fixed_volume, &fixed_mosaic)?;
    tools.to_jpeg(&fixed_mosaic, &output_dir.join(FIXED_MOSAIC_JPEG))?;
    if !registration.keep_intermediates {
        remove_artifacts(&[fixed_mosaic])?;
    }

    for (index, (item, moving_volume)) in items.iter().enumerate() {
        println!("[{}/{}] Registering '{}'", index + 1, items.len(), item);
        let item_watch = Stopwatch::start();

        // Leader-local linear stage; the full stage reuses its output
        // prefix.
        tools.register(&RegistrationJob {
            fixed: fixed_volume.clone(),
            moving: moving_volume.clone(),
            output_dir: output_dir.to_path_buf(),
            item: item.clone(),
            threads: registration.linear_threads,
            stage: RegistrationStage::Linear,
        })?;

        // Publish strictly before START so a follower waking on START always
        // reads this item's parameters.
        let record = DispatchRecord {
            fixed: fixed_volume.clone(),
            moving: moving_volume.clone(),
            output_dir: output_dir.to_path_buf(),
            item: item.clone(),
            threads: config.cohort.threads,
        };
        session.publish_dispatch(&record)?;
        session.broadcast(Signal::Start)?;

        // The leader's own slot of the fused computation; returns once the
        // cohort-wide invocation is done.
        tools.register(&RegistrationJob {
            fixed: record.fixed,
            moving: record.moving,
            output_dir: record.output_dir,
            item: record.item,
            threads: record.threads,
            stage: RegistrationStage::Full(slot.clone()),
        })?;
        session.broadcast(Signal::Idle)?;

        // Per-item review image and cleanup, local to the leader while the
        // followers idle.
        let warped = warped_volume_path(output_dir, item);
        let mosaic = output_dir.join(format!("{}WarpedTiled.nii", item));
        tools.render_mosaic(&warped, &mosaic)?;
        tools.to_jpeg(&mosaic, &output_dir.join(format!("{}WarpedTiled.jpg", item)))?;
        if !registration.keep_intermediates {
            remove_artifacts(&surplus_artifacts(output_dir, item))?;
        }

        summary.record_item(item, item_watch.total());
        println!(
            "[{}/{}] '{}' done in {}",
            index + 1,
            items.len(),
            item,
            format_duration(item_watch.total())
        );
    }

    session.broadcast(Signal::Exit)?;
    Ok(())
}

fn drive_follower(
    session: &CohortSession,
    tools: &dyn Toolchain,
    summary: &mut RunSummary,
) -> Result<()> {
    let identity = *session.identity();
    let slot = CohortSlot::new(identity.id, identity.cohort, session.dir());

    loop {
        match session.await_start_or_exit()? {
            Signal::Exit => break,
            Signal::Start => {
                let record = session.consume_dispatch()?;
                let item = record.item.clone();
                println!("Worker {}: joining full stage of '{}'", identity.id, item);

                let item_watch = Stopwatch::start();
                tools.register(&RegistrationJob {
                    fixed: record.fixed,
                    moving: record.moving,
                    output_dir: record.output_dir,
                    item: record.item,
                    threads: record.threads,
                    stage: RegistrationStage::Full(slot.clone()),
                })?;
                summary.record_item(&item, item_watch.total());

                if session.await_idle_or_exit()? == Signal::Exit {
                    break;
                }
            }
            // The wait filters IDLE out; just poll again.
            Signal::Idle => continue,
        }
    }
    Ok(())
}

/// A moving or fixed input as a registerable volume: volumes are used in
/// place, slice directories are converted into the shared directory (and so
/// removed with it at teardown).
fn materialize_volume(
    entry: &InputEntry,
    name: &str,
    scratch: &CoordDir,
    tools: &dyn Toolchain,
) -> Result<PathBuf> {
    match entry.kind {
        InputKind::Volume => Ok(entry.path.clone()),
        InputKind::SliceDir => tools.convert_slices(&entry.path, scratch.root(), name),
    }
}

fn surplus_artifacts(output_dir: &Path, item: &str) -> Vec<PathBuf> {
    SURPLUS_SUFFIXES
        .iter()
        .map(|suffix| output_dir.join(format!("{}{}", item, suffix)))
        .collect()
}

/// Remove generated artifacts, ignoring any a given run never produced.
fn remove_artifacts(paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("removing {}", path.display()));
            }
        }
    }
    Ok(())
}
