//! File-based cohort coordination
//!
//! Workers in a cohort share no memory and no sockets; everything they agree
//! on lives in a handful of files inside one shared directory. This module
//! models that directory as a small set of named, lock-guarded durable
//! records rather than ad hoc file I/O:
//!
//! - **Counter record** (`worker_count`): hands out dense worker
//!   identifiers, backs the rendezvous barrier, and counts workers back out
//!   at teardown.
//! - **State record** (`leader_state`): the leader's IDLE/START/EXIT
//!   broadcast, polled by followers.
//! - **Dispatch record** (`dispatch`): per-item command parameters relayed
//!   from leader to followers, ordered strictly before each START.
//! - **Lock files** (`*.lock`): one `flock(2)`-backed mutual exclusion token
//!   per guarded record. The counter lock and state lock are never nested.
//! - **Toolkit scratch** (`itkbarrier<i>`, `itkdata*`): files the external
//!   computation's own multi-process barrier uses; the leader resets the
//!   barrier slots before the first item.
//!
//! [`CohortSession`] ties the records together into the worker lifecycle:
//! join (identity + barrier), broadcast/await, publish/consume, leave. The
//! last worker to leave purges the whole directory.
//!
//! Every wait is a bounded poll (see [`poll`]); exceeding a bound is a typed
//! error naming what was waited on, never a silent hang.
//!
//! # Example
//!
//! ```no_run
//! use regflock::coord::{CohortSession, CoordDir, Signal, TimingPolicy};
//!
//! # fn main() -> Result<(), regflock::coord::CoordError> {
//! let dir = CoordDir::new("/data/out/tmp");
//! let session = CohortSession::join(dir, 1, TimingPolicy::default())?;
//! assert!(session.identity().is_leader());
//!
//! session.broadcast(Signal::Idle)?;
//! session.broadcast(Signal::Exit)?;
//!
//! let purged = session.leave()?;
//! assert!(purged);
//! # Ok(())
//! # }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

const COUNTER_FILE: &str = "worker_count";
const COUNTER_LOCK_FILE: &str = "worker_count.lock";
const STATE_FILE: &str = "leader_state";
const STATE_LOCK_FILE: &str = "leader_state.lock";
const DISPATCH_FILE: &str = "dispatch";
const BARRIER_SCRATCH_PREFIX: &str = "itkbarrier";
const DATA_SCRATCH_PREFIX: &str = "itkdata";

/// Name of the coordination directory created under the run's output
/// directory. After a crash it must be removed by hand before rerunning.
pub const COORD_DIR_NAME: &str = "tmp";

/// The shared coordination directory and its internal layout.
///
/// Every worker derives identical paths from the same output directory, so
/// the file names here are an internal wire format: changing them is a
/// protocol change.
#[derive(Debug, Clone)]
pub struct CoordDir {
    root: PathBuf,
}

impl CoordDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The conventional location: `<output>/tmp`.
    pub fn under_output(output_dir: &Path) -> Self {
        Self::new(output_dir.join(COORD_DIR_NAME))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory. Fine if another worker got there first.
    pub fn ensure(&self) -> Result<(), CoordError> {
        fs::create_dir_all(&self.root)
            .map_err(|e| CoordError::io(format!("creating {}", self.root.display()), e))
    }

    pub fn counter_path(&self) -> PathBuf {
        self.root.join(COUNTER_FILE)
    }

    pub fn counter_lock_path(&self) -> PathBuf {
        self.root.join(COUNTER_LOCK_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    pub fn state_lock_path(&self) -> PathBuf {
        self.root.join(STATE_LOCK_FILE)
    }

    pub fn dispatch_path(&self) -> PathBuf {
        self.root.join(DISPATCH_FILE)
    }

    /// Barrier scratch file for one cohort slot.
    pub fn barrier_scratch_path(&self, slot: u32) -> PathBuf {
        self.root.join(format!("{}{}", BARRIER_SCRATCH_PREFIX, slot))
    }

    /// Prefix handed to the external toolkit for its barrier files.
    pub fn barrier_scratch_prefix(&self) -> PathBuf {
        self.root.join(BARRIER_SCRATCH_PREFIX)
    }

    /// Prefix handed to the external toolkit for its data files.
    pub fn data_scratch_prefix(&self) -> PathBuf {
        self.root.join(DATA_SCRATCH_PREFIX)
    }

    /// Recursively delete all shared state. Only the last worker out of the
    /// cohort is authorized to call this.
    pub fn purge(&self) -> Result<(), CoordError> {
        fs::remove_dir_all(&self.root)
            .map_err(|e| CoordError::io(format!("purging {}", self.root.display()), e))
    }
}

pub mod counter;
pub mod dispatch;
pub mod error;
pub mod lock;
pub mod poll;
pub mod session;
pub mod state;

pub use counter::CounterFile;
pub use dispatch::{DispatchFile, DispatchRecord};
pub use error::CoordError;
pub use lock::{FileLock, LockGuard};
pub use poll::{poll_until, PollPolicy};
pub use session::{CohortSession, TimingPolicy, WorkerIdentity};
pub use state::{Signal, StateFile};

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_is_derived_from_root() {
        let coord = CoordDir::new("/shared/out/tmp");
        assert_eq!(coord.counter_path(), Path::new("/shared/out/tmp/worker_count"));
        assert_eq!(
            coord.counter_lock_path(),
            Path::new("/shared/out/tmp/worker_count.lock")
        );
        assert_eq!(coord.state_path(), Path::new("/shared/out/tmp/leader_state"));
        assert_eq!(coord.dispatch_path(), Path::new("/shared/out/tmp/dispatch"));
        assert_eq!(
            coord.barrier_scratch_path(3),
            Path::new("/shared/out/tmp/itkbarrier3")
        );
    }

    #[test]
    fn test_under_output_appends_dir_name() {
        let coord = CoordDir::under_output(Path::new("/data/out"));
        assert_eq!(coord.root(), Path::new("/data/out/tmp"));
    }

    #[test]
    fn test_ensure_is_idempotent_and_purge_removes() {
        let out = TempDir::new().unwrap();
        let coord = CoordDir::under_output(out.path());

        coord.ensure().unwrap();
        coord.ensure().unwrap();
        assert!(coord.root().is_dir());

        fs::write(coord.counter_path(), "2").unwrap();
        coord.purge().unwrap();
        assert!(!coord.root().exists());
    }
}
