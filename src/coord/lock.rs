//! Exclusive file locks
//!
//! A [`FileLock`] names one lock file in the shared directory and hands out
//! RAII guards backed by `flock(2)`. Acquisition is a bounded poll of
//! non-blocking attempts with a little jitter, so a worker that cannot get
//! the lock in time reports a timeout instead of blocking forever. Dropping
//! the guard releases the lock on every exit path; the lock file itself
//! stays in place for the next acquirer and is removed with the rest of the
//! shared directory at teardown.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::time::Duration;

use super::error::CoordError;
use super::poll::{poll_until, PollPolicy};

const ACQUIRE_INTERVAL: Duration = Duration::from_millis(50);
const ACQUIRE_JITTER: Duration = Duration::from_millis(25);

/// A named mutual-exclusion token shared by cooperating processes.
#[derive(Debug, Clone)]
pub struct FileLock {
    name: &'static str,
    path: PathBuf,
    policy: PollPolicy,
}

/// Holds the lock until dropped.
///
/// Critical sections in this protocol are single read-modify-writes of a
/// small record; a guard must never be held across a blocking wait.
pub struct LockGuard {
    file: File,
}

impl FileLock {
    pub fn new(name: &'static str, path: PathBuf, timeout: Duration) -> Self {
        let policy = PollPolicy::new(ACQUIRE_INTERVAL, timeout).with_jitter(ACQUIRE_JITTER);
        Self { name, path, policy }
    }

    /// Block until the lock is held, up to the configured bound.
    pub fn acquire(&self) -> Result<LockGuard, CoordError> {
        match poll_until(&self.policy, || self.try_acquire())? {
            Some(guard) => Ok(guard),
            None => Err(CoordError::LockTimeout {
                name: self.name.to_string(),
                waited: self.policy.timeout,
            }),
        }
    }

    /// One non-blocking attempt; `Ok(None)` when another worker holds it.
    pub fn try_acquire(&self) -> Result<Option<LockGuard>, CoordError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| {
                CoordError::io(format!("opening lock file {}", self.path.display()), e)
            })?;

        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc == 0 {
            return Ok(Some(LockGuard { file }));
        }

        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::WouldBlock {
            Ok(None)
        } else {
            Err(CoordError::io(
                format!("locking {}", self.path.display()),
                err,
            ))
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Ignore errors on unlock - nothing we can do, and closing the
        // descriptor releases the flock regardless.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lock_in(dir: &TempDir, timeout_ms: u64) -> FileLock {
        FileLock::new(
            "test_lock",
            dir.path().join("resource.lock"),
            Duration::from_millis(timeout_ms),
        )
    }

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let lock = lock_in(&dir, 500);

        let guard = lock.acquire().unwrap();
        drop(guard);

        // Released on drop: a second acquisition succeeds right away.
        let _guard = lock.acquire().unwrap();
    }

    #[test]
    fn test_try_acquire_reports_contention() {
        let dir = TempDir::new().unwrap();
        let lock = lock_in(&dir, 500);

        let _held = lock.acquire().unwrap();
        let second = FileLock::new(
            "test_lock",
            dir.path().join("resource.lock"),
            Duration::from_millis(500),
        );
        assert!(second.try_acquire().unwrap().is_none());
    }

    #[test]
    fn test_contended_acquire_times_out() {
        let dir = TempDir::new().unwrap();
        let lock = lock_in(&dir, 500);

        let _held = lock.acquire().unwrap();
        let waiter = lock_in(&dir, 150);
        match waiter.acquire() {
            Err(CoordError::LockTimeout { name, .. }) => assert_eq!(name, "test_lock"),
            other => panic!("expected lock timeout, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_acquire_succeeds_once_holder_drops() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resource.lock");

        let holder = FileLock::new("test_lock", path.clone(), Duration::from_millis(500));
        let waiter = FileLock::new("test_lock", path, Duration::from_secs(5));

        let guard = holder.acquire().unwrap();
        crossbeam::thread::scope(|scope| {
            let handle = scope.spawn(|_| waiter.acquire().map(|_| ()));
            std::thread::sleep(Duration::from_millis(100));
            drop(guard);
            handle.join().unwrap().unwrap();
        })
        .unwrap();
    }
}
