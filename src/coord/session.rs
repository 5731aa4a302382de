//! Cohort membership
//!
//! A [`CohortSession`] is one worker's handle on the shared protocol state,
//! covering its whole lifecycle:
//!
//! 1. **Join**: take the next identifier from the counter record (creator
//!    gets 0 and leads), then rendezvous until every expected identifier has
//!    been issued.
//! 2. **Drive**: the leader broadcasts signals and publishes dispatch
//!    records; followers await signals and consume dispatches.
//! 3. **Leave**: decrement the counter; the worker that brings it to zero
//!    purges the shared directory.
//!
//! `leave` consumes the session, so leaving twice is unrepresentable. The
//! whole lifecycle runs in-process against any directory, which is what lets
//! the tests below exercise real multi-worker interleavings with plain
//! threads instead of spawned processes.

use std::cell::Cell;
use std::time::Duration;

use super::counter::CounterFile;
use super::dispatch::{DispatchFile, DispatchRecord};
use super::error::CoordError;
use super::lock::FileLock;
use super::poll::{poll_until, PollPolicy};
use super::state::{Signal, StateFile};
use super::CoordDir;

/// Timing knobs for every protocol wait.
///
/// The signal bound is far larger than the others because a follower
/// legitimately idles for as long as one external registration runs.
#[derive(Debug, Clone, Copy)]
pub struct TimingPolicy {
    /// Sleep between probes of the counter and state records.
    pub poll_interval: Duration,
    /// Bound on the rendezvous barrier (and on dispatch appearance).
    pub barrier_timeout: Duration,
    /// Bound on waiting for a leader signal.
    pub signal_timeout: Duration,
    /// Bound on acquiring any single lock.
    pub lock_timeout: Duration,
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            barrier_timeout: Duration::from_secs(60),
            signal_timeout: Duration::from_secs(4 * 60 * 60),
            lock_timeout: Duration::from_secs(30),
        }
    }
}

/// Who a worker is within its cohort. Assigned once at join, immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub id: u32,
    pub cohort: u32,
}

impl WorkerIdentity {
    /// The worker that created the counter record leads the cohort.
    pub fn is_leader(&self) -> bool {
        self.id == 0
    }

    pub fn role_name(&self) -> &'static str {
        if self.is_leader() {
            "leader"
        } else {
            "follower"
        }
    }
}

/// One worker's membership in a live cohort.
pub struct CohortSession {
    dir: CoordDir,
    identity: WorkerIdentity,
    counter: CounterFile,
    state: StateFile,
    dispatch: DispatchFile,
    timing: TimingPolicy,
    // The leader is the single writer of the state record, so its own last
    // broadcast is enough to enforce the transition table locally.
    last_broadcast: Cell<Option<Signal>>,
}

impl CohortSession {
    /// Join the cohort: create the shared directory if needed, take the next
    /// identity, and block until all `cohort` workers have joined.
    ///
    /// An identity at or beyond `cohort` means more workers were launched
    /// than configured; the slot is handed back (so a correctly sized cohort
    /// can still fill) and the join fails. A failed rendezvous hands the
    /// slot back the same way, purging the directory if this worker was the
    /// last one counted.
    pub fn join(dir: CoordDir, cohort: u32, timing: TimingPolicy) -> Result<Self, CoordError> {
        dir.ensure()?;

        let counter = CounterFile::new(
            dir.counter_path(),
            FileLock::new("worker_count", dir.counter_lock_path(), timing.lock_timeout),
        );
        let state = StateFile::new(
            dir.state_path(),
            FileLock::new("leader_state", dir.state_lock_path(), timing.lock_timeout),
        );
        let dispatch = DispatchFile::new(dir.dispatch_path());

        let id = counter.assign_next()?;
        if id >= cohort {
            let _ = counter.decrement();
            return Err(CoordError::IdentityOutOfRange { id, cohort });
        }

        let session = Self {
            dir,
            identity: WorkerIdentity { id, cohort },
            counter,
            state,
            dispatch,
            timing,
            last_broadcast: Cell::new(None),
        };
        if let Err(err) = session.await_cohort() {
            // Best-effort hand-back: the count must only ever reflect
            // workers live inside the run, and the last one out still
            // purges. The rendezvous failure is what gets reported.
            if let Ok(0) = session.counter.decrement() {
                let _ = session.dir.purge();
            }
            return Err(err);
        }
        Ok(session)
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    pub fn dir(&self) -> &CoordDir {
        &self.dir
    }

    /// Rendezvous barrier: poll the counter until every expected identifier
    /// has been issued. Exceeding the bound is fatal; the protocol must not
    /// continue with an incomplete cohort.
    fn await_cohort(&self) -> Result<(), CoordError> {
        let policy = PollPolicy::new(self.timing.poll_interval, self.timing.barrier_timeout);
        let expected = self.identity.cohort;
        let mut joined = 0;

        let arrived = poll_until(&policy, || match self.counter.current()? {
            Some(value) if value >= expected => {
                joined = value;
                Ok(Some(()))
            }
            Some(value) => {
                joined = value;
                Ok(None)
            }
            None => Ok(None),
        })?;

        match arrived {
            Some(()) => Ok(()),
            None => Err(CoordError::BarrierTimeout {
                joined,
                expected,
                waited: policy.timeout,
            }),
        }
    }

    /// Leader-only: broadcast the next signal to the cohort.
    ///
    /// The legal transitions are IDLE→START→IDLE, repeated per work item,
    /// and anything→EXIT; the first broadcast must be IDLE (or EXIT on an
    /// aborted run). Anything else is a protocol bug and is rejected.
    pub fn broadcast(&self, signal: Signal) -> Result<(), CoordError> {
        let legal = match self.last_broadcast.get() {
            None => matches!(signal, Signal::Idle | Signal::Exit),
            Some(previous) => previous.may_transition_to(signal),
        };
        if !legal {
            return Err(CoordError::InvalidTransition {
                from: self
                    .last_broadcast
                    .get()
                    .map(Signal::name)
                    .unwrap_or("UNSET"),
                to: signal.name(),
            });
        }

        self.state.write(signal)?;
        self.last_broadcast.set(Some(signal));
        Ok(())
    }

    /// Follower: wait for the leader to start an item or end the run.
    /// An absent state record means the leader has not initialized yet and
    /// is simply polled through.
    pub fn await_start_or_exit(&self) -> Result<Signal, CoordError> {
        self.await_signal("START or EXIT", |signal| {
            matches!(signal, Signal::Start | Signal::Exit)
        })
    }

    /// Follower: wait for the in-flight item to finish. EXIT is also
    /// accepted so a leader abort mid-item cannot strand the cohort.
    pub fn await_idle_or_exit(&self) -> Result<Signal, CoordError> {
        self.await_signal("IDLE or EXIT", |signal| {
            matches!(signal, Signal::Idle | Signal::Exit)
        })
    }

    fn await_signal(
        &self,
        awaiting: &'static str,
        wanted: impl Fn(Signal) -> bool,
    ) -> Result<Signal, CoordError> {
        let policy = PollPolicy::new(self.timing.poll_interval, self.timing.signal_timeout);
        let seen = poll_until(&policy, || {
            Ok(self.state.read()?.filter(|signal| wanted(*signal)))
        })?;
        seen.ok_or(CoordError::SignalTimeout {
            awaiting,
            waited: policy.timeout,
        })
    }

    /// Leader-only: publish the work-item parameters. Must complete before
    /// the matching START broadcast; the caller owns that ordering.
    pub fn publish_dispatch(&self, record: &DispatchRecord) -> Result<(), CoordError> {
        self.dispatch.publish(record)
    }

    /// Follower, only after observing START. Publication order makes the
    /// record complete by then; a short bounded poll covers laggy shared
    /// filesystems.
    pub fn consume_dispatch(&self) -> Result<DispatchRecord, CoordError> {
        let policy = PollPolicy::new(self.timing.poll_interval, self.timing.barrier_timeout);
        poll_until(&policy, || self.dispatch.consume())?.ok_or(CoordError::DispatchTimeout {
            waited: policy.timeout,
        })
    }

    /// Leave the cohort, decrementing the live-worker count. Returns whether
    /// this worker was the last out and purged the shared directory.
    ///
    /// Consumes the session: every worker leaves exactly once, and a left
    /// session cannot be used again.
    pub fn leave(self) -> Result<bool, CoordError> {
        let remaining = self.counter.decrement()?;
        if remaining == 0 {
            self.dir.purge()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
